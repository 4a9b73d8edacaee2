use crate::constants::{FIELD_DELIMITER, NULL_SENTINEL};
use crate::error::{PipelineError, Result};
use crate::store::BulkStore;
use crate::tables::{ForeignKey, LOAD_ORDER};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Rows of one in-memory table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column, matched case-insensitively like unquoted identifiers
    pub fn column_values(&self, name: &str) -> Vec<Option<&str>> {
        match self.column_index(name) {
            Some(i) => self.rows.iter().map(|r| r[i].as_deref()).collect(),
            None => Vec::new(),
        }
    }
}

/// A store operation, recorded in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Begin,
    Truncate(String),
    Copy(String),
    DeleteOrphans { table: String, column: String },
    Commit,
    Rollback,
}

/// In-process store for development and testing.
///
/// Tables must be declared up front, like a pre-existing schema. Writes go to a
/// working copy that replaces the committed state only on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: HashMap<String, MemoryTable>,
    working: Option<HashMap<String, MemoryTable>>,
    fail_copy_on: Option<String>,
    ops: Vec<StoreOp>,
}

impl MemoryStore {
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            committed: tables
                .into_iter()
                .map(|t| (t.into(), MemoryTable::default()))
                .collect(),
            ..Self::default()
        }
    }

    /// Every IMDb target table, empty
    pub fn with_imdb_schema() -> Self {
        Self::with_tables(LOAD_ORDER.iter().map(|d| d.table_name))
    }

    /// Make every copy into `table` fail
    pub fn fail_copy_on(mut self, table: &str) -> Self {
        self.fail_copy_on = Some(table.to_string());
        self
    }

    pub fn clear_failure(&mut self) {
        self.fail_copy_on = None;
    }

    /// Committed contents of a table
    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.committed.get(name)
    }

    pub fn row_count(&self, name: &str) -> usize {
        self.committed.get(name).map_or(0, |t| t.rows.len())
    }

    /// Seed committed rows directly, bypassing the transaction
    pub fn seed(&mut self, name: &str, columns: &[&str], rows: Vec<Vec<Option<String>>>) {
        self.committed.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn in_transaction(&self) -> bool {
        self.working.is_some()
    }

    fn working(&mut self) -> Result<&mut HashMap<String, MemoryTable>> {
        self.working.as_mut().ok_or_else(|| PipelineError::Store {
            message: "no transaction open".to_string(),
        })
    }

    fn working_table<'a>(
        tables: &'a mut HashMap<String, MemoryTable>,
        name: &str,
    ) -> Result<&'a mut MemoryTable> {
        tables.get_mut(name).ok_or_else(|| PipelineError::Store {
            message: format!("relation \"{}\" does not exist", name),
        })
    }
}

/// Tables whose foreign keys point at `table`, transitively
fn cascade_targets(table: &str) -> Vec<&'static str> {
    let mut targets = vec![];
    let mut pending = vec![table.to_string()];
    let mut seen = HashSet::new();
    while let Some(current) = pending.pop() {
        for d in LOAD_ORDER.iter() {
            let references_current = d
                .foreign_keys
                .iter()
                .any(|fk| fk.references.descriptor().table_name == current);
            if references_current && seen.insert(d.table_name) {
                targets.push(d.table_name);
                pending.push(d.table_name.to_string());
            }
        }
    }
    targets
}

/// Parse COPY-style CSV text: tab delimiter, header row, unquoted `\N` as null
fn parse_copy_text(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<Option<String>>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|f| (f != NULL_SENTINEL).then(|| f.to_string()))
                .collect(),
        );
    }
    Ok((headers, rows))
}

#[async_trait]
impl BulkStore for MemoryStore {
    async fn begin(&mut self) -> Result<()> {
        if self.working.is_some() {
            return Err(PipelineError::Store {
                message: "transaction already open".to_string(),
            });
        }
        self.working = Some(self.committed.clone());
        self.ops.push(StoreOp::Begin);
        Ok(())
    }

    async fn truncate_cascade(&mut self, table: &str) -> Result<()> {
        let tables = self.working()?;
        Self::working_table(tables, table)?.rows.clear();
        for dependent in cascade_targets(table) {
            if let Some(t) = tables.get_mut(dependent) {
                t.rows.clear();
            }
        }
        self.ops.push(StoreOp::Truncate(table.to_string()));
        Ok(())
    }

    async fn copy_in(
        &mut self,
        table: &str,
        source: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        if self.fail_copy_on.as_deref() == Some(table) {
            return Err(PipelineError::Store {
                message: format!("injected copy failure for {}", table),
            });
        }

        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes).await?;
        let (headers, rows) = parse_copy_text(&bytes)?;

        let tables = self.working()?;
        let target = Self::working_table(tables, table)?;
        if target.columns.is_empty() {
            target.columns = headers;
        } else if target.columns.len() != headers.len() {
            return Err(PipelineError::Store {
                message: format!(
                    "extra or missing data for {}: {} columns, table has {}",
                    table,
                    headers.len(),
                    target.columns.len()
                ),
            });
        }

        let copied = rows.len() as u64;
        target.rows.extend(rows);
        debug!("Copied {} rows into {}", copied, table);
        self.ops.push(StoreOp::Copy(table.to_string()));
        Ok(copied)
    }

    async fn delete_orphans(&mut self, table: &str, fk: &ForeignKey) -> Result<u64> {
        let parent_name = fk.references.descriptor().table_name;
        let tables = self.working()?;

        let parent = Self::working_table(tables, parent_name)?;
        let parent_index = parent.column_index(fk.referenced_column).ok_or_else(|| {
            PipelineError::Store {
                message: format!(
                    "column \"{}\" of {} does not exist",
                    fk.referenced_column, parent_name
                ),
            }
        })?;
        let valid: HashSet<String> = parent
            .rows
            .iter()
            .filter_map(|r| r[parent_index].clone())
            .collect();

        let child = Self::working_table(tables, table)?;
        if child.rows.is_empty() {
            self.ops.push(StoreOp::DeleteOrphans {
                table: table.to_string(),
                column: fk.column.to_string(),
            });
            return Ok(0);
        }
        let index = child.column_index(fk.column).ok_or_else(|| PipelineError::Store {
            message: format!("column \"{}\" of {} does not exist", fk.column, table),
        })?;

        let before = child.rows.len();
        child
            .rows
            .retain(|r| r[index].as_ref().map_or(true, |v| valid.contains(v)));
        let deleted = (before - child.rows.len()) as u64;

        self.ops.push(StoreOp::DeleteOrphans {
            table: table.to_string(),
            column: fk.column.to_string(),
        });
        Ok(deleted)
    }

    async fn commit(&mut self) -> Result<()> {
        let working = self.working.take().ok_or_else(|| PipelineError::Store {
            message: "no transaction to commit".to_string(),
        })?;
        self.committed = working;
        self.ops.push(StoreOp::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.working.take().is_some() {
            self.ops.push(StoreOp::Rollback);
        }
        Ok(())
    }
}
