//! The loader: cleaned files in, populated tables out, all in one transaction.
//!
//! Tables are truncated and bulk-copied in [`LOAD_ORDER`]; afterwards, under the
//! post-load cleanup policy, rows with dangling foreign keys are deleted. Any
//! failure rolls the whole run back, so readers never see a half-loaded dataset.

use crate::config::IntegrityPolicy;
use crate::constants::tsv_file_name;
use crate::error::{PipelineError, Result};
use crate::metrics::LoadMetrics;
use crate::store::BulkStore;
use crate::tables::{TableDescriptor, LOAD_ORDER};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::BufReader;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableLoad {
    pub table: String,
    pub rows: u64,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrphanCleanup {
    pub table: String,
    pub column: String,
    pub references: String,
    pub deleted: u64,
}

/// Result of a committed load
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub policy: IntegrityPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableLoad>,
    pub orphan_cleanups: Vec<OrphanCleanup>,
}

impl LoadReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn orphans_deleted(&self) -> u64 {
        self.orphan_cleanups.iter().map(|c| c.deleted).sum()
    }

    pub fn rows_for(&self, table: &str) -> Option<u64> {
        self.tables.iter().find(|t| t.table == table).map(|t| t.rows)
    }
}

/// Loads a cleaned directory into a [`BulkStore`]
pub struct Loader<S: BulkStore> {
    store: S,
    policy: IntegrityPolicy,
}

impl<S: BulkStore> std::fmt::Debug for Loader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("store", &"<dyn BulkStore>")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S: BulkStore> Loader<S> {
    pub fn new(store: S, policy: IntegrityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load every table from `cleaned_dir` atomically.
    ///
    /// On error nothing is committed and the error names the failing table.
    pub async fn load(&mut self, cleaned_dir: &Path) -> Result<LoadReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("load", %run_id, policy = ?self.policy);
        self.run(cleaned_dir, run_id).instrument(span).await
    }

    async fn run(&mut self, cleaned_dir: &Path, run_id: Uuid) -> Result<LoadReport> {
        let started_at = Utc::now();

        // Resolve every file before touching the store
        let plan = plan_files(cleaned_dir)?;

        self.store.begin().await?;
        info!("Load transaction opened for {} tables", plan.len());

        match self.load_in_transaction(&plan).await {
            Ok((tables, orphan_cleanups)) => {
                self.store.commit().await?;
                let report = LoadReport {
                    run_id,
                    policy: self.policy,
                    started_at,
                    finished_at: Utc::now(),
                    tables,
                    orphan_cleanups,
                };
                LoadMetrics::record_commit(report.total_rows());
                info!(
                    "Load committed: {} rows across {} tables, {} orphans removed",
                    report.total_rows(),
                    report.tables.len(),
                    report.orphans_deleted()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Load failed, rolling back: {}", e);
                if let Err(rollback_err) = self.store.rollback().await {
                    error!("Rollback failed: {}", rollback_err);
                }
                LoadMetrics::record_rollback();
                Err(e)
            }
        }
    }

    async fn load_in_transaction(
        &mut self,
        plan: &[(&'static TableDescriptor, PathBuf)],
    ) -> Result<(Vec<TableLoad>, Vec<OrphanCleanup>)> {
        let mut tables = Vec::with_capacity(plan.len());
        for (descriptor, path) in plan {
            let loaded = self
                .load_table(descriptor, path)
                .instrument(info_span!("table", table = descriptor.table_name))
                .await
                .map_err(|e| e.in_table(descriptor.table_name))?;
            tables.push(loaded);
        }

        let mut cleanups = Vec::new();
        if self.policy.cleans_after_load() {
            for descriptor in LOAD_ORDER.iter() {
                for fk in descriptor.foreign_keys {
                    let deleted = self
                        .store
                        .delete_orphans(descriptor.table_name, fk)
                        .await
                        .map_err(|e| e.in_table(descriptor.table_name))?;
                    let references = fk.references.descriptor().table_name;
                    if deleted > 0 {
                        warn!(
                            "Deleted {} orphaned rows from {} ({} not in {})",
                            deleted, descriptor.table_name, fk.column, references
                        );
                    }
                    LoadMetrics::record_orphans_deleted(descriptor.table_name, deleted);
                    cleanups.push(OrphanCleanup {
                        table: descriptor.table_name.to_string(),
                        column: fk.column.to_string(),
                        references: references.to_string(),
                        deleted,
                    });
                }
            }
        }

        Ok((tables, cleanups))
    }

    async fn load_table(&mut self, descriptor: &TableDescriptor, path: &Path) -> Result<TableLoad> {
        info!("Loading {}...", descriptor.table_name);
        let started = Instant::now();

        self.store.truncate_cascade(descriptor.table_name).await?;

        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::new(file);
        let rows = self.store.copy_in(descriptor.table_name, &mut reader).await?;

        let elapsed = started.elapsed();
        LoadMetrics::record_table_loaded(descriptor.table_name, rows, elapsed.as_secs_f64());
        info!("Loaded {} ({} rows)", descriptor.table_name, rows);

        Ok(TableLoad {
            table: descriptor.table_name.to_string(),
            rows,
            duration_ms: elapsed.as_millis(),
        })
    }
}

/// Cleaned file for every table in load order; a missing file is fatal
fn plan_files(cleaned_dir: &Path) -> Result<Vec<(&'static TableDescriptor, PathBuf)>> {
    LOAD_ORDER
        .iter()
        .map(|descriptor| {
            let path = cleaned_dir.join(tsv_file_name(descriptor.raw_key));
            if path.is_file() {
                Ok((*descriptor, path))
            } else {
                Err(PipelineError::MissingCleanedFile(path.display().to_string())
                    .in_table(descriptor.table_name))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::StoreOp;
    use crate::store::MemoryStore;
    use std::fs;
    use tempfile::tempdir;

    fn write_minimal_dir(dir: &Path) {
        let files = [
            ("title.basics", "tconst\tprimaryTitle\ntt1\tA\ntt2\tB\n"),
            ("name.basics", "nconst\tprimaryName\nnm1\tX\n"),
            ("title.crew", "tconst\tdirectors\ntt1\t\\N\n"),
            ("title.episode", "tconst\tparentTconst\ntt2\ttt1\n"),
            ("title.principals", "tconst\tnconst\ntt1\tnm1\ntt1\tnm7\n"),
            ("title.ratings", "tconst\tnumVotes\ntt1\t5\ntt3\t1\n"),
            ("title.akas", "titleId\ttitle\ntt1\tA\ntt9\tZ\n"),
        ];
        for (key, body) in files {
            fs::write(dir.join(tsv_file_name(key)), body).unwrap();
        }
    }

    #[tokio::test]
    async fn test_tables_load_in_dependency_order() {
        let dir = tempdir().unwrap();
        write_minimal_dir(dir.path());

        let mut loader = Loader::new(MemoryStore::with_imdb_schema(), IntegrityPolicy::PostLoadCleanup);
        loader.load(dir.path()).await.unwrap();

        let copies: Vec<&str> = loader
            .store()
            .ops()
            .iter()
            .filter_map(|op| match op {
                StoreOp::Copy(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        let expected: Vec<&str> = LOAD_ORDER.iter().map(|d| d.table_name).collect();
        assert_eq!(copies, expected);
        assert_eq!(loader.store().ops().first(), Some(&StoreOp::Begin));
        assert_eq!(loader.store().ops().last(), Some(&StoreOp::Commit));
    }

    #[tokio::test]
    async fn test_orphans_removed_after_load() {
        let dir = tempdir().unwrap();
        write_minimal_dir(dir.path());

        let mut loader = Loader::new(MemoryStore::with_imdb_schema(), IntegrityPolicy::PostLoadCleanup);
        let report = loader.load(dir.path()).await.unwrap();
        let store = loader.store();

        assert_eq!(store.row_count("title_ratings"), 1);
        assert_eq!(store.row_count("title_akas"), 1);
        assert_eq!(store.row_count("title_principals"), 1);
        assert_eq!(report.orphans_deleted(), 3);
        assert_eq!(report.rows_for("title_akas"), Some(2));
    }

    #[tokio::test]
    async fn test_pre_load_policy_skips_cleanup() {
        let dir = tempdir().unwrap();
        write_minimal_dir(dir.path());

        let mut loader = Loader::new(MemoryStore::with_imdb_schema(), IntegrityPolicy::PreLoadFilter);
        let report = loader.load(dir.path()).await.unwrap();

        assert!(report.orphan_cleanups.is_empty());
        assert_eq!(loader.store().row_count("title_akas"), 2);
        assert!(!loader
            .store()
            .ops()
            .iter()
            .any(|op| matches!(op, StoreOp::DeleteOrphans { .. })));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_transaction() {
        let dir = tempdir().unwrap();
        write_minimal_dir(dir.path());
        fs::remove_file(dir.path().join("title.ratings.tsv")).unwrap();

        let mut loader = Loader::new(MemoryStore::with_imdb_schema(), IntegrityPolicy::PostLoadCleanup);
        let err = loader.load(dir.path()).await.unwrap_err();

        match err {
            PipelineError::Load { table, source } => {
                assert_eq!(table, "title_ratings");
                assert!(matches!(*source, PipelineError::MissingCleanedFile(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(loader.store().ops().is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_rolls_back_everything() {
        let dir = tempdir().unwrap();
        write_minimal_dir(dir.path());

        let store = MemoryStore::with_imdb_schema().fail_copy_on("title_principals");
        let mut loader = Loader::new(store, IntegrityPolicy::PostLoadCleanup);
        let err = loader.load(dir.path()).await.unwrap_err();

        assert!(err.to_string().contains("title_principals"));
        let store = loader.store();
        for d in LOAD_ORDER.iter() {
            assert_eq!(store.row_count(d.table_name), 0, "{} not rolled back", d.table_name);
        }
        assert_eq!(store.ops().last(), Some(&StoreOp::Rollback));
        assert!(!store.in_transaction());
    }
}
