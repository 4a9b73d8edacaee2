//! Columnar in-memory batches read from and written to tab-delimited files.

use crate::constants::{FIELD_DELIMITER, NULL_SENTINEL};
use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::warn;

/// One named column of nullable text values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<String>>,
}

/// An ordered set of equally long columns, one row per source line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    columns: Vec<Column>,
    row_count: usize,
}

/// A parsed batch plus the rows that had to be dropped while reading
#[derive(Debug)]
pub struct ParsedBatch {
    pub batch: RecordBatch,
    pub malformed_rows: usize,
}

impl RecordBatch {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: names
                .into_iter()
                .map(|name| Column {
                    name: name.into(),
                    values: Vec::new(),
                })
                .collect(),
            row_count: 0,
        }
    }

    /// Append one row; the row must have exactly one value per column
    pub fn push_row<I>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = Option<String>>,
    {
        let row: Vec<Option<String>> = row.into_iter().collect();
        if row.len() != self.columns.len() {
            return Err(PipelineError::Malformed {
                path: "<batch>".to_string(),
                reason: format!(
                    "row has {} fields, expected {}",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn value(&self, column: &str, row: usize) -> Option<&str> {
        self.column(column)
            .and_then(|c| c.values.get(row))
            .and_then(|v| v.as_deref())
    }

    /// Keep rows where `keep[row]` is true. Returns how many rows were removed.
    pub fn retain_rows(&mut self, keep: &[bool]) -> usize {
        debug_assert_eq!(keep.len(), self.row_count);
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| *flags.next().unwrap_or(&true));
        }
        let kept = keep.iter().filter(|k| **k).count();
        let removed = self.row_count - kept;
        self.row_count = kept;
        removed
    }

    /// Read a tab-delimited file with a header row.
    ///
    /// `\N` becomes a missing value; every other field is kept as text. Rows whose
    /// field count differs from the header, or that are not valid UTF-8, are
    /// skipped and counted.
    pub fn read_tsv(path: &Path) -> Result<ParsedBatch> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            PipelineError::Malformed { reason, .. } => PipelineError::Malformed {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<ParsedBatch> {
        let mut reader = tsv_reader_builder().from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
            return Err(PipelineError::Malformed {
                path: "<input>".to_string(),
                reason: "missing header row".to_string(),
            });
        }

        let mut batch = RecordBatch::new(headers.iter());
        let mut malformed_rows = 0;

        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if is_row_level(&e) => {
                    warn!("Skipping unreadable row: {}", e);
                    malformed_rows += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if record.len() != headers.len() {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                warn!(
                    "Skipping line {}: expected {} fields, saw {}",
                    line,
                    headers.len(),
                    record.len()
                );
                malformed_rows += 1;
                continue;
            }

            batch.push_row(record.iter().map(parse_field))?;
        }

        Ok(ParsedBatch {
            batch,
            malformed_rows,
        })
    }

    /// Write the batch as tab-delimited text with a header row and `\N` for missing values
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(FIELD_DELIMITER)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(writer);

        writer.write_record(self.column_names())?;
        for row in 0..self.row_count {
            writer.write_record(self.columns.iter().map(|c| {
                c.values[row].as_deref().unwrap_or(NULL_SENTINEL)
            }))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Reader settings for the raw snapshot format: tabs, a header row, no quoting
fn tsv_reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(FIELD_DELIMITER)
        .has_headers(true)
        .quoting(false)
        .flexible(true);
    builder
}

fn parse_field(field: &str) -> Option<String> {
    if field == NULL_SENTINEL {
        None
    } else {
        Some(field.to_string())
    }
}

fn is_row_level(e: &csv::Error) -> bool {
    matches!(
        e.kind(),
        csv::ErrorKind::Utf8 { .. } | csv::ErrorKind::UnequalLengths { .. }
    )
}
