//! The cleaner: raw snapshot files in, one cleaned file per table out.
//!
//! Cleaning is best-effort. A file that cannot be read or written is logged,
//! reported as failed, and the run moves on to the next file.

pub mod coerce;
pub mod reference;

use crate::batch::RecordBatch;
use crate::config::IntegrityPolicy;
use crate::constants::TSV_EXTENSION;
use crate::error::Result;
use crate::metrics::CleanMetrics;
use crate::tables::{descriptor_for, ReferenceKey, TableDescriptor, TextDefault};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub use reference::ReferenceSets;

/// Outcome of cleaning one source file
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Cleaned(CleanStats),
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CleanStats {
    pub rows_read: usize,
    pub rows_written: usize,
    pub malformed_rows: usize,
    pub filtered_rows: usize,
    pub nulled_values: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub raw_key: String,
    pub source: PathBuf,
    pub outcome: FileOutcome,
}

/// Result of a complete clean run
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub run_id: Uuid,
    pub policy: IntegrityPolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
}

impl CleanReport {
    pub fn cleaned_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Cleaned(_)))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Failed { .. }))
            .count()
    }

    pub fn file(&self, raw_key: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.raw_key == raw_key)
    }
}

/// Cleans every known `.tsv` file in a directory
#[derive(Debug, Clone, Copy)]
pub struct Cleaner {
    policy: IntegrityPolicy,
}

impl Cleaner {
    pub fn new(policy: IntegrityPolicy) -> Self {
        Self { policy }
    }

    /// Clean all snapshot files in `source_dir` into `dest_dir`.
    ///
    /// Only an unusable directory is an error; per-file problems end up in the report.
    #[instrument(skip(self), fields(policy = ?self.policy))]
    pub fn clean(&self, source_dir: &Path, dest_dir: &Path) -> Result<CleanReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        fs::create_dir_all(dest_dir)?;

        let sources = list_source_files(source_dir)?;
        info!("Found {} source files in {}", sources.len(), source_dir.display());

        let references = if self.policy.filters_before_load() {
            let needed = sources
                .iter()
                .filter_map(|(key, _)| descriptor_for(key))
                .flat_map(|d| d.reference_filters.iter().map(|f| f.reference))
                .collect::<HashSet<ReferenceKey>>();
            Some(ReferenceSets::build(source_dir, needed))
        } else {
            None
        };

        let mut files = Vec::with_capacity(sources.len());
        for (raw_key, path) in sources {
            let outcome = match descriptor_for(&raw_key) {
                None => {
                    warn!("No table descriptor for {}, skipping", raw_key);
                    CleanMetrics::record_file_skipped();
                    FileOutcome::Skipped {
                        reason: format!("no table descriptor for '{}'", raw_key),
                    }
                }
                Some(descriptor) => {
                    let dest = dest_dir.join(path.file_name().unwrap_or_default());
                    match clean_file(descriptor, &path, &dest, references.as_ref()) {
                        Ok(stats) => {
                            info!(
                                "Saved cleaned {} ({} rows, {} filtered, {} malformed)",
                                raw_key, stats.rows_written, stats.filtered_rows, stats.malformed_rows
                            );
                            CleanMetrics::record_file_cleaned(&stats);
                            FileOutcome::Cleaned(stats)
                        }
                        Err(e) => {
                            error!("Error cleaning {}: {}", path.display(), e);
                            remove_stale_output(&dest);
                            CleanMetrics::record_file_failed();
                            FileOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    }
                }
            };
            files.push(FileReport {
                raw_key,
                source: path,
                outcome,
            });
        }

        Ok(CleanReport {
            run_id,
            policy: self.policy,
            started_at,
            finished_at: Utc::now(),
            files,
        })
    }
}

/// Drop a cleaned file left by an earlier run so it cannot be loaded alongside fresh ones
fn remove_stale_output(dest: &Path) {
    match fs::remove_file(dest) {
        Ok(()) => warn!("Removed stale cleaned file {}", dest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!("Could not remove stale cleaned file {}: {}", dest.display(), e),
    }
}

/// `.tsv` files in `dir`, sorted by name, paired with their raw key (file stem)
fn list_source_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(TSV_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((stem.to_string(), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}

/// Read, clean and write one file. The output appears only once fully written.
#[instrument(skip(descriptor, references), fields(raw_key = descriptor.raw_key))]
fn clean_file(
    descriptor: &TableDescriptor,
    source: &Path,
    dest: &Path,
    references: Option<&ReferenceSets>,
) -> Result<CleanStats> {
    info!("Processing {}...", descriptor.raw_key);
    let parsed = RecordBatch::read_tsv(source)?;
    let mut batch = parsed.batch;
    let rows_read = batch.row_count() + parsed.malformed_rows;

    let mut stats = clean_batch(descriptor, &mut batch, references)?;
    stats.rows_read = rows_read;
    stats.malformed_rows = parsed.malformed_rows;
    stats.rows_written = batch.row_count();

    let partial = dest.with_extension(format!("{}.partial", TSV_EXTENSION));
    batch.write_tsv(&partial)?;
    fs::rename(&partial, dest)?;
    Ok(stats)
}

/// Apply a table's rules to a batch in place.
///
/// Order: reference filter, integer coercion, array encoding, flags, text defaults.
/// Columns a rule names but the batch lacks are skipped.
pub fn clean_batch(
    descriptor: &TableDescriptor,
    batch: &mut RecordBatch,
    references: Option<&ReferenceSets>,
) -> Result<CleanStats> {
    let mut stats = CleanStats::default();

    if let Some(references) = references {
        stats.filtered_rows = filter_by_reference(descriptor, batch, references)?;
    }

    for name in descriptor.integer_columns {
        if let Some(column) = batch.column_mut(name) {
            for value in column.values.iter_mut() {
                let coerced = coerce::coerce_integer(value.as_deref());
                if coerced.is_none() && value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                    stats.nulled_values += 1;
                }
                *value = coerced;
            }
        }
    }

    for name in descriptor.array_columns {
        let non_null = descriptor.non_null_array_columns.contains(name);
        if let Some(column) = batch.column_mut(name) {
            for value in column.values.iter_mut() {
                *value = if non_null {
                    coerce::encode_array_non_null(value.as_deref())
                } else {
                    coerce::encode_array(value.as_deref())
                };
            }
        }
    }

    for name in descriptor.boolean_columns {
        if let Some(column) = batch.column_mut(name) {
            for value in column.values.iter_mut() {
                *value = coerce::coerce_flag(value.as_deref());
            }
        }
    }

    for rule in descriptor.text_defaults {
        match *rule {
            TextDefault::Placeholder { column, value: placeholder } => {
                if let Some(column) = batch.column_mut(column) {
                    for value in column.values.iter_mut() {
                        *value = coerce::with_placeholder(value.take(), placeholder);
                    }
                }
            }
            TextDefault::FallbackTo { column, source } => {
                let Some(fallbacks) = batch.column(source).map(|c| c.values.clone()) else {
                    continue;
                };
                if let Some(column) = batch.column_mut(column) {
                    for (value, fallback) in column.values.iter_mut().zip(fallbacks.iter()) {
                        *value = coerce::with_fallback(value.take(), fallback.as_deref());
                    }
                }
            }
        }
    }

    Ok(stats)
}

/// Drop rows whose filtered columns reference unknown keys. Returns rows removed.
fn filter_by_reference(
    descriptor: &TableDescriptor,
    batch: &mut RecordBatch,
    references: &ReferenceSets,
) -> Result<usize> {
    if descriptor.reference_filters.is_empty() {
        return Ok(0);
    }

    let mut keep = vec![true; batch.row_count()];
    for filter in descriptor.reference_filters {
        let Some(column) = batch.column(filter.column) else {
            warn!("{} has no column {}, filter skipped", descriptor.raw_key, filter.column);
            continue;
        };
        let valid = references.get(filter.reference)?;
        for (flag, value) in keep.iter_mut().zip(column.values.iter()) {
            *flag = *flag && value.as_ref().is_some_and(|v| valid.contains(v));
        }
    }
    Ok(batch.retain_rows(&keep))
}
