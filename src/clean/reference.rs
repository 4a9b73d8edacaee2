//! Primary-key sets used by the pre-load reference filter.

use crate::batch::RecordBatch;
use crate::constants::tsv_file_name;
use crate::error::{PipelineError, Result};
use crate::tables::ReferenceKey;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{error, info};

/// Key sets built once per clean run, keyed by the table they come from
#[derive(Debug, Default)]
pub struct ReferenceSets {
    sets: HashMap<ReferenceKey, HashSet<String>>,
}

impl ReferenceSets {
    /// Build the requested sets from the raw files in `source_dir`.
    ///
    /// A set that cannot be built is logged and left out; tables that need it
    /// fail individually when they ask for it.
    pub fn build<I>(source_dir: &Path, keys: I) -> Self
    where
        I: IntoIterator<Item = ReferenceKey>,
    {
        let mut sets = HashMap::new();
        for key in keys {
            if sets.contains_key(&key) {
                continue;
            }
            let path = source_dir.join(tsv_file_name(key.source().raw_key));
            match read_key_column(&path, key.key_column()) {
                Ok(set) => {
                    info!("Loaded {} reference keys for {}", set.len(), key.label());
                    sets.insert(key, set);
                }
                Err(e) => {
                    error!("Could not build {} reference set from {}: {}", key.label(), path.display(), e);
                }
            }
        }
        Self { sets }
    }

    pub fn from_sets(sets: HashMap<ReferenceKey, HashSet<String>>) -> Self {
        Self { sets }
    }

    pub fn get(&self, key: ReferenceKey) -> Result<&HashSet<String>> {
        self.sets
            .get(&key)
            .ok_or_else(|| PipelineError::MissingReference(key.label().to_string()))
    }
}

/// Collect the distinct non-missing values of one column.
///
/// Rows are read with the same rules the cleaner applies, so a row skipped from
/// the cleaned base file never contributes a key.
pub fn read_key_column(path: &Path, column: &str) -> Result<HashSet<String>> {
    let parsed = RecordBatch::read_tsv(path)?;
    let values = parsed
        .batch
        .column(column)
        .ok_or_else(|| PipelineError::MissingColumn {
            raw_key: path.display().to_string(),
            column: column.to_string(),
        })?;

    Ok(values
        .values
        .iter()
        .flatten()
        .filter(|v| !v.is_empty())
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_read_key_column_skips_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("title.basics.tsv");
        fs::write(&path, "tconst\tprimaryTitle\ntt1\tA\n\\N\tB\ntt2\tC\ntt1\tD\n").unwrap();

        let keys = read_key_column(&path, "tconst").unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("tt1"));
        assert!(keys.contains("tt2"));
    }

    #[test]
    fn test_read_key_column_ignores_rows_the_cleaner_drops() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("title.basics.tsv");
        fs::write(&path, "tconst\tprimaryTitle\ntt1\tA\ntt2\tB\textra\ntt3\n").unwrap();

        let keys = read_key_column(&path, "tconst").unwrap();
        assert_eq!(keys, HashSet::from(["tt1".to_string()]));
    }

    #[test]
    fn test_missing_key_column_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("name.basics.tsv");
        fs::write(&path, "id\tprimaryName\nnm1\tA\n").unwrap();

        let err = read_key_column(&path, "nconst").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_build_leaves_out_unavailable_sets() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("title.basics.tsv"), "tconst\ntt9\n").unwrap();

        let sets = ReferenceSets::build(dir.path(), [ReferenceKey::Titles, ReferenceKey::Names]);
        assert!(sets.get(ReferenceKey::Titles).unwrap().contains("tt9"));
        assert!(matches!(
            sets.get(ReferenceKey::Names),
            Err(PipelineError::MissingReference(_))
        ));
    }
}
