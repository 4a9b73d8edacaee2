//! Format constants shared by the cleaner and the loader.
//! These keep the raw files, the cleaned files and the COPY command in agreement.

// Delimited text format
pub const NULL_SENTINEL: &str = r"\N";
pub const FIELD_DELIMITER: u8 = b'\t';
pub const TSV_EXTENSION: &str = "tsv";

// Store literals written by the cleaner
pub const BOOL_TRUE: &str = "t";
pub const BOOL_FALSE: &str = "f";
pub const EMPTY_ARRAY: &str = "{}";

// Placeholders for required text columns
pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_NAME: &str = "Unknown";

// Default directories (extractor output and cleaner output)
pub const DEFAULT_SOURCE_DIR: &str = "imdb_extracted";
pub const DEFAULT_CLEANED_DIR: &str = "cleaned";
pub const DEFAULT_CONFIG_PATH: &str = "imdb_loader.toml";

/// File name for a raw key, e.g. `title.basics` -> `title.basics.tsv`
pub fn tsv_file_name(raw_key: &str) -> String {
    format!("{}.{}", raw_key, TSV_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsv_file_name() {
        assert_eq!(tsv_file_name("title.basics"), "title.basics.tsv");
        assert_eq!(NULL_SENTINEL, "\\N");
    }
}
