//! Static table descriptors for the IMDb snapshot.
//!
//! Every per-table rule the cleaner and loader apply lives here: which columns
//! are coerced, which text columns get defaults, which columns are checked
//! against another table, and the order tables are loaded in.

use crate::constants::{UNKNOWN_NAME, UNKNOWN_TITLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    TitleBasics,
    NameBasics,
    TitleCrew,
    TitleEpisode,
    TitlePrincipals,
    TitleRatings,
    TitleAkas,
}

/// Text repair applied after type coercion, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDefault {
    /// Blank or missing values become `value`
    Placeholder {
        column: &'static str,
        value: &'static str,
    },
    /// Blank or missing values copy the same row's value from `source`
    FallbackTo {
        column: &'static str,
        source: &'static str,
    },
}

/// Reference key sets built once per clean run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKey {
    /// `tconst` values of title.basics
    Titles,
    /// `nconst` values of name.basics
    Names,
}

impl ReferenceKey {
    pub fn source(self) -> &'static TableDescriptor {
        match self {
            ReferenceKey::Titles => &TITLE_BASICS,
            ReferenceKey::Names => &NAME_BASICS,
        }
    }

    /// Primary-key column in the source file
    pub fn key_column(self) -> &'static str {
        match self {
            ReferenceKey::Titles => "tconst",
            ReferenceKey::Names => "nconst",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ReferenceKey::Titles => "titles",
            ReferenceKey::Names => "names",
        }
    }
}

/// Keep only rows whose `column` value is present in `reference`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceFilter {
    pub column: &'static str,
    pub reference: ReferenceKey,
}

/// A foreign key checked by the post-load orphan cleanup.
///
/// Column names are the unquoted store identifiers, so they are the lowercase
/// form of the TSV header names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: TableKind,
    pub referenced_column: &'static str,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableDescriptor {
    pub kind: TableKind,
    /// File stem of the snapshot file, e.g. `title.basics`
    pub raw_key: &'static str,
    /// Target table in the store
    pub table_name: &'static str,
    pub integer_columns: &'static [&'static str],
    pub array_columns: &'static [&'static str],
    /// Array columns whose target column is NOT NULL; missing becomes `{}`
    pub non_null_array_columns: &'static [&'static str],
    /// Numeric 0/1 flags rendered as store booleans
    pub boolean_columns: &'static [&'static str],
    pub text_defaults: &'static [TextDefault],
    pub reference_filters: &'static [ReferenceFilter],
    pub foreign_keys: &'static [ForeignKey],
}

pub static TITLE_BASICS: TableDescriptor = TableDescriptor {
    kind: TableKind::TitleBasics,
    raw_key: "title.basics",
    table_name: "title_basics",
    integer_columns: &["startYear", "endYear", "runtimeMinutes"],
    array_columns: &["genres"],
    non_null_array_columns: &[],
    boolean_columns: &["isAdult"],
    text_defaults: &[
        TextDefault::Placeholder {
            column: "primaryTitle",
            value: UNKNOWN_TITLE,
        },
        TextDefault::FallbackTo {
            column: "originalTitle",
            source: "primaryTitle",
        },
    ],
    reference_filters: &[],
    foreign_keys: &[],
};

pub static NAME_BASICS: TableDescriptor = TableDescriptor {
    kind: TableKind::NameBasics,
    raw_key: "name.basics",
    table_name: "name_basics",
    integer_columns: &[],
    array_columns: &["primaryProfession", "knownForTitles"],
    non_null_array_columns: &["primaryProfession", "knownForTitles"],
    boolean_columns: &[],
    text_defaults: &[TextDefault::Placeholder {
        column: "primaryName",
        value: UNKNOWN_NAME,
    }],
    reference_filters: &[],
    foreign_keys: &[],
};

pub static TITLE_CREW: TableDescriptor = TableDescriptor {
    kind: TableKind::TitleCrew,
    raw_key: "title.crew",
    table_name: "title_crew",
    integer_columns: &[],
    array_columns: &["directors", "writers"],
    non_null_array_columns: &[],
    boolean_columns: &[],
    text_defaults: &[],
    reference_filters: &[],
    foreign_keys: &[ForeignKey {
        column: "tconst",
        references: TableKind::TitleBasics,
        referenced_column: "tconst",
    }],
};

pub static TITLE_EPISODE: TableDescriptor = TableDescriptor {
    kind: TableKind::TitleEpisode,
    raw_key: "title.episode",
    table_name: "title_episode",
    integer_columns: &["seasonNumber", "episodeNumber"],
    array_columns: &[],
    non_null_array_columns: &[],
    boolean_columns: &[],
    text_defaults: &[],
    reference_filters: &[],
    foreign_keys: &[ForeignKey {
        column: "tconst",
        references: TableKind::TitleBasics,
        referenced_column: "tconst",
    }],
};

pub static TITLE_PRINCIPALS: TableDescriptor = TableDescriptor {
    kind: TableKind::TitlePrincipals,
    raw_key: "title.principals",
    table_name: "title_principals",
    integer_columns: &[],
    array_columns: &[],
    non_null_array_columns: &[],
    boolean_columns: &[],
    text_defaults: &[],
    reference_filters: &[
        ReferenceFilter {
            column: "tconst",
            reference: ReferenceKey::Titles,
        },
        ReferenceFilter {
            column: "nconst",
            reference: ReferenceKey::Names,
        },
    ],
    foreign_keys: &[
        ForeignKey {
            column: "tconst",
            references: TableKind::TitleBasics,
            referenced_column: "tconst",
        },
        ForeignKey {
            column: "nconst",
            references: TableKind::NameBasics,
            referenced_column: "nconst",
        },
    ],
};

pub static TITLE_RATINGS: TableDescriptor = TableDescriptor {
    kind: TableKind::TitleRatings,
    raw_key: "title.ratings",
    table_name: "title_ratings",
    integer_columns: &["numVotes"],
    array_columns: &[],
    non_null_array_columns: &[],
    boolean_columns: &[],
    text_defaults: &[],
    reference_filters: &[],
    foreign_keys: &[ForeignKey {
        column: "tconst",
        references: TableKind::TitleBasics,
        referenced_column: "tconst",
    }],
};

pub static TITLE_AKAS: TableDescriptor = TableDescriptor {
    kind: TableKind::TitleAkas,
    raw_key: "title.akas",
    table_name: "title_akas",
    integer_columns: &[],
    array_columns: &["types", "attributes"],
    non_null_array_columns: &[],
    boolean_columns: &[],
    text_defaults: &[TextDefault::Placeholder {
        column: "title",
        value: UNKNOWN_TITLE,
    }],
    reference_filters: &[ReferenceFilter {
        column: "titleId",
        reference: ReferenceKey::Titles,
    }],
    foreign_keys: &[ForeignKey {
        column: "titleid",
        references: TableKind::TitleBasics,
        referenced_column: "tconst",
    }],
};

/// Tables in load order: referenced tables before the tables that reference them
pub static LOAD_ORDER: [&TableDescriptor; 7] = [
    &TITLE_BASICS,
    &NAME_BASICS,
    &TITLE_CREW,
    &TITLE_EPISODE,
    &TITLE_PRINCIPALS,
    &TITLE_RATINGS,
    &TITLE_AKAS,
];

impl TableKind {
    pub fn descriptor(self) -> &'static TableDescriptor {
        match self {
            TableKind::TitleBasics => &TITLE_BASICS,
            TableKind::NameBasics => &NAME_BASICS,
            TableKind::TitleCrew => &TITLE_CREW,
            TableKind::TitleEpisode => &TITLE_EPISODE,
            TableKind::TitlePrincipals => &TITLE_PRINCIPALS,
            TableKind::TitleRatings => &TITLE_RATINGS,
            TableKind::TitleAkas => &TITLE_AKAS,
        }
    }
}

/// Look up the descriptor for a raw file key such as `title.akas`
pub fn descriptor_for(raw_key: &str) -> Option<&'static TableDescriptor> {
    LOAD_ORDER.iter().copied().find(|d| d.raw_key == raw_key)
}

/// Position of a table in the load order
pub fn load_position(kind: TableKind) -> usize {
    LOAD_ORDER
        .iter()
        .position(|d| d.kind == kind)
        .unwrap_or(LOAD_ORDER.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lookup_by_raw_key() {
        assert_eq!(descriptor_for("title.basics").unwrap().table_name, "title_basics");
        assert_eq!(descriptor_for("name.basics").unwrap().table_name, "name_basics");
        assert_eq!(descriptor_for("title.akas").unwrap().kind, TableKind::TitleAkas);
        assert!(descriptor_for("title.unknown").is_none());
    }

    #[test]
    fn test_load_order_covers_every_table_once() {
        let names: HashSet<_> = LOAD_ORDER.iter().map(|d| d.table_name).collect();
        assert_eq!(names.len(), LOAD_ORDER.len());
        for d in LOAD_ORDER.iter() {
            assert_eq!(d.kind.descriptor(), *d);
        }
    }

    #[test]
    fn test_referenced_tables_load_first() {
        for d in LOAD_ORDER.iter() {
            let own = load_position(d.kind);
            for fk in d.foreign_keys {
                assert!(
                    load_position(fk.references) < own,
                    "{} loads before {}",
                    d.table_name,
                    fk.references.descriptor().table_name
                );
            }
            for filter in d.reference_filters {
                assert!(load_position(filter.reference.source().kind) < own);
            }
        }
    }

    #[test]
    fn test_principals_is_fifth() {
        assert_eq!(LOAD_ORDER[4].raw_key, "title.principals");
    }

    #[test]
    fn test_filters_and_foreign_keys_agree() {
        // Each pre-load filter has a matching post-load foreign key on the same table
        for d in LOAD_ORDER.iter() {
            for filter in d.reference_filters {
                assert!(d.foreign_keys.iter().any(|fk| {
                    fk.column == filter.column.to_ascii_lowercase()
                        && fk.references == filter.reference.source().kind
                }));
            }
        }
    }
}
