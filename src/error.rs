use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Malformed input {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Missing required column '{column}' in {raw_key}")]
    MissingColumn { raw_key: String, column: String },

    #[error("Reference set '{0}' is unavailable")]
    MissingReference(String),

    #[error("Cleaned file not found: {0}")]
    MissingCleanedFile(String),

    #[error("Failed to load table {table}: {source}")]
    Load {
        table: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wrap an error with the table whose load step produced it
    pub fn in_table(self, table: &str) -> Self {
        match self {
            already @ PipelineError::Load { .. } => already,
            other => PipelineError::Load {
                table: table.to_string(),
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
