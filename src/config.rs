use crate::constants::{DEFAULT_CLEANED_DIR, DEFAULT_CONFIG_PATH, DEFAULT_SOURCE_DIR};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub integrity: IntegrityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub source_dir: PathBuf,
    pub cleaned_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            cleaned_dir: PathBuf::from(DEFAULT_CLEANED_DIR),
        }
    }
}

/// Connection parameters for the target PostgreSQL database
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "imdb".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub policy: IntegrityPolicy,
}

/// Which component guarantees that referencing rows point at existing titles/names.
/// Exactly one is active for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityPolicy {
    /// The loader deletes dangling rows after every table is copied
    #[default]
    PostLoadCleanup,
    /// The cleaner drops dangling rows before they are written
    PreLoadFilter,
}

impl IntegrityPolicy {
    pub fn filters_before_load(self) -> bool {
        self == IntegrityPolicy::PreLoadFilter
    }

    pub fn cleans_after_load(self) -> bool {
        self == IntegrityPolicy::PostLoadCleanup
    }
}

impl FromStr for IntegrityPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "post_load_cleanup" => Ok(IntegrityPolicy::PostLoadCleanup),
            "pre_load_filter" => Ok(IntegrityPolicy::PreLoadFilter),
            other => Err(PipelineError::Config(format!(
                "Unknown integrity policy '{}'",
                other
            ))),
        }
    }
}

impl Config {
    /// Load configuration: optional TOML file, then environment overrides.
    ///
    /// A missing file is not an error when `path` is the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = match fs::read_to_string(config_path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(e) if path.is_none() && e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    config_path.display(),
                    e
                )))
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the environment (DB_HOST, DB_PORT, ...).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = non_empty("DB_PORT") {
            self.database.port = port.trim().parse().map_err(|e| {
                PipelineError::Config(format!("DB_PORT '{}' is not a valid port: {}", port, e))
            })?;
        }
        if let Some(name) = non_empty("DB_NAME") {
            self.database.name = name;
        }
        if let Some(user) = non_empty("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(dir) = non_empty("IMDB_SOURCE_DIR") {
            self.paths.source_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("IMDB_CLEANED_DIR") {
            self.paths.cleaned_dir = PathBuf::from(dir);
        }
        if let Some(policy) = non_empty("IMDB_INTEGRITY_POLICY") {
            self.integrity.policy = policy.parse()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.paths.source_dir, PathBuf::from("imdb_extracted"));
        assert_eq!(config.paths.cleaned_dir, PathBuf::from("cleaned"));
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.integrity.policy, IntegrityPolicy::PostLoadCleanup);
    }

    #[test]
    fn test_toml_partial_config() {
        let config = Config::from_toml_str(
            r#"
            [database]
            host = "db.internal"
            name = "movies"

            [integrity]
            policy = "pre_load_filter"
            "#,
        )
        .unwrap();

        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.name, "movies");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.integrity.policy, IntegrityPolicy::PreLoadFilter);
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "pg"),
            ("DB_PORT", "6543"),
            ("DB_PASSWORD", "secret"),
            ("IMDB_INTEGRITY_POLICY", "pre-load-filter"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.password, "secret");
        assert_eq!(config.integrity.policy, IntegrityPolicy::PreLoadFilter);
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env_overrides(|k| (k == "DB_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let db = DatabaseConfig {
            password: "hunter2".to_string(),
            ..DatabaseConfig::default()
        };
        let rendered = format!("{:?}", db);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
