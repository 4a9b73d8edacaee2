use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "imdb_loader=info";

/// Where and how the pipeline logs
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory holding the daily rolling JSON log
    pub dir: PathBuf,
    pub file_prefix: String,
    /// Console output goes to stderr so stdout stays free for reports
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "imdb_loader.log".to_string(),
            console: true,
        }
    }
}

/// `RUST_LOG` when it parses, otherwise info for this crate
fn build_filter(env_value: Option<&str>) -> EnvFilter {
    env_value
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Initializes console and JSON file logging.
///
/// The returned guard flushes the file writer when dropped; hold it for the life
/// of the process. Returns `None` when the log directory cannot be created, in
/// which case only console logging is installed.
pub fn init_logging(options: &LogOptions) -> Option<WorkerGuard> {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref());
    let console_layer = options
        .console
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    let (file_layer, guard) = match fs::create_dir_all(&options.dir) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(&options.dir, &options.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        Err(e) => {
            eprintln!("Cannot create log directory {}: {}", options.dir.display(), e);
            (None, None)
        }
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_invalid_env_filter_falls_back_to_default() {
        let default = EnvFilter::new(DEFAULT_DIRECTIVE).to_string();
        assert_eq!(build_filter(Some("imdb_loader=notalevel")).to_string(), default);
        assert_eq!(build_filter(None).to_string(), default);
        assert_ne!(build_filter(Some("warn")).to_string(), default);
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let options = LogOptions {
            dir: dir.path().join("logs"),
            console: false,
            ..LogOptions::default()
        };

        let guard = init_logging(&options);
        assert!(guard.is_some());
        assert!(options.dir.is_dir());
    }

    #[test]
    fn test_unusable_log_directory_falls_back_to_console() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("logs");
        std::fs::write(&blocker, "not a directory").unwrap();
        let options = LogOptions {
            dir: blocker,
            ..LogOptions::default()
        };

        assert!(init_logging(&options).is_none());
    }
}
