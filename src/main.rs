use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use imdb_loader::clean::{CleanReport, Cleaner, FileOutcome};
use imdb_loader::config::{Config, IntegrityPolicy};
use imdb_loader::load::{LoadReport, Loader};
use imdb_loader::store::PgStore;
use imdb_loader::logging::{self, LogOptions};

#[derive(Parser)]
#[command(name = "imdb_loader")]
#[command(about = "Clean IMDb TSV snapshots and load them into PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean raw TSV files into the cleaned directory
    Clean {
        #[command(flatten)]
        opts: CommonArgs,
    },
    /// Load the cleaned directory into the database in one transaction
    Load {
        #[command(flatten)]
        opts: CommonArgs,
    },
    /// Run clean, then load
    Run {
        #[command(flatten)]
        opts: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Config file (defaults to imdb_loader.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of raw .tsv files
    #[arg(long)]
    source_dir: Option<PathBuf>,
    /// Directory for cleaned .tsv files
    #[arg(long)]
    cleaned_dir: Option<PathBuf>,
    /// Which integrity policy keeps referencing rows consistent
    #[arg(long, value_enum)]
    policy: Option<IntegrityPolicy>,
    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

impl CommonArgs {
    fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = &self.source_dir {
            config.paths.source_dir = dir.clone();
        }
        if let Some(dir) = &self.cleaned_dir {
            config.paths.cleaned_dir = dir.clone();
        }
        if let Some(policy) = self.policy {
            config.integrity.policy = policy;
        }
        Ok(config)
    }
}

/// Both stage reports of a `run`, printed as one JSON document
#[derive(Serialize)]
struct RunReport {
    clean: CleanReport,
    load: LoadReport,
}

fn print_json<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

// Progress banners and summaries go to stderr; stdout carries only JSON reports.

fn run_clean(config: &Config) -> anyhow::Result<CleanReport> {
    eprintln!("🧹 Cleaning {} -> {}", config.paths.source_dir.display(), config.paths.cleaned_dir.display());

    let cleaner = Cleaner::new(config.integrity.policy);
    let report = cleaner
        .clean(&config.paths.source_dir, &config.paths.cleaned_dir)
        .with_context(|| format!("cleaning {}", config.paths.source_dir.display()))?;

    print_clean_summary(&report);
    if report.failed_count() > 0 {
        warn!("{} files failed to clean", report.failed_count());
    }
    Ok(report)
}

async fn run_load(config: &Config) -> anyhow::Result<LoadReport> {
    eprintln!("🐘 Loading {} into {}", config.paths.cleaned_dir.display(), config.database.name);

    let store = PgStore::connect(&config.database)
        .await
        .context("connecting to PostgreSQL")?;
    let mut loader = Loader::new(store, config.integrity.policy);

    let report = match loader.load(&config.paths.cleaned_dir).await {
        Ok(report) => report,
        Err(e) => {
            error!("Load failed: {}", e);
            eprintln!("❌ Load failed, nothing was committed: {}", e);
            return Err(e.into());
        }
    };

    print_load_summary(&report);
    Ok(report)
}

fn print_clean_summary(report: &CleanReport) {
    eprintln!("\n📊 Clean results:");
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Cleaned(stats) => eprintln!(
                "   ✅ {}: {} rows written ({} filtered, {} malformed, {} values nulled)",
                file.raw_key, stats.rows_written, stats.filtered_rows, stats.malformed_rows, stats.nulled_values
            ),
            FileOutcome::Skipped { reason } => eprintln!("   ⏭️  {}: skipped ({})", file.raw_key, reason),
            FileOutcome::Failed { error } => eprintln!("   ❌ {}: {}", file.raw_key, error),
        }
    }
}

fn print_load_summary(report: &LoadReport) {
    eprintln!("\n📊 Load results:");
    for table in &report.tables {
        eprintln!("   ✅ {}: {} rows ({} ms)", table.table, table.rows, table.duration_ms);
    }
    for cleanup in report.orphan_cleanups.iter().filter(|c| c.deleted > 0) {
        eprintln!(
            "   🧽 {}: removed {} rows with {} not in {}",
            cleanup.table, cleanup.deleted, cleanup.column, cleanup.references
        );
    }
    eprintln!("🎉 Committed {} rows", report.total_rows());
}

fn ensure_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    anyhow::ensure!(path.is_dir(), "{} directory '{}' does not exist", what, path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging(&LogOptions::default());
    imdb_loader::metrics::init_metrics();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clean { opts } => {
            let config = opts.resolve()?;
            ensure_dir(&config.paths.source_dir, "Source")?;
            let report = run_clean(&config)?;
            if opts.json {
                print_json(&report)?;
            }
        }
        Commands::Load { opts } => {
            let config = opts.resolve()?;
            ensure_dir(&config.paths.cleaned_dir, "Cleaned")?;
            let report = run_load(&config).await?;
            if opts.json {
                print_json(&report)?;
            }
        }
        Commands::Run { opts } => {
            let config = opts.resolve()?;
            ensure_dir(&config.paths.source_dir, "Source")?;
            info!("Running clean then load with policy {:?}", config.integrity.policy);

            eprintln!("\n📥 Step 1: Cleaning...");
            let clean = run_clean(&config)?;

            eprintln!("\n📤 Step 2: Loading...");
            let load = run_load(&config).await?;
            if opts.json {
                print_json(&RunReport { clean, load })?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imdb_loader::store::MemoryStore;
    use imdb_loader::tables::LOAD_ORDER;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_report_is_one_json_document() {
        let source = tempdir().unwrap();
        let cleaned = tempdir().unwrap();
        for descriptor in LOAD_ORDER.iter() {
            let key_column = if descriptor.raw_key == "title.akas" { "titleId" } else { "tconst" };
            std::fs::write(
                source.path().join(format!("{}.tsv", descriptor.raw_key)),
                format!("{}\n", key_column),
            )
            .unwrap();
        }

        let clean = Cleaner::new(IntegrityPolicy::PostLoadCleanup)
            .clean(source.path(), cleaned.path())
            .unwrap();
        let mut loader = Loader::new(MemoryStore::with_imdb_schema(), IntegrityPolicy::PostLoadCleanup);
        let load = loader.load(cleaned.path()).await.unwrap();

        let text = serde_json::to_string_pretty(&RunReport { clean, load }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["clean"]["files"].as_array().unwrap().len(), 7);
        assert_eq!(value["load"]["tables"].as_array().unwrap().len(), 7);
    }
}
