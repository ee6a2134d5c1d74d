//! Importer CLI
//!
//! Commands:
//! - import --file <csv> --kind <kind>   Import a single export
//! - import --manifest <json>            Import every file listed in a manifest
//! - publish --output <path>             Write the GeoJSON report to disk

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use importer::batch::{run_batch, BatchReport, FailurePolicy};
use importer::config::ImporterConfig;
use importer::manifest::Manifest;
use importer::repository::PgImportStore;
use importer::{report, ImportKind, Importer};

#[derive(Parser, Debug)]
#[command(name = "importer", about = "Imports municipal childcare CSV exports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import one or more CSV exports
    Import(ImportArgs),
    /// Write the latest statistics as a GeoJSON FeatureCollection
    Publish {
        /// Destination file
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// JSON manifest listing files and their kinds
    #[arg(long, conflicts_with_all = ["file", "kind"])]
    manifest: Option<PathBuf>,

    /// Single CSV file to import
    #[arg(long, requires = "kind")]
    file: Option<PathBuf>,

    /// Kind of figures the file carries
    #[arg(long, value_enum, requires = "file")]
    kind: Option<ImportKind>,

    /// Continue with the remaining files when one fails
    #[arg(long, default_value = "false")]
    keep_going: bool,

    /// Run every import and roll it back
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

impl ImportArgs {
    fn to_manifest(&self) -> Result<Manifest> {
        match (&self.manifest, &self.file, self.kind) {
            (Some(path), _, _) => Ok(Manifest::load(path)?),
            (None, Some(file), Some(kind)) => Ok(Manifest::single(file.clone(), kind)),
            _ => bail!("either --manifest or --file with --kind is required"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = ImporterConfig::from_env()?;
    let pool = connect(&config).await?;

    let outcome = match cli.command {
        Command::Import(args) => import(&config, &pool, &args).await,
        Command::Publish { output } => publish(&pool, output).await,
    };

    pool.close().await;
    outcome
}

async fn connect(config: &ImporterConfig) -> Result<PgPool> {
    info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.db_url)
        .await
        .context("Failed to connect to database")
}

async fn import(config: &ImporterConfig, pool: &PgPool, args: &ImportArgs) -> Result<()> {
    let manifest = args.to_manifest()?;
    let policy = if args.keep_going {
        FailurePolicy::KeepGoing
    } else {
        FailurePolicy::Halt
    };
    let importer = Importer::from_config(config);
    let store = PgImportStore::new(pool.clone());

    let report = run_batch(&importer, &store, &manifest.files, policy, args.dry_run).await;
    print_report(&report, args.dry_run);

    if !report.is_success() {
        bail!(
            "{} of {} files failed to import",
            report.failures().count(),
            manifest.files.len()
        );
    }
    Ok(())
}

fn print_report(report: &BatchReport, dry_run: bool) {
    let suffix = if dry_run { " (dry run, rolled back)" } else { "" };
    println!("\n=== Import summary{suffix} ===");
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!(
                "  OK     {} [{}] batch={} month={} rows={} skipped={} \
                 new_facilities={} statistics={}",
                outcome.file_name.display(),
                outcome.kind,
                summary.batch_id,
                summary.target_month,
                summary.rows_read,
                summary.rows_skipped,
                summary.facilities_inserted,
                summary.statistics_inserted
            ),
            Err(err) => println!(
                "  FAILED {} [{}] {}",
                outcome.file_name.display(),
                outcome.kind,
                err
            ),
        }
    }
    if report.not_attempted > 0 {
        println!("  {} file(s) not attempted", report.not_attempted);
    }
}

async fn publish(pool: &PgPool, output: PathBuf) -> Result<()> {
    let mut connection = pool.acquire().await.context("Failed to acquire connection")?;
    let collection = report::fetch_report(&mut connection)
        .await
        .context("Failed to build report")?;
    let body = serde_json::to_vec(&collection)?;
    tokio::fs::write(&output, &body)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        path = %output.display(),
        features = collection.features.len(),
        bytes = body.len(),
        "report written"
    );
    Ok(())
}
