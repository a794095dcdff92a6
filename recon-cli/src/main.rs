use clap::{Args, Parser, Subcommand};
use recon::{
    export_csv, IndexStore, MimeClassifier, ReconError, ReconOptions, Reconciler, ReportTarget,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Environment variable consulted when no database path is given.
const DB_ENV_VAR: &str = "RECON_DB";

/// Database created in the working directory when nothing else is named.
const DEFAULT_DB_NAME: &str = "recon.db";

/// Report file used when `--report` is passed without a value.
const DEFAULT_REPORT_NAME: &str = "report.txt";

#[derive(Parser)]
#[command(name = "recon")]
#[command(version)]
#[command(about = "Reconciles a directory tree against a mirror or a persisted index")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory into a persisted database
    Index(IndexArgs),
    /// Compare two directory trees and report their differences
    Compare(CompareArgs),
    /// Validate a directory against a persisted database
    Validate(ValidateArgs),
    /// Export a persisted database to a CSV file
    Export(ExportArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// Pathname of the index database (falls back to $RECON_DB, then ./recon.db)
    #[arg(short = 'b', long = "backup")]
    database: Option<PathBuf>,

    /// Print the name of each file as it is indexed
    #[arg(short, long)]
    verbose: bool,

    /// Do not update existing entries whose content changed
    #[arg(long)]
    no_update: bool,

    /// Remove entries whose files are no longer present in the directory
    #[arg(long)]
    remove_missing: bool,

    /// Directory to index
    directory: PathBuf,
}

#[derive(Args)]
struct CompareArgs {
    /// Save the report to a file instead of the console
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = DEFAULT_REPORT_NAME)]
    report: Option<PathBuf>,

    /// Print the name of each file as it is compared
    #[arg(short, long)]
    verbose: bool,

    /// Copy MISS and DIFF files onto the other directory, overwriting it
    #[arg(short, long)]
    copy_on_diff: bool,

    /// Base directory
    base: PathBuf,

    /// Directory compared against the base
    other: PathBuf,
}

#[derive(Args)]
struct ValidateArgs {
    /// Pathname of the index database (falls back to $RECON_DB)
    #[arg(short = 'b', long = "backup")]
    database: Option<PathBuf>,

    /// Save the report to a file instead of the console
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = DEFAULT_REPORT_NAME)]
    report: Option<PathBuf>,

    /// Print the name of each file as it is validated
    #[arg(short, long)]
    verbose: bool,

    /// Directory to validate
    directory: PathBuf,
}

#[derive(Args)]
struct ExportArgs {
    /// Pathname of the database to export (falls back to $RECON_DB)
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let result = match cli.command {
        Commands::Index(args) => run_index(args).await,
        Commands::Compare(args) => run_compare(args).await,
        Commands::Validate(args) => run_validate(args).await,
        Commands::Export(args) => run_export(args).await,
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::from(exit_code(&err))
        }
    };

    info!("Program lasted for {}", format_duration(start.elapsed()));

    code
}

async fn run_index(args: IndexArgs) -> Result<(), ReconError> {
    let db_path = args
        .database
        .or_else(database_from_env)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_NAME));

    let store = Arc::new(IndexStore::open(&db_path)?);

    let options = ReconOptions {
        verbose: args.verbose,
        no_update: args.no_update,
        prune_missing: args.remove_missing,
        ..Default::default()
    };

    let engine = Reconciler::new(options, Arc::new(MimeClassifier));
    let summary = engine.index(&args.directory, store).await?;

    info!(
        "Successfully indexed directory: {} ({} files, {} new, {} updated, {} pruned)",
        args.directory.display(),
        summary.files,
        summary.created,
        summary.updated,
        summary.pruned
    );

    Ok(())
}

async fn run_compare(args: CompareArgs) -> Result<(), ReconError> {
    let options = ReconOptions {
        verbose: args.verbose,
        copy_on_diff: args.copy_on_diff,
        report: report_target(args.report),
        ..Default::default()
    };

    let engine = Reconciler::new(options, Arc::new(MimeClassifier));
    let summary = engine.compare(&args.base, &args.other).await?;

    info!(
        "Successfully compared directories ({} files, {} diffs, {} missing, {} extra)",
        summary.files, summary.diffs, summary.misses, summary.extras
    );

    Ok(())
}

async fn run_validate(args: ValidateArgs) -> Result<(), ReconError> {
    let db_path = args
        .database
        .or_else(database_from_env)
        .ok_or_else(|| ReconError::store_error("Please specify a database for validation"))?;

    let store = Arc::new(IndexStore::open_existing(&db_path)?);

    let options = ReconOptions {
        verbose: args.verbose,
        report: report_target(args.report),
        ..Default::default()
    };

    let engine = Reconciler::new(options, Arc::new(MimeClassifier));
    let summary = engine.validate(&args.directory, store).await?;

    info!(
        "Successfully validated directory: {} ({} files, {} diffs, {} missing)",
        args.directory.display(),
        summary.files,
        summary.diffs,
        summary.misses
    );

    Ok(())
}

async fn run_export(args: ExportArgs) -> Result<(), ReconError> {
    let db_path = args
        .database
        .or_else(database_from_env)
        .ok_or_else(|| ReconError::store_error("Please specify a database to export"))?;

    let store = IndexStore::open_existing(&db_path)?;
    let out_path = export_csv(&store, Path::new("."))?;

    info!("Successfully exported database to: {}", out_path.display());

    Ok(())
}

fn database_from_env() -> Option<PathBuf> {
    std::env::var_os(DB_ENV_VAR).map(PathBuf::from)
}

fn report_target(report: Option<PathBuf>) -> ReportTarget {
    match report {
        Some(path) => ReportTarget::File(path),
        None => ReportTarget::Console,
    }
}

fn exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::Config(_) => 1,
        ReconError::Store { .. } => 2,
        ReconError::Report { .. } => 3,
        _ => 1,
    }
}

fn format_duration(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();

    if millis < 1_000 {
        format!("{} ms", millis)
    } else if millis < 60_000 {
        format!("{} s", millis / 1_000)
    } else if millis < 3_600_000 {
        format!("{} min", millis / 60_000)
    } else {
        format!("{} h", millis / 3_600_000)
    }
}
