//! reviewer-migrate CLI - copy, move and export Reviewer Workspace sessions.

use clap::{Args, Parser, Subcommand};
use reviewer_migrate::{CopyConfig, CopyRun, ExportConfig, ExportRun, MigrateError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "reviewer-migrate")]
#[command(about = "Copy, move and export Reviewer Workspace session records")]
#[command(version)]
struct Cli {
    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy session records into another workspace
    Copy(CopyArgs),

    /// Export session records to a point file and a table
    Export(ExportArgs),
}

#[derive(Args)]
struct CopyArgs {
    /// Path to YAML configuration file; positional values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Source workspace
    source: Option<PathBuf>,

    /// Semicolon-delimited session names
    sessions: Option<String>,

    /// Filter on REVTABLEMAIN ("" or "#" for none)
    filter: Option<String>,

    /// Destination workspace
    destination: Option<PathBuf>,

    /// Destination session name
    destination_session: Option<String>,

    /// Delete the copied records from the source
    #[arg(long)]
    delete: bool,

    /// Write a run log next to the destination workspace
    #[arg(long)]
    create_log: bool,

    /// Directory for the run log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Fail when a session name does not exist
    #[arg(long)]
    strict_sessions: bool,

    /// Fail when a check run references a batch run that was not copied
    #[arg(long)]
    strict_batch_runs: bool,
}

#[derive(Args)]
struct ExportArgs {
    /// Path to YAML configuration file; positional values override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace to export from
    workspace: Option<PathBuf>,

    /// Semicolon-delimited session names
    sessions: Option<String>,

    /// Semicolon-delimited REVTABLEMAIN fields ("" or "#" for all)
    fields: Option<String>,

    /// Output folder
    output_dir: Option<PathBuf>,

    /// Output base name
    output_name: Option<String>,

    /// Fail when a session name does not exist
    #[arg(long)]
    strict_sessions: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Copy(args) => {
            let config = copy_config(args)?;
            info!(
                "Copying sessions {} from {} to {}",
                config.sessions,
                config.source.display(),
                config.destination.display()
            );
            let report = CopyRun::open(config)?.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nCopy completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Versions: {} -> {}",
                    report.source_version, report.destination_version
                );
                println!("  Output session: {}: {}", report.output_session.id, report.output_session.name);
                for table in &report.tables {
                    println!("  Total Records from {}: {}", table.table, table.records);
                }
                for deleted in &report.deleted {
                    match &deleted.error {
                        Some(err) => println!("  Delete from {} failed: {}", deleted.table, err),
                        None => println!("  Deleted from {}: {}", deleted.table, deleted.deleted),
                    }
                }
                if let Some(path) = &report.log_file {
                    println!("  Log file: {}", path.display());
                }
                if !report.warnings.is_empty() {
                    println!("  Warnings: {}", report.warnings.len());
                }
            }
        }

        Commands::Export(args) => {
            let config = export_config(args)?;
            info!(
                "Exporting sessions {} from {}",
                config.sessions,
                config.workspace.display()
            );
            let report = ExportRun::open(config)?.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nExport completed!");
                println!("  Run ID: {}", report.run_id);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!("  Total Errors Exported: {}", report.total);
                println!("  Point features: {}", report.features);
                println!("  Output point file path {}", report.feature_file.display());
                if let Some(path) = &report.table_file {
                    println!("  Output Table path {}", path.display());
                }
                if !report.warnings.is_empty() {
                    println!("  Warnings: {}", report.warnings.len());
                }
            }
        }
    }

    Ok(())
}

/// Empty text and `#` mean "not given".
fn given(value: Option<String>) -> Option<String> {
    value.filter(|v| {
        let v = v.trim();
        !v.is_empty() && v != "#"
    })
}

fn copy_config(args: CopyArgs) -> Result<CopyConfig, MigrateError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loaded configuration from {:?}", path);
            CopyConfig::load(path)?
        }
        None => CopyConfig::default(),
    };

    if let Some(source) = args.source {
        config.source = source;
    }
    if let Some(sessions) = given(args.sessions) {
        config.sessions = sessions;
    }
    if let Some(filter) = args.filter {
        config.filter = given(Some(filter));
    }
    if let Some(destination) = args.destination {
        config.destination = destination;
    }
    if let Some(session) = given(args.destination_session) {
        config.destination_session = session;
    }
    config.delete |= args.delete;
    config.create_log |= args.create_log;
    config.options.strict_sessions |= args.strict_sessions;
    config.options.strict_batch_runs |= args.strict_batch_runs;
    if args.log_dir.is_some() {
        config.options.log_dir = args.log_dir;
    }

    config.validate()?;
    Ok(config)
}

fn export_config(args: ExportArgs) -> Result<ExportConfig, MigrateError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loaded configuration from {:?}", path);
            ExportConfig::load(path)?
        }
        None => ExportConfig::default(),
    };

    if let Some(workspace) = args.workspace {
        config.workspace = workspace;
    }
    if let Some(sessions) = given(args.sessions) {
        config.sessions = sessions;
    }
    if let Some(fields) = args.fields {
        config.fields = given(Some(fields)).unwrap_or_default();
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(name) = given(args.output_name) {
        config.output_name = name;
    }
    config.strict_sessions |= args.strict_sessions;

    config.validate()?;
    Ok(config)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for the result
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
