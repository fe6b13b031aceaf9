//! data-checksum CLI - chunked checksum comparison of MySQL tables.

use clap::{Parser, Subcommand};
use data_checksum::orchestrator::explicit_pairs;
use data_checksum::{ChecksumError, Config, JobResult, Orchestrator, ProgressUpdate};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code when every pair was compared but at least one differs.
const EXIT_TABLES_DIFFER: u8 = 4;

#[derive(Parser)]
#[command(name = "data-checksum")]
#[command(about = "Chunked checksum comparison of MySQL source and target tables")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Seconds to wait for in-flight chunks after a shutdown signal (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new comparison job
    Run {
        /// Override number of concurrent table pairs
        #[arg(long)]
        workers: Option<usize>,

        /// Override rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Treat a target that contains extra rows as equal
        #[arg(long)]
        superset_as_equal: bool,

        /// List differing rows for unequal tables
        #[arg(long)]
        differential: bool,
    },

    /// Resume the unfinished table pairs of a job
    Resume {
        /// Job to resume
        #[arg(long)]
        job_id: String,

        /// Override number of concurrent table pairs
        #[arg(long)]
        workers: Option<usize>,
    },

    /// List the table pairs the configuration selects
    Pairs,

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, ChecksumError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())
        .map_err(ChecksumError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            workers,
            chunk_size,
            superset_as_equal,
            differential,
        } => {
            if let Some(w) = workers {
                config.checksum.workers = Some(w);
            }
            if let Some(size) = chunk_size {
                config.checksum.chunk_size = Some(size);
            }
            if superset_as_equal {
                config.checksum.superset_as_equal = true;
            }
            if differential {
                config.checksum.differential = true;
            }
            config.validate()?;

            let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;
            let orchestrator = Orchestrator::new(config.with_auto_tuning())
                .await?
                .with_cancellation(cancel_token);
            let (orchestrator, printer) = attach_progress(orchestrator, cli.progress);

            let result = orchestrator.run().await;
            orchestrator.close().await;
            drop(orchestrator);
            finish_progress(printer).await;

            let result = result?;
            print_result(&result, cli.output_json, "Comparison finished")?;
            Ok(job_exit_code(&result))
        }

        Commands::Resume { job_id, workers } => {
            if let Some(w) = workers {
                config.checksum.workers = Some(w);
            }
            if config.tracking.is_none() {
                return Err(ChecksumError::Config(
                    "a tracking section is required to resume a job".to_string(),
                ));
            }

            let cancel_token = setup_signal_handler(cli.shutdown_timeout).await?;
            let orchestrator = Orchestrator::for_resume(config.with_auto_tuning())
                .await?
                .with_cancellation(cancel_token);
            let (orchestrator, printer) = attach_progress(orchestrator, cli.progress);

            info!("Resuming job {}", job_id);
            let result = orchestrator.resume(&job_id).await;
            orchestrator.close().await;
            drop(orchestrator);
            finish_progress(printer).await;

            let result = result?;
            print_result(&result, cli.output_json, "Resumed comparison finished")?;
            Ok(job_exit_code(&result))
        }

        Commands::Pairs => {
            let pairs = if config.tables.pairs.is_empty() {
                let orchestrator = Orchestrator::new(config.with_auto_tuning()).await?;
                let pairs = orchestrator.resolve_table_pairs().await;
                orchestrator.close().await;
                pairs?
            } else {
                explicit_pairs(&config.tables)?
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&pairs)?);
            } else {
                for pair in &pairs {
                    println!("{}", pair);
                }
                println!("\n{} table pairs", pairs.len());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config.with_auto_tuning()).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source (MySQL): {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (MySQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(ChecksumError::pool(
                    "health check failed",
                    "probing source and target",
                ));
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Cancelled, then failed pairs, then differing pairs decide the exit code.
fn job_exit_code(result: &JobResult) -> ExitCode {
    if result.is_cancelled() {
        return ExitCode::from(data_checksum::error::EXIT_CANCELLED);
    }
    if let Some(failed) = result.failed_tables.first() {
        return ExitCode::from(failed.exit_code);
    }
    if result.tables_different > 0 {
        return ExitCode::from(EXIT_TABLES_DIFFER);
    }
    ExitCode::SUCCESS
}

fn print_result(result: &JobResult, output_json: bool, headline: &str) -> Result<(), ChecksumError> {
    if output_json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    println!("\n{}!", headline);
    println!("  Job ID: {}", result.job_id);
    println!("  Status: {}", result.status);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {}/{} equal",
        result.tables_equal, result.tables_total
    );
    if !result.different_tables.is_empty() {
        println!("  Different tables: {:?}", result.different_tables);
    }
    for failed in &result.failed_tables {
        println!("  Failed: {} ({})", failed.pair, failed.error);
    }
    for table in &result.results {
        if let Some(report) = &table.difference {
            println!(
                "  {}: {} source-only, {} target-only, {} modified",
                table.pair, report.source_only, report.target_only, report.modified
            );
        }
    }
    Ok(())
}

/// Wire a JSON-lines progress printer to the orchestrator when requested.
fn attach_progress(
    orchestrator: Orchestrator,
    enabled: bool,
) -> (Orchestrator, Option<JoinHandle<()>>) {
    if !enabled {
        return (orchestrator, None);
    }

    let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(256);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            eprintln!("{}", update.to_json_line());
        }
    });
    (orchestrator.with_progress(tx), Some(printer))
}

async fn finish_progress(printer: Option<JoinHandle<()>>) {
    if let Some(printer) = printer {
        let _ = printer.await;
    }
}

fn setup_logging(verbosity: &str, format: &str, log_file: Option<&Path>) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("cannot open log file {}: {}", path.display(), e))?;
            let subscriber = subscriber.with_writer(Mutex::new(file)).with_ansi(false);
            if format == "json" {
                subscriber.json().init();
            } else {
                subscriber.init();
            }
        }
        None => {
            let subscriber = subscriber.with_writer(std::io::stderr);
            if format == "json" {
                subscriber.json().init();
            } else {
                subscriber.init();
            }
        }
    }

    Ok(())
}

/// Force the process down if in-flight work outlives the shutdown timeout.
fn spawn_shutdown_watchdog(shutdown_timeout: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        eprintln!("Shutdown timeout of {}s reached, exiting", shutdown_timeout);
        std::process::exit(i32::from(data_checksum::error::EXIT_CANCELLED));
    });
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, ChecksumError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Finishing in-flight chunks (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
        spawn_shutdown_watchdog(shutdown_timeout);
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, ChecksumError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing in-flight chunks...");
            token.cancel();
            spawn_shutdown_watchdog(shutdown_timeout);
        }
    });

    Ok(cancel_token)
}
