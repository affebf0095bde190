//! db-s3-export CLI - snapshot export of relational databases to S3.

use clap::{Parser, Subcommand};
use db_s3_export::{catalog, Config, ExportError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-s3-export")]
#[command(about = "Export database schema and data snapshots to S3 as parquet")]
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

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full export: metadata, DDL, table data, export ledger
    Run,

    /// Test the source database connection
    HealthCheck,
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

async fn run() -> Result<(), ExportError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| ExportError::Config(e.to_string()))?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_token = setup_signal_handler();

    match cli.command {
        Commands::Run => {
            let mut orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.run(cancel_token).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("\nExport completed!");
                println!("  Database: {}", result.database);
                println!(
                    "  Tables: {}/{}",
                    result.tables_succeeded, result.tables_total
                );
                if result.tables_failed > 0 {
                    println!("  Failed tables: {} (see export ledger)", result.tables_failed);
                }
                println!("  Views written: {}", result.views_written);
                println!("  Routines written: {}", result.routines_written);
                println!("  Metadata: {}", result.metadata_path);
                println!("  Ledger: {}", result.ledger_path);
                let duration = result.finished_at - result.started_at;
                println!("  Duration: {:.2}s", duration.num_milliseconds() as f64 / 1000.0);
            }
        }

        Commands::HealthCheck => {
            let mut adapter = catalog::for_engine(&config.source)?;
            let start = std::time::Instant::now();
            let outcome = adapter.connect().await;
            let latency_ms = start.elapsed().as_millis();

            match outcome {
                Ok(()) => {
                    adapter.close().await?;
                    println!(
                        "Source ({}): OK ({}ms)",
                        config.source.engine, latency_ms
                    );
                }
                Err(e) => {
                    println!(
                        "Source ({}): FAILED ({}ms)",
                        config.source.engine, latency_ms
                    );
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Handles SIGINT (Ctrl-C) and SIGTERM (Kubernetes/Airflow shutdown).
/// Returns a token cancelled when a signal arrives.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Finishing current table and flushing ledger...");
        token_int.cancel();
    });

    let token_term = cancel_token.clone();
    tokio::spawn(async move {
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Finishing current table and flushing ledger...");
        token_term.cancel();
    });

    cancel_token
}

#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Finishing current table and flushing ledger...");
        token.cancel();
    });

    cancel_token
}
