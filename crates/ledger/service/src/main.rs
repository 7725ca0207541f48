//! ledgerd - Constitutional ledger daemon
//!
//! - `run`: continuous hash verification until interrupted or halted
//! - `scan`: one verification pass, non-zero exit on breach
//! - `export`: complete ledger export as JSON on stdout
//! - `verify-export`: completeness and integrity check of an export file
//! - `check-config`: print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledger_integrity::{HashVerifier, InMemoryBreachLog, InMemoryScanRecordStore, ScanScope};
use ledger_service::{open_ledger, CompleteExport, ConstitutionalLedger, LedgerConfig};
use ledger_signing::InMemoryKeySource;
use ledger_store::InMemoryEventStore;
use ledger_types::HaltState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Constitutional ledger daemon CLI
#[derive(Parser)]
#[command(name = "ledgerd")]
#[command(about = "Constitutional ledger daemon - verification and export", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LEDGER_CONFIG", global = true)]
    config: Option<String>,

    /// Log level (overrides the configuration file)
    #[arg(long, env = "LEDGER_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "LEDGER_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run continuous verification until Ctrl-C or a halt
    Run {
        /// Seconds between scans
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Run a single verification pass
    Scan {
        /// Scan only the most recent N events
        #[arg(long)]
        window: Option<u64>,
    },

    /// Write the complete ledger export to stdout
    Export {
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Verify a previously written export file
    VerifyExport {
        /// Export file path
        path: PathBuf,
    },

    /// Print the effective configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LedgerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Command::CheckConfig => {
            config.validate().map_err(anyhow::Error::msg)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::VerifyExport { path } => verify_export(&path).await,
        Command::Export { pretty } => {
            let ledger = open(&config).await?;
            let export = ledger.export_complete().await?;
            let json = if pretty {
                serde_json::to_string_pretty(&export)?
            } else {
                serde_json::to_string(&export)?
            };
            println!("{json}");
            Ok(())
        }
        Command::Scan { window } => {
            let ledger = open(&config).await?;
            let result = match window.or(config.verification.window) {
                Some(last_n) => ledger.scan_window(last_n).await?,
                None => ledger.full_chain_scan().await?,
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.passed() {
                bail!(
                    "integrity breach at sequence {}",
                    result.failed_sequence.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Run { interval_secs } => {
            let ledger = open(&config).await?;
            let interval = interval_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.verification.interval());
            let scope = match config.verification.window {
                Some(last_n) => ScanScope::Window { last_n },
                None => ScanScope::Full,
            };
            run(ledger, interval, scope).await
        }
    }
}

async fn open(config: &LedgerConfig) -> Result<ConstitutionalLedger> {
    // Verification and export never sign, so no private keys are loaded.
    open_ledger(config, Arc::new(InMemoryKeySource::new()))
        .await
        .context("failed to open ledger")
}

async fn run(ledger: ConstitutionalLedger, interval: Duration, scope: ScanScope) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        interval_secs = interval.as_secs(),
        scope = ?scope,
        "ledgerd starting"
    );

    let handle = ledger.start_verification(interval, scope);

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = wait_for_halt(ledger.halt()) => {}
    }

    handle.shutdown().await;

    let status = ledger.halt_status();
    if status.halted {
        bail!(
            "ledger halted: {}",
            status.reason.unwrap_or_else(|| "unknown reason".into())
        );
    }
    tracing::info!("ledgerd shutting down");
    Ok(())
}

async fn wait_for_halt(halt: &HaltState) {
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    while !halt.is_halted() {
        poll.tick().await;
    }
}

async fn verify_export(path: &PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let export: CompleteExport = serde_json::from_str(&raw).context("not a ledger export")?;

    if !export.validate_completeness() {
        bail!("export {} is incomplete", export.metadata.export_id);
    }

    let verifier = HashVerifier::new(
        Arc::new(InMemoryEventStore::load_unverified(export.events)),
        Arc::new(InMemoryScanRecordStore::new()),
        Arc::new(InMemoryBreachLog::new()),
        HaltState::shared(),
    );
    let result = verifier.full_chain_scan().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.passed() {
        bail!(
            "export fails verification at sequence {}",
            result.failed_sequence.unwrap_or_default()
        );
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down");
        }
    }
}
