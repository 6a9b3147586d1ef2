//! Garm authorization gateway - main binary

use anyhow::{Context, Result};
use clap::Parser;
use garm_api_server::ServerError;
use garm_core::CONFIG_VERSION;
use garm_node::daemon::shutdown_signal;
use garm_node::{init_tracing, Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Garm command line
#[derive(Parser)]
#[command(name = "garm")]
#[command(about = "Authorization gateway between cluster webhooks and a policy service")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short = 'f', long, default_value = "/etc/garm/config.toml", env = "GARM_CONFIG")]
    config: PathBuf,

    /// Show binary and configuration versions
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("garm version -> {}", env!("CARGO_PKG_VERSION"));
        println!("garm config version -> {}", CONFIG_VERSION);
        return ExitCode::SUCCESS;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("garm: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    init_tracing(&config.logger)?;
    info!(
        "Starting garm v{} with configuration {:?}",
        env!("CARGO_PKG_VERSION"),
        cli.config
    );

    let daemon = Daemon::new(&config).context("failed to instantiate daemon")?;

    let cancel = CancellationToken::new();
    let signals = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(signal) => {
                    warn!(signal, "garm server shutdown...");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "failed to install signal handlers"),
            }
        })
    };

    let errors = daemon.run(cancel).await;
    signals.abort();

    let (cancelled, failures): (Vec<_>, Vec<_>) = errors
        .into_iter()
        .partition(|e| matches!(e, ServerError::Cancelled));

    if !cancelled.is_empty() {
        for failure in &failures {
            warn!(error = %failure, "shutdown incomplete");
        }
        info!("garm stopped");
        return Ok(());
    }

    if failures.is_empty() {
        anyhow::bail!("listeners stopped without an error");
    }
    let report: Vec<String> = failures
        .iter()
        .map(|e| match std::error::Error::source(e) {
            Some(source) => format!("{}: {}", e, source),
            None => e.to_string(),
        })
        .collect();
    anyhow::bail!("garm server failed:\n{}", report.join("\n"))
}
