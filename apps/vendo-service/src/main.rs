//! # Vendo Service
//!
//! Hosts the sales engine's background work: the expiration sweeper and,
//! when configured, archival of old terminal sales.
//!
//! ## Usage
//! ```text
//! vendo-service [--config PATH]
//! vendo-service [--config PATH] --write-config OUT.toml
//!
//! RUST_LOG=vendo_engine=debug vendo-service
//! VENDO_DATABASE_PATH=/var/lib/vendo/vendo.db vendo-service
//! ```

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vendo_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let config = EngineConfig::load(args.config_path).context("loading engine configuration")?;

    if let Some(out) = args.write_config {
        config
            .save(Some(out.clone()))
            .with_context(|| format!("writing configuration to {}", out.display()))?;
        println!("Wrote effective configuration to {}", out.display());
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("building log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting Vendo service...");
    info!(
        database = %config.database_path().display(),
        payment_ttl_minutes = config.sales.payment_ttl_minutes,
        sweeper_enabled = config.sweeper.enabled,
        "Configuration loaded"
    );

    let engine = Engine::connect(&config)
        .await
        .context("opening the sales engine")?;

    let sweeper = if config.sweeper.enabled {
        Some(engine.start_sweeper())
    } else {
        warn!("Expiration sweeper disabled; paid sales will not expire on their own");
        None
    };

    shutdown_signal().await;

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.shutdown().await {
            warn!(error = %e, "Sweeper did not shut down cleanly");
        }
    }
    engine.close().await;

    info!("Shutdown complete");
    Ok(())
}

struct Args {
    config_path: Option<PathBuf>,
    /// Dump the merged file/env/default configuration here and exit.
    write_config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config_path: None,
        write_config: None,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "--write-config" => {
                let path = args.next().context("--write-config requires a path")?;
                parsed.write_config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => {
                println!("Usage: vendo-service [--config PATH] [--write-config OUT]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }

    Ok(parsed)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
