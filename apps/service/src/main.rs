#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use logger::init_tracing;
use lookout::exporter::{Export, Exporter, ExporterConfig};
use lookout::healthcheck::Probe;
use lookout::{Config, Engine, api};

/// Health-check daemon pushing results to exporters
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file, defaults to $XDG_CONFIG_HOME/lookout/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("Fail to load the configuration")?;
    info!("Loaded configuration:\n{config}");

    let engine = Arc::new(Engine::new(config.engine.clone()));

    for exporter in &config.exporters.http {
        let name = exporter.name.clone();
        let added = match Exporter::try_from(ExporterConfig::Http(exporter.clone())) {
            Ok(exporter) => engine.add_exporter(exporter).await,
            Err(e) => Err(e),
        };
        if let Err(e) = added {
            error!(exporter = %name, error = %e, "Fail to add exporter");
        }
    }

    for probe in config.probes() {
        let name = probe.base().name.clone();
        if let Err(e) = engine.add_check(Probe::from(probe)).await {
            error!(name = %name, error = %e, "Fail to add healthcheck");
        }
    }

    let server = if config.http.enabled {
        let server = api::serve(&config.http, engine.clone()).context("Fail to start the admin API")?;
        let handle = server.handle();
        actix_web::rt::spawn(server);
        Some(handle)
    } else {
        None
    };

    shutdown_signal().await?;

    if let Some(handle) = server {
        handle.stop(true).await;
    }
    engine.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Fail to install the SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = terminate.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Fail to install the Ctrl+C handler")?;
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
    Ok(())
}
