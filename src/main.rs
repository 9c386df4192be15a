//! n8n-sync — Entry Point
//!
//! Bidirectional sync between a local directory of workflow JSON files and
//! an n8n-compatible remote server.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use n8n_sync::cli::{dispatch, Cli, Command};
use n8n_sync::config::settings::Settings;
use n8n_sync::http::client::HttpClient;
use n8n_sync::http::workflows::{N8nAdapter, RemoteAdapter};
use n8n_sync::local::registry::Registry;
use n8n_sync::local::store::LocalStore;
use n8n_sync::logs::{init_logging, LogOptions};
use n8n_sync::sync::engine::SyncEngine;
use n8n_sync::sync::resolver::{resolver_for, Strategy};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = init_logging(LogOptions::default()) {
        eprintln!("failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), n8n_sync::errors::SyncError> {
    let mut settings = Settings::from_env()?;

    if let Command::SyncStart { conflict_resolution: Some(strategy), .. } = &cli.command {
        settings.conflict_resolution = Strategy::parse(strategy)?;
    }

    info!("workflows directory: {}", settings.workflows_dir.display());

    let local = Arc::new(LocalStore::new(settings.workflows_dir.clone()));
    local.ensure_dir().await?;

    let registry = Registry::new(&settings.workflows_dir);

    let http_client = HttpClient::new(&settings.n8n_url, settings.auth.clone())?;
    let remote: Arc<dyn RemoteAdapter> = Arc::new(N8nAdapter::new(http_client));

    let resolver = resolver_for(settings.conflict_resolution);
    let engine = Arc::new(SyncEngine::new(remote, local, resolver));

    for wid in registry.load().await? {
        if let Err(e) = engine.add_workflow(&wid, true).await {
            error!("failed to reload monitored workflow {}: {}", wid, e);
        }
    }

    dispatch(cli.command, engine, &registry, &settings, await_shutdown_signal()).await
}

fn await_shutdown_signal() -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
            let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received, shutting down..."),
                _ = sigint.recv() => info!("SIGINT received, shutting down..."),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl+C received, shutting down...");
        }
    })
}
