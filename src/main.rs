use anyhow::Result;
use certmill::api::server::ApiServer;
use certmill::api::state::AppState;
use certmill::dispatch::Dispatcher;
use certmill::index::MetadataIndex;
use certmill::renewal::{RenewalEngine, SweepScheduler};
use certmill::store::CertificateStore;
use certmill::{vault, watch, EngineConfig};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "certmill", version, about = "Certificate lifecycle manager")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CERTMILL_CONFIG")]
    config: Option<PathBuf>,

    /// Write a default configuration file to the given path and exit
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,

    /// Override the storage root directory
    #[arg(long, env = "CERTMILL_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,

    /// Override the API bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the API port
    #[arg(long)]
    port: Option<u16>,

    /// Disable the scheduled renewal sweep for this run
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    if let Some(path) = &args.init_config {
        EngineConfig::default().save_to_file(path)?;
        println!("{} Default configuration written to {}", "✓".green(), path.display());
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(root) = args.storage_root {
        config.storage.root = root;
    }
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if args.no_scheduler {
        config.scheduler.enabled = false;
    }
    config.validate()?;

    println!(
        "{} v{}",
        "certmill".bold().cyan(),
        env!("CARGO_PKG_VERSION")
    );

    let store = Arc::new(CertificateStore::new(
        config.storage.root.clone(),
        config.storage.history_retention,
    )?);
    let index = Arc::new(MetadataIndex::new());
    index.rebuild(store.load_all()?).await;
    info!(
        certificates = index.len().await,
        root = %config.storage.root.display(),
        "Certificate store loaded"
    );

    let vault = Arc::new(vault::open_default(&config.storage.root)?);
    if vault.is_sealed() {
        warn!(
            "No master key found in {}, the passphrase vault is sealed",
            certmill::constants::MASTER_KEY_ENV
        );
    }

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        index.clone(),
        vault.clone(),
        config.scheduler.max_concurrent_dispatches,
    )?);
    let engine = Arc::new(RenewalEngine::new(
        store.clone(),
        index.clone(),
        vault.clone(),
        dispatcher.clone(),
        config.renewal,
        config.scheduler.max_concurrent_renewals,
    ));
    let scheduler = Arc::new(SweepScheduler::new(
        engine.clone(),
        config.scheduler.clone(),
        &config.storage.root,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut store_events = store.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = store_events.recv().await {
            tracing::debug!(?event, "Store change");
        }
    });

    let scheduler_task = tokio::spawn(scheduler.clone().run(shutdown_rx.clone()));

    if config.storage.watch_filesystem {
        let store = store.clone();
        let index = index.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = watch::run(store, index, shutdown).await {
                warn!("Filesystem watcher stopped: {}", e);
            }
        });
    }

    let state = Arc::new(AppState::new(
        store,
        index,
        vault,
        engine,
        dispatcher,
        scheduler,
        config,
    ));
    let server = ApiServer::new(state);

    let mut shutdown = shutdown_rx;
    tokio::select! {
        result = server.run() => result?,
        _ = shutdown.changed() => {
            info!("Shutting down");
        }
    }

    let _ = scheduler_task.await;
    Ok(())
}
