//! Nexus Bridge - cross-chain OFT transfers over LayerZero
//!
//! This service holds a wallet session, quotes LayerZero fees for the
//! selected route and drives approve, bridge and deploy flows against the
//! OFT contracts, exposing the whole bridge view over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

mod api;
mod chain;
mod config;
mod error;
mod metrics;
mod registry;
mod session;
mod transfer;
mod units;
mod wallet;

use chain::{ChainGateway, EthersGateway, OfflineGateway};
use config::Settings;
use metrics::MetricsServer;
use registry::Registry;
use session::SessionManager;
use transfer::Orchestrator;
use wallet::{KeyWallet, WalletProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Nexus Bridge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    let registry = Arc::new(Registry::with_overrides(&settings.tokens)?);
    info!(
        "Loaded {} networks and {} tokens",
        registry.networks().len(),
        registry.tokens().len()
    );

    // Wallet and chain access
    let initial_network = registry.require_network(settings.wallet.initial_chain_id)?;
    let key_wallet = KeyWallet::from_env(&settings.wallet.private_key_env, initial_network)?
        .map(Arc::new);

    let (session, gateway): (SessionManager, Arc<dyn ChainGateway>) = match &key_wallet {
        Some(wallet) => {
            info!("Wallet loaded for {:?}", wallet.address());
            let bytecode = match &settings.deploy.bytecode_path {
                Some(path) => Some(EthersGateway::load_bytecode(path)?),
                None => None,
            };
            (
                SessionManager::new(Some(wallet.clone() as Arc<dyn WalletProvider>)),
                Arc::new(EthersGateway::new(wallet.clone(), bytecode)),
            )
        }
        None => (SessionManager::new(None), Arc::new(OfflineGateway)),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        session,
        gateway,
        registry.clone(),
        settings.bridge.clone(),
        settings.deploy.clone(),
    ));
    orchestrator.reinitialize().await?;
    info!("Bridge state initialized");

    // Follow wallet account and chain changes
    let wallet_handle = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.watch_wallet().await }
    });

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            orchestrator: orchestrator.clone(),
            registry: registry.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    info!("Nexus Bridge is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    if let Some(wallet) = &key_wallet {
        wallet.disconnect();
    }

    // Abort background tasks
    api_handle.abort();
    wallet_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Nexus Bridge stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,nexus_bridge=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
