//! Msgbridge Gateway - HTTP gateway for messaging-network bots
//!
//! This is the main entry point for the gateway service. It opens the
//! store, loads and connects every persisted bot, and serves the HTTP API.
//!
//! # Configuration
//!
//! - `LISTEN_ADDR` - listen address (default `0.0.0.0:8080`)
//! - `DATA_DIR` - `RocksDB` directory (default `/data/msgbridge`)
//! - `BACKEND` - connection backend, `offline` or `mock`
//!
//! # Dev Mode
//!
//! Build with `--features dev-mode` to compile in the in-memory mock
//! backend; it becomes the default when `BACKEND` is not set.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use msgbridge_connection::{factory_for, BackendKind};
use msgbridge_control::{BridgeService, ControlConfig};
use msgbridge_gateway::{create_router, GatewayConfig, GatewayState};
use msgbridge_store::RocksStore;

#[cfg(feature = "dev-mode")]
const DEFAULT_BACKEND: &str = "mock";
#[cfg(not(feature = "dev-mode"))]
const DEFAULT_BACKEND: &str = "offline";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,msgbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Msgbridge Gateway");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/msgbridge".into());
    let backend: BackendKind = std::env::var("BACKEND")
        .unwrap_or_else(|_| DEFAULT_BACKEND.into())
        .parse()?;

    let gateway_config = GatewayConfig {
        listen_addr,
        ..GatewayConfig::default()
    };
    let control_config = ControlConfig::default();

    tracing::info!(
        listen_addr = %gateway_config.listen_addr,
        data_dir = %data_dir,
        backend = %backend,
        max_inflight_dispatches = control_config.max_inflight_dispatches,
        webhook_timeout_seconds = control_config.webhook_timeout_seconds,
        "Gateway configuration loaded"
    );

    if backend == BackendKind::Offline {
        tracing::warn!("No network backend configured - bots will not connect");
    }
    #[cfg(feature = "dev-mode")]
    if backend == BackendKind::Mock {
        tracing::warn!("DEV MODE ENABLED - using in-memory mock connections");
    }

    // Initialize RocksDB store
    tracing::info!(path = %data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&data_dir)?);

    // Initialize the bridge and bring up persisted bots
    let factory = factory_for(backend)?;
    let bridge = Arc::new(BridgeService::new(store, factory, control_config)?);
    let loaded = bridge.start().await?;
    tracing::info!(bots = loaded, "Bridge service initialized");

    // Create the full router with all API endpoints
    let listen_addr = gateway_config.listen_addr.clone();
    let state = GatewayState::new(bridge, gateway_config);
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
