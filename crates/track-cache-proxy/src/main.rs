//! Track Cache Proxy
//!
//! Serves tracks from a bounded local cache, downloading them from their
//! source on first request.

mod error;
mod server;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use track_cache::CacheStore;
use track_fetcher::HttpFetcher;
use track_gate::{FetchGate, TrackCatalog};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter =
        EnvFilter::from_default_env().add_directive("track_cache_proxy=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting track cache proxy...");

    let config = load_config();
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Max cached tracks: {}", config.max_cache_count);
    info!("Track extension: {}", config.cache_extension);

    let store = CacheStore::new(config.cache_dir, config.max_cache_count)
        .with_extension(config.cache_extension);
    store.init().await?;

    let gate = FetchGate::new(store, HttpFetcher::new());
    let state: SharedState = Arc::new(ServerState::new(gate, TrackCatalog::new()));

    start_server(state, config.port).await?;

    Ok(())
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let cache_dir = std::env::var("CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.cache_dir);

    let max_cache_count = std::env::var("MAX_CACHE_COUNT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(defaults.max_cache_count);

    let cache_extension = std::env::var("CACHE_EXTENSION")
        .ok()
        .filter(|s| s.starts_with('.') && s.len() > 1)
        .unwrap_or(defaults.cache_extension);

    ProxyConfig {
        port,
        cache_dir,
        max_cache_count,
        cache_extension,
    }
}
