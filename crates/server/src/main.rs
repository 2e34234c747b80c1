//! shellcache server entry point.
//!
//! Boots the caching proxy worker and serves its MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use anyhow::{Context, Result};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use shellcache_client::{FetchClient, FetchConfig, ProxyWorker, WorkerConfig};
use shellcache_core::{AppConfig, CacheDb};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.cache_version, origin = %config.origin, "Starting shellcache on stdio transport");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network = FetchClient::new(FetchConfig {
        user_agent: config.user_agent.clone(),
        timeout: config.timeout(),
        ..Default::default()
    })?;
    let worker = Arc::new(ProxyWorker::new(Arc::new(network), db, WorkerConfig::from_app_config(&config)?)?);

    let mut events = worker.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::info!(event = %json, "lifecycle event"),
                    Err(e) => tracing::warn!("failed to encode lifecycle event: {e}"),
                },
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "lifecycle events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let state = worker.start().await?;
    tracing::info!(state = state.as_str(), "worker started");

    let handler = handler::ShellcacheServer::new(worker.clone());
    let server = serve_server(handler, stdio()).await?;
    server.waiting().await?;

    worker.settle().await;
    tracing::info!("pending cache writes flushed, exiting");

    Ok(())
}
