//! cache_get tool implementation.
//!
//! Reads an entry from the active store without touching the network.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ProxyWorker;
use shellcache_core::{Error, ProxyRequest};

use crate::tools::{HeaderField, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Absolute URL or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// Cache key of the entry.
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<HeaderField>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    pub stored_at: Option<String>,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ProxyWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let request = ProxyRequest::new(params.method.as_deref().unwrap_or("GET"), url)?;

    let entry = worker
        .lookup(&request)
        .await
        .ok_or_else(|| Error::CacheMiss(format!("{} {}", request.method, request.url)))?;

    let output = CacheGetOutput {
        key: entry.key.to_string(),
        method: entry.method,
        url: entry.url,
        status: entry.status,
        headers: HeaderField::from_pairs(&entry.headers),
        body: String::from_utf8_lossy(&entry.body).into_owned(),
        stored_at: entry.stored_at,
    };

    json_result(&output)
}
