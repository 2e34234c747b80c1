//! proxy_fetch tool implementation.
//!
//! Feeds one request through the worker, as if a page had issued it.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ProxyWorker;
use shellcache_core::{Error, Policy, ProxyRequest};

use super::{HeaderField, json_result};

/// Input parameters for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// Absolute URL or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Request headers, forwarded in order.
    #[serde(default)]
    pub headers: Vec<HeaderField>,

    /// Mark the request as a top-level page load.
    #[serde(default)]
    pub navigate: bool,

    /// Client context issuing the request, from client_open.
    #[serde(default)]
    pub client_id: Option<u64>,
}

/// Who produced the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServedBy {
    Proxy,
    Passthrough,
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    pub status: u16,
    pub headers: Vec<HeaderField>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
    /// Body size in bytes.
    pub body_bytes: usize,
    pub served_by: ServedBy,
    /// Policy applied when served by the proxy.
    pub policy: Option<Policy>,
}

/// Implementation of the proxy_fetch tool.
pub async fn fetch_impl(worker: &ProxyWorker, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let url = worker.resolve(&params.url)?;
    let mut request = ProxyRequest::new(params.method.as_deref().unwrap_or("GET"), url)?;
    for header in params.headers {
        request = request.with_header(header.name, header.value);
    }
    if params.navigate {
        request = request.navigation();
    }
    if let Some(id) = params.client_id {
        request = request.with_client(id);
    }

    let served = worker.respond(&request).await?;
    tracing::debug!(
        method = %request.method,
        url = %request.url,
        status = served.response.status,
        policy = served.policy.map(|p| p.as_str()),
        "proxy_fetch served"
    );

    let response = served.response;
    let output = ProxyFetchOutput {
        status: response.status,
        headers: HeaderField::from_pairs(&response.headers),
        body: String::from_utf8_lossy(&response.body).into_owned(),
        body_bytes: response.body.len(),
        served_by: if served.policy.is_some() { ServedBy::Proxy } else { ServedBy::Passthrough },
        policy: served.policy,
    };

    json_result(&output)
}
