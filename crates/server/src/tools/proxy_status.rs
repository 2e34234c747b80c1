//! proxy_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ProxyWorker;
use shellcache_core::CacheStore;

use super::json_result;

/// Output structure for proxy_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyStatusOutput {
    /// Lifecycle state: uninstalled, installed or active.
    pub state: String,
    /// Version this worker installs and serves.
    pub version: String,
    pub origin: String,
    /// Every store on disk, with entry counts.
    pub stores: Vec<CacheStore>,
    /// Background cache writes still in flight.
    pub pending_writes: usize,
}

/// Implementation of the proxy_status tool.
pub async fn status_impl(worker: &ProxyWorker) -> Result<CallToolResult, McpError> {
    let output = ProxyStatusOutput {
        state: worker.state().await.as_str().to_string(),
        version: worker.version().to_string(),
        origin: worker.config().origin.to_string(),
        stores: worker.stores().await?,
        pending_writes: worker.engine().pending_writes(),
    };

    json_result(&output)
}
