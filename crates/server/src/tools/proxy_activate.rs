//! proxy_activate tool implementation.
//!
//! Activates an installed version that is waiting (`skip_waiting = false`).

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ProxyWorker;

use super::json_result;

/// Output structure for proxy_activate tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyActivateOutput {
    pub version: String,
    /// Versions whose stores were deleted.
    pub reclaimed: Vec<String>,
}

/// Implementation of the proxy_activate tool.
pub async fn activate_impl(worker: &ProxyWorker) -> Result<CallToolResult, McpError> {
    let reclaimed = worker.activate().await?;
    let output = ProxyActivateOutput {
        version: worker.version().to_string(),
        reclaimed: reclaimed.iter().map(ToString::to_string).collect(),
    };

    json_result(&output)
}
