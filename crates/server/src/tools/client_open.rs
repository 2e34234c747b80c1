//! client_open tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::ProxyWorker;

use super::json_result;

/// Output structure for client_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClientOpenOutput {
    /// Id to pass as `client_id` to proxy_fetch.
    pub client_id: u64,
    /// Whether the current version already controls this client.
    pub controlled: bool,
}

/// Implementation of the client_open tool.
pub async fn open_impl(worker: &ProxyWorker) -> Result<CallToolResult, McpError> {
    let client_id = worker.open_client().await;
    let output = ClientOpenOutput { client_id, controlled: worker.is_controlled(client_id).await };
    tracing::debug!(client = client_id, controlled = output.controlled, "client opened");

    json_result(&output)
}
