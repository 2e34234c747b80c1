//! MCP tool implementations.
//!
//! This module contains all tools exposed by the shellcache server.

pub mod cache;
pub mod client_open;
pub mod proxy_activate;
pub mod proxy_fetch;
pub mod proxy_status;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_core::Error;

/// A single HTTP header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub(crate) fn from_pairs(pairs: &[(String, String)]) -> Vec<Self> {
        pairs
            .iter()
            .map(|(name, value)| Self { name: name.clone(), value: value.clone() })
            .collect()
    }
}

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
