//! Request classification.
//!
//! Every intercepted request is assigned exactly one [`Policy`]. API calls
//! must never be stale, the page shell should be fresh but survive offline,
//! and static assets should load instantly and refresh in the background.

use serde::{Deserialize, Serialize};

use crate::ProxyRequest;

/// Routing decision for a single request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Forward untouched, no cache interaction.
    Bypass,
    /// Network-first with the cached shell as fallback.
    Navigation,
    /// Stale-while-revalidate.
    Asset,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Bypass => "bypass",
            Policy::Navigation => "navigation",
            Policy::Asset => "asset",
        }
    }
}

/// Pure request classifier configured with path prefixes that always bypass.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    bypass_prefixes: Vec<String>,
}

impl Classifier {
    pub fn new<I, S>(bypass_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { bypass_prefixes: bypass_prefixes.into_iter().map(Into::into).collect() }
    }

    pub fn bypass_prefixes(&self) -> &[String] {
        &self.bypass_prefixes
    }

    /// Assign a policy to `request`.
    pub fn classify(&self, request: &ProxyRequest) -> Policy {
        if !request.is_get() || self.is_excluded(request.url.path()) {
            return Policy::Bypass;
        }

        if request.navigate || accepts_markup(request) {
            return Policy::Navigation;
        }

        Policy::Asset
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.bypass_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

fn accepts_markup(request: &ProxyRequest) -> bool {
    request
        .header("accept")
        .is_some_and(|accept| accept.to_ascii_lowercase().contains("text/html"))
}
