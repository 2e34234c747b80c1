//! Deterministic cache key generation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::ProxyRequest;

/// Identifier of a cached response within one store.
///
/// Derived from the method and the full URL (query included, fragment
/// excluded). Headers never take part, so two requests for the same
/// method + URL always collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);

        let mut hasher = Sha256::new();
        hasher.update(method.to_ascii_uppercase().as_bytes());
        hasher.update(b"\n");
        hasher.update(url.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn for_request(request: &ProxyRequest) -> Self {
        Self::compute(&request.method, &request.url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_stored(hash: String) -> Self {
        Self(hash)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
