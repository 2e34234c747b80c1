//! Network-first strategy for navigations.

use shellcache_core::{CacheEntry, CacheVersion, ProxyRequest, ProxyResponse};

use super::StrategyEngine;

impl StrategyEngine {
    /// Prefer the live network; fall back to the cached shell, then to the
    /// offline placeholder.
    ///
    /// Every successful response is cached under the shell key, not the
    /// request's own URL: all navigations share one shell document.
    pub async fn network_first(&self, request: &ProxyRequest, version: &CacheVersion) -> ProxyResponse {
        match self.network.fetch(request).await {
            Ok(response) => {
                let entry = CacheEntry::capture(self.shell_key.clone(), "GET", &self.shell_url, &response);
                self.spawn_write(version.clone(), entry);
                response
            }
            Err(e) => {
                tracing::debug!(url = %request.url, "navigation fetch failed, serving fallback: {e}");
                match self.db.get(version, &self.shell_key).await {
                    Some(shell) => shell.into_response(),
                    None => {
                        tracing::info!(url = %request.url, "no cached shell, serving offline placeholder");
                        ProxyResponse::offline_placeholder(&self.offline_markup)
                    }
                }
            }
        }
    }
}
