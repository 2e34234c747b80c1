//! Response strategies executed per intercepted request.
//!
//! - **bypass** forwards to the network and returns its result untouched.
//! - **navigation** is network-first with the cached shell, then a static
//!   offline document, as fallbacks. It never fails.
//! - **asset** is stale-while-revalidate: a cached copy answers immediately
//!   while a revalidation fetch refreshes the store for the next request.
//!
//! Cache writes run as tracked background tasks and never delay or fail the
//! response they were triggered by.

mod network_first;
mod stale_while_revalidate;

use shellcache_core::{CacheDb, CacheEntry, CacheKey, CacheVersion, Error, Policy, ProxyRequest, ProxyResponse};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use url::Url;

use crate::fetch::Network;

/// Settings shared by every strategy.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Absolute URL of the document cached as the navigation shell.
    pub shell_url: Url,
    /// Markup served to navigations when offline without a cached shell.
    pub offline_markup: String,
}

/// Executes a [`Policy`] against the network and a cache version.
#[derive(Clone)]
pub struct StrategyEngine {
    network: Arc<dyn Network>,
    db: CacheDb,
    shell_url: Url,
    shell_key: CacheKey,
    offline_markup: Arc<str>,
    writes: TaskTracker,
}

impl StrategyEngine {
    pub fn new(network: Arc<dyn Network>, db: CacheDb, config: StrategyConfig) -> Self {
        let shell_key = CacheKey::compute("GET", &config.shell_url);
        Self {
            network,
            db,
            shell_url: config.shell_url,
            shell_key,
            offline_markup: config.offline_markup.into(),
            writes: TaskTracker::new(),
        }
    }

    /// Key every navigation response is cached under.
    pub fn shell_key(&self) -> &CacheKey {
        &self.shell_key
    }

    pub fn shell_url(&self) -> &Url {
        &self.shell_url
    }

    /// Run `policy` for `request` against the store of `version`.
    ///
    /// Only `Bypass` and `Asset` can fail, and only with the network's error.
    pub async fn execute(
        &self, policy: Policy, request: &ProxyRequest, version: &CacheVersion,
    ) -> Result<ProxyResponse, Error> {
        tracing::debug!(policy = policy.as_str(), method = %request.method, url = %request.url, "executing strategy");
        match policy {
            Policy::Bypass => self.bypass(request).await,
            Policy::Navigation => Ok(self.network_first(request, version).await),
            Policy::Asset => self.stale_while_revalidate(request, version).await,
        }
    }

    /// Forward `request` unmodified. No cache interaction.
    pub async fn bypass(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        self.network.fetch(request).await
    }

    /// Fetch `request` and store the result under its own key.
    ///
    /// Used to pre-populate a store on install. Returns whether the entry
    /// was stored.
    pub async fn prefetch(&self, request: &ProxyRequest, version: &CacheVersion) -> bool {
        match self.network.fetch(request).await {
            Ok(response) => {
                let entry = CacheEntry::capture(CacheKey::for_request(request), &request.method, &request.url, &response);
                self.db.put(version, entry).await.is_stored()
            }
            Err(e) => {
                tracing::debug!(url = %request.url, "prefetch failed: {e}");
                false
            }
        }
    }

    /// Wait until every background cache write started so far has finished.
    pub async fn settle(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    /// Number of background cache writes still running.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn spawn_write(&self, version: CacheVersion, entry: CacheEntry) {
        let db = self.db.clone();
        self.writes.spawn(async move {
            db.put(&version, entry).await;
        });
    }
}
