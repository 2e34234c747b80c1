//! Lifecycle worker: install, activate and intercept.
//!
//! The worker is an explicit state machine `Uninstalled -> Installed ->
//! Active`, ending in `Redundant` once another version is activated on the
//! same database. Only an active worker answers requests; otherwise, and for
//! bypassed requests, it declines and lets the host go to the network.
//!
//! The version is captured once per request, so an activation in the
//! middle of a request never mixes two generations within it.

mod clients;
mod events;

pub use clients::ClientRegistry;
pub use events::LifecycleEvent;

use shellcache_core::{
    AppConfig, CacheDb, CacheEntry, CacheKey, CacheStore, CacheVersion, Classifier, Error, Policy, ProxyRequest,
    ProxyResponse,
};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinSet;
use url::Url;

use crate::fetch::{Network, resolve};
use crate::strategy::{StrategyConfig, StrategyEngine};

const EVENT_CAPACITY: usize = 32;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninstalled,
    Installed,
    Active,
    /// Another version took over the database; this worker only passes through.
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninstalled => "uninstalled",
            WorkerState::Installed => "installed",
            WorkerState::Active => "active",
            WorkerState::Redundant => "redundant",
        }
    }
}

/// What the worker decided to do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The worker produced the response.
    Respond { policy: Policy, response: ProxyResponse },
    /// The worker declined; the request should go to the network untouched.
    PassThrough,
}

/// A response plus the policy that produced it (`None` when passed through).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub policy: Option<Policy>,
    pub response: ProxyResponse,
}

/// Worker settings, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: CacheVersion,
    pub origin: Url,
    pub bypass_prefixes: Vec<String>,
    pub shell_path: String,
    pub core_paths: Vec<String>,
    pub offline_markup: String,
    pub skip_waiting: bool,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let invalid = |e: shellcache_core::ConfigError| Error::InvalidInput(e.to_string());
        Ok(Self {
            version: config.version().map_err(invalid)?,
            origin: config.origin_url().map_err(invalid)?,
            bypass_prefixes: config.bypass_prefixes.clone(),
            shell_path: config.shell_path.clone(),
            core_paths: config.core_paths.clone(),
            offline_markup: config.offline_markup.clone(),
            skip_waiting: config.skip_waiting,
        })
    }
}

/// The caching proxy for one cache version.
pub struct ProxyWorker {
    db: CacheDb,
    classifier: Classifier,
    engine: StrategyEngine,
    config: WorkerConfig,
    state: RwLock<WorkerState>,
    clients: Mutex<ClientRegistry>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl ProxyWorker {
    pub fn new(network: Arc<dyn Network>, db: CacheDb, config: WorkerConfig) -> Result<Self, Error> {
        let shell_url = resolve(&config.origin, &config.shell_path).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let engine = StrategyEngine::new(
            network,
            db.clone(),
            StrategyConfig { shell_url, offline_markup: config.offline_markup.clone() },
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            db,
            classifier: Classifier::new(config.bypass_prefixes.iter().cloned()),
            engine,
            config,
            state: RwLock::new(WorkerState::Uninstalled),
            clients: Mutex::new(ClientRegistry::default()),
            events,
        })
    }

    pub fn version(&self) -> &CacheVersion {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.engine
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Receive lifecycle notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LifecycleEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Resolve a path or absolute URL against the configured origin.
    pub fn resolve(&self, target: &str) -> Result<Url, Error> {
        resolve(&self.config.origin, target).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Install the current version: create its store and pre-populate the
    /// core paths. Population is best effort and never fails the install.
    pub async fn install(&self) -> Result<CacheStore, Error> {
        let version = self.config.version.clone();
        self.db.create_store(&version).await?;

        let mut population = JoinSet::new();
        for path in &self.config.core_paths {
            let url = match self.resolve(path) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(path = %path, "skipping core path: {e}");
                    continue;
                }
            };
            let engine = self.engine.clone();
            let version = version.clone();
            population.spawn(async move { engine.prefetch(&ProxyRequest::get(url), &version).await });
        }

        let requested = population.len();
        let mut cached = 0;
        while let Some(result) = population.join_next().await {
            if matches!(result, Ok(true)) {
                cached += 1;
            }
        }

        {
            let mut state = self.state.write().await;
            if *state == WorkerState::Uninstalled {
                *state = WorkerState::Installed;
            }
        }

        tracing::info!(version = %version, cached, requested, "cache version installed");
        self.emit(LifecycleEvent::Installed { version: version.clone(), cached, requested });

        self.db
            .store(&version)
            .await?
            .ok_or_else(|| Error::InvalidState(format!("store {version} was reclaimed during install")))
    }

    /// Take control: make the current version the only store and claim
    /// every open client. Returns the reclaimed versions.
    pub async fn activate(&self) -> Result<Vec<CacheVersion>, Error> {
        let version = self.config.version.clone();
        let mut state = self.state.write().await;
        match *state {
            WorkerState::Uninstalled => {
                return Err(Error::InvalidState(format!("cannot activate {version} before install")));
            }
            WorkerState::Redundant => {
                return Err(Error::InvalidState(format!("{version} was superseded and cannot be reactivated")));
            }
            WorkerState::Installed | WorkerState::Active => {}
        }

        let reclaimed = self.db.activate(&version).await?;
        *state = WorkerState::Active;
        drop(state);

        tracing::info!(version = %version, reclaimed = reclaimed.len(), "cache version activated");
        self.emit(LifecycleEvent::Activated { version: version.clone(), reclaimed: reclaimed.clone() });
        self.claim().await;

        Ok(reclaimed)
    }

    /// Install, then activate right away when `skip_waiting` is set.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        self.install().await?;
        if self.config.skip_waiting {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Adopt every open client into the current version.
    pub async fn claim(&self) -> usize {
        let count = self.clients.lock().await.claim(&self.config.version);
        tracing::debug!(version = %self.config.version, count, "clients claimed");
        self.emit(LifecycleEvent::ClientsClaimed { version: self.config.version.clone(), count });
        count
    }

    /// Open a client context. It is controlled immediately if the worker is active.
    pub async fn open_client(&self) -> u64 {
        let controller = (self.state().await == WorkerState::Active).then(|| self.config.version.clone());
        self.clients.lock().await.open(controller)
    }

    pub async fn close_client(&self, id: u64) -> bool {
        self.clients.lock().await.close(id)
    }

    pub async fn is_controlled(&self, id: u64) -> bool {
        self.clients.lock().await.is_controlled(id)
    }

    /// Classify and, unless declined, answer `request`.
    pub async fn intercept(&self, request: &ProxyRequest) -> Result<Disposition, Error> {
        if self.state().await != WorkerState::Active || self.superseded().await {
            tracing::debug!(url = %request.url, "worker not active, passing through");
            return Ok(Disposition::PassThrough);
        }

        if let Some(id) = request.client_id
            && !self.is_controlled(id).await
        {
            tracing::debug!(client = id, url = %request.url, "uncontrolled client, passing through");
            return Ok(Disposition::PassThrough);
        }

        let policy = self.classifier.classify(request);
        if policy == Policy::Bypass {
            return Ok(Disposition::PassThrough);
        }

        let version = self.config.version.clone();
        let response = self.engine.execute(policy, request, &version).await?;
        Ok(Disposition::Respond { policy, response })
    }

    /// Like [`intercept`](Self::intercept), but performs the pass-through
    /// itself so the caller always gets a response.
    pub async fn respond(&self, request: &ProxyRequest) -> Result<Served, Error> {
        match self.intercept(request).await? {
            Disposition::Respond { policy, response } => Ok(Served { policy: Some(policy), response }),
            Disposition::PassThrough => {
                let response = self.engine.bypass(request).await?;
                Ok(Served { policy: None, response })
            }
        }
    }

    /// Whether another version has been activated on the database since this
    /// worker took control. Flips the worker to `Redundant` when it has.
    async fn superseded(&self) -> bool {
        let active = match self.db.active_store().await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!("could not read active store: {e}");
                return false;
            }
        };
        if active.is_some_and(|store| store.version == self.config.version) {
            return false;
        }

        let mut state = self.state.write().await;
        if *state == WorkerState::Active {
            *state = WorkerState::Redundant;
            tracing::info!(version = %self.config.version, "cache version superseded, worker is redundant");
        }
        true
    }

    /// Look up `request` in the active store without touching the network.
    pub async fn lookup(&self, request: &ProxyRequest) -> Option<CacheEntry> {
        if self.state().await != WorkerState::Active {
            return None;
        }
        self.db.get(&self.config.version, &CacheKey::for_request(request)).await
    }

    pub async fn stores(&self) -> Result<Vec<CacheStore>, Error> {
        self.db.list_stores().await
    }

    /// Wait for background cache writes.
    pub async fn settle(&self) {
        self.engine.settle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedNetwork;
    use shellcache_core::exchange::OFFLINE_CONTENT_TYPE;

    fn config(version: &str) -> WorkerConfig {
        WorkerConfig {
            version: CacheVersion::new(version).unwrap(),
            origin: Url::parse("http://localhost:8000").unwrap(),
            bypass_prefixes: vec!["/api/".into()],
            shell_path: "/static/index.html".into(),
            core_paths: vec!["/".into(), "/static/".into(), "/static/index.html".into()],
            offline_markup: "<h1>Offline</h1>".into(),
            skip_waiting: true,
        }
    }

    fn shell_network() -> Arc<ScriptedNetwork> {
        let network = Arc::new(ScriptedNetwork::new());
        network.respond("/", 200, "text/html", "<html>root</html>");
        network.respond("/static/", 200, "text/html", "<html>static</html>");
        network.respond("/static/index.html", 200, "text/html", "<html>shell</html>");
        network
    }

    async fn worker_with(network: Arc<ScriptedNetwork>, db: CacheDb, version: &str) -> ProxyWorker {
        ProxyWorker::new(network, db, config(version)).unwrap()
    }

    fn get(worker: &ProxyWorker, path: &str) -> ProxyRequest {
        ProxyRequest::get(worker.resolve(path).unwrap())
    }

    #[tokio::test]
    async fn test_install_populates_core_paths() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db.clone(), "v1").await;

        let store = worker.install().await.unwrap();

        assert_eq!(worker.state().await, WorkerState::Installed);
        assert_eq!(store.version.as_str(), "v1");
        assert_eq!(store.entries, 3);
        for path in ["/", "/static/", "/static/index.html"] {
            let key = CacheKey::for_request(&get(&worker, path));
            assert!(db.get(worker.version(), &key).await.is_some(), "{path} missing");
        }
    }

    #[tokio::test]
    async fn test_install_swallows_population_failures() {
        let network = shell_network();
        network.fail("/static/");
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network, db, "v1").await;
        let mut events = worker.subscribe();

        let store = worker.install().await.unwrap();

        assert_eq!(store.entries, 2);
        assert_eq!(
            events.recv().await.unwrap(),
            LifecycleEvent::Installed { version: CacheVersion::new("v1").unwrap(), cached: 2, requested: 3 }
        );
    }

    #[tokio::test]
    async fn test_install_offline_still_succeeds() {
        let network = shell_network();
        network.set_offline(true);
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network, db, "v1").await;

        let store = worker.install().await.unwrap();
        assert_eq!(store.entries, 0);
        assert_eq!(worker.state().await, WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_activate_before_install_is_rejected() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db, "v1").await;
        assert!(matches!(worker.activate().await, Err(Error::InvalidState(_))));
        assert_eq!(worker.state().await, WorkerState::Uninstalled);
    }

    #[tokio::test]
    async fn test_version_rollover_reclaims_previous_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = worker_with(shell_network(), db.clone(), "v1").await;
        old.start().await.unwrap();
        let shell_req = get(&old, "/static/index.html");

        let new = worker_with(shell_network(), db.clone(), "v2").await;
        new.install().await.unwrap();
        // installing v2 leaves v1 active and intact
        assert_eq!(db.active_store().await.unwrap().unwrap().version.as_str(), "v1");

        let reclaimed = new.activate().await.unwrap();
        assert_eq!(reclaimed, vec![CacheVersion::new("v1").unwrap()]);
        assert!(db.get(old.version(), &CacheKey::for_request(&shell_req)).await.is_none());
        assert!(db.get(new.version(), &CacheKey::for_request(&shell_req)).await.is_some());
        assert_eq!(new.stores().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_worker_passes_through() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let old = worker_with(shell_network(), db.clone(), "v1").await;
        old.start().await.unwrap();
        let req = get(&old, "/static/index.html");
        assert!(matches!(old.intercept(&req).await.unwrap(), Disposition::Respond { .. }));

        let new = worker_with(shell_network(), db, "v2").await;
        new.start().await.unwrap();

        assert_eq!(old.intercept(&req).await.unwrap(), Disposition::PassThrough);
        assert_eq!(old.state().await, WorkerState::Redundant);
        assert!(matches!(old.activate().await, Err(Error::InvalidState(_))));
        assert!(matches!(new.intercept(&req).await.unwrap(), Disposition::Respond { .. }));
        assert_eq!(new.state().await, WorkerState::Active);
    }

    #[tokio::test]
    async fn test_start_respects_skip_waiting() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let waiting = ProxyWorker::new(shell_network(), db, WorkerConfig { skip_waiting: false, ..config("v1") }).unwrap();
        assert_eq!(waiting.start().await.unwrap(), WorkerState::Installed);

        let db = CacheDb::open_in_memory().await.unwrap();
        let eager = worker_with(shell_network(), db, "v1").await;
        assert_eq!(eager.start().await.unwrap(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db, "v1").await;
        let mut events = worker.subscribe();
        worker.open_client().await;

        worker.start().await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Installed { cached: 3, .. }));
        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::Activated { ref reclaimed, .. } if reclaimed.is_empty()));
        assert!(matches!(events.recv().await.unwrap(), LifecycleEvent::ClientsClaimed { count: 1, .. }));
    }

    #[tokio::test]
    async fn test_inactive_worker_passes_through() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db, "v1").await;
        worker.install().await.unwrap();

        let req = get(&worker, "/static/index.html");
        assert_eq!(worker.intercept(&req).await.unwrap(), Disposition::PassThrough);
        assert!(worker.lookup(&req).await.is_none());
    }

    #[tokio::test]
    async fn test_clients_claimed_on_activation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db, "v1").await;
        worker.install().await.unwrap();

        let early = worker.open_client().await;
        let req = get(&worker, "/static/index.html").with_client(early);
        assert!(!worker.is_controlled(early).await);

        worker.activate().await.unwrap();
        assert!(worker.is_controlled(early).await);
        assert!(matches!(worker.intercept(&req).await.unwrap(), Disposition::Respond { .. }));

        let late = worker.open_client().await;
        assert!(worker.is_controlled(late).await);
    }

    #[tokio::test]
    async fn test_unknown_client_passes_through() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db, "v1").await;
        worker.start().await.unwrap();

        let id = worker.open_client().await;
        assert!(worker.close_client(id).await);
        let req = get(&worker, "/static/app.js").with_client(id);
        assert_eq!(worker.intercept(&req).await.unwrap(), Disposition::PassThrough);
    }

    #[tokio::test]
    async fn test_scenario_a_install_caches_core_urls() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(shell_network(), db.clone(), "v1").await;
        worker.start().await.unwrap();

        let store = db.store(worker.version()).await.unwrap().unwrap();
        assert!(store.active);
        assert_eq!(store.entries, 3);
        assert!(worker.lookup(&get(&worker, "/")).await.is_some());
    }

    #[tokio::test]
    async fn test_scenario_b_asset_stale_then_fresh() {
        let network = shell_network();
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network.clone(), db, "v1").await;
        worker.start().await.unwrap();
        let req = get(&worker, "/static/app.js");

        network.respond("/static/app.js", 200, "application/javascript", "X");
        let first = worker.respond(&req).await.unwrap();
        worker.settle().await;

        network.respond("/static/app.js", 200, "application/javascript", "Y");
        let second = worker.respond(&req).await.unwrap();
        worker.settle().await;

        let third = worker.respond(&req).await.unwrap();

        assert_eq!(first.policy, Some(Policy::Asset));
        assert_eq!(&first.response.body[..], b"X");
        assert_eq!(&second.response.body[..], b"X");
        assert_eq!(&third.response.body[..], b"Y");
    }

    #[tokio::test]
    async fn test_scenario_c_offline_navigation_without_shell() {
        let network = Arc::new(ScriptedNetwork::new());
        network.set_offline(true);
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network, db, "v1").await;
        worker.start().await.unwrap();

        let req = get(&worker, "/weather").navigation();
        let served = worker.respond(&req).await.unwrap();

        assert_eq!(served.policy, Some(Policy::Navigation));
        assert_eq!(served.response.content_type(), Some(OFFLINE_CONTENT_TYPE));
        assert_eq!(&served.response.body[..], b"<h1>Offline</h1>");
    }

    #[tokio::test]
    async fn test_offline_navigation_uses_installed_shell() {
        let network = shell_network();
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network.clone(), db, "v1").await;
        worker.start().await.unwrap();

        network.set_offline(true);
        let req = get(&worker, "/articles/42").with_header("Accept", "text/html");
        let served = worker.respond(&req).await.unwrap();

        assert_eq!(&served.response.body[..], b"<html>shell</html>");
    }

    #[tokio::test]
    async fn test_scenario_d_api_never_cached() {
        let network = shell_network();
        network.respond("/api/anything", 200, "application/json", r#"{"ok":true}"#);
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network.clone(), db.clone(), "v1").await;
        worker.start().await.unwrap();
        let before = db.entry_count(worker.version()).await.unwrap();

        let req = get(&worker, "/api/anything");
        for _ in 0..5 {
            assert_eq!(worker.intercept(&req).await.unwrap(), Disposition::PassThrough);
            let served = worker.respond(&req).await.unwrap();
            assert_eq!(served.policy, None);
            assert_eq!(&served.response.body[..], br#"{"ok":true}"#);
        }
        worker.settle().await;

        assert_eq!(network.calls_for("/api/anything"), 5);
        assert_eq!(db.entry_count(worker.version()).await.unwrap(), before);
        assert!(worker.lookup(&req).await.is_none());
    }

    #[tokio::test]
    async fn test_non_get_never_cached() {
        let network = shell_network();
        network.respond("/static/upload", 201, "text/plain", "created");
        let db = CacheDb::open_in_memory().await.unwrap();
        let worker = worker_with(network, db.clone(), "v1").await;
        worker.start().await.unwrap();
        let before = db.entry_count(worker.version()).await.unwrap();

        let req = ProxyRequest::new("POST", worker.resolve("/static/upload").unwrap()).unwrap();
        let served = worker.respond(&req).await.unwrap();
        worker.settle().await;

        assert_eq!(served.response.status, 201);
        assert_eq!(db.entry_count(worker.version()).await.unwrap(), before);
    }

    #[test]
    fn test_worker_config_from_app_config() {
        let config = WorkerConfig::from_app_config(&AppConfig::default()).unwrap();
        assert_eq!(config.version.as_str(), "shellcache-v1");
        assert_eq!(config.origin.as_str(), "http://localhost:8000/");
        assert!(config.skip_waiting);

        let bad = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(WorkerConfig::from_app_config(&bad), Err(Error::InvalidInput(_))));
    }
}
