//! Scripted network used by strategy and worker tests.

use async_trait::async_trait;
use shellcache_core::{Error, ProxyRequest, ProxyResponse};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::fetch::Network;

enum Reply {
    Respond { status: u16, content_type: &'static str, body: String },
    Fail,
}

/// Answers by URL path. Unknown paths get a 404.
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
    offline: AtomicBool,
    delay: Mutex<Duration>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn respond(&self, path: &str, status: u16, content_type: &'static str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Reply::Respond { status, content_type, body: body.to_string() });
    }

    pub(crate) fn fail(&self, path: &str) {
        self.routes.lock().unwrap().insert(path.to_string(), Reply::Fail);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| p.as_str() == path).count()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let path = request.url.path().to_string();
        self.calls.lock().unwrap().push(path.clone());

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let routes = self.routes.lock().unwrap();
        match routes.get(&path) {
            Some(Reply::Respond { status, content_type, body }) => {
                Ok(ProxyResponse::new(*status, body.clone()).with_header("content-type", *content_type))
            }
            Some(Reply::Fail) => Err(Error::Network(format!("connection refused: {}", request.url))),
            None => Ok(ProxyResponse::new(404, "not found").with_header("content-type", "text/plain")),
        }
    }
}
