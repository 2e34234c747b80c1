//! Stale-while-revalidate strategy for static assets.

use shellcache_core::{CacheEntry, CacheKey, CacheVersion, Error, ProxyRequest, ProxyResponse};
use tokio::sync::oneshot;

use super::StrategyEngine;

impl StrategyEngine {
    /// Answer from the cache when possible and refresh it in the background.
    ///
    /// The revalidation fetch starts alongside the cache lookup and always
    /// completes on its own task, but its write waits until the lookup has
    /// returned, so a cached copy present at request time always wins. A hit
    /// returns without waiting for the fetch; a miss waits for its response,
    /// and a transport failure then propagates.
    pub async fn stale_while_revalidate(
        &self, request: &ProxyRequest, version: &CacheVersion,
    ) -> Result<ProxyResponse, Error> {
        let key = CacheKey::for_request(request);
        let (looked_up, gate) = oneshot::channel();
        let revalidated = self.spawn_revalidation(request.clone(), version.clone(), key.clone(), gate);

        let cached = self.db.get(version, &key).await;
        // the revalidation task may store its response from here on
        let _ = looked_up.send(());

        if let Some(cached) = cached {
            tracing::debug!(url = %request.url, "asset cache hit");
            return Ok(cached.into_response());
        }

        tracing::debug!(url = %request.url, "asset cache miss, waiting for network");
        revalidated
            .await
            .unwrap_or_else(|_| Err(Error::Network(format!("revalidation of {} was dropped", request.url))))
    }

    fn spawn_revalidation(
        &self, request: ProxyRequest, version: CacheVersion, key: CacheKey, gate: oneshot::Receiver<()>,
    ) -> oneshot::Receiver<Result<ProxyResponse, Error>> {
        let (tx, rx) = oneshot::channel();
        let network = self.network.clone();
        let db = self.db.clone();

        self.writes.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) => {
                    let entry = CacheEntry::capture(key, &request.method, &request.url, &response);
                    // nobody listens when the cached copy already answered
                    let _ = tx.send(Ok(response));
                    // a dropped caller closes the gate, which also releases the write
                    let _ = gate.await;
                    db.put(&version, entry).await;
                }
                Err(e) => {
                    tracing::debug!(url = %request.url, "asset revalidation failed: {e}");
                    let _ = tx.send(Err(e));
                }
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{setup, url};
    use shellcache_core::{CacheKey, Error, Policy, ProxyRequest};
    use std::time::{Duration, Instant};

    fn asset(path: &str) -> ProxyRequest {
        ProxyRequest::get(url(path))
    }

    #[tokio::test]
    async fn test_miss_waits_for_network_and_caches() {
        let (network, db, engine, version) = setup().await;
        network.respond("/static/app.js", 200, "application/javascript", "X");

        let response = engine.execute(Policy::Asset, &asset("/static/app.js"), &version).await.unwrap();
        assert_eq!(&response.body[..], b"X");

        engine.settle().await;
        let entry = db.get(&version, &CacheKey::for_request(&asset("/static/app.js"))).await.unwrap();
        assert_eq!(&entry.body[..], b"X");
    }

    #[tokio::test]
    async fn test_hit_does_not_wait_for_network() {
        let (network, _db, engine, version) = setup().await;
        network.respond("/static/app.css", 200, "text/css", "cached");
        engine.execute(Policy::Asset, &asset("/static/app.css"), &version).await.unwrap();
        engine.settle().await;

        network.set_delay(Duration::from_secs(3));
        let start = Instant::now();
        let response = tokio::time::timeout(
            Duration::from_secs(1),
            engine.execute(Policy::Asset, &asset("/static/app.css"), &version),
        )
        .await
        .expect("cache hit must not wait for the network")
        .unwrap();

        assert_eq!(&response.body[..], b"cached");
        assert!(start.elapsed() < Duration::from_secs(1));
        // revalidation was still issued
        assert_eq!(network.calls_for("/static/app.css"), 2);
    }

    #[tokio::test]
    async fn test_freshness_converges() {
        let (network, _db, engine, version) = setup().await;
        let req = asset("/static/app.js");

        network.respond("/static/app.js", 200, "application/javascript", "X");
        let first = engine.execute(Policy::Asset, &req, &version).await.unwrap();
        engine.settle().await;

        network.respond("/static/app.js", 200, "application/javascript", "Y");
        let second = engine.execute(Policy::Asset, &req, &version).await.unwrap();
        engine.settle().await;

        let third = engine.execute(Policy::Asset, &req, &version).await.unwrap();

        assert_eq!(&first.body[..], b"X");
        assert_eq!(&second.body[..], b"X");
        assert_eq!(&third.body[..], b"Y");
    }

    #[tokio::test]
    async fn test_miss_with_network_failure_fails() {
        let (network, db, engine, version) = setup().await;
        network.fail("/static/logo.png");

        let result = engine.execute(Policy::Asset, &asset("/static/logo.png"), &version).await;
        assert!(matches!(result, Err(Error::Network(_))));

        engine.settle().await;
        assert_eq!(db.entry_count(&version).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hit_survives_network_failure() {
        let (network, _db, engine, version) = setup().await;
        network.respond("/static/logo.png", 200, "image/png", "png-bytes");
        engine.execute(Policy::Asset, &asset("/static/logo.png"), &version).await.unwrap();
        engine.settle().await;

        network.set_offline(true);
        let response = engine.execute(Policy::Asset, &asset("/static/logo.png"), &version).await.unwrap();
        engine.settle().await;

        assert_eq!(&response.body[..], b"png-bytes");
        let again = engine.execute(Policy::Asset, &asset("/static/logo.png"), &version).await.unwrap();
        assert_eq!(&again.body[..], b"png-bytes");
    }

    #[tokio::test]
    async fn test_query_string_is_part_of_key() {
        let (network, _db, engine, version) = setup().await;
        network.respond("/static/app.js", 200, "application/javascript", "v1");
        engine.execute(Policy::Asset, &asset("/static/app.js?v=1"), &version).await.unwrap();
        engine.settle().await;

        network.set_offline(true);
        let result = engine.execute(Policy::Asset, &asset("/static/app.js?v=2"), &version).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_requests_last_write_wins() {
        let (network, db, engine, version) = setup().await;
        let req = asset("/static/feed.json");
        network.respond("/static/feed.json", 200, "application/json", "A");

        let (a, b) = tokio::join!(
            engine.execute(Policy::Asset, &req, &version),
            engine.execute(Policy::Asset, &req, &version)
        );
        assert!(a.is_ok() && b.is_ok());
        engine.settle().await;

        assert_eq!(db.entry_count(&version).await.unwrap(), 1);
        assert_eq!(&db.get(&version, &CacheKey::for_request(&req)).await.unwrap().body[..], b"A");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cached_copy_wins_over_instant_revalidation() {
        for round in 0..200 {
            let (network, _db, engine, version) = setup().await;
            let req = asset(&format!("/static/bundle-{round}.js"));
            let path = req.url.path().to_string();

            network.respond(&path, 200, "application/javascript", "X");
            engine.execute(Policy::Asset, &req, &version).await.unwrap();
            engine.settle().await;

            network.respond(&path, 200, "application/javascript", "Y");
            let second = engine.execute(Policy::Asset, &req, &version).await.unwrap();
            engine.settle().await;
            let third = engine.execute(Policy::Asset, &req, &version).await.unwrap();

            assert_eq!(&second.body[..], b"X", "round {round} served the revalidated body");
            assert_eq!(&third.body[..], b"Y", "round {round} did not converge");
        }
    }

    #[tokio::test]
    async fn test_write_after_cutover_is_dropped() {
        let (network, db, engine, version) = setup().await;
        network.respond("/static/app.js", 200, "application/javascript", "late");
        network.set_delay(Duration::from_millis(100));

        let req = asset("/static/app.js");
        let in_flight = engine.execute(Policy::Asset, &req, &version);
        let next = shellcache_core::CacheVersion::new("v2").unwrap();
        let (response, reclaimed) = tokio::join!(in_flight, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            db.activate(&next).await.unwrap()
        });
        engine.settle().await;

        // the old request still completes against stale data
        assert_eq!(&response.unwrap().body[..], b"late");
        assert_eq!(reclaimed, vec![version.clone()]);
        assert!(db.store(&version).await.unwrap().is_none());
        assert_eq!(db.entry_count(&next).await.unwrap(), 0);
    }
}
