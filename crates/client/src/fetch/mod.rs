//! Network transport behind the proxy.
//!
//! ### Transport failures vs. HTTP statuses
//! Only transport-level failures (DNS, refused connection, transport timeout,
//! truncated body) are errors. Any status code, including 4xx/5xx, is a
//! successful fetch and flows back as a [`ProxyResponse`].
//!
//! ### Headers
//! Request headers are forwarded as-is except hop-by-hop headers. Response
//! bodies are decoded by reqwest, so encoding/length headers are dropped from
//! the captured response.

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header::HeaderName};
use std::time::{Duration, Instant};

pub use url::{UrlError, resolve};

use shellcache_core::{Error, ProxyRequest, ProxyResponse};

/// Headers never forwarded upstream or captured downstream.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Response headers invalidated by transparent decompression.
const DECODED_BODY_HEADERS: &[&str] = &["content-encoding", "content-length"];

/// The network as seen by the strategy engine.
///
/// `Err` means the fetch failed at the transport level; every HTTP response
/// is `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shellcache/0.1")
    pub user_agent: String,

    /// Transport timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "shellcache/0.1".to_string(), timeout: Duration::from_millis(20000), max_redirects: 5 }
    }
}

/// reqwest-backed [`Network`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn is_skipped(name: &str, skipped: &[&str]) -> bool {
    skipped.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ProxyResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if is_skipped(name, HOP_BY_HOP) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::InvalidInput(format!("invalid header name {name}: {e}")))?;
            builder = builder.header(name, value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                Error::InvalidInput(format!("invalid request: {e}"))
            } else {
                Error::Network(format!("{} {}: {e}", request.method, request.url))
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_skipped(name.as_str(), HOP_BY_HOP) && !is_skipped(name.as_str(), DECODED_BODY_HEADERS))
            .map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response from {}: {e}", request.url)))?;

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(ProxyResponse { status, headers, body })
    }
}
