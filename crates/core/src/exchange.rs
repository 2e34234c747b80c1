//! Request and response types exchanged between the host, the proxy and the network.
//!
//! Both types are transport-agnostic: the host builds a [`ProxyRequest`] from
//! whatever it intercepted, and every answer (network, cache or synthesized)
//! comes back as a [`ProxyResponse`].

use bytes::Bytes;
use url::Url;

use crate::Error;

/// Content type of the synthesized offline document.
pub const OFFLINE_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// An intercepted outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Absolute URL, fragment removed, query preserved.
    pub url: Url,
    /// Request headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Explicit top-level page load marker.
    pub navigate: bool,
    /// Client context the request originated from, if any.
    pub client_id: Option<u64>,
}

impl ProxyRequest {
    /// Build a request, normalizing the method and dropping the URL fragment.
    pub fn new(method: &str, mut url: Url) -> Result<Self, Error> {
        let method = method.trim();
        if method.is_empty() || !method.bytes().all(is_token_char) {
            return Err(Error::InvalidInput(format!("invalid method: {method:?}")));
        }
        url.set_fragment(None);

        Ok(Self { method: method.to_ascii_uppercase(), url, headers: Vec::new(), navigate: false, client_id: None })
    }

    /// Build a plain GET request.
    pub fn get(mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method: "GET".into(), url, headers: Vec::new(), navigate: false, client_id: None }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Mark the request as a top-level navigation.
    pub fn navigation(mut self) -> Self {
        self.navigate = true;
        self
    }

    pub fn with_client(mut self, client_id: u64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// A response returned to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ProxyResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, headers: Vec::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Minimal static document served to navigations when neither the
    /// network nor the cached shell is available.
    pub fn offline_placeholder(markup: &str) -> Self {
        Self::new(200, Bytes::copy_from_slice(markup.as_bytes())).with_header("content-type", OFFLINE_CONTENT_TYPE)
    }
}

/// `tchar` from RFC 9110: method names are tokens.
fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
