//! Request/response values passed through the offline worker.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::CACHED_TIME_HEADER;

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// A top-level document load (the app shell).
    Navigate,
    /// Any programmatic fetch.
    Fetch,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub mode: RequestMode,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::Fetch,
        }
    }

    /// A programmatic `GET`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A document navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Adds a header, skipping values that are not valid header text.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Key under which a response to this request is cached.
    pub fn cache_key(&self) -> &str {
        self.url.as_str()
    }

    /// Whether this request opens a streaming connection (WebSocket).
    pub fn is_upgrade(&self) -> bool {
        let scheme_is_ws = matches!(self.url.scheme(), "ws" | "wss");
        let upgrade_header = self
            .headers
            .get(reqwest::header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

        scheme_is_ws || upgrade_header || self.url.path().contains("/ws/")
    }
}

/// An HTTP response, either live from the network or replayed from a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// A JSON response with the given status.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Self::new(status, headers, value.to_string().into_bytes())
    }

    /// A plain-text response with the given status.
    pub fn text(status: StatusCode, body: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain"),
        );
        Self::new(status, headers, body.as_bytes().to_vec())
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// When the worker stored this response, in epoch millis.
    pub fn cached_at(&self) -> Option<u64> {
        self.header(CACHED_TIME_HEADER)?.parse().ok()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Json`](crate::HalalTradeError::Json) if the
    /// body is not valid JSON for `T`.
    pub fn json_body<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// How the worker treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Non-GET or streaming upgrade; never intercepted.
    Bypass,
    /// Allow-listed API read: network first, API cache fallback.
    CacheableApi,
    /// Any other API read; not intercepted.
    UncachedApi,
    /// Static asset or navigation: network first, asset cache fallback.
    Static,
}

/// Classifies `request` against the API allow-list.
pub fn classify(request: &Request, cacheable_prefixes: &[&str]) -> RequestClass {
    if request.method != Method::GET || request.is_upgrade() {
        return RequestClass::Bypass;
    }

    let path = request.url.path();
    if cacheable_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        RequestClass::CacheableApi
    } else if path.starts_with("/api/") {
        RequestClass::UncachedApi
    } else {
        RequestClass::Static
    }
}
