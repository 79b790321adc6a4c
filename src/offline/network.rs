//! The transport under the offline worker.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::request::{Request, Response};

/// Something that can perform an HTTP exchange.
///
/// An `Err` means the request never produced a response (DNS, refused
/// connection, timeout). Any response, including 4xx/5xx, is `Ok`.
pub trait Network: Send + Sync {
    fn fetch(&self, request: &Request) -> impl Future<Output = crate::Result<Response>> + Send;
}

/// [`Network`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    /// Builds a client that gives up on a request after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Http`](crate::HalalTradeError::Http) if the
    /// TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> crate::Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(method = %request.method, url = %request.url, status = status.as_u16(), "http exchange");
        Ok(Response::new(status, headers, body))
    }
}
