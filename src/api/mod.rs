//! HTTP client for the HalalTrade backend.
//!
//! Every request goes through the [`OfflineCacheWorker`], so allow-listed
//! reads keep working from the offline cache when the backend is down.
//! Reads are additionally memoised in a [`TtlCache`] keyed by path and
//! sorted query, so repeated reads inside the TTL never reach the network.
//!
//! - [`endpoints`] - Paths, methods and cache lifetimes
//! - [`sequencer`] - Stale-response guard
//! - [`auth`] - Login, registration and the bearer token

mod auth;
pub mod endpoints;
pub mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{MEDIUM_TTL, TtlCache};
use crate::clock::Clock;
use crate::models::{
    Alert, OfflineBody, PortfolioSummary, Security, Transaction, UniverseInfo,
};
use crate::offline::{Network, OfflineCacheWorker, Request, Response};
use crate::prefs::PreferenceStore;

pub use endpoints::{Endpoint, PORTFOLIO_PREFIX};
pub use sequencer::{RequestSequencer, Ticket};

const PERFORMANCE_SLOT: &str = "dashboard-performance";
const HISTORY_SLOT: &str = "stock-history";

/// A decoded response and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    /// `true` if served from the in-memory cache without a request.
    pub from_cache: bool,
}

/// Options for [`ApiClient::cached_get`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub ttl: Duration,
    /// Skip the cache lookup (the fresh response is still stored).
    pub force_refresh: bool,
    /// Overrides the key derived from path and query.
    pub cache_key: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            ttl: MEDIUM_TTL,
            force_refresh: false,
            cache_key: None,
        }
    }
}

impl FetchOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }
}

/// Client for the backend REST API.
pub struct ApiClient<N> {
    base_url: String,
    worker: Arc<OfflineCacheWorker<N>>,
    cache: Arc<TtlCache<Value>>,
    prefs: Arc<PreferenceStore>,
    sequencer: RequestSequencer,
}

impl<N: Network> ApiClient<N> {
    /// Creates a client for the API at `base_url` (no trailing slash).
    pub fn new(
        base_url: impl Into<String>,
        worker: Arc<OfflineCacheWorker<N>>,
        clock: Arc<dyn Clock>,
        prefs: Arc<PreferenceStore>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker,
            cache: Arc::new(TtlCache::new(clock)),
            prefs,
            sequencer: RequestSequencer::new(),
        }
    }

    /// The in-memory response cache.
    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn worker(&self) -> &OfflineCacheWorker<N> {
        &self.worker
    }

    /// Absolute URL for `path` with `query` appended.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Config`](crate::HalalTradeError::Config) if
    /// the base URL is not a valid URL.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> crate::Result<Url> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url)).map_err(|e| {
            crate::HalalTradeError::Config(format!("invalid API URL {}: {e}", self.base_url))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Builds a request, attaching the stored bearer token if there is one.
    fn request(&self, method: Method, url: Url) -> Request {
        let request = Request::new(method, url);
        match self.prefs.auth_token() {
            Some(token) => request.with_header(AUTHORIZATION, &format!("Bearer {token}")),
            None => request,
        }
    }

    /// Fetches `path` and decodes the JSON body, going to the network only
    /// if the cache has no live entry under the request's key.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Offline`](crate::HalalTradeError::Offline)
    /// when the backend is unreachable and nothing usable is cached,
    /// [`HalalTradeError::Status`](crate::HalalTradeError::Status) for other
    /// non-2xx responses, and a JSON error if the body does not decode.
    pub async fn cached_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        options: FetchOptions,
    ) -> crate::Result<Fetched<T>> {
        let key = options
            .cache_key
            .unwrap_or_else(|| crate::cache::cache_key(path, query));

        if !options.force_refresh
            && let Some(value) = self.cache.get(&key)
        {
            debug!(key = %key, "served from memory cache");
            return Ok(Fetched {
                data: serde_json::from_value(value)?,
                from_cache: true,
            });
        }

        let url = self.url(path, query)?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let value: Value = response.json_body()?;
        let data = serde_json::from_value(value.clone())?;
        self.cache.set(key, value, options.ttl);

        Ok(Fetched {
            data,
            from_cache: false,
        })
    }

    /// Reads a cacheable endpoint using its own TTL.
    async fn read<T: DeserializeOwned>(&self, endpoint: Endpoint<'_>) -> crate::Result<Fetched<T>> {
        let options = FetchOptions::with_ttl(endpoint.cache_ttl().unwrap_or(MEDIUM_TTL));
        self.cached_get(&endpoint.path(), &endpoint.query(), options)
            .await
    }

    /// Sends `request` through the worker and rejects non-2xx responses.
    async fn send(&self, request: Request) -> crate::Result<Response> {
        let response = self.worker.fetch(&request).await?;
        ensure_success(response, &request.url)
    }

    pub async fn universe_info(&self) -> crate::Result<Fetched<UniverseInfo>> {
        self.read(Endpoint::StocksList).await
    }

    pub async fn dashboard(&self) -> crate::Result<Fetched<Value>> {
        self.read(Endpoint::Dashboard).await
    }

    /// Performance series for `period`; `Ok(None)` if a newer request for
    /// another period started before this one finished.
    pub async fn dashboard_performance(
        &self,
        period: &str,
    ) -> crate::Result<Option<Fetched<Value>>> {
        let ticket = self.sequencer.begin(PERFORMANCE_SLOT);
        let fetched = self
            .read(Endpoint::DashboardPerformance { period })
            .await?;
        Ok(self.keep_if_current(&ticket, fetched))
    }

    pub async fn portfolio(&self) -> crate::Result<Fetched<PortfolioSummary>> {
        self.read(Endpoint::Portfolio).await
    }

    pub async fn transactions(&self) -> crate::Result<Fetched<Vec<Transaction>>> {
        self.read(Endpoint::Transactions).await
    }

    /// Deletes a transaction and drops every cached portfolio read.
    pub async fn delete_transaction(&self, id: &str) -> crate::Result<()> {
        let endpoint = Endpoint::DeleteTransaction { id };
        let url = self.url(&endpoint.path(), &[])?;
        self.send(self.request(endpoint.method(), url)).await?;

        let dropped = self.cache.invalidate_prefix(PORTFOLIO_PREFIX);
        info!(id, dropped, "deleted transaction");
        Ok(())
    }

    /// Price history for charting; `Ok(None)` if superseded by a newer
    /// history request.
    pub async fn stock_history(
        &self,
        symbol: &str,
        range: &str,
    ) -> crate::Result<Option<Fetched<Value>>> {
        let ticket = self.sequencer.begin(HISTORY_SLOT);
        let fetched = self.read(Endpoint::StockHistory { symbol, range }).await?;
        Ok(self.keep_if_current(&ticket, fetched))
    }

    pub async fn alerts(&self) -> crate::Result<Fetched<Vec<Alert>>> {
        self.read(Endpoint::Alerts).await
    }

    pub async fn analytics_performance(&self) -> crate::Result<Fetched<Value>> {
        self.read(Endpoint::AnalyticsPerformance).await
    }

    pub async fn analytics_risk(&self) -> crate::Result<Fetched<Value>> {
        self.read(Endpoint::AnalyticsRisk).await
    }

    pub async fn market_overview(&self) -> crate::Result<Fetched<Value>> {
        self.read(Endpoint::MarketOverview).await
    }

    /// Runs a fresh scan. Never cached.
    pub async fn scan(&self) -> crate::Result<Vec<Security>> {
        let url = self.url(&Endpoint::Scan.path(), &[])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let securities: Vec<Security> = response.json_body()?;
        info!(count = securities.len(), "scan completed");
        Ok(securities)
    }

    fn keep_if_current<T>(&self, ticket: &Ticket, fetched: Fetched<T>) -> Option<Fetched<T>> {
        if self.sequencer.is_current(ticket) {
            Some(fetched)
        } else {
            debug!("dropping superseded response");
            None
        }
    }
}

/// Passes 2xx responses through and turns everything else into an error.
fn ensure_success(response: Response, url: &Url) -> crate::Result<Response> {
    if response.is_success() {
        return Ok(response);
    }

    if response.status == StatusCode::SERVICE_UNAVAILABLE
        && let Ok(body) = response.json_body::<OfflineBody>()
        && body.error == "Offline"
    {
        return Err(crate::HalalTradeError::Offline(body.message));
    }

    Err(crate::HalalTradeError::Status {
        status: response.status.as_u16(),
        url: url.to_string(),
    })
}
