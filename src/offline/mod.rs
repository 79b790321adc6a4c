//! Offline cache worker.
//!
//! Sits between the API client and the network. Once active it serves
//! allow-listed API reads network-first with a five minute cache fallback,
//! keeps the app shell available offline, purges caches from older
//! generations and turns push messages into notifications.
//!
//! Only `GET` requests are ever intercepted; writes and streaming upgrades
//! always go straight to the network.

pub mod network;
pub mod notification;
pub mod request;
pub mod storage;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::Url;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;

pub use network::{HttpNetwork, Network};
pub use notification::{ClickOutcome, ClientWindow, Notification, notification_from_push, resolve_click};
pub use request::{Request, RequestClass, RequestMode, Response, classify};
pub use storage::CacheStorage;

/// Static asset cache of the current generation.
pub const STATIC_CACHE: &str = "halaltrade-v2";
/// API response cache of the current generation.
pub const API_CACHE: &str = "halaltrade-api-v1";

/// App shell fetched during install.
pub const STATIC_ASSETS: [&str; 3] = ["/", "/index.html", "/manifest.json"];

/// API path prefixes whose `GET` responses are kept for offline use.
pub const CACHEABLE_API_PREFIXES: [&str; 5] = [
    "/api/stocks/list",
    "/api/dashboard",
    "/api/portfolio",
    "/api/alerts",
    "/api/stocks/history",
];

/// How long a cached API response may be served while offline.
pub const API_CACHE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Synthetic header recording when an API response was stored (epoch millis).
pub const CACHED_TIME_HEADER: &str = "sw-cached-time";

/// Where the worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Created; not intercepting.
    Parsed,
    /// Shell precached, waiting to take over.
    Installed,
    /// Intercepting requests.
    Active,
}

/// Result of offering a request to the worker.
#[derive(Debug)]
pub enum Interception {
    /// The worker does not handle this request; send it to the network.
    PassThrough,
    /// The worker produced the response.
    Respond(Response),
}

/// Control message posted by the application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    ClearApiCache,
    SkipWaiting,
    #[serde(other)]
    Unknown,
}

/// The offline cache worker.
pub struct OfflineCacheWorker<N> {
    network: N,
    storage: CacheStorage,
    clock: Arc<dyn Clock>,
    origin: Url,
    phase: Mutex<WorkerPhase>,
}

impl<N: Network> OfflineCacheWorker<N> {
    /// Creates a worker for the application served at `origin`.
    pub fn new(network: N, storage: CacheStorage, clock: Arc<dyn Clock>, origin: Url) -> Self {
        Self {
            network,
            storage,
            clock,
            origin,
            phase: Mutex::new(WorkerPhase::Parsed),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
    }

    /// Backing cache storage.
    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    /// Precaches the app shell, then takes over immediately.
    ///
    /// # Errors
    ///
    /// Fails if any shell asset cannot be fetched or answers with a non-2xx
    /// status; nothing is stored in that case and the worker stays
    /// [`WorkerPhase::Parsed`].
    pub async fn install(&self) -> crate::Result<()> {
        let mut fetched = Vec::with_capacity(STATIC_ASSETS.len());

        for path in STATIC_ASSETS {
            let url = self.origin.join(path).map_err(|e| {
                crate::HalalTradeError::Config(format!("invalid origin {}: {e}", self.origin))
            })?;
            let request = Request::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.is_success() {
                return Err(crate::HalalTradeError::Status {
                    status: response.status.as_u16(),
                    url: request.url.to_string(),
                });
            }
            fetched.push((request, response));
        }

        for (request, response) in &fetched {
            self.storage.put(STATIC_CACHE, request.cache_key(), response);
        }

        info!(assets = fetched.len(), "cached static assets");
        self.set_phase(WorkerPhase::Installed);
        self.skip_waiting();
        Ok(())
    }

    /// Activates an installed worker without waiting.
    pub fn skip_waiting(&self) {
        if self.phase() == WorkerPhase::Installed {
            self.activate();
        }
    }

    /// Purges caches from other generations and starts intercepting.
    pub fn activate(&self) {
        for name in self.storage.keys() {
            if name != STATIC_CACHE && name != API_CACHE {
                self.storage.delete(&name);
                info!(cache = %name, "deleted outdated cache");
            }
        }
        self.set_phase(WorkerPhase::Active);
    }

    /// Applies a control message from the application.
    pub fn on_message(&self, message: &ControlMessage) {
        match message {
            ControlMessage::ClearApiCache => {
                self.storage.delete(API_CACHE);
                info!("API cache cleared");
            }
            ControlMessage::SkipWaiting => self.skip_waiting(),
            ControlMessage::Unknown => debug!("ignoring unknown control message"),
        }
    }

    /// Parses and applies a JSON control message.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Json`](crate::HalalTradeError::Json) if the
    /// message is not an object with a string `type`.
    pub fn on_message_json(&self, raw: &str) -> crate::Result<()> {
        let message: ControlMessage = serde_json::from_str(raw)?;
        self.on_message(&message);
        Ok(())
    }

    /// Builds the notification for a push message, if it carries data.
    pub fn on_push(&self, data: Option<&[u8]>) -> Option<Notification> {
        notification_from_push(data)
    }

    /// Decides what a notification click does given the open windows.
    pub fn on_notification_click(
        &self,
        notification: &Notification,
        action: Option<&str>,
        windows: &[ClientWindow],
    ) -> ClickOutcome {
        let origin = self.origin.origin().ascii_serialization();
        resolve_click(notification, action, windows, &origin)
    }

    /// Offers `request` to the worker.
    pub async fn handle(&self, request: &Request) -> Interception {
        if self.phase() != WorkerPhase::Active {
            return Interception::PassThrough;
        }

        match classify(request, &CACHEABLE_API_PREFIXES) {
            RequestClass::Bypass | RequestClass::UncachedApi => Interception::PassThrough,
            RequestClass::CacheableApi => Interception::Respond(self.handle_api(request).await),
            RequestClass::Static => Interception::Respond(self.handle_static(request).await),
        }
    }

    /// Sends `request` through the worker, falling back to the plain network
    /// for requests it does not intercept.
    ///
    /// # Errors
    ///
    /// Only pass-through requests can fail; intercepted requests always
    /// produce a response (possibly a 503).
    pub async fn fetch(&self, request: &Request) -> crate::Result<Response> {
        match self.handle(request).await {
            Interception::Respond(response) => Ok(response),
            Interception::PassThrough => self.network.fetch(request).await,
        }
    }

    async fn handle_api(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store_api_response(request, &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed, trying cache");
                match self.cached_api_response(request) {
                    Some(cached) => {
                        info!(url = %request.url, "serving from cache");
                        cached
                    }
                    None => offline_api_response(),
                }
            }
        }
    }

    fn store_api_response(&self, request: &Request, response: &Response) {
        let mut stamped = response.clone();
        let now = self.clock.now_millis().to_string();
        match HeaderValue::from_str(&now) {
            Ok(value) => {
                stamped.headers.insert(CACHED_TIME_HEADER, value);
                self.storage.put(API_CACHE, request.cache_key(), &stamped);
            }
            Err(e) => warn!(error = %e, "could not stamp cached response"),
        }
    }

    fn cached_api_response(&self, request: &Request) -> Option<Response> {
        let key = request.cache_key();
        let cached = self.storage.get(API_CACHE, key)?;

        if let Some(cached_at) = cached.cached_at() {
            let age = self.clock.now_millis().saturating_sub(cached_at);
            if age > API_CACHE_DURATION.as_millis() as u64 {
                debug!(key, age, "cached API response expired");
                self.storage.delete_entry(API_CACHE, key);
                return None;
            }
        }

        Some(cached)
    }

    async fn handle_static(&self, request: &Request) -> Response {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.storage.put(STATIC_CACHE, request.cache_key(), &response);
                }
                response
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network failed, trying static cache");
                if let Some(cached) = self.storage.get_any(request.cache_key()) {
                    return cached;
                }
                if request.mode == RequestMode::Navigate
                    && let Ok(root) = request.url.join("/")
                    && let Some(shell) = self.storage.get_any(root.as_str())
                {
                    return shell;
                }
                Response::text(StatusCode::SERVICE_UNAVAILABLE, "Offline")
            }
        }
    }
}

/// The 503 returned for an API read with no usable cached copy.
pub fn offline_api_response() -> Response {
    Response::json(
        StatusCode::SERVICE_UNAVAILABLE,
        &serde_json::json!({ "error": "Offline", "message": "No cached data available" }),
    )
}
