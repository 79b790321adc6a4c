//! Scanner session: one live view of the market.
//!
//! Owns the [`MarketBook`], drains stream events into it and keeps track of
//! connection status and the user-facing error banner.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::offline::Network;
use crate::prefs::PreferenceStore;
use crate::stream::{ConnectionState, MarketBook, PriceStream, StreamEvent};
use crate::watchlist::Watchlist;

/// Shown when a scan cannot reach the backend.
pub const SCAN_ERROR_MESSAGE: &str = "Connection Failed: Is the backend server running?";

pub struct ScannerSession<N> {
    api: Arc<ApiClient<N>>,
    stream: PriceStream,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    prefs: Arc<PreferenceStore>,
    book: MarketBook,
    watchlist: Watchlist,
    status: ConnectionState,
    error: Option<String>,
}

impl<N: Network> ScannerSession<N> {
    pub fn new(
        api: Arc<ApiClient<N>>,
        stream: PriceStream,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        prefs: Arc<PreferenceStore>,
    ) -> Self {
        let watchlist = Watchlist::load(prefs.clone());
        Self {
            api,
            stream,
            events,
            prefs,
            book: MarketBook::new(),
            watchlist,
            status: ConnectionState::Disconnected,
            error: None,
        }
    }

    /// Runs a scan and replaces the list with its result.
    ///
    /// Clears the selection first. On success the stream is connected if it
    /// is not already; on failure the error banner is set and the current
    /// list is kept.
    ///
    /// # Errors
    ///
    /// Returns whatever [`ApiClient::scan`] returned.
    pub async fn scan(&mut self) -> crate::Result<usize> {
        self.error = None;
        self.book.clear_selection();

        match self.api.scan().await {
            Ok(securities) => {
                self.book.replace_all(securities);
                if self.stream.state() != ConnectionState::Connected {
                    self.stream.connect();
                }
                Ok(self.book.len())
            }
            Err(e) => {
                warn!(error = %e, "scan failed");
                self.error = Some(SCAN_ERROR_MESSAGE.to_string());
                Err(e)
            }
        }
    }

    /// Applies one stream event to the session state.
    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Status(status) => {
                self.status = status;
                if status.is_active() {
                    self.error = None;
                }
            }
            StreamEvent::Snapshot(securities) => self.book.replace_all(securities),
            StreamEvent::Prices { timestamp, ticks } => {
                let applied = self.book.apply_ticks(timestamp, &ticks);
                debug!(applied, total = ticks.len(), "applied price ticks");
            }
            StreamEvent::Error(message) => self.error = Some(message),
        }
    }

    /// Waits for the next stream event, applies it and returns it.
    ///
    /// Returns `None` once the stream driver has shut down.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.events.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    /// Persists the live-mode flag and applies it to the stream.
    ///
    /// Turning live mode on also connects a disconnected stream.
    pub fn set_live_mode(&mut self, enabled: bool) {
        self.prefs.set_live_mode(enabled);
        self.stream.set_live_mode(enabled);
        if enabled && self.stream.state() == ConnectionState::Disconnected {
            self.stream.connect();
        }
    }

    pub fn live_mode(&self) -> bool {
        self.prefs.live_mode()
    }

    pub fn connect(&self) {
        self.stream.connect();
    }

    pub fn disconnect(&self) {
        self.stream.disconnect();
    }

    pub fn select(&mut self, symbol: &str) -> bool {
        self.book.select(symbol)
    }

    pub fn clear_selection(&mut self) {
        self.book.clear_selection();
    }

    pub fn book(&self) -> &MarketBook {
        &self.book
    }

    pub fn status(&self) -> ConnectionState {
        self.status
    }

    /// Current user-facing error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    pub fn watchlist_mut(&mut self) -> &mut Watchlist {
        &mut self.watchlist
    }

    pub fn api(&self) -> &ApiClient<N> {
        &self.api
    }

    /// Closes the stream and stops its driver.
    pub async fn shutdown(self) {
        self.stream.shutdown().await;
    }
}
