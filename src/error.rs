//! Crate-level error types.
//!
//! [`HalalTradeError`] unifies every error source (configuration, WebSocket,
//! HTTP, JSON, local storage) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HalalTradeError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum HalalTradeError {
    /// A configuration value was missing or could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// An HTTP request could not be sent or its body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A filesystem operation on a local store failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// The backend was unreachable and no fresh cached copy existed.
    #[error("offline: {0}")]
    Offline(String),

    /// Login or registration was rejected by the backend.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A local store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}
