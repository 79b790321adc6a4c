//! Application configuration loaded from environment variables.
//!
//! Every variable is optional; empty values are treated as unset.
//! - `HALALTRADE_API_URL` - backend base URL (default `http://localhost:8000`)
//! - `HALALTRADE_WS_URL` - price stream endpoint (default `ws://localhost:8000/ws/prices`)
//! - `HALALTRADE_DATA_DIR` - directory for preferences and offline caches
//! - `HALALTRADE_LIVE_MODE` - `true`/`false`, overrides the persisted live-mode flag
//! - `HALALTRADE_RECONNECT_DELAY_MS` - delay before a stream reconnect attempt
//! - `HALALTRADE_REQUEST_TIMEOUT_SECS` - per-request HTTP timeout

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default backend base URL.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default price stream endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "ws://localhost:8000/ws/prices";

/// Default directory for local stores, relative to the working directory.
const DEFAULT_DATA_DIR: &str = ".halaltrade";

/// Delay between a stream close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Upper bound on a single HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub stream: StreamConfig,
    pub storage: StorageConfig,
}

/// Backend endpoints and HTTP settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_url: String,
    pub websocket_url: String,
    pub request_timeout: Duration,
}

/// Price stream settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `None` means "use the persisted preference".
    pub live_mode: Option<bool>,
    pub reconnect_delay: Duration,
}

/// Where the local stores live.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// Path of the preference file.
    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join("preferences.json")
    }

    /// Directory holding the offline worker's named caches.
    pub fn caches_dir(&self) -> PathBuf {
        self.data_dir.join("caches")
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`HalalTradeError::Config`](crate::HalalTradeError::Config) if a
/// numeric or boolean variable is set but cannot be parsed.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let api_url = non_empty_var("HALALTRADE_API_URL")
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
        .trim_end_matches('/')
        .to_string();
    let websocket_url =
        non_empty_var("HALALTRADE_WS_URL").unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let data_dir = non_empty_var("HALALTRADE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    let live_mode = parsed_var::<bool>("HALALTRADE_LIVE_MODE")?;
    let reconnect_delay = parsed_var::<u64>("HALALTRADE_RECONNECT_DELAY_MS")?
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_RECONNECT_DELAY);
    let request_timeout = match parsed_var::<u64>("HALALTRADE_REQUEST_TIMEOUT_SECS")? {
        Some(0) => {
            return Err(crate::HalalTradeError::Config(
                "HALALTRADE_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_REQUEST_TIMEOUT,
    };

    Ok(AppConfig {
        backend: BackendConfig {
            api_url,
            websocket_url,
            request_timeout,
        },
        stream: StreamConfig {
            live_mode,
            reconnect_delay,
        },
        storage: StorageConfig { data_dir },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses a non-empty environment variable, failing loudly on bad input.
fn parsed_var<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            crate::HalalTradeError::Config(format!("{name} has an invalid value: {raw:?}"))
        }),
        None => Ok(None),
    }
}
