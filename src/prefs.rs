//! Durable key-value storage for UI preferences.
//!
//! Values are kept as JSON in a single file so they survive restarts. Reads
//! never fail: a missing key, an unreadable file or a value of the wrong
//! shape all yield the caller's default. Writes are best-effort; a failure is
//! logged and the in-memory value stays updated for the rest of the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Preference keys used by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreferenceKey {
    ActiveTab,
    Theme,
    LiveMode,
    Watchlist,
    TourCompleted,
    AuthToken,
}

impl PreferenceKey {
    /// Returns the storage key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveTab => "halaltrade-tab",
            Self::Theme => "halaltrade-theme",
            Self::LiveMode => "halaltrade-live",
            Self::Watchlist => "halaltrade-watchlist",
            Self::TourCompleted => "stockscanner_tour_completed",
            Self::AuthToken => "token",
        }
    }
}

/// Default tab shown on start.
pub const DEFAULT_TAB: &str = "dashboard";

/// Colour themes offered by the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Ocean,
    Sunset,
    Forest,
}

impl Theme {
    /// Light and dark swap; any other theme goes to light.
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            _ => Theme::Light,
        }
    }
}

/// File-backed preference map.
pub struct PreferenceStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl PreferenceStore {
    /// Opens the store at `path`, loading whatever it already contains.
    ///
    /// A missing file starts an empty store; an unreadable or corrupt file
    /// is logged and also starts empty (it is replaced on the next write).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load preferences, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, serde_json::Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads `key`, returning `default` if it is absent or does not decode as `T`.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(value) = self.lock().get(key).cloned() else {
            return default;
        };

        match serde_json::from_value(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(key, error = %e, "stored preference has unexpected shape, using default");
                default
            }
        }
    }

    /// Returns whether `key` currently holds a value.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Stores `value` under `key` and persists the store.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "failed to encode preference");
                return;
            }
        };

        let mut entries = self.lock();
        entries.insert(key.to_string(), value);
        self.persist(&entries);
    }

    /// Deletes `key` and persists the store.
    pub fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    /// Writes the whole map to disk; failures are logged only.
    fn persist(&self, entries: &BTreeMap<String, serde_json::Value>) {
        let Some(path) = &self.path else {
            return;
        };

        if let Err(e) = save_entries(path, entries) {
            warn!(path = %path.display(), error = %e, "failed to persist preferences");
        }
    }

    // -- Typed accessors for the well-known keys --

    pub fn active_tab(&self) -> String {
        self.read(PreferenceKey::ActiveTab.as_str(), DEFAULT_TAB.to_string())
    }

    pub fn set_active_tab(&self, tab: &str) {
        self.write(PreferenceKey::ActiveTab.as_str(), &tab);
    }

    pub fn theme(&self) -> Theme {
        self.read(PreferenceKey::Theme.as_str(), Theme::default())
    }

    pub fn set_theme(&self, theme: Theme) {
        self.write(PreferenceKey::Theme.as_str(), &theme);
    }

    /// Whether the price stream should connect and reconnect automatically.
    pub fn live_mode(&self) -> bool {
        self.read(PreferenceKey::LiveMode.as_str(), true)
    }

    pub fn set_live_mode(&self, enabled: bool) {
        self.write(PreferenceKey::LiveMode.as_str(), &enabled);
    }

    pub fn tour_completed(&self) -> bool {
        self.read(PreferenceKey::TourCompleted.as_str(), false)
    }

    pub fn set_tour_completed(&self) {
        self.write(PreferenceKey::TourCompleted.as_str(), &true);
    }

    pub fn reset_tour(&self) {
        self.remove(PreferenceKey::TourCompleted.as_str());
    }

    /// The stored bearer token, if the user has logged in.
    pub fn auth_token(&self) -> Option<String> {
        self.read::<Option<String>>(PreferenceKey::AuthToken.as_str(), None)
            .filter(|t| !t.is_empty())
    }

    pub fn set_auth_token(&self, token: &str) {
        self.write(PreferenceKey::AuthToken.as_str(), &token);
    }

    pub fn clear_auth_token(&self) {
        self.remove(PreferenceKey::AuthToken.as_str());
    }
}

fn load_entries(path: &Path) -> crate::Result<BTreeMap<String, serde_json::Value>> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// Writes to a sibling temp file and renames it over the target.
fn save_entries(path: &Path, entries: &BTreeMap<String, serde_json::Value>) -> crate::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
