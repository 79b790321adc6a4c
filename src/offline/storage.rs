//! Named response caches, optionally mirrored to disk.
//!
//! Each named cache is one JSON file `<root>/<name>.json` mapping request URL
//! to a stored response. Bodies are base64 so binary assets survive the trip.
//! Disk errors never fail a request: they are logged and the in-memory copy
//! stays authoritative for the rest of the process.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use base64::prelude::*;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::request::Response;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl From<&Response> for StoredResponse {
    fn from(response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Self {
            status: response.status.as_u16(),
            headers,
            body: BASE64_STANDARD.encode(&response.body),
        }
    }
}

impl StoredResponse {
    fn to_response(&self) -> crate::Result<Response> {
        let status = StatusCode::from_u16(self.status).map_err(|e| {
            crate::HalalTradeError::Storage(format!("invalid stored status {}: {e}", self.status))
        })?;
        let body = BASE64_STANDARD.decode(&self.body).map_err(|e| {
            crate::HalalTradeError::Storage(format!("invalid stored body: {e}"))
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        Ok(Response::new(status, headers, body))
    }
}

type NamedCache = BTreeMap<String, StoredResponse>;

/// A set of named caches keyed by request URL.
pub struct CacheStorage {
    root: Option<PathBuf>,
    caches: Mutex<HashMap<String, NamedCache>>,
}

impl CacheStorage {
    /// Opens the caches persisted under `root`.
    ///
    /// Files that cannot be read or parsed are logged and skipped.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let caches = match load_all(&root) {
            Ok(caches) => caches,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "failed to load offline caches");
                HashMap::new()
            }
        };

        debug!(root = %root.display(), caches = caches.len(), "opened offline cache storage");
        Self {
            root: Some(root),
            caches: Mutex::new(caches),
        }
    }

    /// Storage that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            root: None,
            caches: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NamedCache>> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Names of all caches, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has(&self, cache: &str) -> bool {
        self.lock().contains_key(cache)
    }

    /// Number of entries in `cache` (zero if it does not exist).
    pub fn len(&self, cache: &str) -> usize {
        self.lock().get(cache).map_or(0, BTreeMap::len)
    }

    /// Looks `key` up in one cache.
    pub fn get(&self, cache: &str, key: &str) -> Option<Response> {
        let stored = self.lock().get(cache)?.get(key)?.clone();
        decode(&stored, key)
    }

    /// Looks `key` up in every cache, in name order.
    pub fn get_any(&self, key: &str) -> Option<Response> {
        let caches = self.lock();
        let mut names: Vec<&String> = caches.keys().collect();
        names.sort();

        names
            .into_iter()
            .find_map(|name| caches.get(name)?.get(key).cloned())
            .and_then(|stored| decode(&stored, key))
    }

    /// Stores `response` under `key`, creating the cache if needed.
    pub fn put(&self, cache: &str, key: &str, response: &Response) {
        let mut caches = self.lock();
        let entries = caches.entry(cache.to_string()).or_default();
        entries.insert(key.to_string(), StoredResponse::from(response));
        self.persist(cache, entries);
    }

    /// Removes one entry; returns whether it existed.
    pub fn delete_entry(&self, cache: &str, key: &str) -> bool {
        let mut caches = self.lock();
        let Some(entries) = caches.get_mut(cache) else {
            return false;
        };

        let removed = entries.remove(key).is_some();
        if removed {
            self.persist(cache, entries);
        }
        removed
    }

    /// Drops a whole named cache; returns whether it existed.
    pub fn delete(&self, cache: &str) -> bool {
        let removed = self.lock().remove(cache).is_some();
        if removed && let Some(root) = &self.root {
            let path = cache_path(root, cache);
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "failed to delete cache file");
            }
        }
        removed
    }

    fn persist(&self, cache: &str, entries: &NamedCache) {
        let Some(root) = &self.root else {
            return;
        };

        if let Err(e) = save(root, cache, entries) {
            warn!(cache, error = %e, "failed to persist offline cache");
        }
    }
}

fn decode(stored: &StoredResponse, key: &str) -> Option<Response> {
    match stored.to_response() {
        Ok(response) => Some(response),
        Err(e) => {
            warn!(key, error = %e, "dropping unreadable cached response");
            None
        }
    }
}

fn cache_path(root: &Path, cache: &str) -> PathBuf {
    root.join(format!("{cache}.json"))
}

fn load_all(root: &Path) -> crate::Result<HashMap<String, NamedCache>> {
    let mut caches = HashMap::new();

    let dir = match std::fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(caches),
        Err(e) => return Err(e.into()),
    };

    for entry in dir {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        match std::fs::read(&path)
            .map_err(crate::HalalTradeError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<NamedCache>(&bytes)?))
        {
            Ok(entries) => {
                caches.insert(name.to_string(), entries);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt cache file"),
        }
    }

    Ok(caches)
}

fn save(root: &Path, cache: &str, entries: &NamedCache) -> crate::Result<()> {
    std::fs::create_dir_all(root)?;

    let path = cache_path(root, cache);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}
