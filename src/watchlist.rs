//! The user's followed symbols.
//!
//! Independent of the live security list: a symbol can be watched even if
//! the current scan does not contain it. Every mutation is written through to
//! the [`PreferenceStore`] before returning.

use std::sync::Arc;

use tracing::debug;

use crate::prefs::{PreferenceKey, PreferenceStore};

/// Ordered set of watched symbols (insertion order kept for display).
pub struct Watchlist {
    store: Arc<PreferenceStore>,
    symbols: Vec<String>,
}

impl Watchlist {
    /// Loads the watchlist persisted in `store`.
    ///
    /// Duplicate entries in the stored list are collapsed.
    pub fn load(store: Arc<PreferenceStore>) -> Self {
        let stored: Vec<String> = store.read(PreferenceKey::Watchlist.as_str(), Vec::new());

        let mut symbols: Vec<String> = Vec::with_capacity(stored.len());
        for symbol in stored {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        Self { store, symbols }
    }

    /// Adds `symbol` if absent, removes it if present.
    ///
    /// Returns `true` if the symbol is watched after the call.
    pub fn toggle(&mut self, symbol: &str) -> bool {
        let watched = if let Some(pos) = self.position(symbol) {
            self.symbols.remove(pos);
            false
        } else {
            self.symbols.push(symbol.to_string());
            true
        };

        debug!(symbol, watched, "toggled watchlist entry");
        self.persist();
        watched
    }

    /// Returns whether `symbol` is watched.
    pub fn is_watched(&self, symbol: &str) -> bool {
        self.position(symbol).is_some()
    }

    /// Stops watching `symbol`; returns `false` if it was not watched.
    pub fn remove(&mut self, symbol: &str) -> bool {
        match self.position(symbol) {
            Some(pos) => {
                self.symbols.remove(pos);
                self.persist();
                true
            }
            None => false,
        }
    }

    /// Stops watching everything.
    pub fn clear(&mut self) {
        self.symbols.clear();
        self.persist();
    }

    /// Number of watched symbols.
    pub fn count(&self) -> usize {
        self.symbols.len()
    }

    /// Watched symbols in the order they were added.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    fn position(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    fn persist(&self) {
        self.store
            .write(PreferenceKey::Watchlist.as_str(), &self.symbols);
    }
}
