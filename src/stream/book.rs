//! The live security list and the user's selection.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{PriceTick, Security};

/// In-memory list of securities kept current by the price stream.
///
/// Order is the order of the last snapshot. Ticks only ever touch `price`,
/// `price_change` and `price_change_percent`; they never add or remove
/// entries.
#[derive(Debug, Default, Clone)]
pub struct MarketBook {
    securities: Vec<Security>,
    index: HashMap<String, usize>,
    selected: Option<Security>,
    update_count: u64,
    last_update: Option<String>,
}

impl MarketBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn securities(&self) -> &[Security] {
        &self.securities
    }

    pub fn get(&self, symbol: &str) -> Option<&Security> {
        self.index.get(symbol).map(|&i| &self.securities[i])
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    /// Replaces the whole list. The selection is left alone.
    ///
    /// Later duplicates of a symbol are dropped with a warning.
    pub fn replace_all(&mut self, securities: Vec<Security>) {
        self.securities.clear();
        self.index.clear();

        for mut security in securities {
            if self.index.contains_key(&security.symbol) {
                warn!(symbol = %security.symbol, "dropping duplicate symbol in snapshot");
                continue;
            }
            security.trim_history();
            self.index
                .insert(security.symbol.clone(), self.securities.len());
            self.securities.push(security);
        }

        debug!(count = self.securities.len(), "replaced security list");
    }

    /// Merges one `price_update` batch; returns how many ticks matched.
    ///
    /// Every batch counts as one update even if no symbol matched. Ticks for
    /// unknown symbols are dropped from the list. The selected security only
    /// has its `price` refreshed, even if a later snapshot no longer lists it.
    pub fn apply_ticks(&mut self, timestamp: Option<String>, ticks: &[PriceTick]) -> usize {
        if timestamp.is_some() {
            self.last_update = timestamp;
        }
        self.update_count += 1;

        let mut applied = 0;
        for tick in ticks {
            // The selection may outlive its symbol's place in the list.
            if let Some(selected) = self.selected.as_mut()
                && selected.symbol == tick.symbol
            {
                selected.price = tick.price;
            }

            let Some(&i) = self.index.get(&tick.symbol) else {
                continue;
            };
            let security = &mut self.securities[i];
            security.price = tick.price;
            security.price_change = tick.change;
            security.price_change_percent = tick.change_percent;
            applied += 1;
        }

        applied
    }

    /// Selects `symbol`; returns `false` if it is not in the list.
    pub fn select(&mut self, symbol: &str) -> bool {
        match self.get(symbol) {
            Some(security) => {
                self.selected = Some(security.clone());
                true
            }
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&Security> {
        self.selected.as_ref()
    }

    /// Number of `price_update` batches applied since start.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Timestamp of the most recent batch, as sent by the server.
    pub fn last_update(&self) -> Option<&str> {
        self.last_update.as_deref()
    }
}
