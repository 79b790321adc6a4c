//! Tradable instruments as seen by the client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of points kept in a security's sparkline history.
pub const MAX_PRICE_HISTORY: usize = 60;

/// One tradable instrument from a scan or an `initial` stream payload.
///
/// Only `price`, `price_change` and `price_change_percent` are ever mutated
/// by live ticks; everything else is owned by the backend and replaced on the
/// next full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_percent: Option<Decimal>,
    #[serde(default)]
    pub price_history: Vec<Decimal>,
    #[serde(default)]
    pub shariah_status: ShariahStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technicals: Option<Technicals>,
    /// Backend fields this layer does not interpret (analysis blocks,
    /// composite scores, ...), kept so nothing is lost on re-serialization.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Security {
    /// Creates a security with only the identifying fields and a price.
    pub fn new(symbol: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector: None,
            price,
            price_change: None,
            price_change_percent: None,
            price_history: Vec::new(),
            shariah_status: ShariahStatus::default(),
            technicals: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Drops the oldest history points beyond [`MAX_PRICE_HISTORY`].
    pub fn trim_history(&mut self) {
        let len = self.price_history.len();
        if len > MAX_PRICE_HISTORY {
            self.price_history.drain(..len - MAX_PRICE_HISTORY);
        }
    }
}

/// Shariah compliance classification assigned by the backend.
///
/// Labels this client does not know (e.g. `"Likely Halal"`) are treated as
/// [`ShariahStatus::Pending`]: not yet confirmed either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum ShariahStatus {
    Halal,
    #[serde(rename = "Non-Halal")]
    NonHalal,
    #[default]
    Pending,
}

impl ShariahStatus {
    /// Returns the wire label used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShariahStatus::Halal => "Halal",
            ShariahStatus::NonHalal => "Non-Halal",
            ShariahStatus::Pending => "Pending",
        }
    }
}

impl From<String> for ShariahStatus {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Halal" => ShariahStatus::Halal,
            "Non-Halal" => ShariahStatus::NonHalal,
            _ => ShariahStatus::Pending,
        }
    }
}

/// Technical indicators computed by the backend during a full scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technicals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sma50: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sma200: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Trading signal derived from the technicals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl From<String> for Signal {
    fn from(label: String) -> Self {
        match label.as_str() {
            "Buy" | "Strong Buy" => Signal::Buy,
            "Sell" | "Strong Sell" => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
