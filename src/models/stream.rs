//! Messages pushed by the backend over the price stream.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use super::security::Security;

/// A text frame received on the price stream, routed on its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// Full snapshot; replaces the whole security list.
    Initial { data: Vec<Security> },
    /// Incremental ticks for some of the known symbols.
    PriceUpdate {
        #[serde(default, deserialize_with = "timestamp_as_string")]
        timestamp: Option<String>,
        /// Ticks that decoded; malformed entries and a non-array `data`
        /// are dropped so the batch itself still counts.
        #[serde(default, deserialize_with = "usable_ticks")]
        data: Vec<PriceTick>,
    },
    /// Any other `type`; ignored by the client.
    #[serde(other)]
    Unknown,
}

impl StreamMessage {
    /// Parses one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`HalalTradeError::Json`](crate::HalalTradeError::Json) if the
    /// frame is not valid JSON or does not match any known shape.
    pub fn parse(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// One symbol's price change inside a `price_update` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub symbol: String,
    pub price: Decimal,
    #[serde(default)]
    pub change: Option<Decimal>,
    #[serde(default)]
    pub change_percent: Option<Decimal>,
}

/// Decodes each tick on its own, skipping the ones that do not fit.
fn usable_ticks<'de, D>(deserializer: D) -> Result<Vec<PriceTick>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items,
        None => return Ok(Vec::new()),
        Some(other) => {
            warn!(data = %other, "price_update data is not an array");
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<PriceTick>(item) {
            Ok(tick) => Some(tick),
            Err(e) => {
                warn!(error = %e, "dropping malformed price tick");
                None
            }
        })
        .collect())
}

/// Accepts either an ISO string or a numeric epoch for `timestamp`.
fn timestamp_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(
        Option::<RawTimestamp>::deserialize(deserializer)?.map(|raw| match raw {
            RawTimestamp::Text(text) => text,
            RawTimestamp::Integer(n) => n.to_string(),
            RawTimestamp::Float(f) => f.to_string(),
        }),
    )
}
