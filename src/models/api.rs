//! REST payloads exchanged with the HalalTrade backend.

use serde::{Deserialize, Serialize};

/// Metadata about the active scan universe (`GET /api/stocks/list`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseInfo {
    pub count: u32,
    pub name: String,
}

/// One position in the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub current_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
}

/// Portfolio totals plus holdings (`GET /api/portfolio`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub current_value: f64,
    pub total_invested: f64,
    pub total_pnl: f64,
    pub total_pnl_percent: f64,
    #[serde(default)]
    pub holdings: Vec<Holding>,
}

/// Buy or sell side of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionSide {
    Buy,
    Sell,
}

/// A recorded portfolio transaction (`GET /api/portfolio/transactions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TransactionSide,
    pub quantity: f64,
    pub price: f64,
    pub date: String,
}

/// Direction of a price alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

/// A configured price alert (`GET /api/alerts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub symbol: String,
    pub condition: AlertCondition,
    pub price: f64,
    pub enabled: bool,
    #[serde(default)]
    pub triggered: bool,
}

/// Body returned by login and registration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Registration request body.
#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Error body produced by the backend on rejected requests.
///
/// `detail` is usually a string but may be a structured object.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Human-readable detail, if the backend supplied one.
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
            _ => None,
        }
    }
}

/// Body of the offline worker's synthetic 503 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineBody {
    pub error: String,
    pub message: String,
}

/// Backend ids arrive as numbers or strings depending on the table.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}
