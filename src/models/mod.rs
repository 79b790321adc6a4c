//! Shared models for HalalTrade backend payloads.
//!
//! Contains the security record pushed by scans and the price stream, the
//! stream message envelope, and the REST payloads consumed by
//! [`crate::api`].

pub mod api;
pub mod security;
pub mod stream;

pub use api::{
    Alert, AlertCondition, ErrorBody, Holding, OfflineBody, PortfolioSummary, RegisterRequest,
    TokenResponse, Transaction, TransactionSide, UniverseInfo,
};
pub use security::{MAX_PRICE_HISTORY, Security, ShariahStatus, Signal, Technicals};
pub use stream::{PriceTick, StreamMessage};
