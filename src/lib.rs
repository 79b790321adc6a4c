//! HalalTrade client core.
//!
//! Keeps a live, cached view of the HalalTrade backend: a WebSocket price
//! stream with automatic reconnection merged into an in-memory security
//! list, an offline cache worker in front of every HTTP call, an in-memory
//! TTL cache for repeated reads, and file-backed preference and watchlist
//! stores.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod offline;
pub mod prefs;
pub mod session;
pub mod stream;
pub mod watchlist;

pub use error::{HalalTradeError, Result};
