//! Backend REST endpoints.

use std::time::Duration;

use reqwest::Method;

use crate::cache::{LONG_TTL, MEDIUM_TTL, SHORT_TTL, cache_key};

/// Prefix shared by every portfolio read; cleared after a portfolio write.
pub const PORTFOLIO_PREFIX: &str = "/api/portfolio";

/// A backend endpoint together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint<'a> {
    StocksList,
    Scan,
    Dashboard,
    DashboardPerformance { period: &'a str },
    Portfolio,
    Transactions,
    DeleteTransaction { id: &'a str },
    StockHistory { symbol: &'a str, range: &'a str },
    Alerts,
    AnalyticsPerformance,
    AnalyticsRisk,
    MarketOverview,
    Login,
    Register,
}

impl<'a> Endpoint<'a> {
    pub fn method(&self) -> Method {
        match self {
            Self::DeleteTransaction { .. } => Method::DELETE,
            Self::Login | Self::Register => Method::POST,
            _ => Method::GET,
        }
    }

    /// Path relative to the API base URL.
    pub fn path(&self) -> String {
        match self {
            Self::StocksList => "/api/stocks/list".into(),
            Self::Scan => "/api/scan".into(),
            Self::Dashboard => "/api/dashboard".into(),
            Self::DashboardPerformance { .. } => "/api/dashboard/performance".into(),
            Self::Portfolio => PORTFOLIO_PREFIX.into(),
            Self::Transactions => format!("{PORTFOLIO_PREFIX}/transactions"),
            Self::DeleteTransaction { id } => format!("{PORTFOLIO_PREFIX}/transactions/{id}"),
            Self::StockHistory { .. } => "/api/stocks/history".into(),
            Self::Alerts => "/api/alerts".into(),
            Self::AnalyticsPerformance => "/api/analytics/performance".into(),
            Self::AnalyticsRisk => "/api/analytics/risk".into(),
            Self::MarketOverview => "/api/market/overview".into(),
            Self::Login => "/api/auth/login".into(),
            Self::Register => "/api/auth/register".into(),
        }
    }

    /// Query parameters, in the order they are sent.
    pub fn query(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            Self::DashboardPerformance { period } => vec![("period", period)],
            Self::StockHistory { symbol, range } => vec![("symbol", symbol), ("range", range)],
            _ => Vec::new(),
        }
    }

    /// How long a response stays in the in-memory cache; `None` for
    /// endpoints that are never cached.
    pub fn cache_ttl(&self) -> Option<Duration> {
        match self {
            Self::StocksList | Self::StockHistory { .. } | Self::AnalyticsRisk => Some(LONG_TTL),
            Self::Dashboard
            | Self::DashboardPerformance { .. }
            | Self::AnalyticsPerformance
            | Self::MarketOverview => Some(MEDIUM_TTL),
            Self::Portfolio | Self::Transactions | Self::Alerts => Some(SHORT_TTL),
            Self::Scan | Self::DeleteTransaction { .. } | Self::Login | Self::Register => None,
        }
    }

    /// Key for the in-memory cache: path plus sorted query.
    pub fn cache_key(&self) -> String {
        cache_key(&self.path(), &self.query())
    }
}
