use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::errors::CoreError;
use crate::models::api::{InstantQuote, PriceHistory, Quote};
use crate::models::position::Position;

/// The backend collaborator the engine talks to.
///
/// The engine only depends on this trait; `HttpBackend` is the production
/// implementation and tests substitute in-memory mocks.
#[async_trait]
pub trait PortfolioBackend: Send + Sync {
    /// Per-ticker last date the backend holds verified data for.
    /// Tickers the backend never synced are absent from the map.
    async fn last_sync(&self, tickers: &[String]) -> Result<HashMap<String, NaiveDate>, CoreError>;

    /// Instantaneous price, last close and market state.
    async fn instant_quote(&self, ticker: &str) -> Result<InstantQuote, CoreError>;

    /// Daily closes from `from_date` (inclusive) to today.
    async fn price_history(&self, ticker: &str, from_date: NaiveDate) -> Result<PriceHistory, CoreError>;

    /// Simple quote, used to validate a ticker before adding it.
    async fn quote(&self, ticker: &str) -> Result<Quote, CoreError>;

    /// Persist the full position list.
    async fn save_portfolio(
        &self,
        portfolio_id: &str,
        positions: &[Position],
        cached_return_percentage: f64,
    ) -> Result<(), CoreError>;

    /// Drop the backend's stored history for a ticker nobody holds anymore.
    async fn delete_historical(&self, ticker: &str) -> Result<(), CoreError>;
}

// ── Raw HTTP seam ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

/// A request relative to the backend base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Status + raw body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_str(&self.body).map_err(CoreError::from)
    }
}

/// Sends one HTTP request. `Err` means the exchange itself failed
/// (connection, timeout); any HTTP status is an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CoreError>;
}
