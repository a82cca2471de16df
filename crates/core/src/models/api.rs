use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::position::Position;
use super::price::PricePoint;

// ── Backend request/response bodies ─────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LastSyncRequest<'a> {
    pub tickers: &'a [String],
}

/// `POST /portfolio/last-sync`. Tickers the backend never synced map to `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LastSyncResponse {
    #[serde(default)]
    pub last_sync: HashMap<String, Option<NaiveDate>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LastClose {
    #[serde(default)]
    pub close: Option<f64>,
}

/// `GET /stock/{ticker}/instant`. Any numeric field may be `null` upstream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstantQuote {
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub last_close: Option<LastClose>,
    #[serde(default)]
    pub market_open: bool,
    #[serde(default)]
    pub company_name: Option<String>,
}

impl InstantQuote {
    /// Live price if positive, otherwise the last close if positive.
    pub fn resolved_price(&self) -> Option<f64> {
        let positive = |p: &f64| p.is_finite() && *p > 0.0;
        self.current_price.filter(positive).or_else(|| {
            self.last_close
                .as_ref()
                .and_then(|c| c.close)
                .filter(positive)
        })
    }
}

/// `GET /stock/{ticker}/history?from_date=D`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    #[serde(default)]
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub limited_data: bool,
}

/// `GET /stock/{ticker}`, used to validate tickers on add.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavePortfolioRequest<'a> {
    pub positions: &'a [Position],
    pub portfolio_id: &'a str,
    pub cached_return_percentage: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavePortfolioResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
