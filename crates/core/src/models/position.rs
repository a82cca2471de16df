use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A held stock position.
///
/// Positions have no stable id: they are addressed by their index in the
/// portfolio's position list, and several positions may share a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Exchange symbol, uppercased
    pub ticker: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
    #[serde(default)]
    pub company_name: String,
    pub added_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        ticker: impl Into<String>,
        shares: f64,
        purchase_price: f64,
        purchase_date: NaiveDate,
    ) -> Self {
        let ticker = ticker.into().trim().to_uppercase();
        Self {
            company_name: ticker.clone(),
            ticker,
            shares,
            purchase_price,
            purchase_date,
            added_at: Utc::now(),
        }
    }

    pub fn with_company_name(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = company_name.into();
        self
    }
}

/// Input for adding a position. The company name comes from the ticker lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPosition {
    pub ticker: String,
    pub shares: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
}

/// Editable fields of a position. The ticker is fixed while editing.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEdit {
    pub shares: f64,
    pub purchase_price: f64,
    pub purchase_date: NaiveDate,
}

/// Sorted, deduplicated tickers held by `positions`.
pub fn active_tickers(positions: &[Position]) -> Vec<String> {
    let mut tickers: Vec<String> = positions.iter().map(|p| p.ticker.clone()).collect();
    tickers.sort();
    tickers.dedup();
    tickers
}

/// Earliest purchase date among the positions holding `ticker`.
pub fn earliest_purchase_date(positions: &[Position], ticker: &str) -> Option<NaiveDate> {
    positions
        .iter()
        .filter(|p| p.ticker == ticker)
        .map(|p| p.purchase_date)
        .min()
}
