use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::position::Position;
use super::price::PricePoint;

/// A position combined with its live/cached valuation.
///
/// Recomputed on every valuation pass. Only ever persisted inside a
/// dashboard snapshot, as a first-paint accelerant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPosition {
    #[serde(flatten)]
    pub position: Position,
    pub current_price: f64,
    pub position_value: f64,
    pub cost_basis: f64,
    pub gain_loss: f64,
    pub gain_loss_percent: f64,
    pub historical_prices: Vec<PricePoint>,
    pub market_open: bool,
    /// No price data could be obtained at all; values fall back to cost.
    pub error: bool,
}

impl EnrichedPosition {
    pub fn ticker(&self) -> &str {
        &self.position.ticker
    }
}

/// Aggregate metrics across all enriched positions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioTotals {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain_loss: f64,
    /// `total_gain_loss / total_cost * 100`, or 0 when nothing was invested
    pub total_gain_loss_percent: f64,
    pub position_count: usize,
}

/// One point of the portfolio value-over-time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub value: f64,
}
