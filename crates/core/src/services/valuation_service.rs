use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::models::position::Position;
use crate::models::price::{price_on_or_before, PricePoint};
use crate::models::valuation::{ChartPoint, EnrichedPosition, PortfolioTotals};

/// Price data available for one position during a valuation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceInputs {
    /// Live (or last-close) price from the instant quote.
    pub resolved_price: Option<f64>,
    /// Cached daily closes, ascending.
    pub history: Vec<PricePoint>,
    pub market_open: bool,
    /// The ticker's fetch failed in this pass.
    pub fetch_failed: bool,
}

/// Derives per-position and aggregate metrics from raw prices.
///
/// Pure business logic, no I/O.
pub struct ValuationService;

impl ValuationService {
    pub fn new() -> Self {
        Self
    }

    /// Enrich a position.
    ///
    /// Current price preference: resolved price > 0, then the last cached
    /// close > 0, then the purchase price.
    pub fn valuate(&self, position: &Position, inputs: PriceInputs) -> EnrichedPosition {
        let last_close = inputs.history.last().map(|p| p.close).filter(|c| *c > 0.0);
        let resolved = inputs.resolved_price.filter(|p| p.is_finite() && *p > 0.0);
        let has_price_data = resolved.is_some() || last_close.is_some();

        let current_price = resolved.or(last_close).unwrap_or(position.purchase_price);
        let metrics = Metrics::compute(position.shares, position.purchase_price, current_price);

        EnrichedPosition {
            position: position.clone(),
            current_price,
            position_value: metrics.position_value,
            cost_basis: metrics.cost_basis,
            gain_loss: metrics.gain_loss,
            gain_loss_percent: metrics.gain_loss_percent,
            historical_prices: inputs.history,
            market_open: inputs.market_open,
            error: inputs.fetch_failed && !has_price_data,
        }
    }

    /// Apply a fresh live price. Returns false (and leaves the position
    /// untouched) when the price is unusable or unchanged.
    pub fn reprice(&self, enriched: &mut EnrichedPosition, price: f64) -> bool {
        if !price.is_finite() || price <= 0.0 || price == enriched.current_price {
            return false;
        }
        let metrics = Metrics::compute(
            enriched.position.shares,
            enriched.position.purchase_price,
            price,
        );
        enriched.current_price = price;
        enriched.position_value = metrics.position_value;
        enriched.gain_loss = metrics.gain_loss;
        enriched.gain_loss_percent = metrics.gain_loss_percent;
        true
    }

    /// Daily portfolio value over the union of purchase dates, history dates
    /// and `today`.
    ///
    /// A position contributes from its purchase date on, priced at the
    /// latest close on or before each date (purchase price if none).
    pub fn build_value_history(&self, positions: &[EnrichedPosition], today: NaiveDate) -> Vec<ChartPoint> {
        if positions.is_empty() {
            return Vec::new();
        }

        let mut timeline: BTreeSet<NaiveDate> = BTreeSet::new();
        timeline.insert(today);
        for enriched in positions {
            timeline.insert(enriched.position.purchase_date);
            timeline.extend(enriched.historical_prices.iter().map(|p| p.date));
        }

        timeline
            .into_iter()
            .map(|date| {
                let value = positions
                    .iter()
                    .filter(|e| e.position.purchase_date <= date)
                    .map(|e| {
                        let price = price_on_or_before(&e.historical_prices, date)
                            .unwrap_or(e.position.purchase_price);
                        e.position.shares * price
                    })
                    .sum();
                ChartPoint { date, value }
            })
            .collect()
    }

    pub fn totals(&self, positions: &[EnrichedPosition]) -> PortfolioTotals {
        let total_value: f64 = positions.iter().map(|p| p.position_value).sum();
        let total_cost: f64 = positions.iter().map(|p| p.cost_basis).sum();
        let total_gain_loss = total_value - total_cost;
        PortfolioTotals {
            total_value,
            total_cost,
            total_gain_loss,
            total_gain_loss_percent: percent_of(total_gain_loss, total_cost),
            position_count: positions.len(),
        }
    }
}

impl Default for ValuationService {
    fn default() -> Self {
        Self::new()
    }
}

struct Metrics {
    position_value: f64,
    cost_basis: f64,
    gain_loss: f64,
    gain_loss_percent: f64,
}

impl Metrics {
    fn compute(shares: f64, purchase_price: f64, current_price: f64) -> Self {
        let position_value = shares * current_price;
        let cost_basis = shares * purchase_price;
        let gain_loss = position_value - cost_basis;
        Self {
            position_value,
            cost_basis,
            gain_loss,
            gain_loss_percent: percent_of(gain_loss, cost_basis),
        }
    }
}

/// `part / whole * 100`, defined as 0 for a non-positive whole.
fn percent_of(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}
