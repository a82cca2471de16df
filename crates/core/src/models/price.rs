use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily close (date → close).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// Locally persisted price history for one ticker.
///
/// `prices` is kept ascending by date with at most one point per date.
/// The record is only meaningful for the purchase date it was fetched for:
/// once the position's purchase date changes, the whole series is refetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalCacheRecord {
    pub purchase_date: NaiveDate,
    pub prices: Vec<PricePoint>,
    /// Calendar date of the last accepted fetch.
    pub last_updated: NaiveDate,
    #[serde(default)]
    pub limited_data: bool,
    #[serde(default)]
    pub error: bool,
}

impl HistoricalCacheRecord {
    /// Build a record from a freshly fetched series. Input order does not matter.
    pub fn new(
        purchase_date: NaiveDate,
        prices: Vec<PricePoint>,
        last_updated: NaiveDate,
        limited_data: bool,
    ) -> Self {
        let mut record = Self {
            purchase_date,
            prices: Vec::with_capacity(prices.len()),
            last_updated,
            limited_data,
            error: false,
        };
        record.merge_prices(&prices);
        record
    }

    /// Insert or replace a single close, keeping the series sorted (O(log n) search).
    pub fn set_price(&mut self, date: NaiveDate, close: f64) {
        match self.prices.binary_search_by_key(&date, |p| p.date) {
            Ok(idx) => self.prices[idx].close = close,
            Err(idx) => self.prices.insert(idx, PricePoint { date, close }),
        }
    }

    /// Merge a batch of points; same-day points replace what is cached.
    pub fn merge_prices(&mut self, points: &[PricePoint]) {
        for point in points {
            self.set_price(point.date, point.close);
        }
    }

    /// Most recent cached close, if any.
    pub fn last_close(&self) -> Option<f64> {
        self.prices.last().map(|p| p.close)
    }

    /// Most recent cached date, if any.
    pub fn last_price_date(&self) -> Option<NaiveDate> {
        self.prices.last().map(|p| p.date)
    }

    /// Whether this record was built for the given purchase date.
    pub fn matches_purchase_date(&self, purchase_date: NaiveDate) -> bool {
        self.purchase_date == purchase_date
    }
}

/// Latest close with `date <= on`, found by binary search over an ascending series.
pub fn price_on_or_before(series: &[PricePoint], on: NaiveDate) -> Option<f64> {
    let end = series
        .binary_search_by_key(&on, |p| p.date)
        .map(|pos| pos + 1)
        .unwrap_or_else(|pos| pos);
    if end == 0 {
        None
    } else {
        Some(series[end - 1].close)
    }
}
