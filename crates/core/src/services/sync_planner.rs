use chrono::{Days, Months, NaiveDate};

use crate::models::price::HistoricalCacheRecord;

/// What to fetch for one ticker's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// Cache is current; no request.
    Skip,
    /// Fetch only points newer than the backend watermark.
    Incremental { from: NaiveDate },
    /// Fetch the whole window and replace the cached series.
    Full { from: NaiveDate },
}

impl SyncPlan {
    pub fn from_date(&self) -> Option<NaiveDate> {
        match self {
            SyncPlan::Skip => None,
            SyncPlan::Incremental { from } | SyncPlan::Full { from } => Some(*from),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, SyncPlan::Skip)
    }
}

/// Decides skip / incremental / full for each ticker so the provider's
/// per-minute quota is spent only on data that can actually be new.
#[derive(Debug, Clone, Copy)]
pub struct HistoricalSyncPlanner {
    window_months: u32,
}

impl HistoricalSyncPlanner {
    pub fn new(window_months: u32) -> Self {
        Self { window_months }
    }

    /// Plan a fetch.
    ///
    /// Priority order:
    /// 1. No usable cache → full fetch.
    /// 2. Cache stamped before the backend watermark → full fetch.
    /// 3. Cache current and `last_sync + 1 >= today` → skip.
    /// 4. Cache current otherwise → incremental from `last_sync + 1`.
    ///
    /// A record built for a different purchase date is not usable. Without a
    /// watermark the record's own `last_updated` stands in for it, and an
    /// incremental fetch starts on that date (same-day points replace).
    pub fn plan(
        &self,
        purchase_date: NaiveDate,
        cache: Option<&HistoricalCacheRecord>,
        last_sync: Option<NaiveDate>,
        today: NaiveDate,
    ) -> SyncPlan {
        let full = SyncPlan::Full {
            from: self.full_fetch_start(purchase_date, today),
        };

        let record = match cache {
            Some(record) if record.matches_purchase_date(purchase_date) => record,
            _ => return full,
        };
        let cache_date = record.last_updated;

        let watermark = match last_sync {
            Some(watermark) => {
                if cache_date < watermark {
                    return full;
                }
                watermark
            }
            None => {
                // The stamp day's close may not have existed at fetch time,
                // so refetch from the stamp itself.
                if cache_date >= today {
                    return SyncPlan::Skip;
                }
                return SyncPlan::Incremental { from: cache_date };
            }
        };

        match watermark.checked_add_days(Days::new(1)) {
            Some(next) if next < today => SyncPlan::Incremental { from: next },
            _ => SyncPlan::Skip,
        }
    }

    /// `max(purchase_date, today - window)`.
    pub fn full_fetch_start(&self, purchase_date: NaiveDate, today: NaiveDate) -> NaiveDate {
        let window_start = today
            .checked_sub_months(Months::new(self.window_months))
            .unwrap_or(NaiveDate::MIN);
        purchase_date.max(window_start)
    }
}

impl Default for HistoricalSyncPlanner {
    fn default() -> Self {
        Self::new(6)
    }
}
