use chrono::NaiveDate;
use std::collections::HashMap;
use std::convert::Infallible;
use tokio_util::sync::CancellationToken;

use crate::errors::CoreError;
use crate::models::api::{InstantQuote, PriceHistory};
use crate::models::price::HistoricalCacheRecord;
use crate::providers::traits::PortfolioBackend;
use crate::storage::ticker_cache::TickerCacheStore;

use super::batch_fetcher::BoundedBatchFetcher;
use super::sync_planner::{HistoricalSyncPlanner, SyncPlan};

/// One ticker to synchronize, with the cache state captured at job start.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerTarget {
    pub ticker: String,
    /// Earliest purchase date among positions holding the ticker.
    pub purchase_date: NaiveDate,
    pub cached: Option<HistoricalCacheRecord>,
}

/// Result of the history half of a ticker fetch.
#[derive(Debug)]
pub enum HistoryOutcome {
    /// Planner said the cache is current.
    Skipped,
    Fetched(PriceHistory),
    /// Request succeeded with zero points; the cached series stays.
    Empty,
    Failed(CoreError),
}

/// Everything fetched for one ticker in a resync pass.
#[derive(Debug)]
pub struct TickerFetch {
    pub ticker: String,
    pub purchase_date: NaiveDate,
    pub plan: SyncPlan,
    pub quote: Option<InstantQuote>,
    pub history: HistoryOutcome,
}

impl TickerFetch {
    /// No quote and no fresh history came back.
    pub fn failed(&self) -> bool {
        self.quote.is_none() && !matches!(self.history, HistoryOutcome::Fetched(_))
    }
}

/// Fetched data for a whole pass, tagged with the pass generation.
#[derive(Debug)]
pub struct ResyncOutcome {
    pub generation: u64,
    pub today: NaiveDate,
    pub fetches: Vec<TickerFetch>,
}

/// An owned, self-contained full resync.
///
/// Built from a snapshot of engine state so it can run without borrowing
/// the engine; the engine later commits or discards the outcome by
/// generation.
#[derive(Debug)]
pub struct ResyncJob {
    generation: u64,
    today: NaiveDate,
    targets: Vec<TickerTarget>,
    planner: HistoricalSyncPlanner,
    fetcher: BoundedBatchFetcher,
    cancel: CancellationToken,
}

impl ResyncJob {
    pub fn new(
        generation: u64,
        today: NaiveDate,
        targets: Vec<TickerTarget>,
        planner: HistoricalSyncPlanner,
        fetcher: BoundedBatchFetcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            generation,
            today,
            targets,
            planner,
            fetcher,
            cancel,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn targets(&self) -> &[TickerTarget] {
        &self.targets
    }

    /// Fetch everything the pass needs. Resolves to `CoreError::Cancelled`
    /// as soon as the session token is cancelled; partial results are dropped.
    pub async fn run(self, backend: &dyn PortfolioBackend) -> Result<ResyncOutcome, CoreError> {
        let cancel = self.cancel.clone();
        let generation = self.generation;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Resync generation {} cancelled", generation);
                Err(CoreError::Cancelled)
            }
            outcome = self.execute(backend) => Ok(outcome),
        }
    }

    async fn execute(self, backend: &dyn PortfolioBackend) -> ResyncOutcome {
        let watermarks = self.fetch_watermarks(backend).await;

        let plans: Vec<SyncPlan> = self
            .targets
            .iter()
            .map(|target| {
                self.planner.plan(
                    target.purchase_date,
                    target.cached.as_ref(),
                    watermarks.get(&target.ticker.to_uppercase()).copied(),
                    self.today,
                )
            })
            .collect();

        let skipped = plans.iter().filter(|p| p.is_skip()).count();
        tracing::info!(
            "Resync generation {}: {} tickers, {} history fetches skipped",
            self.generation,
            self.targets.len(),
            skipped
        );

        let tasks = self
            .targets
            .iter()
            .zip(plans.iter())
            .map(|(target, plan)| fetch_ticker(backend, target, *plan));
        let fetches = self
            .fetcher
            .run(tasks)
            .await
            .into_iter()
            .map(|result| match result {
                Ok(fetch) => fetch,
                Err(never) => match never {},
            })
            .collect();

        ResyncOutcome {
            generation: self.generation,
            today: self.today,
            fetches,
        }
    }

    async fn fetch_watermarks(&self, backend: &dyn PortfolioBackend) -> HashMap<String, NaiveDate> {
        if self.targets.is_empty() {
            return HashMap::new();
        }
        let tickers: Vec<String> = self.targets.iter().map(|t| t.ticker.clone()).collect();
        match backend.last_sync(&tickers).await {
            Ok(watermarks) => watermarks,
            Err(e) => {
                tracing::warn!("Last-sync lookup failed, planning from local cache only: {}", e);
                HashMap::new()
            }
        }
    }
}

async fn fetch_ticker(
    backend: &dyn PortfolioBackend,
    target: &TickerTarget,
    plan: SyncPlan,
) -> Result<TickerFetch, Infallible> {
    let quote = match backend.instant_quote(&target.ticker).await {
        Ok(quote) => Some(quote),
        Err(e) => {
            tracing::warn!("Instant quote failed for {}: {}", target.ticker, e);
            None
        }
    };

    let history = match plan.from_date() {
        None => HistoryOutcome::Skipped,
        Some(from) => match backend.price_history(&target.ticker, from).await {
            Ok(history) if history.prices.is_empty() => {
                tracing::debug!("No new prices for {} since {}", target.ticker, from);
                HistoryOutcome::Empty
            }
            Ok(history) => HistoryOutcome::Fetched(history),
            Err(e) => {
                tracing::warn!("History fetch failed for {}: {}", target.ticker, e);
                HistoryOutcome::Failed(e)
            }
        },
    };

    Ok(TickerFetch {
        ticker: target.ticker.clone(),
        purchase_date: target.purchase_date,
        plan,
        quote,
        history,
    })
}

/// Write an accepted fetch into the cache. Returns whether the cache changed.
///
/// Full fetches replace the record; incremental fetches merge into it and
/// restamp `last_updated`. Empty, skipped and failed fetches leave the
/// cached series untouched.
pub fn merge_into_cache(cache: &mut TickerCacheStore, fetch: &TickerFetch, today: NaiveDate) -> bool {
    let history = match &fetch.history {
        HistoryOutcome::Fetched(history) => history,
        _ => return false,
    };

    let record = match (fetch.plan, cache.get(&fetch.ticker)) {
        (SyncPlan::Incremental { .. }, Some(existing)) => {
            let mut record = existing.clone();
            record.merge_prices(&history.prices);
            record.last_updated = today;
            record.limited_data = record.limited_data || history.limited_data;
            record.error = false;
            record
        }
        _ => HistoricalCacheRecord::new(
            fetch.purchase_date,
            history.prices.clone(),
            today,
            history.limited_data,
        ),
    };
    cache.set(&fetch.ticker, record);
    true
}

/// Monotonic pass generations. A pass may commit only if it is newer than
/// the last committed one, so a slow earlier resync never overwrites a
/// newer result.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerationTracker {
    issued: u64,
    committed: u64,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn is_stale(&self, generation: u64) -> bool {
        generation <= self.committed
    }

    /// Record `generation` as committed. Fails for stale generations.
    pub fn commit(&mut self, generation: u64) -> bool {
        if self.is_stale(generation) {
            return false;
        }
        self.committed = generation;
        true
    }
}
