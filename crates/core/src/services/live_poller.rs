use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::api::InstantQuote;
use crate::models::valuation::EnrichedPosition;
use crate::providers::traits::PortfolioBackend;

use super::batch_fetcher::BoundedBatchFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// Whether any enriched position reports its market open.
pub fn any_market_open(positions: &[EnrichedPosition]) -> bool {
    positions.iter().any(|p| p.market_open)
}

/// One live refresh: the tickers to requote and the committed generation
/// it was built against.
#[derive(Debug, Clone)]
pub struct PollJob {
    generation: u64,
    tickers: Vec<String>,
    fetcher: BoundedBatchFetcher,
}

/// Quotes that came back from a poll. Failed tickers are simply absent.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub generation: u64,
    pub quotes: Vec<(String, InstantQuote)>,
}

impl PollJob {
    /// Build a job over the valid (non-error) positions, one request per ticker.
    pub fn new(generation: u64, positions: &[EnrichedPosition], fetcher: BoundedBatchFetcher) -> Self {
        let mut tickers: Vec<String> = positions
            .iter()
            .filter(|p| !p.error)
            .map(|p| p.ticker().to_string())
            .collect();
        tickers.sort();
        tickers.dedup();
        Self {
            generation,
            tickers,
            fetcher,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub async fn run(self, backend: &dyn PortfolioBackend) -> PollOutcome {
        let tasks = self.tickers.iter().map(|ticker| backend.instant_quote(ticker));
        let results = self.fetcher.run(tasks).await;

        let mut quotes = Vec::with_capacity(results.len());
        for (ticker, result) in self.tickers.into_iter().zip(results) {
            match result {
                Ok(quote) => quotes.push((ticker, quote)),
                Err(e) => tracing::warn!("Live price refresh failed for {}: {}", ticker, e),
            }
        }
        PollOutcome {
            generation: self.generation,
            quotes,
        }
    }
}

/// What the poller drives on every tick.
#[async_trait]
pub trait PollTarget: Send + Sync + 'static {
    /// Whether any tracked position's market is currently open.
    async fn markets_open(&self) -> bool;

    /// Refresh live prices once. Returns whether any market is still open.
    async fn poll(&self) -> bool;
}

/// Periodic live-price refresh, active only while a market is open.
///
/// Idle → Polling on `start_if_market_open` when a market is open.
/// Polling → Idle when a tick finds every market closed, or on `stop`.
/// `stop` cancels immediately: an in-flight tick is dropped before it can
/// apply its results.
pub struct LivePricePoller {
    interval: Duration,
    polling: Arc<AtomicBool>,
    cancel: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl LivePricePoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            polling: Arc::new(AtomicBool::new(false)),
            cancel: None,
            handle: None,
        }
    }

    pub fn state(&self) -> PollerState {
        if self.polling.load(Ordering::SeqCst) {
            PollerState::Polling
        } else {
            PollerState::Idle
        }
    }

    /// Enter Polling if any market is open. Returns whether the poller is running.
    pub async fn start_if_market_open<P: PollTarget>(&mut self, target: Arc<P>) -> bool {
        if self.state() == PollerState::Polling {
            return true;
        }
        self.stop();
        if !target.markets_open().await {
            tracing::debug!("No market open, live polling stays idle");
            return false;
        }

        let cancel = CancellationToken::new();
        self.polling.store(true, Ordering::SeqCst);
        self.handle = Some(tokio::spawn(run_loop(
            target,
            self.interval,
            cancel.clone(),
            self.polling.clone(),
        )));
        self.cancel = Some(cancel);
        tracing::info!("Live polling started every {}s", self.interval.as_secs());
        true
    }

    /// Return to Idle immediately (e.g. the portfolio view was left).
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.polling.store(false, Ordering::SeqCst);
    }
}

impl Drop for LivePricePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop<P: PollTarget>(
    target: Arc<P>,
    period: Duration,
    cancel: CancellationToken,
    polling: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let still_open = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            open = target.poll() => open,
        };
        if !still_open {
            tracing::info!("All markets closed, live polling stopped");
            break;
        }
    }

    if !cancel.is_cancelled() {
        polling.store(false, Ordering::SeqCst);
    }
}
