pub mod errors;
pub mod models;
pub mod providers;
pub mod render;
pub mod services;
pub mod storage;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use errors::CoreError;
use models::{
    api::InstantQuote,
    position::{active_tickers, earliest_purchase_date, NewPosition, Position, PositionEdit},
    settings::EngineSettings,
    valuation::{ChartPoint, EnrichedPosition, PortfolioTotals},
};
use providers::{http_backend::HttpBackend, traits::PortfolioBackend};
use render::Renderer;
use services::{
    batch_fetcher::BoundedBatchFetcher,
    live_poller::{self, PollJob, PollOutcome, PollTarget},
    mutation_service::{MutationContext, MutationService},
    sync_planner::HistoricalSyncPlanner,
    sync_service::{merge_into_cache, GenerationTracker, ResyncJob, ResyncOutcome, TickerTarget},
    valuation_service::{PriceInputs, ValuationService},
};
use storage::{
    kv::KeyValueStore,
    snapshot_cache::DashboardSnapshotCache,
    ticker_cache::{CacheStats, TickerCacheStore},
};

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Whether a resync outcome was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// A newer pass had already been committed.
    Discarded,
}

/// One dashboard session: the position list, both caches, the backend and
/// renderer collaborators, and the latest derived state.
///
/// Derived state (enriched positions, chart, totals) is always recomputed
/// from positions + ticker cache + last known quotes; it is never edited
/// independently.
#[must_use]
pub struct PortfolioEngine {
    settings: EngineSettings,
    session_id: uuid::Uuid,
    positions: Vec<Position>,
    ticker_cache: TickerCacheStore,
    snapshot_cache: DashboardSnapshotCache,
    backend: Arc<dyn PortfolioBackend>,
    renderer: Arc<dyn Renderer>,
    planner: HistoricalSyncPlanner,
    fetcher: BoundedBatchFetcher,
    valuation: ValuationService,
    mutations: MutationService,
    /// Instant quote from the latest committed pass (or poll) per ticker.
    quotes: HashMap<String, InstantQuote>,
    /// Tickers whose last fetch returned nothing at all.
    failed: HashSet<String>,
    enriched: Vec<EnrichedPosition>,
    chart: Vec<ChartPoint>,
    totals: PortfolioTotals,
    generations: GenerationTracker,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PortfolioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioEngine")
            .field("session_id", &self.session_id)
            .field("positions", &self.positions.len())
            .field("cached_tickers", &self.ticker_cache.len())
            .field("committed_generation", &self.generations.committed())
            .finish()
    }
}

impl PortfolioEngine {
    /// Create a session over `positions`, loading the persisted ticker cache.
    pub fn new(
        settings: EngineSettings,
        positions: Vec<Position>,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn PortfolioBackend>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        let ticker_cache = TickerCacheStore::load(store.clone(), settings.ticker_cache_key.clone());
        let snapshot_cache = DashboardSnapshotCache::new(
            store,
            settings.snapshot_key.clone(),
            chrono::Duration::hours(settings.snapshot_max_age_hours),
        );
        let session_id = uuid::Uuid::new_v4();
        tracing::info!("Portfolio session {} opened with {} positions", session_id, positions.len());

        Ok(Self {
            planner: HistoricalSyncPlanner::new(settings.history_window_months),
            fetcher: BoundedBatchFetcher::new(settings.batch_width),
            valuation: ValuationService::new(),
            mutations: MutationService::new(settings.max_positions),
            settings,
            session_id,
            positions,
            ticker_cache,
            snapshot_cache,
            backend,
            renderer,
            quotes: HashMap::new(),
            failed: HashSet::new(),
            enriched: Vec::new(),
            chart: Vec::new(),
            totals: PortfolioTotals::default(),
            generations: GenerationTracker::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Create a session talking to the HTTP backend named in the settings.
    pub fn with_http(
        settings: EngineSettings,
        positions: Vec<Position>,
        store: Arc<dyn KeyValueStore>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, CoreError> {
        let backend: Arc<dyn PortfolioBackend> = Arc::new(HttpBackend::new(&settings));
        Self::new(settings, positions, store, backend, renderer)
    }

    // ── Load & Resync ───────────────────────────────────────────────

    /// Paint the dashboard snapshot, if a fresh one exists. First paint only:
    /// a resync must follow.
    pub fn paint_cached(&mut self) -> bool {
        let Some(snapshot) = self.snapshot_cache.load() else {
            return false;
        };
        tracing::debug!("Painting dashboard snapshot from {}", snapshot.timestamp);
        self.enriched = snapshot.enriched_positions;
        self.chart = snapshot.chart_history;
        self.totals = self.valuation.totals(&self.enriched);
        self.publish();
        true
    }

    /// Start a full resync pass. Orphaned cache entries are dropped first;
    /// the returned job owns everything it needs and carries a fresh
    /// generation.
    pub fn begin_resync(&mut self, today: NaiveDate) -> ResyncJob {
        let active = active_tickers(&self.positions);
        self.ticker_cache.validate_and_clean(&active);

        let targets = active
            .iter()
            .filter_map(|ticker| {
                let purchase_date = earliest_purchase_date(&self.positions, ticker)?;
                Some(TickerTarget {
                    ticker: ticker.clone(),
                    purchase_date,
                    cached: self.ticker_cache.get(ticker).cloned(),
                })
            })
            .collect();

        ResyncJob::new(
            self.generations.next(),
            today,
            targets,
            self.planner,
            self.fetcher,
            self.cancel.clone(),
        )
    }

    /// Apply a finished pass: write accepted fetches to the cache, revalue,
    /// save the snapshot and render.
    ///
    /// Outcomes older than the last committed pass are discarded whole.
    /// Tickers deleted, or re-dated, while the pass was in flight are skipped.
    pub fn commit_resync(&mut self, outcome: ResyncOutcome) -> CommitStatus {
        if !self.generations.commit(outcome.generation) {
            tracing::info!(
                "Discarding resync generation {} (generation {} already committed)",
                outcome.generation,
                self.generations.committed()
            );
            return CommitStatus::Discarded;
        }

        for fetch in &outcome.fetches {
            if earliest_purchase_date(&self.positions, &fetch.ticker) != Some(fetch.purchase_date) {
                tracing::debug!("Skipping {}: position changed during resync", fetch.ticker);
                continue;
            }
            merge_into_cache(&mut self.ticker_cache, fetch, outcome.today);
            // Only this pass's quote counts; without one the last close wins.
            match &fetch.quote {
                Some(quote) => {
                    self.quotes.insert(fetch.ticker.clone(), quote.clone());
                }
                None => {
                    self.quotes.remove(&fetch.ticker);
                }
            }
            if fetch.failed() {
                self.failed.insert(fetch.ticker.clone());
            } else {
                self.failed.remove(&fetch.ticker);
            }
        }

        self.revalue(outcome.today);
        self.snapshot_cache.save(&self.enriched, &self.chart);
        self.publish();
        tracing::info!(
            "Committed resync generation {}: {} positions, total value {:.2}",
            outcome.generation,
            self.enriched.len(),
            self.totals.total_value
        );
        CommitStatus::Committed
    }

    /// Run a full resync to completion against the session's backend.
    pub async fn refresh(&mut self, today: NaiveDate) -> Result<CommitStatus, CoreError> {
        let job = self.begin_resync(today);
        let backend = self.backend.clone();
        let outcome = job.run(backend.as_ref()).await?;
        Ok(self.commit_resync(outcome))
    }

    /// Cold start: paint the snapshot if any, then always resync.
    pub async fn open(&mut self, today: NaiveDate) -> Result<CommitStatus, CoreError> {
        self.paint_cached();
        self.refresh(today).await
    }

    // ── Live Prices ─────────────────────────────────────────────────

    /// A poll over the current enriched positions, pinned to the committed generation.
    pub fn poll_job(&self) -> PollJob {
        PollJob::new(self.generations.committed(), &self.enriched, self.fetcher)
    }

    /// Apply live quotes. Returns how many positions changed price.
    ///
    /// Totals are republished only when something changed. Polls started
    /// before the latest committed resync are discarded.
    pub fn apply_poll(&mut self, outcome: PollOutcome) -> usize {
        if outcome.generation != self.generations.committed() {
            tracing::debug!(
                "Discarding live poll from generation {} (committed {})",
                outcome.generation,
                self.generations.committed()
            );
            return 0;
        }

        let mut changed = 0;
        for (ticker, quote) in outcome.quotes {
            if !self.positions.iter().any(|p| p.ticker == ticker) {
                continue;
            }
            let price = quote.resolved_price();
            for enriched in self.enriched.iter_mut().filter(|e| e.ticker() == ticker && !e.error) {
                enriched.market_open = quote.market_open;
                if let Some(price) = price {
                    if self.valuation.reprice(enriched, price) {
                        changed += 1;
                    }
                }
            }
            self.quotes.insert(ticker, quote);
        }

        if changed > 0 {
            self.totals = self.valuation.totals(&self.enriched);
            self.publish();
        }
        changed
    }

    pub fn any_market_open(&self) -> bool {
        live_poller::any_market_open(&self.enriched)
    }

    // ── Mutations ───────────────────────────────────────────────────

    /// Add a position, then resync so its history is fetched.
    pub async fn add_position(&mut self, new: NewPosition, today: NaiveDate) -> Result<usize, CoreError> {
        let (mutations, ctx) = self.mutation_parts();
        let index = mutations.add_position(ctx, new, today).await?;
        self.resync_after_mutation(today).await;
        Ok(index)
    }

    /// Edit a position, then resync so a changed purchase date refetches.
    pub async fn edit_position(
        &mut self,
        index: usize,
        edit: PositionEdit,
        today: NaiveDate,
    ) -> Result<(), CoreError> {
        let (mutations, ctx) = self.mutation_parts();
        mutations.edit_position(ctx, index, edit, today).await?;
        self.resync_after_mutation(today).await;
        Ok(())
    }

    /// Delete a position. No fetch is needed; derived state is recomputed
    /// from what is already cached.
    pub async fn delete_position(&mut self, index: usize, today: NaiveDate) -> Result<Position, CoreError> {
        let (mutations, ctx) = self.mutation_parts();
        let removed = mutations.delete_position(ctx, index).await?;
        self.failed.retain(|ticker| self.positions.iter().any(|p| &p.ticker == ticker));
        self.quotes.retain(|ticker, _| self.positions.iter().any(|p| &p.ticker == ticker));
        self.revalue(today);
        self.publish();
        Ok(removed)
    }

    fn mutation_parts(&mut self) -> (&MutationService, MutationContext<'_>) {
        let ctx = MutationContext {
            positions: &mut self.positions,
            ticker_cache: &mut self.ticker_cache,
            snapshot_cache: &self.snapshot_cache,
            backend: self.backend.clone(),
            portfolio_id: &self.settings.portfolio_id,
            cached_return_percentage: self.totals.total_gain_loss_percent,
        };
        (&self.mutations, ctx)
    }

    async fn resync_after_mutation(&mut self, today: NaiveDate) {
        if let Err(e) = self.refresh(today).await {
            tracing::warn!("Resync after mutation did not complete: {}", e);
            self.revalue(today);
            self.publish();
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// End the session's in-flight work. Running resync jobs resolve to
    /// `CoreError::Cancelled`; later jobs get a fresh token.
    pub fn teardown(&mut self) {
        tracing::info!("Portfolio session {} torn down", self.session_id);
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    // ── Accessors ───────────────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[must_use]
    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    #[must_use]
    pub fn enriched_positions(&self) -> &[EnrichedPosition] {
        &self.enriched
    }

    #[must_use]
    pub fn chart_history(&self) -> &[ChartPoint] {
        &self.chart
    }

    #[must_use]
    pub fn totals(&self) -> &PortfolioTotals {
        &self.totals
    }

    #[must_use]
    pub fn ticker_cache(&self) -> &TickerCacheStore {
        &self.ticker_cache
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.ticker_cache.get_stats(&active_tickers(&self.positions))
    }

    #[must_use]
    pub fn committed_generation(&self) -> u64 {
        self.generations.committed()
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn PortfolioBackend> {
        self.backend.clone()
    }

    // ── Internal ────────────────────────────────────────────────────

    fn revalue(&mut self, today: NaiveDate) {
        let enriched: Vec<EnrichedPosition> = self
            .positions
            .iter()
            .map(|position| self.valuation.valuate(position, self.price_inputs(&position.ticker)))
            .collect();
        self.chart = self.valuation.build_value_history(&enriched, today);
        self.totals = self.valuation.totals(&enriched);
        self.enriched = enriched;
    }

    fn price_inputs(&self, ticker: &str) -> PriceInputs {
        let quote = self.quotes.get(ticker);
        PriceInputs {
            resolved_price: quote.and_then(InstantQuote::resolved_price),
            history: self.ticker_cache.price_series(ticker).to_vec(),
            market_open: quote.is_some_and(|q| q.market_open),
            fetch_failed: self.failed.contains(ticker),
        }
    }

    fn publish(&self) {
        self.renderer.render(&self.enriched, &self.chart, &self.totals);
    }
}

/// A shared engine drives the live poller: the lock is held only while
/// building the job and applying its outcome, never across the network calls.
#[async_trait]
impl PollTarget for tokio::sync::Mutex<PortfolioEngine> {
    async fn markets_open(&self) -> bool {
        self.lock().await.any_market_open()
    }

    async fn poll(&self) -> bool {
        let (job, backend) = {
            let engine = self.lock().await;
            (engine.poll_job(), engine.backend())
        };
        let outcome = job.run(backend.as_ref()).await;

        let mut engine = self.lock().await;
        let changed = engine.apply_poll(outcome);
        tracing::debug!("Live poll repriced {} positions", changed);
        engine.any_market_open()
    }
}
