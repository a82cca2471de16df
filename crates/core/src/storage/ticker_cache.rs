use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::price::{HistoricalCacheRecord, PricePoint};

use super::kv::KeyValueStore;

/// Diagnostics for the ticker cache relative to the active position set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub cached_count: usize,
    pub active_count: usize,
    /// True when every cached ticker is still held.
    pub is_valid: bool,
    pub stale_count: usize,
}

/// The single owner of per-ticker price history.
///
/// Keeps an in-memory map mirrored to one persisted entry (`ticker → record`
/// JSON object). Writes go to memory first, then storage; a storage failure
/// is logged and the memory copy stays authoritative for the session.
pub struct TickerCacheStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    records: BTreeMap<String, HistoricalCacheRecord>,
}

impl std::fmt::Debug for TickerCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerCacheStore")
            .field("key", &self.key)
            .field("tickers", &self.records.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TickerCacheStore {
    /// Load the cache from storage. Missing or corrupt data yields an empty cache.
    pub fn load(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let records = match store.get(&key) {
            Ok(Some(json)) => match serde_json::from_str::<BTreeMap<String, HistoricalCacheRecord>>(&json) {
                Ok(records) => records
                    .into_iter()
                    .map(|(ticker, record)| (ticker.to_uppercase(), record))
                    .collect(),
                Err(e) => {
                    tracing::warn!("Ticker cache '{}' is corrupt, starting empty: {}", key, e);
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Ticker cache '{}' could not be read, starting empty: {}", key, e);
                BTreeMap::new()
            }
        };
        tracing::debug!("Loaded {} cached tickers from '{}'", records.len(), key);
        Self { store, key, records }
    }

    pub fn get(&self, ticker: &str) -> Option<&HistoricalCacheRecord> {
        self.records.get(&ticker.to_uppercase())
    }

    /// Insert or overwrite a ticker's record and persist.
    pub fn set(&mut self, ticker: &str, record: HistoricalCacheRecord) {
        self.records.insert(ticker.to_uppercase(), record);
        self.persist_logged();
    }

    /// Remove a ticker's record and persist. Absent tickers are a silent no-op.
    pub fn remove(&mut self, ticker: &str) {
        if self.records.remove(&ticker.to_uppercase()).is_some() {
            self.persist_logged();
        }
    }

    /// Drop every cached ticker that is not in `active_tickers`.
    /// Returns whether anything was removed; storage is only touched if so.
    pub fn validate_and_clean(&mut self, active_tickers: &[String]) -> bool {
        let active: HashSet<String> = active_tickers.iter().map(|t| t.to_uppercase()).collect();
        let before = self.records.len();
        self.records.retain(|ticker, _| active.contains(ticker));
        let removed = before - self.records.len();
        if removed > 0 {
            tracing::info!("Removed {} orphaned tickers from cache", removed);
            self.persist_logged();
        }
        removed > 0
    }

    pub fn get_stats(&self, active_tickers: &[String]) -> CacheStats {
        let active: HashSet<String> = active_tickers.iter().map(|t| t.to_uppercase()).collect();
        let stale_count = self
            .records
            .keys()
            .filter(|ticker| !active.contains(*ticker))
            .count();
        CacheStats {
            cached_count: self.records.len(),
            active_count: active.len(),
            is_valid: stale_count == 0,
            stale_count,
        }
    }

    /// Cached close series for a ticker (empty if not cached).
    pub fn price_series(&self, ticker: &str) -> &[PricePoint] {
        self.get(ticker).map(|r| r.prices.as_slice()).unwrap_or(&[])
    }

    pub fn tickers(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the whole map to storage.
    pub fn persist(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.records)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize ticker cache: {e}")))?;
        self.store.set(&self.key, &json)
    }

    fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!("Ticker cache write failed, keeping memory copy: {}", e);
        }
    }
}
