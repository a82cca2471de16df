use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::snapshot::DashboardSnapshot;
use crate::models::valuation::{ChartPoint, EnrichedPosition};

use super::kv::KeyValueStore;

/// Whole-dashboard snapshot persisted for instant first paint.
pub struct DashboardSnapshotCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_age: Duration,
}

impl DashboardSnapshotCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, max_age: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            max_age,
        }
    }

    /// Load the snapshot if present, parsable, and younger than the max age.
    pub fn load(&self) -> Option<DashboardSnapshot> {
        self.load_at(Utc::now())
    }

    pub fn load_at(&self, now: DateTime<Utc>) -> Option<DashboardSnapshot> {
        let json = match self.store.get(&self.key) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Dashboard snapshot could not be read: {}", e);
                return None;
            }
        };
        let snapshot: DashboardSnapshot = match serde_json::from_str(&json) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::debug!("Ignoring unparsable dashboard snapshot: {}", e);
                return None;
            }
        };
        if snapshot.is_expired(now, self.max_age) {
            tracing::debug!("Dashboard snapshot from {} has expired", snapshot.timestamp);
            return None;
        }
        Some(snapshot)
    }

    /// Overwrite the snapshot. On failure the existing entry is deleted so a
    /// stale or partial snapshot never outlives a failed write.
    pub fn save(&self, enriched_positions: &[EnrichedPosition], chart_history: &[ChartPoint]) {
        let snapshot = DashboardSnapshot::new(enriched_positions.to_vec(), chart_history.to_vec());
        if let Err(e) = self.write(&snapshot) {
            tracing::warn!("Dashboard snapshot write failed, clearing entry: {}", e);
            self.invalidate();
        }
    }

    /// Delete the snapshot (mutations that change the position set).
    pub fn invalidate(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            tracing::warn!("Dashboard snapshot could not be removed: {}", e);
        }
    }

    fn write(&self, snapshot: &DashboardSnapshot) -> Result<(), CoreError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize snapshot: {e}")))?;
        self.store.set(&self.key, &json)
    }
}
