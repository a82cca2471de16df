use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::valuation::{ChartPoint, EnrichedPosition};

/// Last fully rendered dashboard state, cached for instant cold-start paint.
///
/// A hint only: every paint from a snapshot is followed by a fresh fetch that
/// overwrites both the rendered state and the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub enriched_positions: Vec<EnrichedPosition>,
    pub chart_history: Vec<ChartPoint>,
    pub timestamp: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn new(enriched_positions: Vec<EnrichedPosition>, chart_history: Vec<ChartPoint>) -> Self {
        Self {
            enriched_positions,
            chart_history,
            timestamp: Utc::now(),
        }
    }

    /// Whether the snapshot is older than `max_age` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.timestamp > max_age
    }
}
