use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

/// Tunables for the sync engine. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Backend API root, e.g. "https://example.com/api"
    pub base_url: String,

    /// Portfolio the position list is saved under.
    pub portfolio_id: String,

    /// Maximum requests in flight per batch group.
    pub batch_width: usize,

    /// Retries after the first attempt on HTTP 429 / network failure.
    pub max_retries: u32,

    /// First backoff delay; doubled after every retry.
    pub initial_backoff_ms: u64,

    pub request_timeout_secs: u64,

    /// Live price refresh period while any market is open.
    pub poll_interval_secs: u64,

    pub snapshot_max_age_hours: i64,

    /// How far back a full history fetch reaches.
    pub history_window_months: u32,

    pub max_positions: usize,

    /// Storage key of the unified ticker cache.
    pub ticker_cache_key: String,

    /// Storage key of the dashboard snapshot.
    pub snapshot_key: String,
}

/// Upper bound for `snapshot_max_age_hours` (one year).
pub const MAX_SNAPSHOT_AGE_HOURS: i64 = 24 * 365;

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            portfolio_id: String::new(),
            batch_width: 4,
            max_retries: 3,
            initial_backoff_ms: 1000,
            request_timeout_secs: 30,
            poll_interval_secs: 60,
            snapshot_max_age_hours: 24,
            history_window_months: 6,
            max_positions: 60,
            ticker_cache_key: "portfolio_ticker_cache".to_string(),
            snapshot_key: "portfolio_dashboard_snapshot".to_string(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from JSON and validate them.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::Config(format!("Invalid settings JSON: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file on disk.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::Config("base_url must not be empty".into()));
        }
        if self.batch_width == 0 {
            return Err(CoreError::Config("batch_width must be at least 1".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(CoreError::Config("poll_interval_secs must be at least 1".into()));
        }
        if !(1..=MAX_SNAPSHOT_AGE_HOURS).contains(&self.snapshot_max_age_hours) {
            return Err(CoreError::Config(format!(
                "snapshot_max_age_hours must be between 1 and {MAX_SNAPSHOT_AGE_HOURS}"
            )));
        }
        if self.max_positions == 0 {
            return Err(CoreError::Config("max_positions must be at least 1".into()));
        }
        if self.ticker_cache_key == self.snapshot_key {
            return Err(CoreError::Config(
                "ticker_cache_key and snapshot_key must differ".into(),
            ));
        }
        Ok(())
    }
}
