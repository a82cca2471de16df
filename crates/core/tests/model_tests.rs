// ═══════════════════════════════════════════════════════════════════
// Model Tests — Position, HistoricalCacheRecord, wire DTOs,
// DashboardSnapshot, EngineSettings
// ═══════════════════════════════════════════════════════════════════

use chrono::{Duration, NaiveDate, TimeZone, Utc};

use portfolio_sync_core::errors::CoreError;
use portfolio_sync_core::models::api::{InstantQuote, LastSyncResponse, PriceHistory};
use portfolio_sync_core::models::position::{active_tickers, earliest_purchase_date, Position};
use portfolio_sync_core::models::price::{price_on_or_before, HistoricalCacheRecord, PricePoint};
use portfolio_sync_core::models::settings::{EngineSettings, MAX_SNAPSHOT_AGE_HOURS};
use portfolio_sync_core::models::snapshot::DashboardSnapshot;

fn make_date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Position
// ═══════════════════════════════════════════════════════════════════

mod position {
    use super::*;

    #[test]
    fn new_uppercases_and_defaults_company_name() {
        let p = Position::new("  aapl ", 10.0, 150.0, make_date(2024, 1, 1));
        assert_eq!(p.ticker, "AAPL");
        assert_eq!(p.company_name, "AAPL");
    }

    #[test]
    fn serializes_camel_case() {
        let p = Position::new("MSFT", 2.0, 300.0, make_date(2024, 3, 5))
            .with_company_name("Microsoft Corporation");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["ticker"], "MSFT");
        assert_eq!(json["purchasePrice"], 300.0);
        assert_eq!(json["purchaseDate"], "2024-03-05");
        assert_eq!(json["companyName"], "Microsoft Corporation");
        assert!(json.get("addedAt").is_some());
        assert!(json.get("purchase_price").is_none());
    }

    #[test]
    fn deserializes_without_company_name() {
        let json = r#"{
            "ticker": "NVDA",
            "shares": 1.5,
            "purchasePrice": 420.0,
            "purchaseDate": "2024-02-01",
            "addedAt": "2024-02-01T10:00:00Z"
        }"#;
        let p: Position = serde_json::from_str(json).unwrap();
        assert_eq!(p.ticker, "NVDA");
        assert_eq!(p.company_name, "");
    }

    #[test]
    fn active_tickers_sorted_and_deduped() {
        let positions = vec![
            Position::new("MSFT", 1.0, 1.0, make_date(2024, 1, 1)),
            Position::new("AAPL", 1.0, 1.0, make_date(2024, 1, 1)),
            Position::new("MSFT", 2.0, 1.0, make_date(2024, 2, 1)),
        ];
        assert_eq!(active_tickers(&positions), vec!["AAPL", "MSFT"]);
        assert!(active_tickers(&[]).is_empty());
    }

    #[test]
    fn earliest_purchase_date_across_shared_ticker() {
        let positions = vec![
            Position::new("MSFT", 1.0, 1.0, make_date(2024, 5, 1)),
            Position::new("MSFT", 2.0, 1.0, make_date(2024, 2, 1)),
        ];
        assert_eq!(
            earliest_purchase_date(&positions, "MSFT"),
            Some(make_date(2024, 2, 1))
        );
        assert_eq!(earliest_purchase_date(&positions, "AAPL"), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
// HistoricalCacheRecord
// ═══════════════════════════════════════════════════════════════════

mod cache_record {
    use super::*;

    #[test]
    fn new_sorts_and_dedups_by_date() {
        let record = HistoricalCacheRecord::new(
            make_date(2024, 1, 1),
            vec![
                PricePoint::new(make_date(2024, 1, 3), 103.0),
                PricePoint::new(make_date(2024, 1, 1), 100.0),
                PricePoint::new(make_date(2024, 1, 3), 104.0),
            ],
            make_date(2024, 1, 3),
            false,
        );
        let dates: Vec<NaiveDate> = record.prices.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![make_date(2024, 1, 1), make_date(2024, 1, 3)]);
        // Same-day point replaces the earlier one
        assert_eq!(record.last_close(), Some(104.0));
    }

    #[test]
    fn merge_inserts_in_order() {
        let mut record = HistoricalCacheRecord::new(
            make_date(2024, 1, 1),
            vec![
                PricePoint::new(make_date(2024, 1, 1), 100.0),
                PricePoint::new(make_date(2024, 1, 5), 105.0),
            ],
            make_date(2024, 1, 5),
            false,
        );
        record.merge_prices(&[
            PricePoint::new(make_date(2024, 1, 3), 103.0),
            PricePoint::new(make_date(2024, 1, 8), 108.0),
        ]);
        let closes: Vec<f64> = record.prices.iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![100.0, 103.0, 105.0, 108.0]);
        assert_eq!(record.last_price_date(), Some(make_date(2024, 1, 8)));
    }

    #[test]
    fn legacy_record_without_flags_parses() {
        let json = r#"{
            "purchaseDate": "2024-01-01",
            "prices": [{"date": "2024-01-01", "close": 150.0}],
            "lastUpdated": "2024-01-02"
        }"#;
        let record: HistoricalCacheRecord = serde_json::from_str(json).unwrap();
        assert!(!record.limited_data);
        assert!(!record.error);
        assert!(record.matches_purchase_date(make_date(2024, 1, 1)));
        assert!(!record.matches_purchase_date(make_date(2024, 1, 2)));
    }

    #[test]
    fn price_on_or_before_lookup() {
        let series = vec![
            PricePoint::new(make_date(2024, 1, 1), 150.0),
            PricePoint::new(make_date(2024, 6, 1), 180.0),
        ];
        assert_eq!(price_on_or_before(&series, make_date(2023, 12, 31)), None);
        assert_eq!(price_on_or_before(&series, make_date(2024, 1, 1)), Some(150.0));
        assert_eq!(price_on_or_before(&series, make_date(2024, 3, 15)), Some(150.0));
        assert_eq!(price_on_or_before(&series, make_date(2024, 6, 1)), Some(180.0));
        assert_eq!(price_on_or_before(&series, make_date(2025, 1, 1)), Some(180.0));
        assert_eq!(price_on_or_before(&[], make_date(2025, 1, 1)), None);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Wire DTOs
// ═══════════════════════════════════════════════════════════════════

mod wire {
    use super::*;

    #[test]
    fn instant_quote_with_nulls() {
        let json = r#"{"current_price": null, "last_close": {"close": 187.5}, "market_open": false, "company_name": null}"#;
        let quote: InstantQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.current_price, None);
        assert_eq!(quote.resolved_price(), Some(187.5));
        assert!(!quote.market_open);
    }

    #[test]
    fn instant_quote_missing_last_close() {
        let json = r#"{"current_price": 0.0, "market_open": true}"#;
        let quote: InstantQuote = serde_json::from_str(json).unwrap();
        assert!(quote.last_close.is_none());
        // Zero is not a usable price
        assert_eq!(quote.resolved_price(), None);
        assert!(quote.market_open);
    }

    #[test]
    fn instant_quote_prefers_live_price() {
        let json = r#"{"current_price": 190.25, "last_close": {"close": 187.5}, "market_open": true}"#;
        let quote: InstantQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.resolved_price(), Some(190.25));
    }

    #[test]
    fn instant_quote_last_close_without_close_field() {
        let json = r#"{"current_price": null, "last_close": {}}"#;
        let quote: InstantQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.resolved_price(), None);
    }

    #[test]
    fn last_sync_with_null_dates() {
        let json = r#"{"last_sync": {"AAPL": "2024-06-01", "NEW": null}}"#;
        let response: LastSyncResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.last_sync["AAPL"], Some(make_date(2024, 6, 1)));
        assert_eq!(response.last_sync["NEW"], None);
    }

    #[test]
    fn price_history_defaults() {
        let history: PriceHistory = serde_json::from_str(r#"{"prices": []}"#).unwrap();
        assert!(history.prices.is_empty());
        assert!(!history.limited_data);
    }
}

// ═══════════════════════════════════════════════════════════════════
// DashboardSnapshot
// ═══════════════════════════════════════════════════════════════════

mod snapshot {
    use super::*;

    #[test]
    fn expiry_boundary() {
        let mut snapshot = DashboardSnapshot::new(Vec::new(), Vec::new());
        snapshot.timestamp = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let max_age = Duration::hours(24);

        let exactly = Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap();
        assert!(!snapshot.is_expired(exactly, max_age));

        let later = exactly + Duration::seconds(1);
        assert!(snapshot.is_expired(later, max_age));
    }

    #[test]
    fn serializes_camel_case() {
        let snapshot = DashboardSnapshot::new(Vec::new(), Vec::new());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("enrichedPositions").is_some());
        assert!(json.get("chartHistory").is_some());
        assert!(json.get("timestamp").is_some());
    }
}

// ═══════════════════════════════════════════════════════════════════
// EngineSettings
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.batch_width, 4);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.initial_backoff_ms, 1000);
        assert_eq!(s.poll_interval_secs, 60);
        assert_eq!(s.snapshot_max_age_hours, 24);
        assert_eq!(s.history_window_months, 6);
        assert_eq!(s.max_positions, 60);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s = EngineSettings::from_json(r#"{"base_url": "https://api.example.com", "portfolio_id": "p-1"}"#)
            .unwrap();
        assert_eq!(s.base_url, "https://api.example.com");
        assert_eq!(s.portfolio_id, "p-1");
        assert_eq!(s.batch_width, 4);
    }

    #[test]
    fn rejects_zero_width() {
        let err = EngineSettings::from_json(r#"{"batch_width": 0}"#).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn rejects_shared_storage_keys() {
        let err = EngineSettings::from_json(r#"{"ticker_cache_key": "same", "snapshot_key": "same"}"#)
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn rejects_snapshot_age_out_of_range() {
        for hours in [0, -1, MAX_SNAPSHOT_AGE_HOURS + 1, i64::MAX] {
            let json = format!(r#"{{"snapshot_max_age_hours": {hours}}}"#);
            let err = EngineSettings::from_json(&json).unwrap_err();
            assert!(matches!(err, CoreError::Config(_)), "accepted {hours}");
        }
        let s = EngineSettings::from_json(&format!(r#"{{"snapshot_max_age_hours": {MAX_SNAPSHOT_AGE_HOURS}}}"#))
            .unwrap();
        assert_eq!(s.snapshot_max_age_hours, MAX_SNAPSHOT_AGE_HOURS);
    }

    #[test]
    fn rejects_malformed_json() {
        let err = EngineSettings::from_json("{ nope").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"poll_interval_secs": 30}"#).unwrap();
        let s = EngineSettings::load_from_file(&path).unwrap();
        assert_eq!(s.poll_interval_secs, 30);
    }

    #[test]
    fn load_from_missing_file() {
        let err = EngineSettings::load_from_file("/no/such/engine.json").unwrap_err();
        assert!(matches!(err, CoreError::FileIO(_)));
    }
}
