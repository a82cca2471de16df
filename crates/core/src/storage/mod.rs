pub mod kv;
pub mod snapshot_cache;
pub mod ticker_cache;
