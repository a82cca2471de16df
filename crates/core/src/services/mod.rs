pub mod batch_fetcher;
pub mod live_poller;
pub mod mutation_service;
pub mod sync_planner;
pub mod sync_service;
pub mod valuation_service;
