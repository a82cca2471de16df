pub mod api;
pub mod position;
pub mod price;
pub mod settings;
pub mod snapshot;
pub mod valuation;
