use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::CoreError;
use crate::models::api::{
    ErrorBody, InstantQuote, LastSyncRequest, LastSyncResponse, PriceHistory, Quote,
    SavePortfolioRequest, SavePortfolioResponse,
};
use crate::models::position::Position;
use crate::models::settings::EngineSettings;

use super::traits::{ApiRequest, ApiResponse, PortfolioBackend, Transport};
use super::transport::{ReqwestTransport, RetryPolicy, RetryingTransport};

/// HTTP client for the portfolio backend. Every call goes through the
/// retrying transport, so rate limits and transient failures are absorbed
/// before they reach the engine.
pub struct HttpBackend<T = ReqwestTransport> {
    transport: RetryingTransport<T>,
}

impl HttpBackend<ReqwestTransport> {
    pub fn new(settings: &EngineSettings) -> Self {
        let transport = ReqwestTransport::new(
            settings.base_url.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        );
        Self::with_transport(transport, retry_policy(settings))
    }
}

impl<T: Transport> HttpBackend<T> {
    pub fn with_transport(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport: RetryingTransport::new(transport, policy),
        }
    }

    async fn fetch<R: DeserializeOwned>(&self, endpoint: &str, request: ApiRequest) -> Result<R, CoreError> {
        let response = self.transport.call(&request).await?;
        decode(endpoint, &response)
    }
}

/// Retry policy described by the settings.
pub fn retry_policy(settings: &EngineSettings) -> RetryPolicy {
    RetryPolicy {
        max_retries: settings.max_retries,
        initial_delay: Duration::from_millis(settings.initial_backoff_ms),
    }
}

/// Map a raw response to a typed body or the matching error.
fn decode<R: DeserializeOwned>(endpoint: &str, response: &ApiResponse) -> Result<R, CoreError> {
    if response.is_rate_limited() {
        return Err(CoreError::RateLimited {
            endpoint: endpoint.to_string(),
        });
    }
    if !response.is_success() {
        let message = serde_json::from_str::<ErrorBody>(&response.body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| response.body.chars().take(200).collect());
        return Err(CoreError::Api {
            endpoint: endpoint.to_string(),
            status: response.status,
            message,
        });
    }
    response.json().map_err(|e| {
        CoreError::Deserialization(format!("Failed to parse {endpoint} response: {e}"))
    })
}

/// Uppercase a ticker and reject anything unsafe to place in a URL path.
pub fn normalize_ticker(ticker: &str) -> Result<String, CoreError> {
    let ticker = ticker.trim().to_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= 12
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '^');
    if valid {
        Ok(ticker)
    } else {
        Err(CoreError::InvalidTicker(ticker))
    }
}

#[async_trait]
impl<T: Transport> PortfolioBackend for HttpBackend<T> {
    async fn last_sync(&self, tickers: &[String]) -> Result<HashMap<String, NaiveDate>, CoreError> {
        let body = serde_json::to_value(LastSyncRequest { tickers })
            .map_err(|e| CoreError::Serialization(e.to_string()))?;
        let response: LastSyncResponse = self
            .fetch("portfolio/last-sync", ApiRequest::post("/portfolio/last-sync", body))
            .await?;
        Ok(response
            .last_sync
            .into_iter()
            .filter_map(|(ticker, date)| date.map(|d| (ticker.to_uppercase(), d)))
            .collect())
    }

    async fn instant_quote(&self, ticker: &str) -> Result<InstantQuote, CoreError> {
        let ticker = normalize_ticker(ticker)?;
        self.fetch("stock/instant", ApiRequest::get(format!("/stock/{ticker}/instant")))
            .await
    }

    async fn price_history(&self, ticker: &str, from_date: NaiveDate) -> Result<PriceHistory, CoreError> {
        let ticker = normalize_ticker(ticker)?;
        let request = ApiRequest::get(format!("/stock/{ticker}/history"))
            .with_query("from_date", from_date.format("%Y-%m-%d").to_string());
        let mut history: PriceHistory = self.fetch("stock/history", request).await?;
        history.prices.sort_by_key(|p| p.date);
        Ok(history)
    }

    async fn quote(&self, ticker: &str) -> Result<Quote, CoreError> {
        let ticker = normalize_ticker(ticker)?;
        self.fetch("stock", ApiRequest::get(format!("/stock/{ticker}")))
            .await
    }

    async fn save_portfolio(
        &self,
        portfolio_id: &str,
        positions: &[Position],
        cached_return_percentage: f64,
    ) -> Result<(), CoreError> {
        let body = serde_json::to_value(SavePortfolioRequest {
            positions,
            portfolio_id,
            cached_return_percentage,
        })
        .map_err(|e| CoreError::Serialization(e.to_string()))?;
        let response: SavePortfolioResponse = self
            .fetch("portfolio/save", ApiRequest::post("/portfolio/save", body))
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(CoreError::PersistenceFailed(
                response
                    .error
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            ))
        }
    }

    async fn delete_historical(&self, ticker: &str) -> Result<(), CoreError> {
        let ticker = normalize_ticker(ticker)?;
        let response = self
            .transport
            .call(&ApiRequest::delete(format!("/portfolio/delete-historical/{ticker}")))
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(CoreError::Api {
                endpoint: "portfolio/delete-historical".into(),
                status: response.status,
                message: response.body.chars().take(200).collect(),
            })
        }
    }
}
