use chrono::NaiveDate;
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::position::{NewPosition, Position, PositionEdit};
use crate::providers::http_backend::normalize_ticker;
use crate::providers::traits::PortfolioBackend;
use crate::storage::snapshot_cache::DashboardSnapshotCache;
use crate::storage::ticker_cache::TickerCacheStore;

/// Engine state a mutation may touch.
pub struct MutationContext<'a> {
    pub positions: &'a mut Vec<Position>,
    pub ticker_cache: &'a mut TickerCacheStore,
    pub snapshot_cache: &'a DashboardSnapshotCache,
    pub backend: Arc<dyn PortfolioBackend>,
    pub portfolio_id: &'a str,
    /// Aggregate return % sent along with every save.
    pub cached_return_percentage: f64,
}

impl MutationContext<'_> {
    async fn save(&self) -> Result<(), CoreError> {
        self.backend
            .save_portfolio(self.portfolio_id, self.positions.as_slice(), self.cached_return_percentage)
            .await
            .map_err(|e| match e {
                CoreError::PersistenceFailed(_) => e,
                other => CoreError::PersistenceFailed(other.to_string()),
            })
    }
}

/// Applies add/edit/delete optimistically, persists the position list, and
/// rolls local state back when the backend rejects the save.
pub struct MutationService {
    max_positions: usize,
}

impl MutationService {
    pub fn new(max_positions: usize) -> Self {
        Self { max_positions }
    }

    /// Add a position after validating it and looking the ticker up.
    /// Returns the index of the new position.
    pub async fn add_position(
        &self,
        mut ctx: MutationContext<'_>,
        new: NewPosition,
        today: NaiveDate,
    ) -> Result<usize, CoreError> {
        if ctx.positions.len() >= self.max_positions {
            return Err(CoreError::PositionLimitReached(self.max_positions));
        }
        let ticker = normalize_ticker(&new.ticker)?;
        self.validate_quantities(new.shares, new.purchase_price, new.purchase_date, today)?;

        let quote = ctx.backend.quote(&ticker).await.map_err(|e| match e {
            CoreError::Api { status, .. } if (400..500).contains(&status) => {
                CoreError::InvalidTicker(ticker.clone())
            }
            CoreError::Deserialization(_) => CoreError::InvalidTicker(ticker.clone()),
            other => other,
        })?;
        if !quote.current_price.is_some_and(|p| p.is_finite() && p > 0.0) {
            return Err(CoreError::InvalidTicker(ticker));
        }
        let company_name = quote
            .company_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ticker.clone());

        let position = Position::new(ticker, new.shares, new.purchase_price, new.purchase_date)
            .with_company_name(company_name);
        ctx.positions.push(position);
        ctx.snapshot_cache.invalidate();

        if let Err(e) = ctx.save().await {
            ctx.positions.pop();
            ctx.snapshot_cache.invalidate();
            return Err(e);
        }
        Ok(ctx.positions.len() - 1)
    }

    /// Edit shares/price/date of a position. A changed purchase date drops
    /// the ticker's cached history at once, since the whole series depends on it.
    pub async fn edit_position(
        &self,
        mut ctx: MutationContext<'_>,
        index: usize,
        edit: PositionEdit,
        today: NaiveDate,
    ) -> Result<(), CoreError> {
        if index >= ctx.positions.len() {
            return Err(CoreError::PositionNotFound(index));
        }
        self.validate_quantities(edit.shares, edit.purchase_price, edit.purchase_date, today)?;

        let previous = ctx.positions[index].clone();
        let mut dropped = None;
        if previous.purchase_date != edit.purchase_date {
            tracing::info!(
                "Purchase date of {} changed, invalidating cached history",
                previous.ticker
            );
            dropped = ctx.ticker_cache.get(&previous.ticker).cloned();
            ctx.ticker_cache.remove(&previous.ticker);
        }

        let position = &mut ctx.positions[index];
        position.shares = edit.shares;
        position.purchase_price = edit.purchase_price;
        position.purchase_date = edit.purchase_date;
        ctx.snapshot_cache.invalidate();

        if let Err(e) = ctx.save().await {
            tracing::warn!("Edit of {} rolled back: {}", previous.ticker, e);
            if let Some(record) = dropped {
                ctx.ticker_cache.set(&previous.ticker, record);
            }
            ctx.positions[index] = previous;
            ctx.snapshot_cache.invalidate();
            return Err(e);
        }
        Ok(())
    }

    /// Delete a position.
    ///
    /// Cache eviction and the backend history cleanup only happen after the
    /// save succeeds and no remaining position shares the ticker. The cleanup
    /// runs detached and is not awaited. On failure the position is
    /// reinserted at its original index.
    pub async fn delete_position(
        &self,
        mut ctx: MutationContext<'_>,
        index: usize,
    ) -> Result<Position, CoreError> {
        if index >= ctx.positions.len() {
            return Err(CoreError::PositionNotFound(index));
        }

        let removed = ctx.positions.remove(index);
        ctx.snapshot_cache.invalidate();

        if let Err(e) = ctx.save().await {
            tracing::warn!("Delete of {} rolled back: {}", removed.ticker, e);
            ctx.positions.insert(index, removed);
            ctx.snapshot_cache.invalidate();
            return Err(e);
        }

        let still_held = ctx.positions.iter().any(|p| p.ticker == removed.ticker);
        if !still_held {
            ctx.ticker_cache.remove(&removed.ticker);
            let backend = ctx.backend.clone();
            let ticker = removed.ticker.clone();
            tokio::spawn(async move {
                if let Err(e) = backend.delete_historical(&ticker).await {
                    tracing::warn!("Backend history cleanup for {} failed (ignored): {}", ticker, e);
                }
            });
        }
        Ok(removed)
    }

    /// Rules:
    /// - Shares and purchase price must be finite and positive
    /// - Purchase date at most one day ahead (timezone tolerance)
    pub fn validate_quantities(
        &self,
        shares: f64,
        purchase_price: f64,
        purchase_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), CoreError> {
        if !shares.is_finite() || shares <= 0.0 {
            return Err(CoreError::ValidationError("Shares must be positive".into()));
        }
        if !purchase_price.is_finite() || purchase_price <= 0.0 {
            return Err(CoreError::ValidationError(
                "Purchase price must be positive".into(),
            ));
        }
        if let Some(tomorrow) = today.succ_opt() {
            if purchase_date > tomorrow {
                return Err(CoreError::ValidationError(format!(
                    "Purchase date {purchase_date} is in the future"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MutationService {
    fn default() -> Self {
        Self::new(60)
    }
}
