use crate::models::valuation::{ChartPoint, EnrichedPosition, PortfolioTotals};

/// Presentation sink for the dashboard.
///
/// The engine calls `render` after every state change it wants shown: the
/// snapshot paint, each committed resync, each poll that changed a price and
/// each mutation. Implementations must not block.
pub trait Renderer: Send + Sync {
    fn render(&self, positions: &[EnrichedPosition], chart: &[ChartPoint], totals: &PortfolioTotals);
}

/// Discards every frame. Useful for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&self, _positions: &[EnrichedPosition], _chart: &[ChartPoint], _totals: &PortfolioTotals) {}
}
