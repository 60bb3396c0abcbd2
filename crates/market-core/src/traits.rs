use async_trait::async_trait;
use crate::{MarketError, Quote};

/// Source of point-in-time quotes for a single symbol.
///
/// Implementations report every failure as `Err`; degrading to cached or
/// missing data is the caller's decision.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError>;
}
