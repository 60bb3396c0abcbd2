use market_core::{Bar, Holding, MarketSummary, PortfolioValuation, QuoteLookup, DEFAULT_SYMBOLS};
use std::sync::Arc;

pub mod cache;
pub mod summary;
pub mod valuation;

pub use cache::QuoteCache;
pub use summary::{summarize_quotes, MarketSummaryAggregator};
pub use valuation::{value_holding, PortfolioValuator};

/// Facade over the quote cache used by the HTTP layer.
///
/// Owns the shared [`QuoteCache`] and the symbol universe used for market
/// summaries. Construct one per process and inject it; tests build their own.
pub struct MarketDataService {
    cache: Arc<QuoteCache>,
    symbols: Vec<String>,
    valuator: PortfolioValuator,
    aggregator: MarketSummaryAggregator,
}

impl MarketDataService {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self::with_symbols(cache, DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_symbols(cache: Arc<QuoteCache>, symbols: Vec<String>) -> Self {
        Self {
            valuator: PortfolioValuator::new(cache.clone()),
            aggregator: MarketSummaryAggregator::new(cache.clone()),
            cache,
            symbols,
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub async fn get_quote(&self, symbol: &str) -> QuoteLookup {
        self.cache.get(symbol).await
    }

    /// Historical bars are not wired to a provider yet; always empty.
    pub async fn get_historical(&self, symbol: &str, days: u32) -> Vec<Bar> {
        tracing::debug!("Historical data requested for {} ({} days): not available", symbol, days);
        Vec::new()
    }

    pub async fn get_summary(&self) -> MarketSummary {
        self.aggregator.summarize(&self.symbols).await
    }

    pub async fn get_portfolio_value(&self, holdings: &[Holding]) -> PortfolioValuation {
        self.valuator.value(holdings).await
    }
}
