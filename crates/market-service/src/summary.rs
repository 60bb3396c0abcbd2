use futures_util::future::join_all;
use market_core::{MarketSummary, Quote};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::QuoteCache;

/// Number of quotes reported under `most_active`
pub const MOST_ACTIVE_LIMIT: usize = 5;

pub struct MarketSummaryAggregator {
    cache: Arc<QuoteCache>,
}

impl MarketSummaryAggregator {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self { cache }
    }

    /// Fetch every symbol of the universe and partition the results.
    pub async fn summarize(&self, universe: &[String]) -> MarketSummary {
        let lookups = join_all(universe.iter().map(|s| self.cache.get(s))).await;
        let quotes: Vec<Quote> = lookups.into_iter().filter_map(|l| l.into_quote()).collect();

        if quotes.len() < universe.len() {
            tracing::debug!(
                "Market summary: {} of {} symbols unavailable",
                universe.len() - quotes.len(),
                universe.len()
            );
        }

        let mut summary = summarize_quotes(quotes);
        summary.total_symbols = universe.len();
        summary
    }
}

/// Partition quotes into gainers (`change > 0`) and losers, and rank the
/// largest absolute movers. Ties keep input order.
pub fn summarize_quotes(quotes: Vec<Quote>) -> MarketSummary {
    let (gainers, losers): (Vec<Quote>, Vec<Quote>) =
        quotes.iter().cloned().partition(|q| q.change > 0.0);

    let mut most_active = quotes.clone();
    most_active.sort_by(|a, b| {
        b.change
            .abs()
            .partial_cmp(&a.change.abs())
            .unwrap_or(Ordering::Equal)
    });
    most_active.truncate(MOST_ACTIVE_LIMIT);

    MarketSummary {
        total_symbols: quotes.len(),
        gainers,
        losers,
        most_active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;
    use chrono::Duration;

    fn quote(symbol: &str, change: f64) -> Quote {
        let mut q = MockProvider::quote(symbol, 100.0);
        q.change = change;
        q
    }

    fn symbols(quotes: &[Quote]) -> Vec<&str> {
        quotes.iter().map(|q| q.symbol.as_str()).collect()
    }

    #[test]
    fn test_partition_treats_zero_as_loser() {
        let summary = summarize_quotes(vec![quote("A", 2.0), quote("B", -1.0), quote("C", 0.0)]);

        assert_eq!(symbols(&summary.gainers), vec!["A"]);
        assert_eq!(symbols(&summary.losers), vec!["B", "C"]);
        assert_eq!(symbols(&summary.most_active), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_most_active_is_top_five_by_magnitude_with_stable_ties() {
        let summary = summarize_quotes(vec![
            quote("A", 0.5),
            quote("B", -3.0),
            quote("C", 3.0),
            quote("D", 1.0),
            quote("E", -0.1),
            quote("F", 2.0),
            quote("G", -1.0),
        ]);

        assert_eq!(symbols(&summary.most_active), vec!["B", "C", "F", "D", "G"]);
    }

    #[tokio::test]
    async fn test_summarize_drops_unavailable_symbols() {
        let provider = Arc::new(MockProvider::with_changes(&[("AAPL", 1.5), ("MSFT", -0.4)]));
        let cache = Arc::new(QuoteCache::with_settings(
            provider.clone(),
            Duration::minutes(10),
            64,
        ));
        let aggregator = MarketSummaryAggregator::new(cache);

        let universe: Vec<String> = ["AAPL", "MSFT", "GONE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let summary = aggregator.summarize(&universe).await;

        assert_eq!(summary.total_symbols, 3);
        assert_eq!(symbols(&summary.gainers), vec!["AAPL"]);
        assert_eq!(symbols(&summary.losers), vec!["MSFT"]);
        assert_eq!(summary.most_active.len(), 2);
        assert_eq!(provider.calls(), 3);
    }
}
