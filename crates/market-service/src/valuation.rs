use futures_util::future::join_all;
use market_core::{round2, Holding, HoldingValuation, PortfolioValuation, QuoteLookup, QuoteStatus};
use std::collections::HashMap;
use std::sync::Arc;

use crate::QuoteCache;

/// Values holdings against current quotes.
///
/// Holdings without a usable price keep their place in the output with every
/// derived field set to `None` and do not count towards the total.
pub struct PortfolioValuator {
    cache: Arc<QuoteCache>,
}

impl PortfolioValuator {
    pub fn new(cache: Arc<QuoteCache>) -> Self {
        Self { cache }
    }

    pub async fn value(&self, holdings: &[Holding]) -> PortfolioValuation {
        // One lookup per distinct symbol, all in flight together
        let mut symbols: Vec<String> = Vec::new();
        for holding in holdings {
            let symbol = holding.symbol.trim().to_uppercase();
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let lookups = join_all(symbols.iter().map(|s| self.cache.get(s))).await;
        let quotes: HashMap<String, QuoteLookup> = symbols.into_iter().zip(lookups).collect();

        let valued: Vec<HoldingValuation> = holdings
            .iter()
            .map(|holding| {
                let lookup = quotes.get(&holding.symbol.trim().to_uppercase());
                value_holding(holding, lookup)
            })
            .collect();

        let total: f64 = valued.iter().filter_map(|h| h.current_value).sum();

        PortfolioValuation {
            total_value: round2(total),
            holdings: valued,
        }
    }
}

/// Value one holding against an (optional) lookup result.
pub fn value_holding(holding: &Holding, lookup: Option<&QuoteLookup>) -> HoldingValuation {
    let price = lookup.and_then(|l| l.quote()).and_then(|q| q.price);

    match price {
        Some(price) => {
            let current_value = price * holding.quantity;
            let gain_loss = current_value - holding.average_price * holding.quantity;
            let gain_loss_percent = if holding.average_price > 0.0 {
                (price - holding.average_price) / holding.average_price * 100.0
            } else {
                0.0
            };

            HoldingValuation {
                symbol: holding.symbol.clone(),
                quantity: holding.quantity,
                average_price: holding.average_price,
                current_price: Some(price),
                current_value: Some(current_value),
                gain_loss: Some(gain_loss),
                gain_loss_percent: Some(gain_loss_percent),
                quote_status: lookup.map(|l| l.status()).unwrap_or(QuoteStatus::Unavailable),
            }
        }
        None => HoldingValuation {
            symbol: holding.symbol.clone(),
            quantity: holding.quantity,
            average_price: holding.average_price,
            current_price: None,
            current_value: None,
            gain_loss: None,
            gain_loss_percent: None,
            quote_status: QuoteStatus::Unavailable,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;
    use chrono::Duration;

    fn valuator(provider: &Arc<MockProvider>) -> PortfolioValuator {
        let cache = QuoteCache::with_settings(provider.clone(), Duration::minutes(10), 64);
        PortfolioValuator::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn test_single_holding_gain() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let result = valuator(&provider)
            .value(&[Holding::new("AAPL", 10.0, 100.0)])
            .await;

        let h = &result.holdings[0];
        assert_eq!(h.current_price, Some(150.0));
        assert_eq!(h.current_value, Some(1500.0));
        assert_eq!(h.gain_loss, Some(500.0));
        assert_eq!(h.gain_loss_percent, Some(50.0));
        assert_eq!(h.quote_status, QuoteStatus::Fresh);
        assert_eq!(result.total_value, 1500.0);
    }

    #[tokio::test]
    async fn test_missing_quote_is_null_and_excluded_from_total() {
        let provider = Arc::new(MockProvider::with_prices(&[("AAPL", 150.0)]));
        let result = valuator(&provider)
            .value(&[Holding::new("AAPL", 2.0, 100.0), Holding::new("GONE", 5.0, 10.0)])
            .await;

        assert_eq!(result.holdings.len(), 2);
        assert_eq!(result.holdings[1].symbol, "GONE");
        assert_eq!(result.holdings[1].current_price, None);
        assert_eq!(result.holdings[1].current_value, None);
        assert_eq!(result.holdings[1].gain_loss, None);
        assert_eq!(result.holdings[1].gain_loss_percent, None);
        assert_eq!(result.holdings[1].quote_status, QuoteStatus::Unavailable);
        assert_eq!(result.total_value, 300.0);
        assert_eq!(result.unpriced().count(), 1);
    }

    #[tokio::test]
    async fn test_zero_average_price_gives_zero_percent() {
        let provider = Arc::new(MockProvider::with_prices(&[("NVDA", 50.0)]));
        let result = valuator(&provider)
            .value(&[Holding::new("NVDA", 4.0, 0.0)])
            .await;

        assert_eq!(result.holdings[0].gain_loss_percent, Some(0.0));
        assert_eq!(result.holdings[0].gain_loss, Some(200.0));
    }

    #[tokio::test]
    async fn test_order_preserved_and_symbols_fetched_once() {
        let provider = Arc::new(MockProvider::with_prices(&[("MSFT", 300.0), ("AMD", 100.0)]));
        let holdings = vec![
            Holding::new("MSFT", 1.0, 250.0),
            Holding::new("AMD", 3.0, 120.0),
            Holding::new("msft", 2.0, 310.0),
        ];
        let result = valuator(&provider).value(&holdings).await;

        let symbols: Vec<&str> = result.holdings.iter().map(|h| h.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["MSFT", "AMD", "msft"]);
        assert_eq!(provider.calls(), 2);
        assert_eq!(result.holdings[1].gain_loss, Some(-60.0));
        assert_eq!(result.total_value, 1200.0);
    }

    #[tokio::test]
    async fn test_empty_holdings() {
        let provider = Arc::new(MockProvider::with_prices(&[]));
        let result = valuator(&provider).value(&[]).await;

        assert!(result.holdings.is_empty());
        assert_eq!(result.total_value, 0.0);
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_value_holding_with_stale_quote_keeps_status() {
        let quote = MockProvider::quote("TSLA", 200.0);
        let lookup = QuoteLookup::Stale(quote);
        let h = value_holding(&Holding::new("TSLA", 1.0, 250.0), Some(&lookup));

        assert_eq!(h.quote_status, QuoteStatus::Stale);
        assert_eq!(h.gain_loss_percent, Some(-20.0));
    }
}
