use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market_core::{round2, MarketError, Quote, QuoteProvider};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://finnhub.io/api/v1";
const PROVIDER_ID: &str = "finnhub";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => {
                    (oldest + self.window).duration_since(now) + Duration::from_millis(50)
                }
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Finnhub API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Raw `/quote` payload. Finnhub reports `0` for fields it has no value for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuote {
    /// Current price
    pub c: Option<f64>,
    /// Previous close
    pub pc: Option<f64>,
    /// Day high
    pub h: Option<f64>,
    /// Day low
    pub l: Option<f64>,
    /// Day open
    pub o: Option<f64>,
}

fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

/// Normalize a provider payload into a [`Quote`].
///
/// Percent change is `(current - previous_close) / previous_close * 100`, zero
/// when either side is absent. Prices are rounded to two decimals and volume is
/// always zero because the quote endpoint does not carry it.
pub fn normalize_quote(
    symbol: &str,
    raw: &RawQuote,
    observed_at: DateTime<Utc>,
) -> Result<Quote, MarketError> {
    if raw.c.is_none() {
        return Err(MarketError::NoData(symbol.to_string()));
    }

    let price = present(raw.c);
    let previous_close = present(raw.pc);

    let change = match (price, previous_close) {
        (Some(current), Some(prev)) => (current - prev) / prev * 100.0,
        _ => 0.0,
    };

    Ok(Quote {
        symbol: symbol.to_string(),
        price: price.map(round2),
        change: round2(change),
        volume: 0.0,
        timestamp: observed_at,
        high: present(raw.h).map(round2),
        low: present(raw.l).map(round2),
        open: present(raw.o).map(round2),
    })
}

#[derive(Clone)]
pub struct FinnhubClient {
    api_key: Option<String>,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl FinnhubClient {
    /// `rate_limit` is the number of requests allowed per minute (free tier: 60).
    pub fn new(api_key: Option<String>, rate_limit: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!("FINNHUB_API_KEY not set; every quote lookup will be unavailable");
        }

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Point the client at a different host (used for proxies and local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch the raw `/quote` payload for one symbol. No retries.
    pub async fn get_raw_quote(&self, symbol: &str) -> Result<RawQuote, MarketError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| MarketError::NotConfigured("FINNHUB_API_KEY".to_string()))?;

        self.rate_limiter.acquire().await;

        let url = format!("{}/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", api_key)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .map_err(|e| MarketError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                "rate limited".to_string()
            } else {
                format!("HTTP {}: {}", status, response.text().await.unwrap_or_default())
            };
            return Err(MarketError::Provider {
                provider: PROVIDER_ID.to_string(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketError::Network(e.without_url().to_string()))?;

        serde_json::from_str::<RawQuote>(&body).map_err(|e| MarketError::Parse(e.to_string()))
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    fn name(&self) -> &str {
        PROVIDER_ID
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
        let raw = self.get_raw_quote(symbol).await?;
        normalize_quote(symbol, &raw, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> RawQuote {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_full_payload() {
        let raw = parse(r#"{"c":151.237,"d":1.2,"dp":0.8,"h":152.456,"l":149.001,"o":150.0,"pc":150.0,"t":1700000000}"#);
        let quote = normalize_quote("AAPL", &raw, Utc::now()).unwrap();

        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.price, Some(151.24));
        assert_eq!(quote.change, 0.82);
        assert_eq!(quote.high, Some(152.46));
        assert_eq!(quote.low, Some(149.0));
        assert_eq!(quote.open, Some(150.0));
        assert_eq!(quote.volume, 0.0);
    }

    #[test]
    fn test_normalize_missing_previous_close_gives_zero_change() {
        let raw = parse(r#"{"c":100.0,"h":101.0}"#);
        let quote = normalize_quote("MSFT", &raw, Utc::now()).unwrap();

        assert_eq!(quote.price, Some(100.0));
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.low, None);
        assert_eq!(quote.open, None);
    }

    #[test]
    fn test_normalize_unknown_ticker_zeros() {
        // Finnhub answers unknown tickers with all-zero fields
        let raw = parse(r#"{"c":0,"d":null,"dp":null,"h":0,"l":0,"o":0,"pc":0,"t":0}"#);
        let quote = normalize_quote("ZZZZ", &raw, Utc::now()).unwrap();

        assert_eq!(quote.price, None);
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.high, None);
    }

    #[test]
    fn test_normalize_without_current_price_is_no_data() {
        let raw = parse(r#"{"pc":10.0}"#);
        let err = normalize_quote("NOPE", &raw, Utc::now()).unwrap_err();
        assert_eq!(err, MarketError::NoData("NOPE".to_string()));
    }

    #[test]
    fn test_negative_change() {
        let raw = parse(r#"{"c":99.0,"pc":100.0}"#);
        let quote = normalize_quote("TSLA", &raw, Utc::now()).unwrap();
        assert_eq!(quote.change, -1.0);
    }

    #[test]
    fn test_missing_api_key_is_not_configured() {
        let client = FinnhubClient::new(None, 60);
        assert!(!client.has_api_key());

        let err = tokio_test::block_on(client.fetch_quote("AAPL")).unwrap_err();
        assert!(matches!(err, MarketError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_rate_limiter_admits_up_to_limit_immediately() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let started = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
