use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use market_core::{Quote, QuoteLookup, QuoteProvider};
use std::sync::Arc;

pub const DEFAULT_TTL_SECS: i64 = 600; // 10 minutes
pub const DEFAULT_CAPACITY: usize = 512;

/// Internal cache entry with timestamp
#[derive(Clone)]
struct CacheEntry {
    quote: Quote,
    fetched_at: DateTime<Utc>,
}

/// Per-symbol quote cache with a fixed freshness window and stale fallback.
///
/// An entry is served without refetching while `now - fetched_at < ttl`.
/// When a refetch fails the last stored quote is returned as
/// [`QuoteLookup::Stale`], however old it is. Concurrent misses on the same
/// symbol each hit the provider; the last successful write wins.
pub struct QuoteCache {
    provider: Arc<dyn QuoteProvider>,
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl QuoteCache {
    pub fn new(provider: Arc<dyn QuoteProvider>) -> Self {
        Self::with_settings(provider, Duration::seconds(DEFAULT_TTL_SECS), DEFAULT_CAPACITY)
    }

    pub fn with_settings(provider: Arc<dyn QuoteProvider>, ttl: Duration, capacity: usize) -> Self {
        Self {
            provider,
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Resolve a quote for `symbol`, refetching when the entry is missing or expired.
    pub async fn get(&self, symbol: &str) -> QuoteLookup {
        let key = symbol.trim().to_uppercase();
        let now = Utc::now();

        if let Some(entry) = self.snapshot(&key) {
            if now - entry.fetched_at < self.ttl {
                return QuoteLookup::Fresh(entry.quote);
            }
        }

        match self.provider.fetch_quote(&key).await {
            Ok(quote) => {
                // The provider may have waited on its rate limiter
                self.store(key, quote.clone(), Utc::now());
                QuoteLookup::Fresh(quote)
            }
            Err(e) => {
                tracing::warn!(
                    "Quote fetch for {} via {} failed: {}",
                    key,
                    self.provider.name(),
                    e
                );
                match self.snapshot(&key) {
                    Some(entry) => {
                        tracing::debug!(
                            "Serving stale quote for {} fetched at {}",
                            key,
                            entry.fetched_at.to_rfc3339()
                        );
                        QuoteLookup::Stale(entry.quote)
                    }
                    None => QuoteLookup::Unavailable,
                }
            }
        }
    }

    fn store(&self, key: String, quote: Quote, fetched_at: DateTime<Utc>) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, CacheEntry { quote, fetched_at });
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().fetched_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            tracing::debug!("Quote cache full ({}), evicting {}", self.capacity, key);
            self.entries.remove(&key);
        }
    }
}
