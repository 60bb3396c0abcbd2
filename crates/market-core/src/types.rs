use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Symbols tracked by the market summary unless configured otherwise.
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "AAPL", "GOOGL", "MSFT", "AMZN", "TSLA", "META", "NVDA", "NFLX", "AMD", "INTC",
];

/// Round to two decimal places (half away from zero).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Point-in-time price snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: Option<f64>,
    /// Percent change vs. previous close
    pub change: f64,
    /// Not provided by the quote integration; always 0
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub open: Option<f64>,
}

/// OHLCV bar, the element type of historical series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A position supplied by the caller for valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
}

impl Holding {
    pub fn new(symbol: impl Into<String>, quantity: f64, average_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            average_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Fresh,
    Stale,
    Unavailable,
}

/// Outcome of a cache lookup.
///
/// `Stale` means the refetch failed and an expired entry was served instead.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteLookup {
    Fresh(Quote),
    Stale(Quote),
    Unavailable,
}

impl QuoteLookup {
    pub fn status(&self) -> QuoteStatus {
        match self {
            QuoteLookup::Fresh(_) => QuoteStatus::Fresh,
            QuoteLookup::Stale(_) => QuoteStatus::Stale,
            QuoteLookup::Unavailable => QuoteStatus::Unavailable,
        }
    }

    pub fn quote(&self) -> Option<&Quote> {
        match self {
            QuoteLookup::Fresh(q) | QuoteLookup::Stale(q) => Some(q),
            QuoteLookup::Unavailable => None,
        }
    }

    pub fn into_quote(self) -> Option<Quote> {
        match self {
            QuoteLookup::Fresh(q) | QuoteLookup::Stale(q) => Some(q),
            QuoteLookup::Unavailable => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, QuoteLookup::Fresh(_))
    }
}

impl Serialize for QuoteLookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            status: QuoteStatus,
            quote: Option<&'a Quote>,
        }

        Wire {
            status: self.status(),
            quote: self.quote(),
        }
        .serialize(serializer)
    }
}

/// Per-holding valuation. Derived fields are `None` when no usable quote exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: Option<f64>,
    pub current_value: Option<f64>,
    pub gain_loss: Option<f64>,
    pub gain_loss_percent: Option<f64>,
    pub quote_status: QuoteStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioValuation {
    /// Sum of all non-null current values, rounded to 2 dp
    pub total_value: f64,
    pub holdings: Vec<HoldingValuation>,
}

impl PortfolioValuation {
    /// Holdings whose quote could not be resolved at all
    pub fn unpriced(&self) -> impl Iterator<Item = &HoldingValuation> {
        self.holdings.iter().filter(|h| h.current_value.is_none())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total_symbols: usize,
    pub gainers: Vec<Quote>,
    pub losers: Vec<Quote>,
    pub most_active: Vec<Quote>,
}
