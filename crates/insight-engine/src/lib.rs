//! Templated "AI" insight generator.
//!
//! Every answer is a fixed template filled with uniformly random choices;
//! nothing here looks at real market state beyond the caller's inputs.

use chrono::{DateTime, Utc};
use market_core::{round2, HoldingValuation};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

pub mod topic;
pub use topic::{is_finance_query, refusal, REFUSAL_MESSAGE};

const GENERAL_INSIGHTS: &[&str] = &[
    "Market volatility is expected to increase in the coming weeks. Consider defensive positioning.",
    "Technology stocks continue to show strong momentum. Focus on quality names with solid fundamentals.",
    "Diversification remains key in current market conditions. Review your asset allocation.",
    "Interest rate changes may impact growth stocks. Monitor Fed policy updates.",
    "Earnings season could provide trading opportunities. Watch for earnings surprises.",
];

const RISK_LEVELS: &[&str] = &["low", "medium", "high"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAnalysis {
    pub query: String,
    pub analysis: String,
    pub recommendations: Vec<String>,
    pub risk_assessment: String,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl Timeframe {
    pub fn days(&self) -> u32 {
        match self {
            Timeframe::Week => 7,
            Timeframe::Month => 30,
            Timeframe::Quarter => 90,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(Timeframe::Week),
            "30d" => Ok(Timeframe::Month),
            "90d" => Ok(Timeframe::Quarter),
            other => Err(format!("Invalid timeframe '{}': expected 7d, 30d or 90d", other)),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.days())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePrediction {
    pub symbol: String,
    pub current_price: f64,
    pub predicted_price: f64,
    pub predicted_change: f64,
    pub confidence: u32,
    pub analysis: String,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn factors(&self) -> &'static [&'static str] {
        match self {
            Sentiment::Positive => &["strong earnings", "market leadership", "innovation"],
            Sentiment::Negative => &["market volatility", "regulatory concerns", "competition"],
            Sentiment::Neutral => &["stable performance", "market average", "mixed signals"],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReport {
    pub symbol: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub factors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Format a dollar amount with thousands separators, e.g. `$12,345.60`.
pub fn format_usd(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Produces canned analyses from a private RNG.
pub struct InsightGenerator {
    rng: Mutex<StdRng>,
}

impl Default for InsightGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests and reproducible demos.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut guard = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut *guard)
    }

    fn pick(rng: &mut StdRng, options: &[&'static str]) -> &'static str {
        options.choose(rng).copied().unwrap_or_default()
    }

    pub fn analyze_market(&self, symbol: &str, query: &str) -> FinancialAnalysis {
        self.with_rng(|rng| {
            let sentiment = Self::pick(rng, &["bullish", "bearish", "neutral"]);
            let trend = Self::pick(rng, &["upward", "downward", "sideways"]);
            let volatility = Self::pick(rng, &["high", "moderate", "low"]);
            let risk = Self::pick(rng, RISK_LEVELS);

            FinancialAnalysis {
                query: query.to_string(),
                analysis: format!(
                    "Based on current market conditions, {} shows {} momentum. The stock has {} over the past period with {} volatility.",
                    symbol, sentiment, trend, volatility
                ),
                recommendations: vec![
                    format!("Monitor {} for breakout opportunities", symbol),
                    "Consider setting stop-loss orders".to_string(),
                    "Review position sizing based on volatility".to_string(),
                ],
                risk_assessment: format!(
                    "{} presents {} risk based on current market conditions.",
                    symbol, risk
                ),
                confidence_score: round2(rng.gen_range(0.6..=0.95)),
            }
        })
    }

    pub fn analyze_portfolio(
        &self,
        holdings: &[HoldingValuation],
        query: &str,
    ) -> FinancialAnalysis {
        let total_value: f64 = holdings.iter().filter_map(|h| h.current_value).sum();
        let diversification_score = holdings.len() as f64 / 10.0;

        let (diversification, recommendations) = if diversification_score < 0.3 {
            (
                "low",
                strings(&[
                    "Consider diversifying across more sectors",
                    "Add international exposure to your portfolio",
                    "Include bonds or other fixed income assets",
                ]),
            )
        } else if diversification_score < 0.7 {
            (
                "moderate",
                strings(&[
                    "Review sector allocation",
                    "Consider rebalancing quarterly",
                    "Monitor correlation between holdings",
                ]),
            )
        } else {
            (
                "good",
                strings(&[
                    "Maintain current diversification",
                    "Focus on individual stock selection",
                    "Consider tax-loss harvesting opportunities",
                ]),
            )
        };

        let analysis = format!(
            "Your portfolio shows {} diversification. Consider {} to optimize your allocation.",
            diversification,
            recommendations[..2].join(", ")
        );

        self.with_rng(|rng| {
            let risk_level = Self::pick(rng, RISK_LEVELS);
            FinancialAnalysis {
                query: query.to_string(),
                analysis,
                recommendations,
                risk_assessment: format!(
                    "Portfolio risk level: {}. Total value: {}",
                    risk_level,
                    format_usd(total_value)
                ),
                confidence_score: round2(rng.gen_range(0.7..=0.9)),
            }
        })
    }

    pub fn general_insight(&self, query: &str) -> FinancialAnalysis {
        let insight = self.with_rng(|rng| Self::pick(rng, GENERAL_INSIGHTS));
        FinancialAnalysis {
            query: query.to_string(),
            analysis: insight.to_string(),
            recommendations: strings(&["Monitor market conditions", "Review portfolio allocation"]),
            risk_assessment: "General market risk assessment".to_string(),
            confidence_score: 0.75,
        }
    }

    pub fn predict_price(&self, symbol: &str, timeframe: Timeframe) -> PricePrediction {
        self.with_rng(|rng| {
            let current_price: f64 = rng.gen_range(50.0..500.0);
            let volatility: f64 = rng.gen_range(0.05..0.15);
            let price_change: f64 = rng.gen_range(-volatility..volatility);
            let predicted_price = current_price * (1.0 + price_change);
            let outlook = if price_change > 0.0 { "bullish" } else { "bearish" };
            let text_confidence: u32 = rng.gen_range(60..=85);

            PricePrediction {
                symbol: symbol.to_string(),
                current_price: round2(current_price),
                predicted_price: round2(predicted_price),
                predicted_change: round2(price_change * 100.0),
                confidence: rng.gen_range(60..=85),
                analysis: format!(
                    "Short-term outlook for {}: {} with {}% confidence.",
                    symbol, outlook, text_confidence
                ),
                timeframe,
            }
        })
    }

    pub fn sentiment(&self, symbol: &str) -> SentimentReport {
        self.with_rng(|rng| {
            let sentiment = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral]
                .choose(rng)
                .copied()
                .unwrap_or(Sentiment::Neutral);

            SentimentReport {
                symbol: symbol.to_string(),
                sentiment,
                confidence: round2(rng.gen_range(0.6..=0.9)),
                factors: strings(sentiment.factors()),
                timestamp: Utc::now(),
            }
        })
    }
}
