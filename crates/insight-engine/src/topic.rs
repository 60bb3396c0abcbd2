use crate::FinancialAnalysis;

pub const REFUSAL_MESSAGE: &str =
    "Sorry, I can only answer questions about stocks, trading, or financial markets.";

/// Finance vocabulary a query must touch to be answered.
const ALLOWED_KEYWORDS: &[&str] = &[
    "stock", "stocks", "trading", "market", "markets", "portfolio", "equity", "share",
    "investment", "invest", "finance", "financial", "nasdaq", "nyse", "nifty", "sensex",
    "mutual fund", "etf", "bond", "dividend", "option", "futures", "commodities", "forex",
    "currency", "crypto", "bitcoin", "bull", "bear", "price", "volume", "chart", "analysis",
    "prediction", "gains", "losses", "broker", "exchange", "ipo", "earnings", "valuation",
    "fundamental", "technical", "trend", "risk", "return", "asset", "allocation", "index",
    "indices", "securities", "derivative", "order", "buy", "sell", "short", "long", "margin",
    "stop loss", "limit", "order book", "liquidity", "volatility", "capital", "yield",
    "sector", "industry", "diversification", "rebalancing", "hedge", "leverage", "inflation",
    "interest rate", "fed", "federal reserve", "central bank", "macroeconomics",
    "microeconomics", "economic", "gdp", "cpi", "unemployment", "growth", "recession",
    "bubble", "crash", "recovery", "bullish", "bearish", "uptrend", "downtrend", "sideways",
    "support", "resistance", "stop", "bid", "ask", "spread", "turnover", "float", "split",
    "reverse split", "buyback", "insider", "institutional", "retail", "sentiment", "news",
    "catalyst", "event", "calendar", "payout", "ex-dividend", "record date", "payable date",
];

/// Keyword allow-list check: true when the lowercased query contains any
/// finance keyword as a substring.
pub fn is_finance_query(query: &str) -> bool {
    let q = query.to_lowercase();
    ALLOWED_KEYWORDS.iter().any(|keyword| q.contains(keyword))
}

/// Canned answer for off-topic queries.
pub fn refusal(query: &str) -> FinancialAnalysis {
    FinancialAnalysis {
        query: query.to_string(),
        analysis: REFUSAL_MESSAGE.to_string(),
        recommendations: Vec::new(),
        risk_assessment: String::new(),
        confidence_score: 0.0,
    }
}
