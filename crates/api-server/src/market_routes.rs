use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use market_core::{Bar, MarketSummary, QuoteLookup};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

pub const DEFAULT_HISTORY_DAYS: u32 = 30;
pub const MAX_HISTORY_DAYS: u32 = 365;

#[derive(Deserialize, utoipa::IntoParams)]
pub struct HistoricalQuery {
    /// Lookback in days (1-365, default 30)
    pub days: Option<u32>,
}

#[derive(Serialize)]
pub struct HistoricalResponse {
    pub symbol: String,
    pub days: u32,
    pub data: Vec<Bar>,
}

#[derive(Serialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
    pub count: usize,
}

pub fn market_routes() -> Router<AppState> {
    Router::new()
        .route("/market/data/:symbol", get(get_market_data))
        .route("/market/data/:symbol/historical", get(get_historical_data))
        .route("/market/summary", get(get_market_summary))
        .route("/market/symbols", get(get_symbols))
}

#[utoipa::path(
    get,
    path = "/api/v1/market/data/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Quote with freshness status (fresh, stale or unavailable)")),
    tag = "Market"
)]
pub async fn get_market_data(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<ApiResponse<QuoteLookup>> {
    let lookup = state.market.get_quote(&symbol.to_uppercase()).await;
    Json(ApiResponse::success(lookup))
}

#[utoipa::path(
    get,
    path = "/api/v1/market/data/{symbol}/historical",
    params(
        ("symbol" = String, Path, description = "Stock ticker symbol"),
        HistoricalQuery
    ),
    responses(
        (status = 200, description = "Historical bars (currently always empty)"),
        (status = 400, description = "days outside 1-365")
    ),
    tag = "Market"
)]
pub async fn get_historical_data(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoricalQuery>,
) -> Result<Json<ApiResponse<HistoricalResponse>>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    if !(1..=MAX_HISTORY_DAYS).contains(&days) {
        return Err(AppError::bad_request(format!(
            "days must be between 1 and {}",
            MAX_HISTORY_DAYS
        )));
    }

    let symbol = symbol.to_uppercase();
    let data = state.market.get_historical(&symbol, days).await;

    Ok(Json(ApiResponse::success(HistoricalResponse { symbol, days, data })))
}

#[utoipa::path(
    get,
    path = "/api/v1/market/summary",
    responses((status = 200, description = "Gainers, losers and most active symbols of the universe")),
    tag = "Market"
)]
pub async fn get_market_summary(
    State(state): State<AppState>,
) -> Json<ApiResponse<MarketSummary>> {
    Json(ApiResponse::success(state.market.get_summary().await))
}

#[utoipa::path(
    get,
    path = "/api/v1/market/symbols",
    responses((status = 200, description = "The tracked symbol universe")),
    tag = "Market"
)]
pub async fn get_symbols(State(state): State<AppState>) -> Json<ApiResponse<SymbolsResponse>> {
    let symbols = state.market.symbols().to_vec();
    let count = symbols.len();
    Json(ApiResponse::success(SymbolsResponse { symbols, count }))
}
