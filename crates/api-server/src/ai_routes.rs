use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use dashboard_store::insights::{DEFAULT_INSIGHT_LIMIT, MAX_INSIGHT_LIMIT};
use dashboard_store::Insight;
use insight_engine::{
    is_finance_query, refusal, FinancialAnalysis, PricePrediction, SentimentReport, Timeframe,
};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::portfolio_routes::owned_portfolio;
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct AnalyzeRequest {
    pub query: String,
    /// Only the first symbol is analyzed
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct PortfolioQuery {
    pub portfolio_id: i64,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct PredictQuery {
    /// One of 7d, 30d, 90d (default 30d)
    pub timeframe: Option<String>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct InsightsQuery {
    /// Number of insights to return (1-50, default 10)
    pub limit: Option<u32>,
}

pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/ai/analyze", post(analyze))
        .route("/ai/analyze-portfolio", post(analyze_portfolio))
        .route("/ai/predict/:symbol", get(predict))
        .route("/ai/sentiment/:symbol", get(sentiment))
        .route("/ai/insights", get(list_insights))
}

#[utoipa::path(
    post,
    path = "/api/v1/ai/analyze",
    request_body = AnalyzeRequest,
    responses((status = 200, description = "Analysis, or a refusal for off-topic queries")),
    tag = "AI"
)]
pub async fn analyze(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<FinancialAnalysis>>, AppError> {
    let first_symbol = req
        .symbols
        .as_deref()
        .and_then(|symbols| symbols.iter().map(|s| s.trim()).find(|s| !s.is_empty()))
        .map(|s| s.to_uppercase());

    let analysis = if !is_finance_query(&req.query) {
        tracing::debug!("Refusing off-topic query from user {}", user.id);
        refusal(&req.query)
    } else if let Some(symbol) = first_symbol {
        state.insight_generator.analyze_market(&symbol, &req.query)
    } else {
        state.insight_generator.general_insight(&req.query)
    };

    state
        .insights
        .record(user.id, &req.query, &analysis.analysis)
        .await?;

    Ok(Json(ApiResponse::success(analysis)))
}

#[utoipa::path(
    post,
    path = "/api/v1/ai/analyze-portfolio",
    params(PortfolioQuery),
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Portfolio analysis"),
        (status = 404, description = "Portfolio not found, or it has no holdings")
    ),
    tag = "AI"
)]
pub async fn analyze_portfolio(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<PortfolioQuery>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<ApiResponse<FinancialAnalysis>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, params.portfolio_id).await?;

    let positions = state.portfolios.positions(portfolio.id).await?;
    if positions.is_empty() {
        return Err(AppError::with_status(
            axum::http::StatusCode::NOT_FOUND,
            anyhow::anyhow!("No holdings found in portfolio"),
        ));
    }

    let valuation = state.market.get_portfolio_value(&positions).await;
    let analysis = state
        .insight_generator
        .analyze_portfolio(&valuation.holdings, &req.query);

    state
        .insights
        .record(user.id, &req.query, &analysis.analysis)
        .await?;

    Ok(Json(ApiResponse::success(analysis)))
}

#[utoipa::path(
    get,
    path = "/api/v1/ai/predict/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol"), PredictQuery),
    responses(
        (status = 200, description = "Synthetic price prediction"),
        (status = 400, description = "Unknown timeframe")
    ),
    tag = "AI"
)]
pub async fn predict(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<ApiResponse<PricePrediction>>, AppError> {
    let timeframe = match query.timeframe.as_deref() {
        Some(raw) => raw.parse::<Timeframe>().map_err(AppError::bad_request)?,
        None => Timeframe::default(),
    };

    let prediction = state
        .insight_generator
        .predict_price(&symbol.to_uppercase(), timeframe);

    Ok(Json(ApiResponse::success(prediction)))
}

#[utoipa::path(
    get,
    path = "/api/v1/ai/sentiment/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol")),
    responses((status = 200, description = "Synthetic sentiment report")),
    tag = "AI"
)]
pub async fn sentiment(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Json<ApiResponse<SentimentReport>> {
    let report = state.insight_generator.sentiment(&symbol.to_uppercase());
    Json(ApiResponse::success(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/ai/insights",
    params(InsightsQuery),
    responses(
        (status = 200, description = "The caller's recent insights, newest first"),
        (status = 400, description = "limit outside 1-50")
    ),
    tag = "AI"
)]
pub async fn list_insights(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<InsightsQuery>,
) -> Result<Json<ApiResponse<Vec<Insight>>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_INSIGHT_LIMIT);
    if !(1..=MAX_INSIGHT_LIMIT).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_INSIGHT_LIMIT
        )));
    }

    let insights = state.insights.recent(user.id, limit).await?;
    Ok(Json(ApiResponse::success(insights)))
}
