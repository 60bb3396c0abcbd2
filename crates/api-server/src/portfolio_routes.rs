use axum::{
    extract::{Path, State},
    routing::{get, put},
    Extension, Json, Router,
};
use dashboard_store::{
    HoldingInput, HoldingRecord, HoldingUpdate, Portfolio, PortfolioInput, PortfolioUpdate,
};
use market_core::PortfolioValuation;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct PortfolioRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdatePortfolioRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct HoldingRequest {
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateHoldingRequest {
    pub quantity: Option<f64>,
    pub average_price: Option<f64>,
}

#[derive(Serialize)]
pub struct PortfolioValueResponse {
    pub portfolio_id: i64,
    pub portfolio_name: String,
    #[serde(flatten)]
    pub valuation: PortfolioValuation,
}

pub fn portfolio_routes() -> Router<AppState> {
    Router::new()
        .route("/portfolios", get(list_portfolios).post(create_portfolio))
        .route(
            "/portfolios/:id",
            get(get_portfolio)
                .put(update_portfolio)
                .delete(delete_portfolio),
        )
        .route(
            "/portfolios/:id/holdings",
            get(list_holdings).post(add_holding),
        )
        .route(
            "/portfolios/:id/holdings/:holding_id",
            put(update_holding).delete(delete_holding),
        )
        .route("/portfolios/:id/value", get(get_portfolio_value))
}

/// Load a portfolio owned by `user_id`; foreign ids are reported as missing
pub(crate) async fn owned_portfolio(
    state: &AppState,
    user_id: i64,
    id: i64,
) -> Result<Portfolio, AppError> {
    state
        .portfolios
        .get(user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Portfolio"))
}

fn validate_quantity(quantity: f64) -> Result<(), AppError> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(())
    } else {
        Err(AppError::bad_request("Quantity must not be negative"))
    }
}

fn validate_price(price: f64) -> Result<(), AppError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(AppError::bad_request("Average price must not be negative"))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/portfolios",
    request_body = PortfolioRequest,
    responses((status = 200, description = "Created portfolio")),
    tag = "Portfolios"
)]
pub async fn create_portfolio(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<PortfolioRequest>,
) -> Result<Json<ApiResponse<Portfolio>>, AppError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("Portfolio name must not be empty"));
    }

    let portfolio = state
        .portfolios
        .create(
            user.id,
            PortfolioInput {
                name,
                description: req.description,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(portfolio)))
}

#[utoipa::path(
    get,
    path = "/api/v1/portfolios",
    responses((status = 200, description = "The caller's portfolios")),
    tag = "Portfolios"
)]
pub async fn list_portfolios(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<Portfolio>>>, AppError> {
    let portfolios = state.portfolios.list(user.id).await?;
    Ok(Json(ApiResponse::success(portfolios)))
}

#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}",
    params(("id" = i64, Path, description = "Portfolio id")),
    responses(
        (status = 200, description = "Portfolio"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn get_portfolio(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Portfolio>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;
    Ok(Json(ApiResponse::success(portfolio)))
}

#[utoipa::path(
    put,
    path = "/api/v1/portfolios/{id}",
    params(("id" = i64, Path, description = "Portfolio id")),
    request_body = UpdatePortfolioRequest,
    responses(
        (status = 200, description = "Updated portfolio"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn update_portfolio(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePortfolioRequest>,
) -> Result<Json<ApiResponse<Portfolio>>, AppError> {
    let name = req.name.map(|n| n.trim().to_string());
    if matches!(&name, Some(n) if n.is_empty()) {
        return Err(AppError::bad_request("Portfolio name must not be empty"));
    }

    let portfolio = state
        .portfolios
        .update(
            user.id,
            id,
            PortfolioUpdate {
                name,
                description: req.description,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Portfolio"))?;

    Ok(Json(ApiResponse::success(portfolio)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/portfolios/{id}",
    params(("id" = i64, Path, description = "Portfolio id")),
    responses(
        (status = 200, description = "Portfolio and its holdings deleted"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn delete_portfolio(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    if !state.portfolios.delete(user.id, id).await? {
        return Err(AppError::not_found("Portfolio"));
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Portfolio deleted successfully"
    }))))
}

#[utoipa::path(
    post,
    path = "/api/v1/portfolios/{id}/holdings",
    params(("id" = i64, Path, description = "Portfolio id")),
    request_body = HoldingRequest,
    responses(
        (status = 200, description = "Created holding"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn add_holding(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<HoldingRequest>,
) -> Result<Json<ApiResponse<HoldingRecord>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;

    if req.symbol.trim().is_empty() {
        return Err(AppError::bad_request("Symbol must not be empty"));
    }
    validate_quantity(req.quantity)?;
    validate_price(req.average_price)?;

    let holding = state
        .portfolios
        .add_holding(
            portfolio.id,
            HoldingInput {
                symbol: req.symbol,
                quantity: req.quantity,
                average_price: req.average_price,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(holding)))
}

#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/holdings",
    params(("id" = i64, Path, description = "Portfolio id")),
    responses(
        (status = 200, description = "Holdings of the portfolio"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn list_holdings(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<HoldingRecord>>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;
    let holdings = state.portfolios.list_holdings(portfolio.id).await?;
    Ok(Json(ApiResponse::success(holdings)))
}

#[utoipa::path(
    put,
    path = "/api/v1/portfolios/{id}/holdings/{holding_id}",
    params(
        ("id" = i64, Path, description = "Portfolio id"),
        ("holding_id" = i64, Path, description = "Holding id")
    ),
    request_body = UpdateHoldingRequest,
    responses(
        (status = 200, description = "Updated holding"),
        (status = 404, description = "Portfolio or holding not found")
    ),
    tag = "Portfolios"
)]
pub async fn update_holding(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((id, holding_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateHoldingRequest>,
) -> Result<Json<ApiResponse<HoldingRecord>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;

    if let Some(quantity) = req.quantity {
        validate_quantity(quantity)?;
    }
    if let Some(price) = req.average_price {
        validate_price(price)?;
    }

    let holding = state
        .portfolios
        .update_holding(
            portfolio.id,
            holding_id,
            HoldingUpdate {
                quantity: req.quantity,
                average_price: req.average_price,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Holding"))?;

    Ok(Json(ApiResponse::success(holding)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/portfolios/{id}/holdings/{holding_id}",
    params(
        ("id" = i64, Path, description = "Portfolio id"),
        ("holding_id" = i64, Path, description = "Holding id")
    ),
    responses(
        (status = 200, description = "Holding deleted"),
        (status = 404, description = "Portfolio or holding not found")
    ),
    tag = "Portfolios"
)]
pub async fn delete_holding(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((id, holding_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;

    if !state.portfolios.delete_holding(portfolio.id, holding_id).await? {
        return Err(AppError::not_found("Holding"));
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Holding deleted successfully"
    }))))
}

#[utoipa::path(
    get,
    path = "/api/v1/portfolios/{id}/value",
    params(("id" = i64, Path, description = "Portfolio id")),
    responses(
        (status = 200, description = "Current valuation; unpriced holdings report null values"),
        (status = 404, description = "Portfolio not found")
    ),
    tag = "Portfolios"
)]
pub async fn get_portfolio_value(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PortfolioValueResponse>>, AppError> {
    let portfolio = owned_portfolio(&state, user.id, id).await?;
    let positions = state.portfolios.positions(portfolio.id).await?;

    let valuation = state.market.get_portfolio_value(&positions).await;
    let unpriced = valuation.unpriced().count();
    if unpriced > 0 {
        tracing::debug!(
            "Portfolio {}: {} of {} holdings unpriced",
            portfolio.id,
            unpriced,
            valuation.holdings.len()
        );
    }

    Ok(Json(ApiResponse::success(PortfolioValueResponse {
        portfolio_id: portfolio.id,
        portfolio_name: portfolio.name,
        valuation,
    })))
}
