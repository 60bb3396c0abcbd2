use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use dashboard_store::{Alert, AlertInput, AlertUpdate};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateAlertRequest {
    pub symbol: String,
    pub alert_type: String,
    pub threshold: f64,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateAlertRequest {
    pub alert_type: Option<String>,
    pub threshold: Option<f64>,
    pub is_active: Option<bool>,
}

pub fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts).post(create_alert))
        .route(
            "/alerts/:id",
            get(get_alert).put(update_alert).delete(delete_alert),
        )
}

fn validate_threshold(threshold: f64) -> Result<(), AppError> {
    if threshold.is_finite() {
        Ok(())
    } else {
        Err(AppError::bad_request("Threshold must be a finite number"))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/alerts",
    request_body = CreateAlertRequest,
    responses((status = 200, description = "Created alert")),
    tag = "Alerts"
)]
pub async fn create_alert(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<Json<ApiResponse<Alert>>, AppError> {
    if req.symbol.trim().is_empty() {
        return Err(AppError::bad_request("Symbol must not be empty"));
    }
    if req.alert_type.trim().is_empty() {
        return Err(AppError::bad_request("Alert type must not be empty"));
    }
    validate_threshold(req.threshold)?;

    let alert = state
        .alerts
        .create_alert(
            user.id,
            AlertInput {
                symbol: req.symbol,
                alert_type: req.alert_type.trim().to_string(),
                threshold: req.threshold,
            },
        )
        .await?;

    tracing::info!("Alert {} created for {} by user {}", alert.id, alert.symbol, user.id);
    Ok(Json(ApiResponse::success(alert)))
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts",
    responses((status = 200, description = "The caller's alerts, newest first")),
    tag = "Alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<Alert>>>, AppError> {
    let alerts = state.alerts.get_alerts(user.id).await?;
    Ok(Json(ApiResponse::success(alerts)))
}

#[utoipa::path(
    get,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert"),
        (status = 404, description = "Alert not found")
    ),
    tag = "Alerts"
)]
pub async fn get_alert(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Alert>>, AppError> {
    let alert = state
        .alerts
        .get_alert(user.id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Alert"))?;

    Ok(Json(ApiResponse::success(alert)))
}

#[utoipa::path(
    put,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    request_body = UpdateAlertRequest,
    responses(
        (status = 200, description = "Updated alert; omitted fields are unchanged"),
        (status = 404, description = "Alert not found")
    ),
    tag = "Alerts"
)]
pub async fn update_alert(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateAlertRequest>,
) -> Result<Json<ApiResponse<Alert>>, AppError> {
    if let Some(threshold) = req.threshold {
        validate_threshold(threshold)?;
    }

    let alert = state
        .alerts
        .update_alert(
            user.id,
            id,
            AlertUpdate {
                alert_type: req.alert_type,
                threshold: req.threshold,
                is_active: req.is_active,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("Alert"))?;

    Ok(Json(ApiResponse::success(alert)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/alerts/{id}",
    params(("id" = i64, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Alert deleted"),
        (status = 404, description = "Alert not found")
    ),
    tag = "Alerts"
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    if !state.alerts.delete_alert(user.id, id).await? {
        return Err(AppError::not_found("Alert"));
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Alert deleted successfully"
    }))))
}

#[cfg(test)]
mod tests {
    use crate::build_router;
    use crate::test_support::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_alert_crud() {
        let app = build_router(test_state().await);
        let token = register_and_login(&app, "alice").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/alerts",
            Some(&token),
            Some(json!({ "symbol": "tsla", "alert_type": "price_above", "threshold": 250.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["symbol"], "TSLA");
        assert_eq!(body["data"]["is_active"], true);
        let id = body["data"]["id"].as_i64().unwrap();
        let uri = format!("/api/v1/alerts/{}", id);

        let (status, body) = send(
            &app,
            "PUT",
            &uri,
            Some(&token),
            Some(json!({ "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["is_active"], false);
        assert_eq!(body["data"]["threshold"], 250.0);

        let (_, body) = send(&app, "GET", "/api/v1/alerts", Some(&token), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "DELETE", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "Alert deleted successfully");

        let (status, body) = send(&app, "GET", &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Alert not found");
    }

    #[tokio::test]
    async fn test_foreign_alert_is_not_found() {
        let app = build_router(test_state().await);
        let alice = register_and_login(&app, "alice").await;
        let bob = register_and_login(&app, "bob").await;

        let (_, body) = send(
            &app,
            "POST",
            "/api/v1/alerts",
            Some(&alice),
            Some(json!({ "symbol": "AAPL", "alert_type": "price_below", "threshold": 100.0 })),
        )
        .await;
        let uri = format!("/api/v1/alerts/{}", body["data"]["id"].as_i64().unwrap());

        let (status, _) = send(
            &app,
            "PUT",
            &uri,
            Some(&bob),
            Some(json!({ "threshold": 1.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
