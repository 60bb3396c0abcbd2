use axum::{
    http::{HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use dashboard_store::{AlertManager, DashboardDb, InsightLog, PortfolioManager, UserManager};
use finnhub_client::FinnhubClient;
use insight_engine::InsightGenerator;
use market_service::{MarketDataService, QuoteCache};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

pub mod ai_routes;
pub mod alert_routes;
pub mod auth;
pub mod auth_routes;
pub mod brute_force;
pub mod config;
pub mod market_routes;
pub mod portfolio_routes;
pub mod request_id;
pub mod security_headers;
pub mod ws_routes;

use auth::AuthManager;
use brute_force::BruteForceGuard;
use config::{ServerConfig, DEFAULT_CORS_ORIGINS};
use ws_routes::MarketBroadcaster;

pub const API_PREFIX: &str = "/api/v1";
pub const API_VERSION: &str = "1.0.0";

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub users: Arc<UserManager>,
    pub portfolios: Arc<PortfolioManager>,
    pub alerts: Arc<AlertManager>,
    pub insights: Arc<InsightLog>,
    pub market: Arc<MarketDataService>,
    pub insight_generator: Arc<InsightGenerator>,
    pub auth: Arc<AuthManager>,
    pub brute_force_guard: Arc<BruteForceGuard>,
    pub broadcaster: MarketBroadcaster,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        db: DashboardDb,
        market: Arc<MarketDataService>,
        insight_generator: Arc<InsightGenerator>,
    ) -> Self {
        let auth = AuthManager::new(
            config.secret_key.as_bytes(),
            chrono::Duration::minutes(config.access_token_expire_minutes),
        );
        let brute_force_guard = BruteForceGuard::new(
            config.auth_max_failures,
            Duration::from_secs(config.auth_failure_window_secs),
            Duration::from_secs(config.auth_lockout_secs),
        );

        Self {
            users: Arc::new(UserManager::new(db.clone())),
            portfolios: Arc::new(PortfolioManager::new(db.clone())),
            alerts: Arc::new(AlertManager::new(db.clone())),
            insights: Arc::new(InsightLog::new(db)),
            market,
            insight_generator,
            auth: Arc::new(auth),
            brute_force_guard: Arc::new(brute_force_guard),
            broadcaster: MarketBroadcaster::new(),
            config: Arc::new(config),
        }
    }
}

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error: an HTTP status plus the underlying cause.
///
/// Anything convertible into `anyhow::Error` becomes a 500 via `?`. Server
/// errors are logged and replaced with a generic message.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    /// 404 with a "<thing> not found" message
    pub fn not_found(thing: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!("{} not found", thing))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
            "Internal server error".to_string()
        } else {
            self.error.to_string()
        };

        (self.status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "Financial Dashboard API", version = "1.0.0"),
    paths(
        root,
        health,
        auth_routes::register,
        auth_routes::login,
        auth_routes::get_me,
        auth_routes::update_me,
        portfolio_routes::create_portfolio,
        portfolio_routes::list_portfolios,
        portfolio_routes::get_portfolio,
        portfolio_routes::update_portfolio,
        portfolio_routes::delete_portfolio,
        portfolio_routes::add_holding,
        portfolio_routes::list_holdings,
        portfolio_routes::update_holding,
        portfolio_routes::delete_holding,
        portfolio_routes::get_portfolio_value,
        alert_routes::create_alert,
        alert_routes::list_alerts,
        alert_routes::get_alert,
        alert_routes::update_alert,
        alert_routes::delete_alert,
        market_routes::get_market_data,
        market_routes::get_historical_data,
        market_routes::get_market_summary,
        market_routes::get_symbols,
        ai_routes::analyze,
        ai_routes::analyze_portfolio,
        ai_routes::predict,
        ai_routes::sentiment,
        ai_routes::list_insights,
        ws_routes::ws_market_handler,
    ),
    tags(
        (name = "System", description = "Service metadata and health"),
        (name = "Auth", description = "Registration, tokens and profile"),
        (name = "Portfolios", description = "Portfolios, holdings and valuation"),
        (name = "Alerts", description = "Price alerts"),
        (name = "Market", description = "Quotes and market summary"),
        (name = "AI", description = "Templated analysis and insight history"),
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service name, version and docs location")),
    tag = "System"
)]
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Financial Dashboard API",
        "version": API_VERSION,
        "docs": "/api-docs/openapi.json",
    }))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Liveness probe")),
    tag = "System"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if config.debug {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = DEFAULT_CORS_ORIGINS
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Assemble the full application router around `state`.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth_routes::profile_routes())
        .merge(portfolio_routes::portfolio_routes())
        .merge(alert_routes::alert_routes())
        .merge(market_routes::market_routes())
        .merge(ai_routes::ai_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api = Router::new()
        .merge(auth_routes::auth_routes())
        .merge(protected);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest(API_PREFIX, api)
        .merge(ws_routes::ws_routes())
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                // request_id is filled in by request_id_middleware
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}

/// Wire the production components from `config`.
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    let db = DashboardDb::new(&config.database_url).await?;

    let provider = Arc::new(FinnhubClient::new(
        config.finnhub_api_key.clone(),
        config.finnhub_rate_limit,
    ));
    let cache = Arc::new(QuoteCache::with_settings(
        provider,
        chrono::Duration::seconds(config.quote_cache_ttl_secs),
        config.quote_cache_capacity,
    ));
    let market = Arc::new(MarketDataService::new(cache));

    Ok(AppState::new(
        config,
        db,
        market,
        Arc::new(InsightGenerator::new()),
    ))
}

pub async fn run_server() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    let addr = config.bind_addr();
    let update_interval = Duration::from_secs(config.market_update_interval_secs.max(1));

    let state = build_state(config).await?;

    let ticker = state.broadcaster.spawn_ticker(update_interval);

    // Periodically drop expired brute-force records
    let guard = state.brute_force_guard.clone();
    let cleanup = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            guard.cleanup();
        }
    });

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Financial Dashboard API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    ticker.abort();
    cleanup.abort();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use market_core::{MarketError, Quote, QuoteProvider};
    use std::collections::HashMap;
    use tower::ServiceExt;

    /// Fixed-price provider; unknown symbols fail like an unreachable upstream
    pub struct StaticProvider {
        quotes: HashMap<String, (f64, f64)>,
    }

    impl StaticProvider {
        pub fn new(quotes: &[(&str, f64, f64)]) -> Self {
            Self {
                quotes: quotes
                    .iter()
                    .map(|(s, price, change)| (s.to_string(), (*price, *change)))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_quote(&self, symbol: &str) -> Result<Quote, MarketError> {
            let (price, change) = self
                .quotes
                .get(symbol)
                .copied()
                .ok_or_else(|| MarketError::Network("unreachable".to_string()))?;
            Ok(Quote {
                symbol: symbol.to_string(),
                price: Some(price),
                change,
                volume: 0.0,
                timestamp: Utc::now(),
                high: None,
                low: None,
                open: None,
            })
        }
    }

    pub async fn test_state() -> AppState {
        let config = ServerConfig {
            database_url: "sqlite::memory:".to_string(),
            secret_key: "test-secret".to_string(),
            auth_max_failures: 3,
            ..ServerConfig::default()
        };
        let db = DashboardDb::new(&config.database_url).await.unwrap();
        let provider = Arc::new(StaticProvider::new(&[
            ("AAPL", 150.0, 1.5),
            ("MSFT", 300.0, -0.5),
            ("TSLA", 200.0, 3.0),
        ]));
        let cache = Arc::new(QuoteCache::new(provider));
        let market = Arc::new(MarketDataService::new(cache));

        AppState::new(config, db, market, Arc::new(InsightGenerator::with_seed(7)))
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn send_form(app: &Router, uri: &str, form: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Register `username` and return a bearer token for it
    pub async fn register_and_login(app: &Router, username: &str) -> String {
        let (status, _) = send(
            app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(serde_json::json!({
                "email": format!("{}@example.com", username),
                "username": username,
                "password": "correct horse battery staple",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send_form(
            app,
            "/api/v1/auth/token",
            &format!("username={}&password=correct+horse+battery+staple", username),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().unwrap().to_string()
    }
}
