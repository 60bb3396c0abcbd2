use axum::{
    extract::{ConnectInfo, State},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use dashboard_store::{NewUser, User, UserUpdate};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::{AuthError, CurrentUser};
use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
}

/// Unauthenticated: registration and token issue
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/token", post(login))
}

/// Authenticated: the caller's own profile
pub fn profile_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me).put(update_me))
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::bad_request("Invalid email address"))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Created user"),
        (status = 400, description = "Email or username already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();

    validate_email(&email)?;
    if username.is_empty() {
        return Err(AppError::bad_request("Username must not be empty"));
    }
    if req.password.is_empty() {
        return Err(AppError::bad_request("Password must not be empty"));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::bad_request("Email already registered"));
    }
    if state.users.find_by_username(&username).await?.is_some() {
        return Err(AppError::bad_request("Username already registered"));
    }

    let hashed_password = state
        .auth
        .hash_password(&req.password)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let user = state
        .users
        .create(NewUser {
            email,
            username,
            full_name: req.full_name,
            hashed_password,
        })
        .await?;

    tracing::info!("Registered user {} (id {})", user.username, user.id);
    Ok(Json(ApiResponse::success(user)))
}

/// OAuth2 password-flow token endpoint. Returns the bare token object.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 401, description = "Incorrect username or password"),
        (status = 429, description = "Too many failed attempts from this address")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AuthError> {
    let ip = connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(remaining) = state.brute_force_guard.lockout_remaining(&ip) {
        return Err(AuthError::Locked {
            retry_after_secs: remaining.as_secs().max(1),
        });
    }

    let user = state
        .users
        .find_by_username(form.username.trim())
        .await
        .map_err(|e| AuthError::Internal(format!("User lookup failed: {e:#}")))?;

    let user = match user {
        Some(user) => user,
        None => {
            state.brute_force_guard.record_failure(&ip);
            return Err(AuthError::InvalidCredentials);
        }
    };

    if let Err(e) = state.auth.verify_password(&form.password, &user.hashed_password) {
        if matches!(e, AuthError::InvalidCredentials) {
            tracing::warn!("Failed login for {} from {}", user.username, ip);
            state.brute_force_guard.record_failure(&ip);
        }
        return Err(e);
    }

    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }

    state.brute_force_guard.record_success(&ip);
    let access_token = state.auth.issue_token(&user.username)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses((status = 200, description = "The authenticated user")),
    tag = "Auth"
)]
pub async fn get_me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<ApiResponse<User>> {
    Json(ApiResponse::success(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/auth/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user"),
        (status = 400, description = "Email or username already taken")
    ),
    tag = "Auth"
)]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let email = req.email.map(|e| e.trim().to_lowercase());
    let username = req.username.map(|u| u.trim().to_string());

    if let Some(email) = &email {
        validate_email(email)?;
        if let Some(other) = state.users.find_by_email(email).await? {
            if other.id != user.id {
                return Err(AppError::bad_request("Email already registered"));
            }
        }
    }

    if let Some(username) = &username {
        if username.is_empty() {
            return Err(AppError::bad_request("Username must not be empty"));
        }
        if let Some(other) = state.users.find_by_username(username).await? {
            if other.id != user.id {
                return Err(AppError::bad_request("Username already registered"));
            }
        }
    }

    let updated = state
        .users
        .update(
            user.id,
            UserUpdate {
                email,
                username,
                full_name: req.full_name,
            },
        )
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(Json(ApiResponse::success(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::build_router;
    use axum::http::StatusCode;
    use serde_json::json;

    fn registration(email: &str, username: &str) -> serde_json::Value {
        json!({ "email": email, "username": username, "password": "pw-123456" })
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let app = build_router(test_state().await);

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(registration("a@example.com", "alice")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["username"], "alice");
        assert!(body["data"].get("hashed_password").is_none());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(registration("A@example.com", "other")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already registered");

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/auth/register",
            None,
            Some(registration("b@example.com", "alice")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already registered");
    }

    #[tokio::test]
    async fn test_login_and_me() {
        let app = build_router(test_state().await);
        let token = register_and_login(&app, "alice").await;

        let (status, body) = send(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_token_type_is_bearer() {
        let app = build_router(test_state().await);
        register_and_login(&app, "alice").await;

        let (status, body) = send_form(
            &app,
            "/api/v1/auth/token",
            "username=alice&password=correct+horse+battery+staple",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["token_type"], "bearer");
    }

    #[tokio::test]
    async fn test_bad_password_then_lockout() {
        let app = build_router(test_state().await);
        register_and_login(&app, "alice").await;

        // The test state locks after three failures
        for _ in 0..3 {
            let (status, body) =
                send_form(&app, "/api/v1/auth/token", "username=alice&password=wrong").await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Incorrect username or password");
        }

        let (status, body) = send_form(
            &app,
            "/api/v1/auth/token",
            "username=alice&password=correct+horse+battery+staple",
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_user_is_unauthorized() {
        let app = build_router(test_state().await);

        let (status, _) = send_form(&app, "/api/v1/auth/token", "username=ghost&password=x").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_update_me() {
        let app = build_router(test_state().await);
        let token = register_and_login(&app, "alice").await;
        register_and_login(&app, "bob").await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/auth/me",
            Some(&token),
            Some(json!({ "full_name": "Alice Liddell" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["full_name"], "Alice Liddell");

        let (status, body) = send(
            &app,
            "PUT",
            "/api/v1/auth/me",
            Some(&token),
            Some(json!({ "email": "bob@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already registered");
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let state = test_state().await;
        let users = state.users.clone();
        let app = build_router(state);
        let token = register_and_login(&app, "alice").await;

        let alice = users.find_by_username("alice").await.unwrap().unwrap();
        users.set_active(alice.id, false).await.unwrap();

        let (status, body) = send(&app, "GET", "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Inactive user");
    }
}
