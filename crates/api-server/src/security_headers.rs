use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};

/// Response headers stamped on everything the API returns. Handlers that
/// already set one of these keep their own value.
const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "0"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    // Quotes and portfolio values go stale quickly
    ("cache-control", "no-store"),
];

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for (name, value) in SECURITY_HEADERS {
        if !headers.contains_key(*name) {
            headers.insert(*name, HeaderValue::from_static(value));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_handler_headers_are_not_overwritten() {
        let app = Router::new()
            .route(
                "/cached",
                get(|| async { ([("cache-control", "max-age=60")], "ok").into_response() }),
            )
            .layer(middleware::from_fn(security_headers_middleware));

        let request = Request::builder().uri("/cached").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.headers()["cache-control"], "max-age=60");
        assert_eq!(response.headers()["x-frame-options"], "DENY");
    }
}
