//! Middleware stack applied to every HTTP connection.
//!
//! # Responsibilities
//! - Wire up tracing, request IDs, CORS, body limits and request timeouts
//! - Carry JSON reader options to the body extractor
//!
//! # Design Decisions
//! - Layers are applied once to the router; per-connection state travels in
//!   request extensions inserted by the dispatcher

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::{Extension, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{HttpConfig, JsonConfig};
use crate::http::json::JsonOptions;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Wrap application routes in the standard middleware stack.
#[allow(deprecated)]
pub fn build_router(routes: Router, http: &HttpConfig, json: &JsonConfig) -> Router {
    let request_id = HeaderName::from_static(X_REQUEST_ID);
    routes
        .layer(Extension(JsonOptions {
            lenient: json.lenient,
        }))
        .layer(RequestBodyLimitLayer::new(http.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(http.request_timeout_secs)))
        .layer(cors_layer(&http.cors_allowed_origins))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
}

/// CORS policy for the configured origins; `*` allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::post;
    use tower::ServiceExt;

    use super::*;

    fn app(max_body_bytes: usize) -> Router {
        let http = HttpConfig {
            max_body_bytes,
            cors_allowed_origins: vec!["http://localhost".to_string()],
            ..HttpConfig::default()
        };
        build_router(
            Router::new().route("/", post(|body: String| async move { body })),
            &http,
            &JsonConfig::default(),
        )
    }

    #[tokio::test]
    async fn request_id_is_set_and_propagated() {
        let response = app(1024)
            .oneshot(Request::post("/").body(Body::from("x")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let response = app(4)
            .oneshot(
                Request::post("/")
                    .header(header::CONTENT_LENGTH, "10")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let response = app(1024)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/")
                    .header(header::ORIGIN, "http://localhost")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost"
        );
    }
}
