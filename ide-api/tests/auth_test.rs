//! Integration tests for authentication middleware
//!
//! Tests that the auth middleware extracts the caller's numeric id and
//! cluster correlation id from gateway headers and rejects everything else.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
    Router,
};
use ide_api::auth::{auth_middleware, AuthenticatedUser};
use tower::ServiceExt; // for `oneshot`

// Simple handler that echoes the authenticated user
async fn test_handler(
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "user_id": user.user_id,
        "uid": user.uid,
    }))
}

fn create_test_app() -> Router {
    Router::new()
        .route("/protected", get(test_handler))
        .layer(middleware::from_fn(auth_middleware))
}

async fn status_for(headers: &[(&str, &str)]) -> StatusCode {
    let mut builder = Request::builder().uri("/protected");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = create_test_app()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_valid_headers_pass() {
    let request = Request::builder()
        .uri("/protected")
        .header("x-user-id", "42")
        .header("x-user-uid", "uid-42")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["user_id"], 42);
    assert_eq!(json["uid"], "uid-42");
}

#[tokio::test]
async fn test_missing_headers_rejected() {
    assert_eq!(status_for(&[]).await, StatusCode::UNAUTHORIZED);
    assert_eq!(
        status_for(&[("x-user-id", "42")]).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_for(&[("x-user-uid", "uid-42")]).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_malformed_user_id_rejected() {
    assert_eq!(
        status_for(&[("x-user-id", "alice"), ("x-user-uid", "uid-42")]).await,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_blank_headers_rejected() {
    assert_eq!(
        status_for(&[("x-user-id", "  "), ("x-user-uid", "uid-42")]).await,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_for(&[("x-user-id", "42"), ("x-user-uid", "")]).await,
        StatusCode::UNAUTHORIZED
    );
}
