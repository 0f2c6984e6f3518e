//! Common test utilities and helpers for ide-api tests
//!
//! Builds the real router over an in-memory database and the mock cluster
//! controller, and wraps request plumbing so tests read as API calls.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use ide_api::{create_app, AppState, Config};
use ide_orchestrator::test_utils::{create_test_db, insert_user, MockClusterController};
use ide_orchestrator::subscription::{VIP_STATUS_NORMAL, VIP_STATUS_VIP};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

pub const VIP_USER: i64 = 1;
pub const VIP_UID: &str = "uid-vip";
pub const NORMAL_USER: i64 = 2;
pub const NORMAL_UID: &str = "uid-normal";
pub const ADMIN_TOKEN: &str = "test-admin-token";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.max_space_count = 10;
    config.enforce_single_running = false;
    config.restrict_premium_templates = false;
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config.oauth.authorize_url = "https://auth.example.com/oauth/authorize".to_string();
    config.oauth.client_id = "ide-client".to_string();
    config.oauth.redirect_url = "https://ide.example.com/auth/oauth/callback".to_string();
    config
}

/// Seed one active VIP and one normal user.
pub async fn seed_users(pool: &SqlitePool) {
    let in_a_month = chrono::Utc::now().timestamp() + 30 * 86_400;
    insert_user(pool, VIP_USER, VIP_UID, VIP_STATUS_VIP, in_a_month).await;
    insert_user(pool, NORMAL_USER, NORMAL_UID, VIP_STATUS_NORMAL, 0).await;
}

/// Creation body for the Go template on the given spec.
pub fn workspace_body(name: &str, spec_id: i64) -> Value {
    json!({
        "name": name,
        "template_id": 2,
        "spec_id": spec_id,
        "git_repository": "https://github.com/example/app.git"
    })
}

/// Helper to extract JSON body from axum response
pub async fn extract_json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}

/// TestClient to encapsulate API interaction logic
pub struct TestClient {
    pub app: Router,
    pub pool: SqlitePool,
    pub cluster: Arc<MockClusterController>,
}

impl TestClient {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let pool = create_test_db().await;
        seed_users(&pool).await;

        let cluster = Arc::new(MockClusterController::new());
        let state = AppState::new(pool.clone(), cluster.clone(), &config);

        Self {
            app: create_app(state),
            pool,
            cluster,
        }
    }

    /// Send a request to the API
    pub async fn send_request(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Option<(i64, &str)>,
        body: Option<&Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some((user_id, uid)) = user {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-uid", uid);
        }

        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(value).unwrap())
            }
            None => Body::empty(),
        };

        self.send_request(builder.body(body).unwrap()).await
    }

    pub async fn get_as(&self, uri: &str, user: (i64, &str)) -> Response<Body> {
        self.call("GET", uri, Some(user), None).await
    }

    pub async fn post_as(&self, uri: &str, user: (i64, &str), body: &Value) -> Response<Body> {
        self.call("POST", uri, Some(user), Some(body)).await
    }

    pub async fn put_as(&self, uri: &str, user: (i64, &str), body: &Value) -> Response<Body> {
        self.call("PUT", uri, Some(user), Some(body)).await
    }

    pub async fn delete_as(&self, uri: &str, user: (i64, &str)) -> Response<Body> {
        self.call("DELETE", uri, Some(user), None).await
    }

    pub async fn admin_call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("x-admin-token", token);
        }

        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(value).unwrap())
            }
            None => Body::empty(),
        };

        self.send_request(builder.body(body).unwrap()).await
    }

    pub async fn admin_post(
        &self,
        uri: &str,
        token: Option<&str>,
        body: &Value,
    ) -> Response<Body> {
        self.admin_call("POST", uri, token, Some(body)).await
    }

    pub async fn admin_get(&self, uri: &str) -> Response<Body> {
        self.admin_call("GET", uri, Some(ADMIN_TOKEN), None).await
    }

    /// Create and start a workspace as the VIP user, returning its JSON.
    pub async fn running_workspace(&self, name: &str) -> Value {
        let response = self
            .post_as("/api/workspace/cas", (VIP_USER, VIP_UID), &workspace_body(name, 1))
            .await;
        assert_eq!(response.status(), 200);
        extract_json_body(response).await
    }
}
