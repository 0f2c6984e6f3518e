pub mod catalog;
pub mod health;
pub mod oauth;
pub mod payment;
pub mod subscription;
pub mod workspaces;

use crate::{
    api_docs::ApiDoc,
    auth::{admin_middleware, auth_middleware},
    state::AppState,
};
use axum::{middleware, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub fn create_app(state: AppState) -> Router {
    // Allow CORS for the browser IDE frontend served from another origin
    let cors = CorsLayer::permissive();

    let admin = catalog::admin_routes()
        .merge(subscription::admin_routes())
        .merge(payment::admin_routes())
        .layer(middleware::from_fn_with_state(state.clone(), admin_middleware));

    Router::new()
        .merge(health::routes()) // Health and OAuth redirect routes don't need auth
        .merge(oauth::routes())
        .merge(payment::public_routes())
        .route("/api-docs/openapi.json", get(openapi_spec))
        .merge(
            workspaces::routes()
                .merge(catalog::routes())
                .merge(subscription::routes())
                .merge(payment::routes())
                .layer(middleware::from_fn(auth_middleware)),
        )
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
