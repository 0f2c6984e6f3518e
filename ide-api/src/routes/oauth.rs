use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;
use utoipa::{IntoParams, ToSchema};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/oauth/login", get(oauth_login))
        .route("/auth/oauth/callback", get(oauth_callback))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthLoginResponse {
    /// Provider URL the browser should be sent to.
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OAuthCallbackResponse {
    pub code: String,
    pub state_verified: bool,
}

#[utoipa::path(
    get,
    path = "/auth/oauth/login",
    responses((status = 200, description = "Authorize URL with a fresh state", body = OAuthLoginResponse)),
    tag = "oauth"
)]
pub async fn oauth_login(State(state): State<AppState>) -> ApiResult<Json<OAuthLoginResponse>> {
    let issued = state.oauth_states.issue();

    let url = Url::parse_with_params(
        &state.oauth.authorize_url,
        &[
            ("client_id", state.oauth.client_id.as_str()),
            ("redirect_uri", state.oauth.redirect_url.as_str()),
            ("response_type", "code"),
            ("state", issued.as_str()),
        ],
    )
    .map_err(|e| {
        warn!("Invalid OAuth authorize URL {}: {}", state.oauth.authorize_url, e);
        ApiError::BadRequest("OAuth login is not configured".to_string())
    })?;

    Ok(Json(OAuthLoginResponse {
        url: url.into(),
        state: issued,
    }))
}

/// Verifies the `state` round trip. The code itself is exchanged by the auth gateway.
#[utoipa::path(
    get,
    path = "/auth/oauth/callback",
    params(OAuthCallbackQuery),
    responses(
        (status = 200, description = "State verified", body = OAuthCallbackResponse),
        (status = 400, description = "Unknown, reused or expired state")
    ),
    tag = "oauth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<Json<OAuthCallbackResponse>> {
    if !state.oauth_states.validate(&query.state) {
        return Err(ApiError::BadRequest("invalid or expired OAuth state".to_string()));
    }

    Ok(Json(OAuthCallbackResponse {
        code: query.code,
        state_verified: true,
    }))
}
