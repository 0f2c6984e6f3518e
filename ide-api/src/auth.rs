use crate::{error::ApiError, state::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Header carrying the numeric user id, set by the authenticating gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the cluster correlation id of the same user.
pub const USER_UID_HEADER: &str = "x-user-uid";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Identity established upstream. Handlers trust it without re-verifying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Opaque correlation id the cluster controller knows the user by.
    pub uid: String,
}

fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Auth middleware - extracts the caller from gateway headers
///
/// Requests without a numeric `x-user-id` and a `x-user-uid` are rejected with 401.
pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, ApiError> {
    let user_id = header(&req, USER_ID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing user identity".to_string()))?
        .parse::<i64>()
        .map_err(|_| ApiError::Unauthorized("malformed user identity".to_string()))?;

    let uid = header(&req, USER_UID_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing user correlation id".to_string()))?
        .to_string();

    req.extensions_mut().insert(AuthenticatedUser { user_id, uid });

    Ok(next.run(req).await)
}

/// Gate for catalog and subscription administration.
pub async fn admin_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::Forbidden("admin API is disabled".to_string()));
    };

    match header(&req, ADMIN_TOKEN_HEADER) {
        Some(token) if token == expected => Ok(next.run(req).await),
        _ => Err(ApiError::Forbidden("invalid admin token".to_string())),
    }
}
