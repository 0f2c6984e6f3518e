use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ide_orchestrator::{ClusterError, EntitlementDenied, OrchestratorError};
use serde_json::json;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Entitlement(EntitlementDenied),
    Orchestrator(OrchestratorError),
}

/// HTTP status for an orchestrator error kind.
pub fn status_for(err: &OrchestratorError) -> StatusCode {
    use OrchestratorError::*;

    match err {
        ParamInvalid(_) | ProductNotFound(_) => StatusCode::BAD_REQUEST,
        NameDuplicate(_)
        | ReachMaxCount(_)
        | SpaceAlreadyExist(_)
        | OtherSpaceRunning
        | WorkSpaceIsRunning => StatusCode::CONFLICT,
        WorkSpaceNotExist | SpaceNotFound(_) | OrderNotFound(_) => StatusCode::NOT_FOUND,
        // Stop handlers answer this one themselves; elsewhere it is a state conflict
        WorkSpaceIsNotRunning => StatusCode::CONFLICT,
        Cluster(ClusterError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        Cluster(_) => StatusCode::BAD_GATEWAY,
        SpaceCreate | SpaceStart | SpaceStop | SpaceDelete | Database(_) | Migration(_)
        | Serialization(_) | Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "param_invalid", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Entitlement(denied) => {
                (StatusCode::FORBIDDEN, "entitlement_denied", denied.to_string())
            }
            ApiError::Orchestrator(err) => {
                let status = status_for(&err);
                let message = if err.code() == "internal" {
                    // Store details stay in the log
                    error!("Request failed: {}", err);
                    "Internal error".to_string()
                } else {
                    err.to_string()
                };
                (status, err.code(), message)
            }
        };

        (status, Json(json!({ "code": code, "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::Orchestrator(err)
    }
}

impl From<EntitlementDenied> for ApiError {
    fn from(denied: EntitlementDenied) -> Self {
        ApiError::Entitlement(denied)
    }
}
