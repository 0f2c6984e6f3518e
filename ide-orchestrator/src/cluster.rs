//! Contract with the remote cluster controller.
//!
//! The controller is the system of record for whether a workspace is actually
//! materialized and running. It only knows workspaces by their `sid` and owners
//! by their correlation `uid`; local numeric ids never cross this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Resource limits handed to the controller, taken verbatim from a catalog spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu: String,
    pub memory: String,
    pub storage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSpaceRequest {
    pub sid: String,
    pub uid: String,
    pub image: String,
    pub port: u32,
    /// Repository reference; may carry an embedded environment payload,
    /// see [`crate::environment::RepositoryRef`].
    pub git_repository: String,
    pub volume_mount_path: String,
    pub resource_limits: ResourceLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSpaceRequest {
    pub sid: String,
    pub uid: String,
    pub resource_limits: ResourceLimits,
}

/// Structured answer to a create command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
    Failed(String),
}

/// Structured answer to a start command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    NotFound,
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No structured answer came back (connection refused, reset, unavailable).
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{operation} did not complete within {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    /// The controller answered with an error status.
    #[error("controller rejected the request: {0}")]
    Remote(String),
}

#[async_trait]
pub trait ClusterController: Send + Sync {
    async fn create_space(&self, req: CreateSpaceRequest) -> Result<CreateOutcome, ClusterError>;

    async fn start_space(&self, req: StartSpaceRequest) -> Result<StartOutcome, ClusterError>;

    async fn stop_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError>;

    async fn delete_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError>;

    /// Sids of the workspaces currently running for `uid`.
    async fn running_workspaces(&self, uid: &str) -> Result<Vec<String>, ClusterError>;
}

/// Bound a controller call. Expiry is reported as [`ClusterError::Timeout`] and never retried.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    budget: Duration,
    call: F,
) -> Result<T, ClusterError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(ClusterError::Timeout { operation, budget }),
    }
}
