use crate::cluster::ClusterError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Every failure an orchestrator operation can report to the request boundary.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid request parameter: {0}")]
    ParamInvalid(String),

    #[error("Workspace name already in use: {0}")]
    NameDuplicate(String),

    #[error("Reached the maximum of {0} workspaces")]
    ReachMaxCount(i64),

    #[error("Workspace creation failed")]
    SpaceCreate,

    #[error("Workspace start failed")]
    SpaceStart,

    #[error("Workspace stop failed")]
    SpaceStop,

    #[error("Workspace delete failed")]
    SpaceDelete,

    #[error("Workspace already exists in the cluster: {0}")]
    SpaceAlreadyExist(String),

    #[error("Workspace not found in the cluster: {0}")]
    SpaceNotFound(String),

    #[error("Another workspace is already running")]
    OtherSpaceRunning,

    #[error("Workspace does not exist")]
    WorkSpaceNotExist,

    #[error("Workspace is running")]
    WorkSpaceIsRunning,

    #[error("Workspace is not running")]
    WorkSpaceIsNotRunning,

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Cluster controller error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// Stable machine-readable kind, used by the HTTP layer in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParamInvalid(_) => "param_invalid",
            Self::NameDuplicate(_) => "name_duplicate",
            Self::ReachMaxCount(_) => "reach_max_count",
            Self::SpaceCreate => "space_create",
            Self::SpaceStart => "space_start",
            Self::SpaceStop => "space_stop",
            Self::SpaceDelete => "space_delete",
            Self::SpaceAlreadyExist(_) => "space_already_exist",
            Self::SpaceNotFound(_) => "space_not_found",
            Self::OtherSpaceRunning => "other_space_running",
            Self::WorkSpaceNotExist => "workspace_not_exist",
            Self::WorkSpaceIsRunning => "workspace_is_running",
            Self::WorkSpaceIsNotRunning => "workspace_is_not_running",
            Self::ProductNotFound(_) => "product_not_found",
            Self::OrderNotFound(_) => "order_not_found",
            Self::Cluster(ClusterError::Timeout { .. }) => "cluster_timeout",
            Self::Cluster(_) => "cluster_unavailable",
            Self::Database(_) | Self::Migration(_) | Self::Serialization(_) | Self::Io(_) => {
                "internal"
            }
        }
    }
}
