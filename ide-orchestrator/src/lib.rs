//! Cloud IDE workspace control plane
//!
//! This crate holds the lifecycle logic for user workspaces: reserving them in
//! the local store, materializing them through the remote cluster controller,
//! and keeping the two in step. It is consumed by the ide-api HTTP service.

pub mod catalog;
pub mod cluster;
pub mod db;
pub mod environment;
pub mod error;
pub mod grpc;
pub mod operation;
pub mod payment;
pub mod store;
pub mod subscription;
pub mod workspace;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use catalog::{CatalogCache, CatalogSource, Spec, SqliteCatalog, Template};
pub use cluster::{ClusterController, ClusterError};
pub use environment::{ProviderCredentials, RepositoryRef};
pub use error::{OrchestratorError, Result};
pub use grpc::GrpcClusterController;
pub use operation::{Operation, OperationStatus, OperationType};
pub use payment::{
    CreateOrderRequest, Order, OrderStatus, PaymentProduct, PaymentService, Settlement,
};
pub use subscription::{
    EntitlementDenied, EntitlementPolicy, SubscriptionService, SubscriptionStats,
    SubscriptionStatus, UserSubscription, VipInfo,
};
pub use workspace::{
    CreateWorkspaceRequest, OrchestratorConfig, RunningStatus, SpaceStatus, SpecSummary,
    Workspace, WorkspaceOrchestrator,
};
