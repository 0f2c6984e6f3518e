use crate::routes::{
    oauth::{OAuthCallbackResponse, OAuthLoginResponse},
    payment::{SettleOrderRequest, SettleOrderResponse},
    subscription::{ExtendSubscriptionRequest, ExtendSubscriptionResponse},
    workspaces::{MessageResponse, ModifyNameRequest, WorkspaceIdRequest},
};
use ide_orchestrator::{
    CreateOrderRequest, CreateWorkspaceRequest, Operation, OperationStatus, OperationType, Order,
    OrderStatus, PaymentProduct, ProviderCredentials, RunningStatus, SpaceStatus, Spec,
    SpecSummary, SubscriptionStats, SubscriptionStatus, Template, UserSubscription, VipInfo,
    Workspace,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::workspaces::list_workspaces,
        crate::routes::workspaces::create_workspace,
        crate::routes::workspaces::create_and_start_workspace,
        crate::routes::workspaces::start_workspace,
        crate::routes::workspaces::stop_workspace,
        crate::routes::workspaces::delete_workspace,
        crate::routes::workspaces::modify_name,
        crate::routes::workspaces::list_operations,
        crate::routes::catalog::list_templates,
        crate::routes::catalog::list_specs,
        crate::routes::catalog::refresh_catalog,
        crate::routes::subscription::vip_info,
        crate::routes::subscription::subscription_history,
        crate::routes::subscription::extend_subscription,
        crate::routes::subscription::subscription_stats,
        crate::routes::payment::list_products,
        crate::routes::payment::create_order,
        crate::routes::payment::list_orders,
        crate::routes::payment::settle_order,
        crate::routes::oauth::oauth_login,
        crate::routes::oauth::oauth_callback,
    ),
    components(
        schemas(
            Workspace,
            SpaceStatus,
            RunningStatus,
            SpecSummary,
            CreateWorkspaceRequest,
            ProviderCredentials,
            WorkspaceIdRequest,
            ModifyNameRequest,
            MessageResponse,
            Template,
            Spec,
            Operation,
            OperationStatus,
            OperationType,
            VipInfo,
            ExtendSubscriptionRequest,
            ExtendSubscriptionResponse,
            UserSubscription,
            SubscriptionStatus,
            SubscriptionStats,
            PaymentProduct,
            Order,
            OrderStatus,
            CreateOrderRequest,
            SettleOrderRequest,
            SettleOrderResponse,
            OAuthLoginResponse,
            OAuthCallbackResponse
        )
    ),
    tags(
        (name = "ide-api", description = "Cloud IDE workspace control plane API")
    )
)]
pub struct ApiDoc;
