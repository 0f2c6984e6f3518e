//! gRPC client for the cluster controller's `pb.CloudIdeService`.
//!
//! Message layouts mirror the controller's protobuf definitions. They are
//! declared with prost derives directly so the crate builds without protoc.

use crate::cluster::{
    ClusterController, ClusterError, CreateOutcome, CreateSpaceRequest, ResourceLimits,
    StartOutcome, StartSpaceRequest,
};
use async_trait::async_trait;
use std::time::Duration;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{debug, instrument};

pub mod pb {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ResourceLimit {
        #[prost(string, tag = "1")]
        pub cpu: String,
        #[prost(string, tag = "2")]
        pub memory: String,
        #[prost(string, tag = "3")]
        pub storage: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RequestCreate {
        #[prost(string, tag = "1")]
        pub sid: String,
        #[prost(string, tag = "2")]
        pub uid: String,
        #[prost(string, tag = "3")]
        pub image: String,
        #[prost(uint32, tag = "4")]
        pub port: u32,
        #[prost(string, tag = "5")]
        pub git_repository: String,
        #[prost(string, tag = "6")]
        pub volume_mount_path: String,
        #[prost(message, optional, tag = "7")]
        pub resource_limit: Option<ResourceLimit>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum CreateStatus {
        Success = 0,
        AlreadyExist = 1,
        Error = 2,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ResponseCreate {
        #[prost(enumeration = "CreateStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RequestStart {
        #[prost(string, tag = "1")]
        pub sid: String,
        #[prost(string, tag = "2")]
        pub uid: String,
        #[prost(message, optional, tag = "3")]
        pub resource_limit: Option<ResourceLimit>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum StartStatus {
        Success = 0,
        NotFound = 1,
        Error = 2,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ResponseStart {
        #[prost(enumeration = "StartStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }

    /// Shared by stop and delete.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RequestSpace {
        #[prost(string, tag = "1")]
        pub sid: String,
        #[prost(string, tag = "2")]
        pub uid: String,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum CommandStatus {
        Success = 0,
        Error = 1,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ResponseCommand {
        #[prost(enumeration = "CommandStatus", tag = "1")]
        pub status: i32,
        #[prost(string, tag = "2")]
        pub message: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RequestRunningWorkspaces {
        #[prost(string, tag = "1")]
        pub uid: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RunningWorkspace {
        #[prost(string, tag = "1")]
        pub sid: String,
        #[prost(string, tag = "2")]
        pub name: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ResponseRunningWorkspaces {
        #[prost(message, repeated, tag = "1")]
        pub workspaces: Vec<RunningWorkspace>,
    }
}

const CREATE_SPACE: &str = "/pb.CloudIdeService/CreateSpace";
const START_SPACE: &str = "/pb.CloudIdeService/StartSpace";
const STOP_SPACE: &str = "/pb.CloudIdeService/StopSpace";
const DELETE_SPACE: &str = "/pb.CloudIdeService/DeleteSpace";
const RUNNING_WORKSPACES: &str = "/pb.CloudIdeService/RunningWorkspaces";

/// [`ClusterController`] backed by a lazily connected tonic channel.
#[derive(Debug, Clone)]
pub struct GrpcClusterController {
    inner: tonic::client::Grpc<Channel>,
}

impl GrpcClusterController {
    /// Build a client for `addr` (e.g. `http://cloud-ide-control-plane-svc:6387`).
    ///
    /// The connection is established on first use, so a controller that is
    /// down at startup does not keep the API from booting.
    pub fn connect_lazy(addr: &str, connect_timeout: Duration) -> Result<Self, ClusterError> {
        let endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|e| ClusterError::Transport(format!("invalid controller address: {e}")))?
            .connect_timeout(connect_timeout);

        Ok(Self {
            inner: tonic::client::Grpc::new(endpoint.connect_lazy()),
        })
    }

    async fn unary<Req, Resp>(
        &self,
        path: &'static str,
        request: Req,
    ) -> Result<Resp, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.inner.clone();
        grpc.ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("Service was not ready: {e}")))?;

        let codec = tonic::codec::ProstCodec::<Req, Resp>::default();
        let response = grpc
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;

        Ok(response.into_inner())
    }
}

impl From<&ResourceLimits> for pb::ResourceLimit {
    fn from(limits: &ResourceLimits) -> Self {
        Self {
            cpu: limits.cpu.clone(),
            memory: limits.memory.clone(),
            storage: limits.storage.clone(),
        }
    }
}

/// Classify a status that carried no response message.
///
/// Codes the controller uses for deliberate rejections are structured remote
/// errors; anything else means the call never got a real answer.
fn status_to_error(status: tonic::Status) -> ClusterError {
    match status.code() {
        Code::Internal
        | Code::Aborted
        | Code::FailedPrecondition
        | Code::ResourceExhausted
        | Code::InvalidArgument
        | Code::PermissionDenied => ClusterError::Remote(status.message().to_string()),
        _ => ClusterError::Transport(format!("{:?}: {}", status.code(), status.message())),
    }
}

#[async_trait]
impl ClusterController for GrpcClusterController {
    #[instrument(skip(self, req), fields(sid = %req.sid))]
    async fn create_space(&self, req: CreateSpaceRequest) -> Result<CreateOutcome, ClusterError> {
        let request = pb::RequestCreate {
            sid: req.sid,
            uid: req.uid,
            image: req.image,
            port: req.port,
            git_repository: req.git_repository,
            volume_mount_path: req.volume_mount_path,
            resource_limit: Some((&req.resource_limits).into()),
        };

        match self
            .unary::<_, pb::ResponseCreate>(CREATE_SPACE, request)
            .await
        {
            Ok(resp) => match pb::CreateStatus::try_from(resp.status) {
                Ok(pb::CreateStatus::Success) => Ok(CreateOutcome::Created),
                Ok(pb::CreateStatus::AlreadyExist) => Ok(CreateOutcome::AlreadyExists),
                Ok(pb::CreateStatus::Error) | Err(_) => Ok(CreateOutcome::Failed(resp.message)),
            },
            Err(status) if status.code() == Code::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
            Err(status) => match status_to_error(status) {
                ClusterError::Remote(message) => Ok(CreateOutcome::Failed(message)),
                other => Err(other),
            },
        }
    }

    #[instrument(skip(self, req), fields(sid = %req.sid))]
    async fn start_space(&self, req: StartSpaceRequest) -> Result<StartOutcome, ClusterError> {
        let request = pb::RequestStart {
            sid: req.sid,
            uid: req.uid,
            resource_limit: Some((&req.resource_limits).into()),
        };

        match self.unary::<_, pb::ResponseStart>(START_SPACE, request).await {
            Ok(resp) => match pb::StartStatus::try_from(resp.status) {
                Ok(pb::StartStatus::Success) => Ok(StartOutcome::Started),
                Ok(pb::StartStatus::NotFound) => Ok(StartOutcome::NotFound),
                Ok(pb::StartStatus::Error) | Err(_) => Ok(StartOutcome::Failed(resp.message)),
            },
            Err(status) if status.code() == Code::NotFound => Ok(StartOutcome::NotFound),
            Err(status) => match status_to_error(status) {
                ClusterError::Remote(message) => Ok(StartOutcome::Failed(message)),
                other => Err(other),
            },
        }
    }

    #[instrument(skip(self))]
    async fn stop_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError> {
        let request = pb::RequestSpace {
            sid: sid.to_string(),
            uid: uid.to_string(),
        };
        let resp = self
            .unary::<_, pb::ResponseCommand>(STOP_SPACE, request)
            .await
            .map_err(status_to_error)?;
        command_result(resp)
    }

    #[instrument(skip(self))]
    async fn delete_space(&self, sid: &str, uid: &str) -> Result<(), ClusterError> {
        let request = pb::RequestSpace {
            sid: sid.to_string(),
            uid: uid.to_string(),
        };
        let resp = self
            .unary::<_, pb::ResponseCommand>(DELETE_SPACE, request)
            .await
            .map_err(status_to_error)?;
        command_result(resp)
    }

    #[instrument(skip(self))]
    async fn running_workspaces(&self, uid: &str) -> Result<Vec<String>, ClusterError> {
        let request = pb::RequestRunningWorkspaces {
            uid: uid.to_string(),
        };
        let resp = self
            .unary::<_, pb::ResponseRunningWorkspaces>(RUNNING_WORKSPACES, request)
            .await
            .map_err(status_to_error)?;

        debug!("controller reports {} running workspaces", resp.workspaces.len());
        Ok(resp.workspaces.into_iter().map(|ws| ws.sid).collect())
    }
}

fn command_result(resp: pb::ResponseCommand) -> Result<(), ClusterError> {
    match pb::CommandStatus::try_from(resp.status) {
        Ok(pb::CommandStatus::Success) => Ok(()),
        _ => Err(ClusterError::Remote(resp.message)),
    }
}
