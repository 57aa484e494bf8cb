//! Deployment error types.

use thiserror::Error;

use gridrun_channel::ChannelError;
use gridrun_core::{CoreError, RunnerId};
use gridrun_fabric::{FabricError, InstanceId};
use gridrun_rpc::RpcError;

use crate::runtime::Phase;

/// Errors surfaced by the deployment runtime.
#[derive(Debug, Error)]
pub enum DeployError {
    /// No runner-to-instance assignment satisfies every required topology.
    #[error("no instance assignment satisfies the requested topologies")]
    Unmatchable,

    #[error("function not registered: {0}")]
    UnknownFunction(String),

    #[error("duplicate runner id: {0}")]
    DuplicateRunnerId(RunnerId),

    #[error("instance {0} is assigned more than one runner")]
    DuplicateInstanceId(InstanceId),

    #[error("function already registered: {0}")]
    DuplicateName(String),

    #[error("no channel named '{0}' in this deployment")]
    UnknownChannel(String),

    #[error("deploy() must run on the coordinator instance")]
    NotCoordinator,

    #[error("operation not valid in phase {0:?}")]
    WrongPhase(Phase),

    #[error(transparent)]
    Description(#[from] CoreError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

pub type DeployResult<T> = Result<T, DeployError>;
