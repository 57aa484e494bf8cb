//! RPC control plane error types.

use thiserror::Error;

use gridrun_fabric::{FabricError, RemoteFault};

/// Errors surfaced by the RPC engine.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC target already registered: {0}")]
    DuplicateName(String),

    #[error("return value already submitted for this invocation")]
    ReturnAlreadySubmitted,

    #[error("no RPC invocation is active on this instance")]
    NoActiveInvocation,

    /// The serving instance reported a fault instead of a return value.
    #[error("remote fault: {0}")]
    Remote(#[from] RemoteFault),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

pub type RpcResult<T> = Result<T, RpcError>;
