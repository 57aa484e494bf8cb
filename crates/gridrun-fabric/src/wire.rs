//! Wire messages exchanged through a fabric backend.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fabric::InstanceId;

/// A request delivered to a listening instance.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    /// The instance that posted the request.
    pub requester: InstanceId,
    /// Name of the RPC target to execute.
    pub name: String,
    /// Caller-supplied integer argument.
    pub arg: u64,
}

/// Reply to a request: a return-value payload or a fault.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Target executed; `None` when it submitted no return value.
    Value(Option<Bytes>),
    /// Target could not be executed.
    Fault(RemoteFault),
}

/// Faults a serving instance reports back to the requester.
///
/// Serializable so that cross-process backends can move them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum RemoteFault {
    #[error("no RPC target registered under '{0}'")]
    UnknownTarget(String),
}
