//! The RPC engine: target table, listen/request, return-value transport.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use gridrun_fabric::{Fabric, InstanceId, RemoteFault, Reply};

use crate::error::{RpcError, RpcResult};

type TargetFn = Box<dyn FnMut() + Send>;

/// Per-invocation state, live while a target closure runs.
struct Invocation {
    requester: InstanceId,
    arg: u64,
    replied: bool,
}

/// Named-target RPC over a fabric handle.
///
/// The target table is populated before deployment and read-only
/// afterwards; one engine serves one instance. Requests from one caller
/// to one target are served in call order, one per `listen` invocation.
pub struct RpcEngine {
    fabric: Arc<dyn Fabric>,
    targets: Mutex<HashMap<String, TargetFn>>,
    invocation: Mutex<Option<Invocation>>,
}

impl RpcEngine {
    pub fn new(fabric: Arc<dyn Fabric>) -> Self {
        Self {
            fabric,
            targets: Mutex::new(HashMap::new()),
            invocation: Mutex::new(None),
        }
    }

    /// The fabric this engine serves.
    pub fn fabric(&self) -> &Arc<dyn Fabric> {
        &self.fabric
    }

    /// Register a closure under `name`.
    ///
    /// A second registration under the same name fails with
    /// `DuplicateName` and leaves the first closure in place.
    pub fn register_target(
        &self,
        name: &str,
        target: impl FnMut() + Send + 'static,
    ) -> RpcResult<()> {
        let mut targets = self.targets.lock();
        if targets.contains_key(name) {
            return Err(RpcError::DuplicateName(name.to_string()));
        }
        targets.insert(name.to_string(), Box::new(target));
        Ok(())
    }

    /// Block until one request arrives, execute its target, and
    /// guarantee exactly one reply to the requester.
    ///
    /// The reply goes out when the target submits a return value, or as
    /// an empty reply after a target that never submitted. An unknown
    /// target name is answered with a fault; this instance keeps
    /// running.
    pub fn listen(&self) -> RpcResult<()> {
        let request = self.fabric.recv_request()?;
        debug!(
            requester = request.requester,
            name = %request.name,
            arg = request.arg,
            "serving request"
        );

        let target = self.targets.lock().remove(&request.name);
        let Some(mut target) = target else {
            warn!(name = %request.name, "request for unregistered target");
            self.fabric.send_reply(
                request.requester,
                Reply::Fault(RemoteFault::UnknownTarget(request.name)),
            )?;
            return Ok(());
        };

        *self.invocation.lock() = Some(Invocation {
            requester: request.requester,
            arg: request.arg,
            replied: false,
        });

        target();
        self.targets.lock().insert(request.name, target);

        let finished = self.invocation.lock().take();
        match finished {
            Some(invocation) if !invocation.replied => self
                .fabric
                .send_reply(invocation.requester, Reply::Value(None))
                .map_err(RpcError::from),
            _ => Ok(()),
        }
    }

    /// Post a request to `target` and block for its reply.
    pub fn request(&self, target: InstanceId, name: &str, arg: u64) -> RpcResult<ReturnValue> {
        self.fabric.post_request(target, name, arg)?;
        match self.fabric.recv_reply(target)? {
            Reply::Value(payload) => Ok(ReturnValue { payload }),
            Reply::Fault(fault) => Err(RpcError::Remote(fault)),
        }
    }

    /// Declare the reply payload of the current invocation and transmit
    /// it to the requester. At most once per invocation.
    pub fn submit_return_value(&self, payload: &[u8]) -> RpcResult<()> {
        let requester = {
            let mut invocation = self.invocation.lock();
            let Some(invocation) = invocation.as_mut() else {
                return Err(RpcError::NoActiveInvocation);
            };
            if invocation.replied {
                return Err(RpcError::ReturnAlreadySubmitted);
            }
            invocation.replied = true;
            invocation.requester
        };
        self.fabric
            .send_reply(requester, Reply::Value(Some(Bytes::copy_from_slice(payload))))?;
        Ok(())
    }

    /// The caller-supplied integer argument of the current invocation.
    pub fn rpc_argument(&self) -> Option<u64> {
        self.invocation.lock().as_ref().map(|i| i.arg)
    }
}

/// A reply payload returned by [`RpcEngine::request`].
///
/// Holds the backing buffer until released; `release` (or drop) frees
/// it.
pub struct ReturnValue {
    payload: Option<Bytes>,
}

impl ReturnValue {
    /// The reply bytes; empty when the target submitted nothing.
    pub fn as_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }

    /// Whether the target submitted a payload.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Release the backing buffer.
    pub fn release(self) {}
}
