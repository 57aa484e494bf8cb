//! gridrun-rpc — the control plane GridRun deploys over.
//!
//! An [`RpcEngine`] wraps a fabric handle with a named target table.
//! Serving instances park in [`RpcEngine::listen`], which executes
//! exactly one incoming request per call; requesters use
//! [`RpcEngine::request`], which blocks until the reply arrives. Targets
//! emit their reply payload through
//! [`RpcEngine::submit_return_value`] (at most once per invocation) and
//! read the caller-supplied integer through
//! [`RpcEngine::rpc_argument`].

pub mod engine;
pub mod error;

pub use engine::{ReturnValue, RpcEngine};
pub use error::{RpcError, RpcResult};
