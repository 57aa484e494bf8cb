//! gridrun-deploy — the deployment runtime.
//!
//! Drives a deployment from description to running entries:
//!
//! ```text
//! Runtime (one per instance, SPMD)
//!   ├── register_function()      user entry table + launch shims
//!   ├── initialize()             built-in RPC targets, New → Initialized
//!   ├── coordinator: deploy()    gather → match → validate → dispatch
//!   │                            → channels → local entry
//!   └── worker: serve()          listen until launched or parked
//! ```
//!
//! Entries receive a [`RuntimeHandle`] they capture at registration
//! time; it exposes the runner id, the instance identity, and the
//! channels of the deployment.

pub mod error;
pub mod runtime;

pub use error::{DeployError, DeployResult};
pub use runtime::{Phase, Runtime, RuntimeHandle, GET_TOPOLOGY_RPC, PARK_RPC};
