//! gridrun-core — shared data model for the GridRun deployment runtime.
//!
//! - **`topology`** — hardware descriptions (devices, memory spaces,
//!   compute resources), canonical JSON round-trip, subset predicate
//! - **`runner`** — runner specs, resolved runners, deployments,
//!   channel specs
//! - **`description`** — the user-facing JSON job description

pub mod description;
pub mod error;
pub mod runner;
pub mod topology;

pub use description::{DeploymentDescription, RunnerEntry};
pub use error::{CoreError, CoreResult};
pub use runner::{ChannelSpec, Deployment, Runner, RunnerId, RunnerSpec, RunnerTarget};
pub use topology::{is_subset, ComputeResource, Device, MemorySpace, Topology};
