//! gridrun-fabric — the transport layer GridRun runs on.
//!
//! The deployment runtime never talks to a concrete network. Everything
//! it needs from the outside world is the `Fabric` trait:
//!
//! - **Identity** — who am I, who is root, who participates
//! - **Wire RPC** — post a named request, receive requests, exchange replies
//! - **Global memory** — register local slots under `(tag, key)`, fence,
//!   resolve peer slots
//! - **Distributed locks** — mutual exclusion keyed by tag
//! - **Lifecycle** — abort, collective finalize
//!
//! Backends are constructed at process start and handed to the runtime
//! as `Arc<dyn Fabric>`. This crate ships one backend: [`LocalFabric`],
//! which runs a whole transport group as threads in a single process and
//! is what the test suites and the demo driver use.

pub mod error;
pub mod fabric;
pub mod local;
pub mod slot;
pub mod wire;

pub use error::{FabricError, FabricResult};
pub use fabric::{Fabric, InstanceId};
pub use local::LocalFabric;
pub use slot::{read_u64, write_u64, HeapSlot, MemorySlot, SlotRef};
pub use wire::{IncomingRequest, RemoteFault, Reply};
