//! Fabric error types.

use thiserror::Error;

use crate::fabric::InstanceId;

/// Errors surfaced by a transport backend.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("transport peer disconnected")]
    Disconnected,

    #[error("unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("no global memory slot registered under tag {tag}, key {key}")]
    UnknownSlot { tag: u64, key: u64 },

    #[error("slot access out of bounds: offset {offset} + len {len} > size {size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("transport group aborted with code {0}")]
    Aborted(i32),
}

pub type FabricResult<T> = Result<T, FabricError>;
