//! Channel error types.

use thiserror::Error;

use gridrun_fabric::FabricError;

/// Errors surfaced by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Push as a non-producer, or peek/pop as a non-consumer.
    #[error("operation not permitted for this channel role")]
    WrongRole,

    /// The token ring is full or the payload ring lacks space.
    #[error("channel cannot accept the token right now")]
    WouldBlock,

    /// No pending token.
    #[error("channel is empty")]
    Empty,

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
