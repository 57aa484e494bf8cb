//! gridrun-channel — variable-sized MPSC channels between runners.
//!
//! A channel is a bounded token queue owned by its single consumer:
//! the consumer allocates the token ring, the payload ring, and the two
//! coordination cells, and registers them in the fabric's global slot
//! exchange. Producers resolve those slots after a collective fence and
//! publish tokens under a distributed lock keyed by the channel tag.
//!
//! `push` never waits — a full token ring or insufficient payload space
//! yields `WouldBlock`. `peek`/`pop` never block either; consumers that
//! want to wait spin on `peek`.

pub mod channel;
pub mod error;
pub mod layout;

pub use channel::{Channel, ChannelConfig, ChannelRole, Token};
pub use error::{ChannelError, ChannelResult};
