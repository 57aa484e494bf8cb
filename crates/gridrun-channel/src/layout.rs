//! On-slot layout of a channel.
//!
//! Global slot keys, per the wire contract:

/// Token ring: `capacity` entries of [`SIZE_ENTRY_BYTES`] each.
pub const KEY_SIZES: u64 = 0;
/// Coordination cell for the token ring.
pub const KEY_COORD_SIZES: u64 = 3;
/// Coordination cell for the payload ring.
pub const KEY_COORD_PAYLOADS: u64 = 4;
/// Payload ring: `payload_size` bytes.
pub const KEY_PAYLOAD: u64 = 5;

/// A coordination cell: head counter then tail counter, both u64 LE.
/// Heads are producer-advanced, tails consumer-advanced; both count
/// monotonically and are never wrapped.
pub const COORD_CELL_BYTES: usize = 16;
pub const HEAD_OFFSET: usize = 0;
pub const TAIL_OFFSET: usize = 8;

/// A token-ring entry: unwrapped payload byte offset then length, both
/// u64 LE. The payload ring position is `offset % payload_size`.
pub const SIZE_ENTRY_BYTES: usize = 16;
