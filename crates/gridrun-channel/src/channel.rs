//! Channel endpoints: handshake, push, peek, pop.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error};

use gridrun_fabric::{read_u64, write_u64, Fabric, SlotRef};

use crate::error::{ChannelError, ChannelResult};
use crate::layout::{
    COORD_CELL_BYTES, HEAD_OFFSET, KEY_COORD_PAYLOADS, KEY_COORD_SIZES, KEY_PAYLOAD, KEY_SIZES,
    SIZE_ENTRY_BYTES, TAIL_OFFSET,
};

/// This instance's part in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Producer,
    Consumer,
    /// Participates in the collective handshake only.
    Observer,
}

/// Static parameters of a channel, identical on every instance.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Group-unique tag; keys the slot exchange, the fence, and the
    /// distributed lock.
    pub tag: u64,
    /// Maximum number of pending tokens.
    pub capacity: usize,
    /// Payload ring size in bytes.
    pub payload_size: usize,
}

/// The consumer-owned side: the four master slots.
struct ConsumerSide {
    sizes: SlotRef,
    payload: SlotRef,
    coord_sizes: SlotRef,
    coord_payloads: SlotRef,
}

/// The producer side: remote views of the consumer's slots plus local
/// coordination mirrors and the one-element size-info staging slot.
struct ProducerSide {
    sizes: SlotRef,
    payload: SlotRef,
    coord_sizes: SlotRef,
    coord_payloads: SlotRef,
    mirror_sizes: SlotRef,
    mirror_payloads: SlotRef,
    staging: SlotRef,
}

enum Endpoint {
    Producer(ProducerSide),
    Consumer(ConsumerSide),
    Observer,
}

/// One endpoint of a variable-sized MPSC channel.
pub struct Channel {
    fabric: Arc<dyn Fabric>,
    config: ChannelConfig,
    endpoint: Endpoint,
}

/// A pending token observed by `peek`.
///
/// Identity — the unwrapped byte offset and length — refers into the
/// consumer's payload ring and stays valid until the matching `pop`.
#[derive(Debug, Clone)]
pub struct Token {
    offset: u64,
    data: Bytes,
}

impl Token {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Unwrapped byte offset of this token in the payload ring.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Channel {
    /// Collective handshake; every instance in the transport group must
    /// call this with the same `config`, stating its own role.
    ///
    /// The consumer allocates and registers the master slots; producers
    /// allocate their mirrors and resolve the consumer's slots after
    /// the fence; observers only fence. A transport failure here tears
    /// the group down.
    pub fn open(
        fabric: Arc<dyn Fabric>,
        config: ChannelConfig,
        role: ChannelRole,
    ) -> ChannelResult<Self> {
        match Self::open_inner(fabric.clone(), config, role) {
            Ok(channel) => Ok(channel),
            Err(fatal) => {
                error!(error = %fatal, "channel handshake failed, aborting transport group");
                fabric.abort(1);
                Err(fatal)
            }
        }
    }

    fn open_inner(
        fabric: Arc<dyn Fabric>,
        config: ChannelConfig,
        role: ChannelRole,
    ) -> ChannelResult<Self> {
        let tag = config.tag;
        let endpoint = match role {
            ChannelRole::Consumer => {
                let sizes = fabric.allocate_slot(config.capacity * SIZE_ENTRY_BYTES)?;
                let payload = fabric.allocate_slot(config.payload_size)?;
                let coord_sizes = fabric.allocate_slot(COORD_CELL_BYTES)?;
                let coord_payloads = fabric.allocate_slot(COORD_CELL_BYTES)?;

                fabric.exchange_global_slots(
                    tag,
                    &[
                        (KEY_SIZES, Arc::clone(&sizes)),
                        (KEY_COORD_SIZES, Arc::clone(&coord_sizes)),
                        (KEY_COORD_PAYLOADS, Arc::clone(&coord_payloads)),
                        (KEY_PAYLOAD, Arc::clone(&payload)),
                    ],
                )?;
                fabric.fence(tag)?;

                Endpoint::Consumer(ConsumerSide {
                    sizes,
                    payload,
                    coord_sizes,
                    coord_payloads,
                })
            }
            ChannelRole::Producer => {
                let mirror_sizes = fabric.allocate_slot(COORD_CELL_BYTES)?;
                let mirror_payloads = fabric.allocate_slot(COORD_CELL_BYTES)?;
                let staging = fabric.allocate_slot(SIZE_ENTRY_BYTES)?;

                fabric.fence(tag)?;

                Endpoint::Producer(ProducerSide {
                    sizes: fabric.get_global_slot(tag, KEY_SIZES)?,
                    payload: fabric.get_global_slot(tag, KEY_PAYLOAD)?,
                    coord_sizes: fabric.get_global_slot(tag, KEY_COORD_SIZES)?,
                    coord_payloads: fabric.get_global_slot(tag, KEY_COORD_PAYLOADS)?,
                    mirror_sizes,
                    mirror_payloads,
                    staging,
                })
            }
            ChannelRole::Observer => {
                fabric.fence(tag)?;
                Endpoint::Observer
            }
        };

        debug!(tag, ?role, "channel handshake complete");
        Ok(Self {
            fabric,
            config,
            endpoint,
        })
    }

    /// This endpoint's role.
    pub fn role(&self) -> ChannelRole {
        match self.endpoint {
            Endpoint::Producer(_) => ChannelRole::Producer,
            Endpoint::Consumer(_) => ChannelRole::Consumer,
            Endpoint::Observer => ChannelRole::Observer,
        }
    }

    /// Publish one token. Producer only; never waits.
    ///
    /// `WouldBlock` when the token ring is at capacity or the payload
    /// ring lacks space for the token, counting the slack skipped when
    /// a token would straddle the ring end.
    pub fn push(&self, payload: &[u8]) -> ChannelResult<()> {
        let Endpoint::Producer(side) = &self.endpoint else {
            return Err(ChannelError::WrongRole);
        };

        self.fabric.acquire_lock(self.config.tag)?;
        let outcome = self.push_locked(side, payload);
        self.fabric.release_lock(self.config.tag)?;
        outcome
    }

    fn push_locked(&self, side: &ProducerSide, payload: &[u8]) -> ChannelResult<()> {
        let capacity = self.config.capacity as u64;
        let ring_size = self.config.payload_size as u64;
        let len = payload.len() as u64;

        // Refresh the local coordination mirrors from the master cells.
        let mut cell = [0u8; COORD_CELL_BYTES];
        side.coord_sizes.read(0, &mut cell)?;
        side.mirror_sizes.write(0, &cell)?;
        side.coord_payloads.read(0, &mut cell)?;
        side.mirror_payloads.write(0, &cell)?;

        let head_tokens = read_u64(&*side.mirror_sizes, HEAD_OFFSET)?;
        let tail_tokens = read_u64(&*side.mirror_sizes, TAIL_OFFSET)?;
        let head_bytes = read_u64(&*side.mirror_payloads, HEAD_OFFSET)?;
        let tail_bytes = read_u64(&*side.mirror_payloads, TAIL_OFFSET)?;

        if head_tokens - tail_tokens >= capacity {
            return Err(ChannelError::WouldBlock);
        }
        if len > ring_size {
            return Err(ChannelError::WouldBlock);
        }

        // Tokens are contiguous; one that would straddle the ring end is
        // placed at the ring start and the skipped slack counts as used.
        let position = head_bytes % ring_size;
        let offset = if position + len <= ring_size {
            head_bytes
        } else {
            head_bytes + (ring_size - position)
        };
        if offset + len - tail_bytes > ring_size {
            return Err(ChannelError::WouldBlock);
        }

        side.payload.write((offset % ring_size) as usize, payload)?;

        // Stage the size entry locally, then publish it into the ring.
        write_u64(&*side.staging, 0, offset)?;
        write_u64(&*side.staging, 8, len)?;
        let mut entry = [0u8; SIZE_ENTRY_BYTES];
        side.staging.read(0, &mut entry)?;
        let entry_index = (head_tokens % capacity) as usize;
        side.sizes.write(entry_index * SIZE_ENTRY_BYTES, &entry)?;

        // Advance the producer-owned head counters on the master cells.
        write_u64(&*side.coord_payloads, HEAD_OFFSET, offset + len)?;
        write_u64(&*side.coord_sizes, HEAD_OFFSET, head_tokens + 1)?;

        debug!(
            tag = self.config.tag,
            token = head_tokens,
            len,
            "token published"
        );
        Ok(())
    }

    /// Observe the pending head token without consuming it. Consumer
    /// only; never blocks.
    pub fn peek(&self) -> ChannelResult<Token> {
        let Endpoint::Consumer(side) = &self.endpoint else {
            return Err(ChannelError::WrongRole);
        };

        let head_tokens = read_u64(&*side.coord_sizes, HEAD_OFFSET)?;
        let tail_tokens = read_u64(&*side.coord_sizes, TAIL_OFFSET)?;
        if head_tokens == tail_tokens {
            return Err(ChannelError::Empty);
        }

        let entry_base = (tail_tokens % self.config.capacity as u64) as usize * SIZE_ENTRY_BYTES;
        let offset = read_u64(&*side.sizes, entry_base)?;
        let len = read_u64(&*side.sizes, entry_base + 8)?;

        let position = (offset % self.config.payload_size as u64) as usize;
        let mut data = vec![0u8; len as usize];
        side.payload.read(position, &mut data)?;

        Ok(Token {
            offset,
            data: Bytes::from(data),
        })
    }

    /// Consume the pending head token. Consumer only; never blocks.
    pub fn pop(&self) -> ChannelResult<()> {
        let Endpoint::Consumer(side) = &self.endpoint else {
            return Err(ChannelError::WrongRole);
        };

        let head_tokens = read_u64(&*side.coord_sizes, HEAD_OFFSET)?;
        let tail_tokens = read_u64(&*side.coord_sizes, TAIL_OFFSET)?;
        if head_tokens == tail_tokens {
            return Err(ChannelError::Empty);
        }

        let entry_base = (tail_tokens % self.config.capacity as u64) as usize * SIZE_ENTRY_BYTES;
        let offset = read_u64(&*side.sizes, entry_base)?;
        let len = read_u64(&*side.sizes, entry_base + 8)?;

        // Advance the consumer-owned tail counters.
        write_u64(&*side.coord_sizes, TAIL_OFFSET, tail_tokens + 1)?;
        write_u64(&*side.coord_payloads, TAIL_OFFSET, offset + len)?;
        Ok(())
    }

    /// Number of tokens currently pending.
    pub fn pending_tokens(&self) -> ChannelResult<u64> {
        let coord_sizes = match &self.endpoint {
            Endpoint::Producer(side) => &side.coord_sizes,
            Endpoint::Consumer(side) => &side.coord_sizes,
            Endpoint::Observer => return Err(ChannelError::WrongRole),
        };
        let head = read_u64(&**coord_sizes, HEAD_OFFSET)?;
        let tail = read_u64(&**coord_sizes, TAIL_OFFSET)?;
        Ok(head - tail)
    }

    /// Payload bytes currently accounted as used (slack included).
    pub fn used_payload_bytes(&self) -> ChannelResult<u64> {
        let coord_payloads = match &self.endpoint {
            Endpoint::Producer(side) => &side.coord_payloads,
            Endpoint::Consumer(side) => &side.coord_payloads,
            Endpoint::Observer => return Err(ChannelError::WrongRole),
        };
        let head = read_u64(&**coord_payloads, HEAD_OFFSET)?;
        let tail = read_u64(&**coord_payloads, TAIL_OFFSET)?;
        Ok(head - tail)
    }
}
