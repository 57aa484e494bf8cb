//! Memory slots — the unit of remotely addressable storage.
//!
//! A slot is a fixed-size byte region owned by one instance. Registering
//! it in the global exchange (see [`crate::Fabric`]) lets peers address
//! it under a `(tag, key)` pair. Access is bounds-checked `read`/`write`;
//! byte transfer is by copy, which keeps the trait implementable by both
//! shared-memory and message-passing backends.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{FabricError, FabricResult};

/// A remotely addressable byte region.
pub trait MemorySlot: Send + Sync {
    /// Size of the slot in bytes.
    fn size(&self) -> usize;

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> FabricResult<()>;

    /// Copy `data` into the slot starting at `offset`.
    fn write(&self, offset: usize, data: &[u8]) -> FabricResult<()>;
}

/// Shared handle to a memory slot.
pub type SlotRef = Arc<dyn MemorySlot>;

/// Read a little-endian `u64` at `offset`.
pub fn read_u64(slot: &dyn MemorySlot, offset: usize) -> FabricResult<u64> {
    let mut buf = [0u8; 8];
    slot.read(offset, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a little-endian `u64` at `offset`.
pub fn write_u64(slot: &dyn MemorySlot, offset: usize, value: u64) -> FabricResult<()> {
    slot.write(offset, &value.to_le_bytes())
}

/// Heap-backed slot used by in-process backends.
pub struct HeapSlot {
    data: RwLock<Vec<u8>>,
}

impl HeapSlot {
    /// Allocate a zero-initialized slot of `size` bytes.
    pub fn zeroed(size: usize) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(vec![0u8; size]),
        })
    }
}

impl MemorySlot for HeapSlot {
    fn size(&self) -> usize {
        self.data.read().len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> FabricResult<()> {
        let data = self.data.read();
        let end = offset.checked_add(buf.len()).filter(|&e| e <= data.len());
        match end {
            Some(end) => {
                buf.copy_from_slice(&data[offset..end]);
                Ok(())
            }
            None => Err(FabricError::OutOfBounds {
                offset,
                len: buf.len(),
                size: data.len(),
            }),
        }
    }

    fn write(&self, offset: usize, data: &[u8]) -> FabricResult<()> {
        let mut slot = self.data.write();
        let end = offset.checked_add(data.len()).filter(|&e| e <= slot.len());
        match end {
            Some(end) => {
                slot[offset..end].copy_from_slice(data);
                Ok(())
            }
            None => Err(FabricError::OutOfBounds {
                offset,
                len: data.len(),
                size: slot.len(),
            }),
        }
    }
}
