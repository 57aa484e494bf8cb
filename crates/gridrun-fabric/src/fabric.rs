//! The `Fabric` trait — everything GridRun asks of a transport backend.

use crate::error::FabricResult;
use crate::slot::SlotRef;
use crate::wire::{IncomingRequest, Reply};

/// Opaque identifier of one participant in the transport group.
pub type InstanceId = u64;

/// Capability set a transport backend provides to the runtime.
///
/// One instance never calls into its fabric handle concurrently; the
/// runtime is a single cooperative agent per instance. Backends may use
/// threads internally.
pub trait Fabric: Send + Sync {
    /// This instance's identifier.
    fn current_instance_id(&self) -> InstanceId;

    /// The nominated root instance of the group.
    fn root_instance_id(&self) -> InstanceId;

    /// All participating instances, in group order.
    fn instances(&self) -> Vec<InstanceId>;

    // ── Wire RPC ────────────────────────────────────────────────────

    /// Post a named request to `target`. Does not wait for the reply.
    fn post_request(&self, target: InstanceId, name: &str, arg: u64) -> FabricResult<()>;

    /// Block until one request addressed to this instance arrives.
    fn recv_request(&self) -> FabricResult<IncomingRequest>;

    /// Send a reply back to `requester`.
    fn send_reply(&self, requester: InstanceId, reply: Reply) -> FabricResult<()>;

    /// Block until the reply from `target` arrives.
    ///
    /// Replies from one target arrive in request order.
    fn recv_reply(&self, target: InstanceId) -> FabricResult<Reply>;

    // ── Global memory ───────────────────────────────────────────────

    /// Register local slots under `(tag, key)` pairs for peers to resolve.
    ///
    /// Registration is local; visibility is established by the matching
    /// [`Fabric::fence`] on the same tag.
    fn exchange_global_slots(&self, tag: u64, slots: &[(u64, SlotRef)]) -> FabricResult<()>;

    /// Block until every instance in the group has fenced on `tag`.
    fn fence(&self, tag: u64) -> FabricResult<()>;

    /// Resolve a peer-registered slot. Valid only after the fence on `tag`.
    fn get_global_slot(&self, tag: u64, key: u64) -> FabricResult<SlotRef>;

    // ── Distributed locks ───────────────────────────────────────────

    /// Acquire the group-wide lock keyed by `tag`, blocking until held.
    fn acquire_lock(&self, tag: u64) -> FabricResult<()>;

    /// Release the group-wide lock keyed by `tag`.
    fn release_lock(&self, tag: u64) -> FabricResult<()>;

    // ── Local memory ────────────────────────────────────────────────

    /// Allocate a local slot of `size` bytes.
    fn allocate_slot(&self, size: usize) -> FabricResult<SlotRef>;

    /// Release a local slot.
    fn free_slot(&self, slot: SlotRef);

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Tear the whole group down. Peers blocked in collective calls are
    /// woken with an `Aborted` error.
    fn abort(&self, code: i32);

    /// Collective shutdown; blocks until every instance has entered.
    fn finalize(&self) -> FabricResult<()>;
}
