//! Thread-based local fabric.
//!
//! Runs a whole transport group inside one process: every instance is an
//! OS thread holding its own [`LocalFabric`] handle. Requests and replies
//! travel over per-instance mailboxes; global memory slots live in a
//! shared registry; fences and locks are condvar-based. This is the
//! backend the test suites and the demo driver deploy against.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::{FabricError, FabricResult};
use crate::fabric::{Fabric, InstanceId};
use crate::slot::{HeapSlot, SlotRef};
use crate::wire::{IncomingRequest, Reply};

/// Internal tag used by the collective `finalize` barrier.
const FINALIZE_TAG: u64 = u64::MAX;

/// How often blocked mailbox reads re-check the abort flag.
const ABORT_POLL: Duration = Duration::from_millis(100);

struct FenceState {
    arrived: usize,
    generation: u64,
}

/// State shared by every handle in one local group.
struct Shared {
    ids: Vec<InstanceId>,
    request_tx: Vec<Sender<IncomingRequest>>,
    reply_tx: Vec<Sender<(InstanceId, Reply)>>,
    global_slots: Mutex<HashMap<(u64, u64), SlotRef>>,
    fences: Mutex<HashMap<u64, FenceState>>,
    fence_cv: Condvar,
    held_locks: Mutex<HashSet<u64>>,
    lock_cv: Condvar,
    aborted: AtomicBool,
    abort_code: AtomicI32,
}

impl Shared {
    fn abort_error(&self) -> FabricError {
        FabricError::Aborted(self.abort_code.load(Ordering::Acquire))
    }
}

/// One instance's handle into a thread-based transport group.
pub struct LocalFabric {
    shared: Arc<Shared>,
    index: usize,
    request_rx: Mutex<Receiver<IncomingRequest>>,
    reply_rx: Mutex<Receiver<(InstanceId, Reply)>>,
    /// Replies received while waiting for a different sender.
    reply_stash: Mutex<VecDeque<(InstanceId, Reply)>>,
}

impl LocalFabric {
    /// Build a group of `n` instances and return one handle per instance.
    ///
    /// Instance ids are the group ranks `0..n`; rank 0 is root.
    pub fn group(n: usize) -> Vec<LocalFabric> {
        let ids: Vec<InstanceId> = (0..n as u64).collect();

        let mut request_tx = Vec::with_capacity(n);
        let mut request_rx = Vec::with_capacity(n);
        let mut reply_tx = Vec::with_capacity(n);
        let mut reply_rx = Vec::with_capacity(n);
        for _ in 0..n {
            let (tx, rx) = unbounded();
            request_tx.push(tx);
            request_rx.push(rx);
            let (tx, rx) = unbounded();
            reply_tx.push(tx);
            reply_rx.push(rx);
        }

        let shared = Arc::new(Shared {
            ids,
            request_tx,
            reply_tx,
            global_slots: Mutex::new(HashMap::new()),
            fences: Mutex::new(HashMap::new()),
            fence_cv: Condvar::new(),
            held_locks: Mutex::new(HashSet::new()),
            lock_cv: Condvar::new(),
            aborted: AtomicBool::new(false),
            abort_code: AtomicI32::new(0),
        });

        request_rx
            .into_iter()
            .zip(reply_rx)
            .enumerate()
            .map(|(index, (req, rep))| LocalFabric {
                shared: Arc::clone(&shared),
                index,
                request_rx: Mutex::new(req),
                reply_rx: Mutex::new(rep),
                reply_stash: Mutex::new(VecDeque::new()),
            })
            .collect()
    }

    fn index_of(&self, id: InstanceId) -> FabricResult<usize> {
        self.shared
            .ids
            .iter()
            .position(|&i| i == id)
            .ok_or(FabricError::UnknownInstance(id))
    }

    /// Block on a mailbox while honoring the group abort flag.
    fn recv_mailbox<T>(&self, rx: &Receiver<T>) -> FabricResult<T> {
        loop {
            if self.shared.aborted.load(Ordering::Acquire) {
                return Err(self.shared.abort_error());
            }
            match rx.recv_timeout(ABORT_POLL) {
                Ok(msg) => return Ok(msg),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(FabricError::Disconnected),
            }
        }
    }
}

impl Fabric for LocalFabric {
    fn current_instance_id(&self) -> InstanceId {
        self.shared.ids[self.index]
    }

    fn root_instance_id(&self) -> InstanceId {
        self.shared.ids[0]
    }

    fn instances(&self) -> Vec<InstanceId> {
        self.shared.ids.clone()
    }

    fn post_request(&self, target: InstanceId, name: &str, arg: u64) -> FabricResult<()> {
        let target_index = self.index_of(target)?;
        let request = IncomingRequest {
            requester: self.current_instance_id(),
            name: name.to_string(),
            arg,
        };
        debug!(target, name, arg, "posting request");
        self.shared.request_tx[target_index]
            .send(request)
            .map_err(|_| FabricError::Disconnected)
    }

    fn recv_request(&self) -> FabricResult<IncomingRequest> {
        let rx = self.request_rx.lock();
        self.recv_mailbox(&rx)
    }

    fn send_reply(&self, requester: InstanceId, reply: Reply) -> FabricResult<()> {
        let requester_index = self.index_of(requester)?;
        self.shared.reply_tx[requester_index]
            .send((self.current_instance_id(), reply))
            .map_err(|_| FabricError::Disconnected)
    }

    fn recv_reply(&self, target: InstanceId) -> FabricResult<Reply> {
        {
            let mut stash = self.reply_stash.lock();
            if let Some(pos) = stash.iter().position(|(from, _)| *from == target) {
                let (_, reply) = stash.remove(pos).ok_or(FabricError::Disconnected)?;
                return Ok(reply);
            }
        }
        let rx = self.reply_rx.lock();
        loop {
            let (from, reply) = self.recv_mailbox(&rx)?;
            if from == target {
                return Ok(reply);
            }
            self.reply_stash.lock().push_back((from, reply));
        }
    }

    fn exchange_global_slots(&self, tag: u64, slots: &[(u64, SlotRef)]) -> FabricResult<()> {
        let mut registry = self.shared.global_slots.lock();
        for (key, slot) in slots {
            registry.insert((tag, *key), Arc::clone(slot));
        }
        Ok(())
    }

    fn fence(&self, tag: u64) -> FabricResult<()> {
        let group_size = self.shared.ids.len();
        let mut fences = self.shared.fences.lock();
        let state = fences.entry(tag).or_insert(FenceState {
            arrived: 0,
            generation: 0,
        });
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == group_size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.fence_cv.notify_all();
            return Ok(());
        }

        loop {
            self.shared.fence_cv.wait(&mut fences);
            if self.shared.aborted.load(Ordering::Acquire) {
                return Err(self.shared.abort_error());
            }
            match fences.get(&tag) {
                Some(state) if state.generation != generation => return Ok(()),
                _ => continue,
            }
        }
    }

    fn get_global_slot(&self, tag: u64, key: u64) -> FabricResult<SlotRef> {
        self.shared
            .global_slots
            .lock()
            .get(&(tag, key))
            .cloned()
            .ok_or(FabricError::UnknownSlot { tag, key })
    }

    fn acquire_lock(&self, tag: u64) -> FabricResult<()> {
        let mut held = self.shared.held_locks.lock();
        while held.contains(&tag) {
            self.shared.lock_cv.wait(&mut held);
            if self.shared.aborted.load(Ordering::Acquire) {
                return Err(self.shared.abort_error());
            }
        }
        held.insert(tag);
        Ok(())
    }

    fn release_lock(&self, tag: u64) -> FabricResult<()> {
        let mut held = self.shared.held_locks.lock();
        held.remove(&tag);
        self.shared.lock_cv.notify_all();
        Ok(())
    }

    fn allocate_slot(&self, size: usize) -> FabricResult<SlotRef> {
        Ok(HeapSlot::zeroed(size))
    }

    fn free_slot(&self, slot: SlotRef) {
        drop(slot);
    }

    fn abort(&self, code: i32) {
        warn!(code, "local fabric group aborting");
        self.shared.abort_code.store(code, Ordering::Release);
        self.shared.aborted.store(true, Ordering::Release);
        self.shared.fence_cv.notify_all();
        self.shared.lock_cv.notify_all();
    }

    fn finalize(&self) -> FabricResult<()> {
        self.fence(FINALIZE_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn group_assigns_rank_identities() {
        let group = LocalFabric::group(3);
        assert_eq!(group[0].current_instance_id(), 0);
        assert_eq!(group[2].current_instance_id(), 2);
        assert_eq!(group[1].root_instance_id(), 0);
        assert_eq!(group[1].instances(), vec![0, 1, 2]);
    }

    #[test]
    fn request_reply_round_trip() {
        let mut group = LocalFabric::group(2);
        let worker = group.pop().unwrap();
        let root = group.pop().unwrap();

        let server = thread::spawn(move || {
            let request = worker.recv_request().unwrap();
            assert_eq!(request.requester, 0);
            assert_eq!(request.name, "ping");
            assert_eq!(request.arg, 7);
            worker
                .send_reply(request.requester, Reply::Value(Some(bytes::Bytes::from_static(b"pong"))))
                .unwrap();
        });

        root.post_request(1, "ping", 7).unwrap();
        match root.recv_reply(1).unwrap() {
            Reply::Value(Some(payload)) => assert_eq!(&payload[..], b"pong"),
            other => panic!("unexpected reply: {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn requests_to_one_target_stay_fifo() {
        let mut group = LocalFabric::group(2);
        let worker = group.pop().unwrap();
        let root = group.pop().unwrap();

        for i in 0..10 {
            root.post_request(1, "seq", i).unwrap();
        }
        for i in 0..10 {
            let request = worker.recv_request().unwrap();
            assert_eq!(request.arg, i);
        }
    }

    #[test]
    fn fence_blocks_until_all_arrive() {
        let group = LocalFabric::group(3);
        let arrived = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = group
            .into_iter()
            .enumerate()
            .map(|(i, fabric)| {
                let arrived = Arc::clone(&arrived);
                thread::spawn(move || {
                    if i == 2 {
                        thread::sleep(Duration::from_millis(50));
                        arrived.store(true, Ordering::SeqCst);
                    }
                    fabric.fence(42).unwrap();
                    // Nobody passes the fence before the late thread arrives.
                    assert!(arrived.load(Ordering::SeqCst));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn fence_is_reusable_per_tag() {
        let group = LocalFabric::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|fabric| {
                thread::spawn(move || {
                    for _ in 0..5 {
                        fabric.fence(7).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn exchanged_slots_resolve_after_fence() {
        let mut group = LocalFabric::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();

        let owner = thread::spawn(move || {
            let slot = a.allocate_slot(8).unwrap();
            slot.write(0, b"slotdata").unwrap();
            a.exchange_global_slots(9, &[(1, slot)]).unwrap();
            a.fence(9).unwrap();
        });

        b.fence(9).unwrap();
        let slot = b.get_global_slot(9, 1).unwrap();
        let mut buf = [0u8; 8];
        slot.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"slotdata");

        assert!(matches!(
            b.get_global_slot(9, 99),
            Err(FabricError::UnknownSlot { .. })
        ));
        owner.join().unwrap();
    }

    #[test]
    fn lock_provides_mutual_exclusion() {
        let group = LocalFabric::group(4);
        let counter = Arc::new(Mutex::new(0u64));

        let handles: Vec<_> = group
            .into_iter()
            .map(|fabric| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..100 {
                        fabric.acquire_lock(3).unwrap();
                        let mut value = counter.lock();
                        *value += 1;
                        drop(value);
                        fabric.release_lock(3).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock(), 400);
    }

    #[test]
    fn abort_wakes_fence_waiters() {
        let mut group = LocalFabric::group(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();

        let waiter = thread::spawn(move || a.fence(11));
        thread::sleep(Duration::from_millis(20));
        b.abort(5);

        match waiter.join().unwrap() {
            Err(FabricError::Aborted(5)) => {}
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[test]
    fn finalize_is_collective() {
        let group = LocalFabric::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|fabric| thread::spawn(move || fabric.finalize().unwrap()))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn unknown_instance_is_rejected() {
        let group = LocalFabric::group(2);
        assert!(matches!(
            group[0].post_request(9, "x", 0),
            Err(FabricError::UnknownInstance(9))
        ));
    }
}
