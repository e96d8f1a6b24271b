//! Thin façade over intra-process or inter-process message passing.
//!
//! Messages are contiguous byte slices; all handles are waitable but
//! non-blocking. The sweep driver calls `.wait()` before trusting that a
//! buffer is ready. Channels are FIFO per (peer, tag) pair, which together
//! with the typed face tags gives the ordering the scheduler assumes.

use crate::octant::{Axis, Dir};
use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::thread::JoinHandle;

/// Typed message tag, so concurrent exchanges never alias a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        CommTag(raw)
    }

    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Tag for a face exchange: axis, direction, octant-in-block, and the
    /// step phase the face feeds. Three phase bits cover the one-step
    /// lookahead the triple-buffer rotation allows, with room to spare.
    pub fn face(axis: Axis, dir: Dir, octant_in_block: i32, step: i32) -> Self {
        const FACE_BASE: u16 = 0x5B00;
        debug_assert!((0..8).contains(&octant_in_block));
        let axis_bit = match axis {
            Axis::X => 0u16,
            Axis::Y => 1,
        };
        let dir_bit = match dir {
            Dir::Up => 0u16,
            Dir::Dn => 1,
        };
        let phase = (step.rem_euclid(8)) as u16;
        CommTag(FACE_BASE | axis_bit | dir_bit << 1 | (octant_in_block as u16) << 2 | phase << 5)
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: CommTag, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: CommTag, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: CommTag, _buf: &mut [u8]) {}
}

// --- ThreadComm: intra-process ranks sharing one mailbox ---

type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);

/// Receive handle for [`ThreadComm`]; a helper thread polls the mailbox.
pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.buf.lock().take()
    }
}

/// Intra-process communicator: every rank lives on its own thread of the
/// same process and exchanges through a shared FIFO mailbox. Used to run
/// multi-rank sweeps (and their tests) without an MPI launcher.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
}

impl ThreadComm {
    pub fn new(rank: usize, size: usize) -> Self {
        debug_assert!(rank < size);
        ThreadComm { rank, size }
    }

    pub const fn rank(&self) -> usize {
        self.rank
    }

    pub const fn size(&self) -> usize {
        self.size
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) {
        let key = (self.rank, peer, tag.get());
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: CommTag, buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag.get());
        let cap = buf.len();
        let slot = Arc::new(Mutex::new(None));
        let slot_writer = Arc::clone(&slot);
        let handle = std::thread::spawn(move || {
            loop {
                if let Some(mut queue) = MAILBOX.get_mut(&key) {
                    if let Some(bytes) = queue.pop_front() {
                        let n = bytes.len().min(cap);
                        *slot_writer.lock() = Some(bytes[..n].to_vec());
                        break;
                    }
                }
                std::thread::yield_now();
            }
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }
}

// --- Message accounting ---

/// Per-peer traffic counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerStats {
    pub sends: u64,
    pub send_bytes: u64,
    pub recvs: u64,
    pub recv_bytes: u64,
}

/// Message accounting owned by whoever wants it, not by a process global.
///
/// Wrap a communicator in [`TallyComm`] to populate one of these; read it
/// out as a [`snapshot`](CommStats::snapshot) for reporting.
#[derive(Debug, Default)]
pub struct CommStats {
    sends: AtomicU64,
    send_bytes: AtomicU64,
    recvs: AtomicU64,
    recv_bytes: AtomicU64,
    by_peer: DashMap<usize, PeerStats>,
}

/// Serializable point-in-time view of [`CommStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommStatsSnapshot {
    pub sends: u64,
    pub send_bytes: u64,
    pub recvs: u64,
    pub recv_bytes: u64,
    pub by_peer: Vec<(usize, PeerStats)>,
}

impl CommStats {
    fn record_send(&self, peer: usize, bytes: usize) {
        self.sends.fetch_add(1, Relaxed);
        self.send_bytes.fetch_add(bytes as u64, Relaxed);
        let mut entry = self.by_peer.entry(peer).or_default();
        entry.sends += 1;
        entry.send_bytes += bytes as u64;
    }

    fn record_recv(&self, peer: usize, bytes: usize) {
        self.recvs.fetch_add(1, Relaxed);
        self.recv_bytes.fetch_add(bytes as u64, Relaxed);
        let mut entry = self.by_peer.entry(peer).or_default();
        entry.recvs += 1;
        entry.recv_bytes += bytes as u64;
    }

    pub fn sends(&self) -> u64 {
        self.sends.load(Relaxed)
    }

    pub fn recvs(&self) -> u64 {
        self.recvs.load(Relaxed)
    }

    pub fn snapshot(&self) -> CommStatsSnapshot {
        let mut by_peer: Vec<(usize, PeerStats)> =
            self.by_peer.iter().map(|e| (*e.key(), *e.value())).collect();
        by_peer.sort_unstable_by_key(|&(peer, _)| peer);
        CommStatsSnapshot {
            sends: self.sends.load(Relaxed),
            send_bytes: self.send_bytes.load(Relaxed),
            recvs: self.recvs.load(Relaxed),
            recv_bytes: self.recv_bytes.load(Relaxed),
            by_peer,
        }
    }
}

/// Communicator wrapper that tallies traffic into an explicit [`CommStats`].
#[derive(Clone, Debug)]
pub struct TallyComm<C> {
    inner: C,
    stats: Arc<CommStats>,
}

impl<C> TallyComm<C> {
    pub fn new(inner: C) -> Self {
        TallyComm {
            inner,
            stats: Arc::new(CommStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CommStats> {
        Arc::clone(&self.stats)
    }
}

impl<C: Communicator> Communicator for TallyComm<C> {
    type SendHandle = C::SendHandle;
    type RecvHandle = C::RecvHandle;

    fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> Self::SendHandle {
        self.stats.record_send(peer, buf.len());
        self.inner.isend(peer, tag, buf)
    }

    fn irecv(&self, peer: usize, tag: CommTag, buf: &mut [u8]) -> Self::RecvHandle {
        self.stats.record_recv(peer, buf.len());
        self.inner.irecv(peer, tag, buf)
    }
}

// --- MPI backend (feature = "mpi-support") ---

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{CommTag, Communicator, Wait};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use std::sync::Arc;
    use std::thread::JoinHandle;

    /// MPI-backed transport. Sends run on a helper thread and receives are
    /// deferred to `wait()`, so the library hosting this must have been
    /// initialized with `MPI_THREAD_MULTIPLE`
    /// (`mpi::initialize_with_threading`).
    pub struct MpiComm {
        world: Arc<SimpleCommunicator>,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            MpiComm {
                world: Arc::new(world),
                rank,
                size,
            }
        }

        pub const fn rank(&self) -> usize {
            self.rank
        }

        pub const fn size(&self) -> usize {
            self.size
        }
    }

    pub struct MpiSendHandle(Option<JoinHandle<()>>);

    impl Wait for MpiSendHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            if let Some(handle) = self.0.take() {
                let _ = handle.join();
            }
            None
        }
    }

    pub struct MpiRecvHandle {
        world: Arc<SimpleCommunicator>,
        peer: i32,
        tag: i32,
        cap: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let (mut data, _status) = self
                .world
                .process_at_rank(self.peer)
                .receive_vec_with_tag::<u8>(self.tag);
            data.truncate(self.cap);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiSendHandle;
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: CommTag, buf: &[u8]) -> MpiSendHandle {
            let world = Arc::clone(&self.world);
            let data = buf.to_vec();
            let handle = std::thread::spawn(move || {
                world
                    .process_at_rank(peer as i32)
                    .send_with_tag(&data[..], tag.get() as i32);
            });
            MpiSendHandle(Some(handle))
        }

        fn irecv(&self, peer: usize, tag: CommTag, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: Arc::clone(&self.world),
                peer: peer as i32,
                tag: tag.get() as i32,
                cap: buf.len(),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
