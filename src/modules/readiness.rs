//! Readiness gate for the mount handshake.
//!
//! A session is ready to resolve its root once all three cluster maps have
//! been received at least once. The tracker records first receipt per map
//! dimension and wakes the mount coordinator exactly once, on the transition
//! to full coverage. `mark_ready` is called from the transport's delivery
//! thread and must stay constant-time; the set update and the wake decision
//! happen under one lock.

use log::debug;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// The three cluster map dimensions a session must see before mounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSource {
    /// Monitor cluster membership map
    Monitor,
    /// Metadata server assignment map
    Metadata,
    /// Object storage topology map
    Storage,
}

impl MapSource {
    /// All dimensions, in no particular order.
    pub const ALL: [MapSource; 3] = [MapSource::Monitor, MapSource::Metadata, MapSource::Storage];

    fn index(self) -> usize {
        match self {
            MapSource::Monitor => 0,
            MapSource::Metadata => 1,
            MapSource::Storage => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            MapSource::Monitor => "monitor",
            MapSource::Metadata => "metadata",
            MapSource::Storage => "storage",
        }
    }
}

/// Which map dimensions have been seen at least once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadySet {
    seen: [bool; 3],
}

impl ReadySet {
    /// Records `source` as seen. Returns `true` only on first insertion.
    pub fn insert(&mut self, source: MapSource) -> bool {
        let slot = &mut self.seen[source.index()];
        let newly = !*slot;
        *slot = true;
        newly
    }

    /// Whether `source` has been seen.
    pub fn contains(&self, source: MapSource) -> bool {
        self.seen[source.index()]
    }

    /// Whether every dimension has been seen.
    pub fn is_complete(&self) -> bool {
        self.seen.iter().all(|s| *s)
    }

    /// Number of dimensions seen so far.
    pub fn len(&self) -> usize {
        self.seen.iter().filter(|s| **s).count()
    }

    /// Whether no dimension has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
struct Inner {
    seen: ReadySet,
    fired: bool,
    interrupted: bool,
}

/// Outcome of a bounded wait on the readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// All three maps are present
    Ready,
    /// The interval elapsed without reaching full coverage
    TimedOut,
    /// An external interrupt aborted the wait
    Interrupted,
}

/// Wait/notify gate tracking first receipt of the three cluster maps.
pub struct ReadyState {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Default for ReadyState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyState {
    /// Creates a gate with no map seen and no interrupt pending.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            cond: Condvar::new(),
        }
    }

    /// Records first receipt of a map dimension.
    ///
    /// Idempotent per dimension. Returns `true` iff this call completed the
    /// set and fired the wake, which happens at most once per gate.
    pub fn mark_ready(&self, source: MapSource) -> bool {
        let mut inner = self.inner.lock();
        if !inner.seen.insert(source) {
            return false;
        }
        debug!(
            "first {} map, {}/3 dimensions present",
            source.name(),
            inner.seen.len()
        );
        if inner.seen.is_complete() && !inner.fired {
            inner.fired = true;
            debug!("all maps present, waking mount");
            self.cond.notify_all();
            return true;
        }
        false
    }

    /// Whether all three maps have been seen.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().seen.is_complete()
    }

    /// Which dimensions have been seen, as a snapshot.
    pub fn snapshot(&self) -> ReadySet {
        self.inner.lock().seen
    }

    /// Blocks until the gate is complete, the timeout elapses, or an
    /// interrupt arrives. Interrupts win over readiness so a cancelled mount
    /// aborts even when maps race in at the same instant.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.interrupted {
                return WaitOutcome::Interrupted;
            }
            if inner.seen.is_complete() {
                return WaitOutcome::Ready;
            }
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                if inner.interrupted {
                    return WaitOutcome::Interrupted;
                }
                if inner.seen.is_complete() {
                    return WaitOutcome::Ready;
                }
                return WaitOutcome::TimedOut;
            }
        }
    }

    /// Flags an external interrupt and wakes all waiters. The flag is
    /// permanent for the lifetime of the gate; a cancelled mount is over.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        self.cond.notify_all();
    }

    /// Whether an interrupt has been flagged.
    pub fn is_interrupted(&self) -> bool {
        self.inner.lock().interrupted
    }
}
