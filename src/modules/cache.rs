//! Local entry cache: the client-side view of resolved namespace entries.
//!
//! The mount path mutates this cache but does not own its policy; eviction
//! and attribute bookkeeping belong to the wider filesystem layer. What the
//! bootstrap needs is root binding, trace materialization, and capability
//! attachment, with `Arc`-owned entries so failure paths release by drop
//! instead of manual put calls.

use crate::modules::error::{ClientError, Result};
use crate::modules::message::EntityName;
use crate::modules::metadata::TraceEntry;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Mode an entry was opened with, for pin accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Held open without read/write intent (mount points)
    Pin = 0,
    /// Opened for reading
    Read = 1,
    /// Opened for writing
    Write = 2,
    /// Opened for both
    ReadWrite = 3,
}

/// A time- and session-scoped access right bound to a cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    /// The metadata server that issued the grant
    pub grantor: EntityName,
    /// Rights bitmask as granted
    pub rights: u32,
    /// Grant sequence number
    pub seq: u64,
}

/// A cached namespace entry.
#[derive(Debug)]
pub struct Entry {
    /// Inode number this entry resolves to
    pub ino: u64,
    /// Last path component, empty for the filesystem root
    pub name: String,
    caps: Mutex<Vec<Capability>>,
    pins: [AtomicU32; 4],
}

impl Entry {
    fn new(ino: u64, name: String) -> Arc<Self> {
        Arc::new(Self {
            ino,
            name,
            caps: Mutex::new(Vec::new()),
            pins: Default::default(),
        })
    }

    /// Increments the pin count for the given open mode.
    pub fn pin(&self, mode: OpenMode) {
        self.pins[mode as usize].fetch_add(1, Ordering::SeqCst);
    }

    /// Current pin count for the given open mode.
    pub fn pin_count(&self, mode: OpenMode) -> u32 {
        self.pins[mode as usize].load(Ordering::SeqCst)
    }

    /// The most recent capability bound to this entry, if any.
    pub fn capability(&self) -> Option<Capability> {
        self.caps.lock().last().cloned()
    }
}

#[derive(Default)]
struct CacheInner {
    root: Option<Arc<Entry>>,
    by_ino: HashMap<u64, Arc<Entry>>,
}

/// Interning cache of entries keyed by inode, with at most one bound root.
#[derive(Default)]
pub struct EntryCache {
    inner: Mutex<CacheInner>,
}

impl EntryCache {
    /// Creates an empty cache with no root bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bound filesystem root, if any.
    pub fn root(&self) -> Option<Arc<Entry>> {
        self.inner.lock().root.clone()
    }

    /// Returns the filesystem root, binding it to `ino` first if no root
    /// exists yet. The boolean is `true` only when this call did the
    /// binding, so the caller knows what a rollback may touch.
    pub fn resolve_or_create_root(&self, ino: u64) -> (Arc<Entry>, bool) {
        let mut inner = self.inner.lock();
        if let Some(root) = &inner.root {
            return (root.clone(), false);
        }
        let entry = inner
            .by_ino
            .entry(ino)
            .or_insert_with(|| Entry::new(ino, String::new()))
            .clone();
        debug!("binding filesystem root to inode {}", ino);
        inner.root = Some(entry.clone());
        (entry, true)
    }

    /// Drops the root binding and its interned entry. Rollback hook for a
    /// failed root resolution that bound the root itself.
    pub fn unbind_root(&self) {
        let mut inner = self.inner.lock();
        if let Some(root) = inner.root.take() {
            inner.by_ino.remove(&root.ino);
            debug!("unbound filesystem root inode {}", root.ino);
        }
    }

    /// Walks a lookup trace, interning an entry per step, and returns the
    /// entry for the final component: the mount point.
    pub fn materialize_trace(&self, trace: &[TraceEntry]) -> Result<Arc<Entry>> {
        if trace.is_empty() {
            return Err(ClientError::Protocol("empty resolution trace"));
        }
        let mut inner = self.inner.lock();
        let mut last = None;
        for step in trace {
            if step.ino == 0 {
                return Err(ClientError::Protocol("trace step without an inode"));
            }
            let entry = inner
                .by_ino
                .entry(step.ino)
                .or_insert_with(|| Entry::new(step.ino, step.name.clone()))
                .clone();
            last = Some(entry);
        }
        // Non-empty trace, so last is set
        Ok(last.expect("trace walked at least one step"))
    }

    /// Binds an access grant to `entry` and returns it.
    pub fn bind_capability(
        &self,
        entry: &Arc<Entry>,
        grantor: EntityName,
        rights: u32,
        seq: u64,
    ) -> Capability {
        let cap = Capability {
            grantor,
            rights,
            seq,
        };
        debug!(
            "capability on inode {}: rights {:#x} seq {} from {:?}",
            entry.ino, rights, seq, grantor
        );
        entry.caps.lock().push(cap.clone());
        cap
    }

    /// Number of interned entries. Mostly useful in tests.
    pub fn len(&self) -> usize {
        self.inner.lock().by_ino.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
