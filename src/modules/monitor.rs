//! Monitor client state: the monitor membership map and statfs replies.
//!
//! Protocol internals (elections, subscriptions) live with the monitors;
//! this side only applies map updates handed over by the dispatcher and
//! completes pending statistics requests.

use crate::modules::error::Result;
use crate::modules::message::Message;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Authoritative map of the monitor cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorMap {
    /// Monotonic map version
    pub epoch: u32,
    /// One address per monitor
    pub addrs: Vec<SocketAddr>,
}

/// Filesystem-wide statistics as reported by a monitor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatfsResult {
    /// Total kilobytes
    pub kb: u64,
    /// Available kilobytes
    pub kb_avail: u64,
    /// Object count
    pub num_objects: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatfsReply {
    tid: u64,
    stats: StatfsResult,
}

#[derive(Default)]
struct MonitorInner {
    map: Option<MonitorMap>,
    pending_statfs: HashMap<u64, Option<StatfsResult>>,
}

/// Client-side monitor state.
#[derive(Default)]
pub struct MonitorClient {
    inner: Mutex<MonitorInner>,
}

impl MonitorClient {
    /// Creates a monitor client with no map yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a monitor map has ever been received.
    pub fn has_map(&self) -> bool {
        self.inner.lock().map.is_some()
    }

    /// Epoch of the current map, if one is present.
    pub fn epoch(&self) -> Option<u32> {
        self.inner.lock().map.as_ref().map(|m| m.epoch)
    }

    /// Decodes and applies a monitor map update. A payload that fails to
    /// parse leaves the current map untouched.
    pub fn handle_map_update(&self, msg: &Message) -> Result<()> {
        let new: MonitorMap = msg.decode_payload()?;
        let mut inner = self.inner.lock();
        let had = inner.map.as_ref().map(|m| m.epoch).unwrap_or(0);
        debug!(
            "monitor map epoch {} -> {} ({} monitors)",
            had,
            new.epoch,
            new.addrs.len()
        );
        inner.map = Some(new);
        Ok(())
    }

    /// Registers interest in a statfs reply for `tid`.
    pub fn register_statfs(&self, tid: u64) {
        self.inner.lock().pending_statfs.insert(tid, None);
    }

    /// Completes a pending statfs request from its reply message.
    pub fn handle_statfs_reply(&self, msg: &Message) {
        let reply: StatfsReply = match msg.decode_payload() {
            Ok(reply) => reply,
            Err(e) => {
                warn!("dropping undecodable statfs reply: {}", e);
                return;
            }
        };
        let mut inner = self.inner.lock();
        match inner.pending_statfs.get_mut(&reply.tid) {
            Some(slot) => *slot = Some(reply.stats),
            None => warn!("statfs reply for unknown tid {}", reply.tid),
        }
    }

    /// Takes the completed statfs result for `tid`, if it has arrived.
    pub fn take_statfs(&self, tid: u64) -> Option<StatfsResult> {
        let mut inner = self.inner.lock();
        let done = matches!(inner.pending_statfs.get(&tid), Some(Some(_)));
        if done {
            inner.pending_statfs.remove(&tid).flatten()
        } else {
            None
        }
    }
}
