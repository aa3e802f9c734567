//! Metadata client state: the mds assignment map and the request/reply
//! machinery the root resolver blocks on.
//!
//! One transaction id per outstanding request correlates replies back to
//! their waiters. The dispatcher fills replies in from the transport thread;
//! `do_request` is the only place that blocks, on the caller's thread.

use crate::modules::constants::REQUEST_WAIT;
use crate::modules::error::{ClientError, Result};
use crate::modules::message::{EntityName, EntityType, Message, MessageType};
use crate::modules::transport::Transport;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Open flag requesting directory semantics for an mds open request.
pub const OPEN_DIRECTORY: u32 = 0x1_0000;

/// Assignment map of the metadata server cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataMap {
    /// Monotonic map version
    pub epoch: u32,
    /// Ordinals of the currently active metadata servers
    pub active: Vec<i64>,
}

/// One step of a lookup trace: the inode reached and the name that led
/// there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Inode number
    pub ino: u64,
    /// Path component, empty for the filesystem root
    pub name: String,
}

/// Decoded reply to a metadata request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdsReply {
    /// Transaction id this reply answers
    pub tid: u64,
    /// Result code, zero for success
    pub result: i32,
    /// Lookup trace from the filesystem root to the requested path
    pub trace: Vec<TraceEntry>,
    /// Rights bitmask granted with the open
    pub rights: u32,
    /// Grant sequence number
    pub cap_seq: u64,
    /// Ordinal of the mds that answered; filled from the message header
    #[serde(default = "unassigned_mds")]
    pub from_mds: i64,
}

fn unassigned_mds() -> i64 {
    crate::modules::constants::WHO_UNASSIGNED
}

/// Operations this client issues to a metadata server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MdsOp {
    /// Open a path
    Open,
}

#[derive(Debug, Serialize, Deserialize)]
struct RequestArgs {
    tid: u64,
    op: MdsOp,
    path: String,
    flags: u32,
    mode: u32,
}

#[derive(Debug, Serialize, Deserialize)]
enum SessionOp {
    Open,
    Close,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionEvent {
    op: SessionOp,
    seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ForwardNotice {
    tid: u64,
    to_mds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CapabilityEvent {
    ino: u64,
    rights: u32,
    seq: u64,
}

#[derive(Default)]
struct Pending {
    reply: Option<MdsReply>,
    aborted: bool,
    forwards: u32,
}

/// Client-side metadata state and pending request table.
#[derive(Default)]
pub struct MetadataClient {
    map: Mutex<Option<MetadataMap>>,
    pending: Mutex<HashMap<u64, Pending>>,
    reply_ready: Condvar,
    next_tid: AtomicU64,
    stopped: AtomicBool,
}

impl MetadataClient {
    /// Creates a metadata client with no map and no pending requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a metadata map has ever been received.
    pub fn has_map(&self) -> bool {
        self.map.lock().is_some()
    }

    /// Epoch of the current map, if one is present.
    pub fn epoch(&self) -> Option<u32> {
        self.map.lock().as_ref().map(|m| m.epoch)
    }

    /// Decodes and applies a metadata map update.
    pub fn handle_map_update(&self, msg: &Message) -> Result<()> {
        let new: MetadataMap = msg.decode_payload()?;
        let mut map = self.map.lock();
        debug!(
            "metadata map epoch {} -> {} ({} active)",
            map.as_ref().map(|m| m.epoch).unwrap_or(0),
            new.epoch,
            new.active.len()
        );
        *map = Some(new);
        Ok(())
    }

    /// Handles a session open/close acknowledgment.
    pub fn handle_session_event(&self, msg: &Message) {
        match msg.decode_payload::<SessionEvent>() {
            Ok(event) => debug!("mds session event {:?} seq {}", event.op, event.seq),
            Err(e) => warn!("dropping undecodable session event: {}", e),
        }
    }

    /// Delivers a reply to the request waiting on its transaction id.
    pub fn handle_reply(&self, msg: &Message) {
        let mut reply: MdsReply = match msg.decode_payload() {
            Ok(reply) => reply,
            Err(e) => {
                warn!("dropping undecodable mds reply: {}", e);
                return;
            }
        };
        if msg.header.src.kind == EntityType::Mds {
            reply.from_mds = msg.header.src.num;
        }
        let mut pending = self.pending.lock();
        match pending.get_mut(&reply.tid) {
            Some(slot) => {
                debug!("reply for tid {} from mds{}", reply.tid, reply.from_mds);
                slot.reply = Some(reply);
                self.reply_ready.notify_all();
            }
            None => warn!("mds reply for unknown tid {}", reply.tid),
        }
    }

    /// Records that a pending request was forwarded to another mds.
    pub fn handle_forward(&self, msg: &Message) {
        let notice: ForwardNotice = match msg.decode_payload() {
            Ok(notice) => notice,
            Err(e) => {
                warn!("dropping undecodable forward notice: {}", e);
                return;
            }
        };
        let mut pending = self.pending.lock();
        match pending.get_mut(&notice.tid) {
            Some(slot) => {
                slot.forwards += 1;
                debug!(
                    "tid {} forwarded to mds{} ({} hops)",
                    notice.tid, notice.to_mds, slot.forwards
                );
            }
            None => warn!("forward notice for unknown tid {}", notice.tid),
        }
    }

    /// Handles a capability grant or revocation notice. Runs off the
    /// dispatch thread via the shared task pool.
    pub fn handle_capability_event(&self, msg: &Message) {
        match msg.decode_payload::<CapabilityEvent>() {
            Ok(event) => debug!(
                "capability event on inode {}: rights {:#x} seq {}",
                event.ino, event.rights, event.seq
            ),
            Err(e) => warn!("dropping undecodable capability event: {}", e),
        }
    }

    /// Builds an open-as-directory request for `path`, returning the
    /// transaction id and the message to send.
    pub fn create_open_request(&self, path: &str) -> Result<(u64, Message)> {
        let tid = self.next_tid.fetch_add(1, Ordering::SeqCst) + 1;
        let args = RequestArgs {
            tid,
            op: MdsOp::Open,
            path: path.to_string(),
            flags: OPEN_DIRECTORY,
            mode: 0,
        };
        let msg = Message::with_payload(MessageType::ClientRequest, &args)?
            .addressed_to(EntityName::mds(0), None);
        Ok((tid, msg))
    }

    /// Sends a request and blocks until its reply arrives, the wait times
    /// out, or the client is stopped.
    pub fn do_request(
        &self,
        transport: &Arc<dyn Transport>,
        msg: Message,
        tid: u64,
    ) -> Result<MdsReply> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ClientError::Cancelled);
        }
        self.pending.lock().insert(tid, Pending::default());

        if let Err(e) = transport.send(msg) {
            self.pending.lock().remove(&tid);
            return Err(e);
        }
        debug!("sent mds request tid {}, waiting for reply", tid);

        let deadline = Instant::now() + REQUEST_WAIT;
        let mut pending = self.pending.lock();
        loop {
            let slot = pending
                .get_mut(&tid)
                .ok_or(ClientError::Protocol("pending request vanished"))?;
            if slot.aborted {
                pending.remove(&tid);
                return Err(ClientError::Cancelled);
            }
            if let Some(reply) = slot.reply.take() {
                pending.remove(&tid);
                return Ok(reply);
            }
            if self
                .reply_ready
                .wait_until(&mut pending, deadline)
                .timed_out()
            {
                let done = pending
                    .get_mut(&tid)
                    .and_then(|slot| slot.reply.take());
                pending.remove(&tid);
                return match done {
                    Some(reply) => Ok(reply),
                    None => Err(ClientError::Timeout),
                };
            }
        }
    }

    /// Aborts all outstanding requests. Called once during session teardown.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock();
        let outstanding = pending.len();
        for slot in pending.values_mut() {
            slot.aborted = true;
        }
        if outstanding > 0 {
            info!("aborted {} outstanding mds requests", outstanding);
        }
        self.reply_ready.notify_all();
    }
}
