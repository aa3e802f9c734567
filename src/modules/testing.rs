//! Test doubles shared by the module tests. Compiled only for tests.

use crate::modules::error::{ClientError, Result};
use crate::modules::message::{Message, MessageType};
use crate::modules::transport::{MessageHandler, PagePreparer, Transport};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;

/// Initializes test logging. Safe to call from every test; only the first
/// call wins.
pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Script callback: given the 1-based send count and the outbound message,
/// returns the messages the "cluster" answers with.
pub type Script = Box<dyn FnMut(usize, &Message) -> Vec<Message> + Send>;

/// In-memory transport. Records every send and answers according to an
/// optional script, delivering replies synchronously through the registered
/// dispatch handler, the way a fast wire would interleave with the caller.
#[derive(Default)]
pub struct MockTransport {
    sent: Mutex<Vec<Message>>,
    handler: Mutex<Option<Weak<dyn MessageHandler>>>,
    script: Mutex<Option<Script>>,
    fail_sends: AtomicBool,
    shut_down: AtomicBool,
}

impl MockTransport {
    /// A transport that swallows sends and never answers.
    pub fn silent() -> Self {
        Self::default()
    }

    /// A transport answering per `script`.
    pub fn scripted<F>(script: F) -> Self
    where
        F: FnMut(usize, &Message) -> Vec<Message> + Send + 'static,
    {
        let transport = Self::default();
        *transport.script.lock() = Some(Box::new(script));
        transport
    }

    /// Makes every subsequent send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Number of sends of the given type.
    pub fn sent_of(&self, mtype: MessageType) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.mtype() == Some(mtype))
            .count()
    }

    /// Whether shutdown was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Pushes a message into the registered dispatch handler, as the wire
    /// delivery thread would.
    pub fn deliver(&self, msg: Message) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler.and_then(|weak| weak.upgrade()) {
            handler.dispatch(msg);
        }
    }
}

impl Transport for MockTransport {
    fn send(&self, msg: Message) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("mock send failure".into()));
        }
        let count = {
            let mut sent = self.sent.lock();
            sent.push(msg.clone());
            sent.len()
        };
        let replies = {
            let mut script = self.script.lock();
            match script.as_mut() {
                Some(script) => script(count, &msg),
                None => Vec::new(),
            }
        };
        for reply in replies {
            self.deliver(reply);
        }
        Ok(())
    }

    fn register_dispatch(&self, handler: Weak<dyn MessageHandler>) {
        *self.handler.lock() = Some(handler);
    }

    fn register_page_preparer(&self, _preparer: Weak<dyn PagePreparer>) {}

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

/// Builds a monitor map message addressed to `client_num`.
pub fn mon_map_msg(epoch: u32, monitors: usize, client_num: i64) -> Message {
    use crate::modules::message::EntityName;
    use crate::modules::monitor::MonitorMap;

    let addrs = (0..monitors)
        .map(|n| format!("10.0.0.{}:6789", n + 1).parse().unwrap())
        .collect();
    let mut msg =
        Message::with_payload(MessageType::MonMap, &MonitorMap { epoch, addrs }).unwrap();
    msg.header.dst = EntityName::client(client_num);
    msg
}

/// Builds a metadata map message.
pub fn mds_map_msg(epoch: u32) -> Message {
    use crate::modules::metadata::MetadataMap;

    Message::with_payload(
        MessageType::MdsMap,
        &MetadataMap {
            epoch,
            active: vec![0],
        },
    )
    .unwrap()
}

/// Builds a storage map message.
pub fn osd_map_msg(epoch: u32) -> Message {
    use crate::modules::storage::StorageMap;

    Message::with_payload(MessageType::OsdMap, &StorageMap { epoch, num_osds: 3 }).unwrap()
}

/// Builds an mds reply answering `request`, echoing its transaction id.
pub fn open_reply_msg(
    request: &Message,
    result: i32,
    trace: &[(u64, &str)],
    rights: u32,
    cap_seq: u64,
) -> Message {
    use crate::modules::message::EntityName;
    use crate::modules::metadata::{MdsReply, TraceEntry};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct TidOnly {
        tid: u64,
    }

    let tid = request.decode_payload::<TidOnly>().unwrap().tid;
    let reply = MdsReply {
        tid,
        result,
        trace: trace
            .iter()
            .map(|(ino, name)| TraceEntry {
                ino: *ino,
                name: name.to_string(),
            })
            .collect(),
        rights,
        cap_seq,
        from_mds: -1,
    };
    let mut msg = Message::with_payload(MessageType::ClientReply, &reply).unwrap();
    msg.header.src = EntityName::mds(0);
    msg
}
