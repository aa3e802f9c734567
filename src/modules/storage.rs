//! Storage client state: the object storage topology map, operation
//! replies, and the transport's page-preparation hook.
//!
//! Placement and the data path proper are out of scope here; the bootstrap
//! only needs first-map tracking and constant-time reply accounting.

use crate::modules::constants::PAGE_SIZE;
use crate::modules::error::Result;
use crate::modules::message::{Message, MessageHeader};
use crate::modules::transport::PagePreparer;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Topology map of the object storage cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageMap {
    /// Monotonic map version
    pub epoch: u32,
    /// Number of object storage daemons in the topology
    pub num_osds: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OsdOpReply {
    tid: u64,
    result: i32,
}

/// Client-side storage state.
#[derive(Default)]
pub struct StorageClient {
    map: Mutex<Option<StorageMap>>,
    pages_prepared: AtomicUsize,
}

impl StorageClient {
    /// Creates a storage client with no map yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a storage map has ever been received.
    pub fn has_map(&self) -> bool {
        self.map.lock().is_some()
    }

    /// Epoch of the current map, if one is present.
    pub fn epoch(&self) -> Option<u32> {
        self.map.lock().as_ref().map(|m| m.epoch)
    }

    /// Decodes and applies a storage map update.
    pub fn handle_map_update(&self, msg: &Message) -> Result<()> {
        let new: StorageMap = msg.decode_payload()?;
        let mut map = self.map.lock();
        debug!(
            "storage map epoch {} -> {} ({} osds)",
            map.as_ref().map(|m| m.epoch).unwrap_or(0),
            new.epoch,
            new.num_osds
        );
        *map = Some(new);
        Ok(())
    }

    /// Handles an operation reply. The data path that would consume it is
    /// out of scope; the reply is acknowledged and logged.
    pub fn handle_op_reply(&self, msg: &Message) {
        match msg.decode_payload::<OsdOpReply>() {
            Ok(reply) => debug!("osd op reply tid {} result {}", reply.tid, reply.result),
            Err(e) => warn!("dropping undecodable osd reply: {}", e),
        }
    }

    /// Pages accounted for so far through the preparation hook.
    pub fn pages_prepared(&self) -> usize {
        self.pages_prepared.load(Ordering::SeqCst)
    }
}

impl PagePreparer for StorageClient {
    fn prepare_pages(&self, header: &MessageHeader, data_len: usize) -> Result<()> {
        let pages = data_len.div_ceil(PAGE_SIZE);
        debug!(
            "preparing {} pages for {} bytes from {:?}",
            pages, data_len, header.src
        );
        self.pages_prepared.fetch_add(pages, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::message::{EntityName, MessageType};

    fn map_msg(epoch: u32) -> Message {
        Message::with_payload(MessageType::OsdMap, &StorageMap { epoch, num_osds: 4 }).unwrap()
    }

    #[test]
    fn test_first_map_receipt() -> Result<()> {
        let osdc = StorageClient::new();
        assert!(!osdc.has_map());
        osdc.handle_map_update(&map_msg(1))?;
        assert!(osdc.has_map());
        assert_eq!(osdc.epoch(), Some(1));
        Ok(())
    }

    #[test]
    fn test_bad_payload_rejected() {
        let osdc = StorageClient::new();
        let mut bad = Message::new(MessageType::OsdMap);
        bad.payload = b"{".to_vec();
        assert!(osdc.handle_map_update(&bad).is_err());
        assert!(!osdc.has_map());
    }

    #[test]
    fn test_page_accounting_rounds_up() -> Result<()> {
        let osdc = StorageClient::new();
        let header = MessageHeader {
            tag: MessageType::OsdOpReply.tag(),
            src: EntityName::mds(0),
            dst: EntityName::client(1),
            dst_addr: None,
        };
        osdc.prepare_pages(&header, 1)?;
        osdc.prepare_pages(&header, PAGE_SIZE + 1)?;
        assert_eq!(osdc.pages_prepared(), 3);
        Ok(())
    }
}
