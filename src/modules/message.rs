//! Cluster message framing and the closed set of message types.
//!
//! Encoding of the wire frame itself belongs to the transport; this module
//! only defines the header the dispatcher routes on and serde helpers for
//! the JSON payloads the subsystem clients exchange.

use crate::modules::error::{ClientError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// The kind of cluster member a message names as source or destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    /// Monitor holding the authoritative cluster membership map
    Monitor,
    /// Metadata server tracking the namespace assignment map
    Mds,
    /// Object storage daemon
    Osd,
    /// A client session
    Client,
}

/// A cluster member: its kind plus a cluster-assigned ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityName {
    /// What kind of member this is
    pub kind: EntityType,
    /// Ordinal within that kind; negative while unassigned
    pub num: i64,
}

impl EntityName {
    /// Names the monitor with the given ordinal.
    pub fn monitor(num: i64) -> Self {
        Self {
            kind: EntityType::Monitor,
            num,
        }
    }

    /// Names the metadata server with the given ordinal.
    pub fn mds(num: i64) -> Self {
        Self {
            kind: EntityType::Mds,
            num,
        }
    }

    /// Names the client with the given ordinal.
    pub fn client(num: i64) -> Self {
        Self {
            kind: EntityType::Client,
            num,
        }
    }
}

/// Every message type the dispatcher knows how to route.
///
/// The set is closed: routing matches exhaustively on this enum, so a new
/// variant cannot silently fall through to the unknown-tag path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Orderly cluster shutdown notice
    Shutdown,
    /// Liveness probe
    Ping,
    /// Liveness probe answer
    PingAck,
    /// Monitor cluster membership map
    MonMap,
    /// Client join request sent to a monitor
    ClientMount,
    /// Client leave notice
    ClientUnmount,
    /// Filesystem statistics request
    Statfs,
    /// Filesystem statistics answer
    StatfsReply,
    /// Explicit metadata map fetch
    MdsGetMap,
    /// Metadata server assignment map
    MdsMap,
    /// Metadata session open/close acknowledgment
    ClientSession,
    /// Metadata session reconnect
    ClientReconnect,
    /// Metadata operation request
    ClientRequest,
    /// Notice that a pending request was forwarded to another mds
    ClientRequestForward,
    /// Metadata operation answer
    ClientReply,
    /// Capability grant or revocation notice
    ClientFileCaps,
    /// Explicit storage map fetch
    OsdGetMap,
    /// Object storage topology map
    OsdMap,
    /// Object storage operation request
    OsdOp,
    /// Object storage operation answer
    OsdOpReply,
}

impl MessageType {
    /// The wire tag for this message type.
    pub fn tag(self) -> u32 {
        match self {
            MessageType::Shutdown => 1,
            MessageType::Ping => 2,
            MessageType::PingAck => 3,
            MessageType::MonMap => 4,
            MessageType::ClientMount => 10,
            MessageType::ClientUnmount => 11,
            MessageType::Statfs => 12,
            MessageType::StatfsReply => 13,
            MessageType::MdsGetMap => 20,
            MessageType::MdsMap => 21,
            MessageType::ClientSession => 22,
            MessageType::ClientReconnect => 23,
            MessageType::ClientRequest => 24,
            MessageType::ClientRequestForward => 25,
            MessageType::ClientReply => 26,
            MessageType::ClientFileCaps => 27,
            MessageType::OsdGetMap => 40,
            MessageType::OsdMap => 41,
            MessageType::OsdOp => 42,
            MessageType::OsdOpReply => 43,
        }
    }

    /// Maps a wire tag back to a message type, `None` for unknown tags.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            1 => MessageType::Shutdown,
            2 => MessageType::Ping,
            3 => MessageType::PingAck,
            4 => MessageType::MonMap,
            10 => MessageType::ClientMount,
            11 => MessageType::ClientUnmount,
            12 => MessageType::Statfs,
            13 => MessageType::StatfsReply,
            20 => MessageType::MdsGetMap,
            21 => MessageType::MdsMap,
            22 => MessageType::ClientSession,
            23 => MessageType::ClientReconnect,
            24 => MessageType::ClientRequest,
            25 => MessageType::ClientRequestForward,
            26 => MessageType::ClientReply,
            27 => MessageType::ClientFileCaps,
            40 => MessageType::OsdGetMap,
            41 => MessageType::OsdMap,
            42 => MessageType::OsdOp,
            43 => MessageType::OsdOpReply,
            _ => return None,
        })
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Shutdown => "shutdown",
            MessageType::Ping => "ping",
            MessageType::PingAck => "ping_ack",
            MessageType::MonMap => "mon_map",
            MessageType::ClientMount => "client_mount",
            MessageType::ClientUnmount => "client_unmount",
            MessageType::Statfs => "statfs",
            MessageType::StatfsReply => "statfs_reply",
            MessageType::MdsGetMap => "mds_getmap",
            MessageType::MdsMap => "mds_map",
            MessageType::ClientSession => "client_session",
            MessageType::ClientReconnect => "client_reconnect",
            MessageType::ClientRequest => "client_request",
            MessageType::ClientRequestForward => "client_request_forward",
            MessageType::ClientReply => "client_reply",
            MessageType::ClientFileCaps => "client_filecaps",
            MessageType::OsdGetMap => "osd_getmap",
            MessageType::OsdMap => "osd_map",
            MessageType::OsdOp => "osd_op",
            MessageType::OsdOpReply => "osd_opreply",
        }
    }
}

/// Diagnostic name for a raw wire tag. Pure lookup, `"unknown"` for tags
/// outside the closed set.
pub fn message_type_name(tag: u32) -> &'static str {
    MessageType::from_tag(tag)
        .map(MessageType::name)
        .unwrap_or("unknown")
}

/// Routing header carried by every message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Wire tag; see [`MessageType::tag`]
    pub tag: u32,
    /// Sender
    pub src: EntityName,
    /// Receiver
    pub dst: EntityName,
    /// Concrete address for the receiver, when the sender resolves one
    pub dst_addr: Option<SocketAddr>,
}

/// A cluster message: routing header plus an opaque payload.
#[derive(Debug, Clone)]
pub struct Message {
    /// Routing header
    pub header: MessageHeader,
    /// Serialized payload; interpretation depends on the message type
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates an empty message of the given type addressed to nobody.
    pub fn new(mtype: MessageType) -> Self {
        Self {
            header: MessageHeader {
                tag: mtype.tag(),
                src: EntityName::client(crate::modules::constants::WHO_UNASSIGNED),
                dst: EntityName::client(crate::modules::constants::WHO_UNASSIGNED),
                dst_addr: None,
            },
            payload: Vec::new(),
        }
    }

    /// Creates a message carrying `payload` serialized as JSON.
    pub fn with_payload<T: Serialize>(mtype: MessageType, payload: &T) -> Result<Self> {
        let mut msg = Self::new(mtype);
        msg.payload = serde_json::to_vec(payload).map_err(ClientError::Decode)?;
        Ok(msg)
    }

    /// Addresses the message to the given entity.
    pub fn addressed_to(mut self, dst: EntityName, addr: Option<SocketAddr>) -> Self {
        self.header.dst = dst;
        self.header.dst_addr = addr;
        self
    }

    /// The message type, if the tag is in the closed set.
    pub fn mtype(&self) -> Option<MessageType> {
        MessageType::from_tag(self.header.tag)
    }

    /// Deserializes the payload as `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(ClientError::Decode)
    }
}
