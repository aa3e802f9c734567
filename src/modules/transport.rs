//! Interface boundary to the wire transport.
//!
//! The transport owns sockets, framing, and delivery threads; this crate
//! only sends messages and receives them through the registered dispatch
//! handler. Delivery happens on a transport thread while the transport
//! holds its own receive lock, so `dispatch` implementations must not
//! block, sleep, or unwind.

use crate::modules::error::Result;
use crate::modules::message::{Message, MessageHeader};
use std::net::SocketAddr;
use std::sync::Weak;

/// Inbound delivery callback. Registered once at session creation.
pub trait MessageHandler: Send + Sync {
    /// Routes one inbound message. Must be constant-time and non-blocking;
    /// the message is consumed regardless of how routing goes.
    fn dispatch(&self, msg: Message);
}

/// Page-preparation hook the storage client registers so the transport can
/// size receive buffers for data-bearing storage replies before reading
/// them off the wire.
pub trait PagePreparer: Send + Sync {
    /// Accounts for an incoming data payload of `data_len` bytes.
    fn prepare_pages(&self, header: &MessageHeader, data_len: usize) -> Result<()>;
}

/// Outbound message channel plus callback registration.
///
/// Registration takes `Weak` references: the session owns the transport, and
/// the transport must not keep the session alive in return.
pub trait Transport: Send + Sync {
    /// Queues a message for delivery to `msg.header.dst`.
    fn send(&self, msg: Message) -> Result<()>;

    /// Registers the inbound delivery callback.
    fn register_dispatch(&self, handler: Weak<dyn MessageHandler>);

    /// Registers the storage client's page-preparation hook.
    fn register_page_preparer(&self, preparer: Weak<dyn PagePreparer>);

    /// The local address the transport bound, if any.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Stops delivery threads and closes connections. Called once, from
    /// session teardown.
    fn shutdown(&self);
}
