//! Client session lifecycle and inbound message routing.
//!
//! A `Client` is the long-lived aggregate for one mount: its cluster
//! identity, readiness gate, the three subsystem clients, the transport
//! handle, and a reference on the shared background task pool. Inbound
//! messages arrive on the transport's delivery thread and are routed here;
//! routing stays constant-time and never blocks, because the transport
//! holds its receive lock across the call.

use crate::modules::cache::EntryCache;
use crate::modules::constants::WHO_UNASSIGNED;
use crate::modules::error::Result;
use crate::modules::message::{message_type_name, EntityName, Message, MessageType};
use crate::modules::metadata::MetadataClient;
use crate::modules::monitor::MonitorClient;
use crate::modules::mount::MountArgs;
use crate::modules::pool::PoolHandle;
use crate::modules::readiness::{MapSource, ReadyState};
use crate::modules::storage::StorageClient;
use crate::modules::transport::{MessageHandler, PagePreparer, Transport};
use anyhow::Context;
use log::{debug, error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tokio::signal::ctrl_c;
use uuid::Uuid;

/// A live client session.
///
/// Created once per mount attempt with [`Client::create`] and torn down
/// with [`Client::shutdown`]. The session does no I/O itself; it routes
/// messages between the transport and the subsystem clients and gates the
/// mount handshake on map readiness.
pub struct Client {
    /// Local instance id, for log correlation before the cluster names us
    pub instance: Uuid,
    whoami: AtomicI64,
    /// Readiness gate the mount coordinator waits on
    pub ready: ReadyState,
    /// Monitor subsystem state
    pub monc: MonitorClient,
    /// Metadata subsystem state
    pub mdsc: Arc<MetadataClient>,
    /// Storage subsystem state
    pub osdc: Arc<StorageClient>,
    transport: Arc<dyn Transport>,
    cache: Arc<EntryCache>,
    pool: PoolHandle,
}

impl Client {
    /// Creates a session: acquires the shared pool, builds the transport
    /// through `factory` (passing the caller's local-address override), and
    /// wires the dispatch and page-preparation callbacks.
    ///
    /// On any failure after the pool reference is taken, the reference is
    /// released again by drop before the error returns.
    pub fn create<F>(args: &MountArgs, cache: Arc<EntryCache>, factory: F) -> Result<Arc<Self>>
    where
        F: FnOnce(Option<SocketAddr>) -> Result<Arc<dyn Transport>>,
    {
        let pool = PoolHandle::acquire();
        let transport = factory(args.my_addr)?;

        let client = Arc::new(Self {
            instance: Uuid::new_v4(),
            whoami: AtomicI64::new(WHO_UNASSIGNED),
            ready: ReadyState::new(),
            monc: MonitorClient::new(),
            mdsc: Arc::new(MetadataClient::new()),
            osdc: Arc::new(StorageClient::new()),
            transport,
            cache,
            pool,
        });

        let dispatch: Weak<dyn MessageHandler> =
            Arc::downgrade(&(client.clone() as Arc<dyn MessageHandler>));
        client.transport.register_dispatch(dispatch);
        let preparer: Weak<dyn PagePreparer> =
            Arc::downgrade(&(client.osdc.clone() as Arc<dyn PagePreparer>));
        client.transport.register_page_preparer(preparer);

        info!("created client session {}", client.instance);
        Ok(client)
    }

    /// The cluster-assigned client ordinal, once a monitor map has named us.
    pub fn whoami(&self) -> Option<i64> {
        match self.whoami.load(Ordering::SeqCst) {
            WHO_UNASSIGNED => None,
            num => Some(num),
        }
    }

    /// The transport this session sends through.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// The entry cache this session resolves into.
    pub fn cache(&self) -> &Arc<EntryCache> {
        &self.cache
    }

    /// Flags an external interrupt; any blocked mount wait aborts with
    /// `Cancelled`.
    pub fn interrupt(&self) {
        info!("client session {} interrupted", self.instance);
        self.ready.interrupt();
    }

    /// Tears the session down: aborts outstanding metadata work, then stops
    /// the transport. The pool reference is released when the session is
    /// dropped. Not idempotent; the session has a single owner.
    pub fn shutdown(&self) {
        info!("shutting down client session {}", self.instance);
        self.mdsc.stop();
        self.transport.shutdown();
    }

    // Identity comes from the destination field of the first monitor map
    // ever received, and is never reassigned.
    fn assign_identity(&self, dst: &EntityName) {
        if self
            .whoami
            .compare_exchange(WHO_UNASSIGNED, dst.num, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("i am client{}", dst.num);
        }
    }
}

impl MessageHandler for Client {
    /// Routes one inbound message to its subsystem handler.
    ///
    /// For the three map-update types, first-ever receipt (absent before,
    /// present after) is what reports into the readiness gate; routine epoch
    /// refreshes do not. Unknown tags are logged and dropped. Errors never
    /// escape: this runs under the transport's receive lock.
    fn dispatch(&self, msg: Message) {
        let Some(mtype) = msg.mtype() else {
            error!(
                "dispatch: unknown message type {} ({})",
                msg.header.tag,
                message_type_name(msg.header.tag)
            );
            return;
        };
        debug!("dispatch {}", mtype.name());

        match mtype {
            MessageType::MonMap => {
                let had = self.monc.has_map();
                match self.monc.handle_map_update(&msg) {
                    Ok(()) => {
                        if !had && self.monc.has_map() {
                            self.assign_identity(&msg.header.dst);
                            self.ready.mark_ready(MapSource::Monitor);
                        }
                    }
                    Err(e) => error!("problem decoding monitor map: {}", e),
                }
            }
            MessageType::StatfsReply => self.monc.handle_statfs_reply(&msg),

            MessageType::MdsMap => {
                let had = self.mdsc.has_map();
                match self.mdsc.handle_map_update(&msg) {
                    Ok(()) => {
                        if !had && self.mdsc.has_map() {
                            self.ready.mark_ready(MapSource::Metadata);
                        }
                    }
                    Err(e) => error!("problem decoding metadata map: {}", e),
                }
            }
            MessageType::ClientSession => self.mdsc.handle_session_event(&msg),
            MessageType::ClientReply => self.mdsc.handle_reply(&msg),
            MessageType::ClientRequestForward => self.mdsc.handle_forward(&msg),
            MessageType::ClientFileCaps => {
                // Capability processing can fan out into cache work; keep
                // the delivery thread constant-time and do it on the pool.
                let mdsc = self.mdsc.clone();
                self.pool.execute(move || mdsc.handle_capability_event(&msg));
            }

            MessageType::OsdMap => {
                let had = self.osdc.has_map();
                match self.osdc.handle_map_update(&msg) {
                    Ok(()) => {
                        if !had && self.osdc.has_map() {
                            self.ready.mark_ready(MapSource::Storage);
                        }
                    }
                    Err(e) => error!("problem decoding storage map: {}", e),
                }
            }
            MessageType::OsdOpReply => self.osdc.handle_op_reply(&msg),

            // Request-direction and control types a client never consumes
            MessageType::Shutdown
            | MessageType::Ping
            | MessageType::PingAck
            | MessageType::ClientMount
            | MessageType::ClientUnmount
            | MessageType::Statfs
            | MessageType::MdsGetMap
            | MessageType::ClientReconnect
            | MessageType::ClientRequest
            | MessageType::OsdGetMap
            | MessageType::OsdOp => {
                warn!("dispatch: unhandled message type {}", mtype.name());
            }
        }
        // msg dropped here on every path, including the unknown-tag return
    }
}

/// Maps SIGINT/SIGTERM to the session's interrupt flag from a dedicated
/// signal thread. The thread holds only a weak reference and exits once a
/// signal fires.
pub fn install_interrupt_handler(client: &Arc<Client>) -> anyhow::Result<JoinHandle<()>> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handler")?;
    let weak = Arc::downgrade(client);
    let handle = thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            debug!("received signal {}", sig);
            if let Some(client) = weak.upgrade() {
                client.interrupt();
            }
        }
    });
    Ok(handle)
}

/// Runs the session until ctrl-c, then interrupts and shuts it down.
///
/// # Returns
/// * `Ok(())` once the session has been torn down
/// * `Err` if the ctrl-c listener cannot be installed
pub async fn run(client: Arc<Client>) -> anyhow::Result<()> {
    info!(
        "session {} running, waiting for shutdown signal",
        client.instance
    );
    ctrl_c().await?;
    client.interrupt();
    client.shutdown();
    info!("session terminated");
    Ok(())
}
