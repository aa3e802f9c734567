//! Mount coordinator: the bootstrap handshake that joins the cluster.
//!
//! The coordinator runs on the caller's thread and is the only code here
//! allowed to block. It repeatedly asks a randomly chosen monitor to let the
//! session join, waits on the readiness gate for the three cluster maps,
//! and once they are all present resolves the mount path to a root handle
//! through the metadata cluster.

use crate::modules::cache::{Capability, Entry, OpenMode};
use crate::modules::error::{ClientError, Result};
use crate::modules::message::{EntityName, Message, MessageType};
use crate::modules::readiness::WaitOutcome;
use crate::modules::session::Client;
use log::{debug, error, info};
use rand::rngs::OsRng;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use super::constants::{MOUNT_ATTEMPTS, MOUNT_WAIT};

/// Caller-supplied mount parameters. Assembled by the configuration layer;
/// opaque to everything below the coordinator.
#[derive(Debug, Clone)]
pub struct MountArgs {
    /// Addresses of the known monitors, one join target per attempt
    pub mon_addrs: Vec<SocketAddr>,
    /// Cluster path to mount
    pub path: String,
    /// Local address override for the transport, if the caller wants one
    pub my_addr: Option<SocketAddr>,
    /// Join attempts before giving up
    pub attempts: u32,
    /// How long each attempt waits for the maps
    pub wait: Duration,
}

impl MountArgs {
    /// Mount parameters for `path` through `mon_addrs`, with the default
    /// attempt budget and wait interval.
    pub fn new(mon_addrs: Vec<SocketAddr>, path: impl Into<String>) -> Self {
        Self {
            mon_addrs,
            path: path.into(),
            my_addr: None,
            attempts: MOUNT_ATTEMPTS,
            wait: MOUNT_WAIT,
        }
    }
}

/// The resolved mount point: its cache entry and the access grant that came
/// with the open.
#[derive(Debug)]
pub struct RootHandle {
    /// Cache entry for the mount point
    pub entry: Arc<Entry>,
    /// Capability granted by the answering metadata server
    pub capability: Capability,
}

/// Joins the cluster and resolves the mount path.
///
/// Sends a join request to one random monitor per attempt and waits one
/// interval on the readiness gate. An external interrupt aborts immediately
/// with [`ClientError::Cancelled`]; an exhausted attempt budget fails with
/// [`ClientError::Timeout`]. Once all three maps are present the root is
/// resolved exactly once, and any resolver failure is the mount's failure.
pub fn mount(client: &Arc<Client>, args: &MountArgs) -> Result<RootHandle> {
    if args.mon_addrs.is_empty() {
        return Err(ClientError::InvalidArgs("no monitor addresses"));
    }
    if args.attempts == 0 {
        return Err(ClientError::InvalidArgs("no join attempts budgeted"));
    }
    info!("mount start, path '{}'", args.path);

    let mut attempts = args.attempts;
    while !client.ready.is_complete() {
        if client.ready.is_interrupted() {
            return Err(ClientError::Cancelled);
        }

        let which = pick_monitor(args.mon_addrs.len());
        let msg = Message::new(MessageType::ClientMount).addressed_to(
            EntityName::monitor(which as i64),
            Some(args.mon_addrs[which]),
        );
        client.transport().send(msg)?;
        debug!("mount from mon{}, {} attempts left", which, attempts);

        match client.ready.wait(args.wait) {
            WaitOutcome::Interrupted => return Err(ClientError::Cancelled),
            WaitOutcome::Ready => break,
            WaitOutcome::TimedOut => {
                attempts -= 1;
                debug!("mount still waiting for maps, attempts={}", attempts);
                if attempts == 0 {
                    error!("mount gave up after {} attempts", args.attempts);
                    return Err(ClientError::Timeout);
                }
            }
        }
    }

    debug!("mount opening base mount point");
    let root = open_root(client, &args.path)?;
    info!("mount success, mount point inode {}", root.entry.ino);
    Ok(root)
}

/// Uniform-enough monitor choice: one cryptographically strong random byte
/// reduced modulo the count. The modulo skew is negligible at realistic
/// cluster sizes and every monitor stays reachable.
fn pick_monitor(count: usize) -> usize {
    let mut byte = [0u8; 1];
    OsRng.fill_bytes(&mut byte);
    byte[0] as usize % count
}

/// Resolves the mount path through the metadata cluster and binds the
/// result into the local cache.
///
/// Binds the filesystem root first if no root exists yet, then materializes
/// the mount-point entry from the reply's lookup trace, attaches the
/// granted capability, and pins the entry for its open mode. On failure,
/// only state allocated by this call is released; a root bound by an
/// earlier mount is left alone.
fn open_root(client: &Arc<Client>, path: &str) -> Result<RootHandle> {
    debug!("open_root opening '{}'", path);
    let (tid, request) = client.mdsc.create_open_request(path)?;
    let reply = client.mdsc.do_request(client.transport(), request, tid)?;

    if reply.result != 0 {
        debug!("open_root rejected by mds, code {}", reply.result);
        return Err(ClientError::RemoteRejected(reply.result));
    }
    if reply.trace.is_empty() {
        error!("open_root: mds reported success but sent nothing to resolve");
        return Err(ClientError::Protocol("success reply with empty trace"));
    }

    let cache = client.cache();
    let (_root, bound_here) = cache.resolve_or_create_root(reply.trace[0].ino);

    let resolved = cache.materialize_trace(&reply.trace).map(|entry| {
        let capability = cache.bind_capability(
            &entry,
            EntityName::mds(reply.from_mds),
            reply.rights,
            reply.cap_seq,
        );
        entry.pin(OpenMode::Pin);
        RootHandle { entry, capability }
    });

    match resolved {
        Ok(handle) => {
            debug!("open_root success, mount point inode {}", handle.entry.ino);
            Ok(handle)
        }
        Err(e) => {
            debug!("open_root failure: {}", e);
            if bound_here {
                cache.unbind_root();
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::cache::EntryCache;
    use crate::modules::testing::{
        init_logs, mds_map_msg, mon_map_msg, open_reply_msg, osd_map_msg, MockTransport,
    };
    use crate::modules::transport::Transport;
    use std::collections::HashSet;
    use std::thread;

    fn fast_args(monitors: usize, attempts: u32) -> MountArgs {
        let addrs = (0..monitors)
            .map(|n| format!("10.0.0.{}:6789", n + 1).parse().unwrap())
            .collect();
        let mut args = MountArgs::new(addrs, "/export");
        args.attempts = attempts;
        args.wait = Duration::from_millis(30);
        args
    }

    fn new_client(args: &MountArgs, transport: Arc<MockTransport>) -> Arc<Client> {
        init_logs();
        Client::create(args, Arc::new(EntryCache::new()), |_my_addr| {
            let transport: Arc<dyn Transport> = transport;
            Ok(transport)
        })
        .unwrap()
    }

    /// Answers every join request with all three maps and every metadata
    /// request with a successful open reply.
    fn cooperative_script(
    ) -> impl FnMut(usize, &Message) -> Vec<Message> + Send + 'static {
        |_count, msg| match msg.mtype() {
            Some(MessageType::ClientMount) => {
                vec![mon_map_msg(1, 3, 7), mds_map_msg(1), osd_map_msg(1)]
            }
            Some(MessageType::ClientRequest) => {
                vec![open_reply_msg(
                    msg,
                    0,
                    &[(1, ""), (22, "export")],
                    0x5,
                    9,
                )]
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_mount_success() -> Result<()> {
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::scripted(cooperative_script()));
        let client = new_client(&args, transport.clone());

        let root = mount(&client, &args)?;
        assert_eq!(root.entry.ino, 22);
        assert_eq!(root.entry.name, "export");
        assert_eq!(root.capability.rights, 0x5);
        assert_eq!(root.capability.grantor, EntityName::mds(0));
        assert_eq!(root.entry.pin_count(OpenMode::Pin), 1);

        // Filesystem root bound from the head of the trace
        assert_eq!(client.cache().root().unwrap().ino, 1);
        assert_eq!(client.whoami(), Some(7));
        assert_eq!(transport.sent_of(MessageType::ClientMount), 1);
        Ok(())
    }

    #[test]
    fn test_timeout_after_exact_attempts() {
        let args = fast_args(3, 4);
        let transport = Arc::new(MockTransport::silent());
        let client = new_client(&args, transport.clone());

        let err = mount(&client, &args).unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert_eq!(transport.sent_of(MessageType::ClientMount), 4);
    }

    #[test]
    fn test_cancel_mid_wait_consumes_no_attempt() {
        let mut args = fast_args(3, 10);
        args.wait = Duration::from_secs(30);
        let transport = Arc::new(MockTransport::silent());
        let client = new_client(&args, transport.clone());

        let interrupter = {
            let client = client.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                client.interrupt();
            })
        };
        let err = mount(&client, &args).unwrap_err();
        interrupter.join().unwrap();

        assert!(matches!(err, ClientError::Cancelled));
        // One join was sent before the interrupt, none after
        assert_eq!(transport.sent_of(MessageType::ClientMount), 1);
    }

    #[test]
    fn test_partial_readiness_keeps_joining() -> Result<()> {
        // Scenario: two join attempts get no answer, the third brings only
        // the monitor map, and the session must keep waiting until the
        // metadata and storage maps arrive on the fourth.
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::scripted(|count, msg| {
            match (count, msg.mtype()) {
                (3, Some(MessageType::ClientMount)) => vec![mon_map_msg(1, 3, 7)],
                (4, Some(MessageType::ClientMount)) => vec![mds_map_msg(1), osd_map_msg(1)],
                (_, Some(MessageType::ClientRequest)) => {
                    vec![open_reply_msg(msg, 0, &[(1, "")], 0x5, 1)]
                }
                _ => Vec::new(),
            }
        }));
        let client = new_client(&args, transport.clone());

        let root = mount(&client, &args)?;
        assert_eq!(root.entry.ino, 1);
        assert_eq!(transport.sent_of(MessageType::ClientMount), 4);
        assert!(client.ready.is_complete());
        Ok(())
    }

    #[test]
    fn test_remote_rejection_binds_nothing() {
        // Scenario: the mds answers the open with result code 5
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::scripted(|_count, msg| match msg.mtype() {
            Some(MessageType::ClientMount) => {
                vec![mon_map_msg(1, 3, 7), mds_map_msg(1), osd_map_msg(1)]
            }
            Some(MessageType::ClientRequest) => {
                vec![open_reply_msg(msg, 5, &[(1, "")], 0, 0)]
            }
            _ => Vec::new(),
        }));
        let client = new_client(&args, transport.clone());

        let err = mount(&client, &args).unwrap_err();
        assert!(matches!(err, ClientError::RemoteRejected(5)));
        assert!(client.cache().root().is_none());
    }

    #[test]
    fn test_empty_trace_is_protocol_error() {
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::scripted(|_count, msg| match msg.mtype() {
            Some(MessageType::ClientMount) => {
                vec![mon_map_msg(1, 3, 7), mds_map_msg(1), osd_map_msg(1)]
            }
            Some(MessageType::ClientRequest) => vec![open_reply_msg(msg, 0, &[], 0, 0)],
            _ => Vec::new(),
        }));
        let client = new_client(&args, transport.clone());

        let err = mount(&client, &args).unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(client.cache().root().is_none());
    }

    #[test]
    fn test_submount_reuses_bound_root() -> Result<()> {
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::scripted(cooperative_script()));
        let client = new_client(&args, transport.clone());

        let first = mount(&client, &args)?;
        let root_before = client.cache().root().unwrap();

        // A second mount of a sub-path keeps the already-bound root even
        // though its trace starts at a different inode
        let mut sub = args.clone();
        sub.path = "/export/sub".to_string();
        let second = mount(&client, &sub)?;

        assert!(Arc::ptr_eq(&root_before, &client.cache().root().unwrap()));
        assert_eq!(first.entry.ino, second.entry.ino);
        Ok(())
    }

    #[test]
    fn test_send_failure_propagates() {
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::silent());
        let client = new_client(&args, transport.clone());
        transport.fail_sends();

        let err = mount(&client, &args).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn test_no_monitors_is_invalid() {
        let args = fast_args(3, 10);
        let transport = Arc::new(MockTransport::silent());
        let client = new_client(&args, transport);

        let mut empty = args.clone();
        empty.mon_addrs.clear();
        let err = mount(&client, &empty).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgs(_)));
    }

    #[test]
    fn test_monitor_selection_covers_all() {
        for count in 1..=5usize {
            let mut seen = HashSet::new();
            for _ in 0..2000 {
                let which = pick_monitor(count);
                assert!(which < count);
                seen.insert(which);
            }
            assert_eq!(seen.len(), count, "count {}", count);
        }
    }
}
