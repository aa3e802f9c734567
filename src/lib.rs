#![doc(html_root_url = "https://docs.rs/shoalfs/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! shoalfs: client bootstrap core for the Shoal distributed file system
//!
//! This crate joins a client to a storage cluster and routes everything the
//! cluster sends back. Mounting means three things happening in order:
//! discovering the monitor quorum, receiving the three authoritative
//! cluster maps (monitor, metadata, storage), and resolving the mount path
//! to a root handle through the metadata servers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shoalfs::{mount, Client, EntryCache, MountArgs};
//! use std::sync::Arc;
//!
//! # fn connect(_addr: Option<std::net::SocketAddr>)
//! #     -> shoalfs::Result<Arc<dyn shoalfs::Transport>> { unimplemented!() }
//! # fn main() -> shoalfs::Result<()> {
//! let args = MountArgs::new(vec!["10.0.0.1:6789".parse().unwrap()], "/export");
//! let cache = Arc::new(EntryCache::new());
//!
//! // The transport factory receives the optional local-address override
//! let client = Client::create(&args, cache, connect)?;
//! let root = mount(&client, &args)?;
//! println!("mounted at inode {}", root.entry.ino);
//!
//! client.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! ## Structure
//!
//! Inbound messages are delivered by the transport on its own thread and
//! routed by [`Client`]'s dispatch to the monitor, metadata, or storage
//! client. Each map-update handler reports first receipt into the readiness
//! gate; [`mount`] blocks on that gate, then resolves the root exactly once.

pub mod modules;

pub use modules::cache::{Capability, Entry, EntryCache, OpenMode};
pub use modules::error::{ClientError, Result};
pub use modules::message::{message_type_name, Message, MessageType};
pub use modules::mount::{mount, MountArgs, RootHandle};
pub use modules::session::Client;
pub use modules::transport::Transport;

// Re-export commonly used types
pub use modules::readiness::{MapSource, ReadyState};
