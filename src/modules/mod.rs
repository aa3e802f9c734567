//! Core client modules.
//!
//! This module provides the main components of the client bootstrap:
//!
//! - `cache`: local entry cache and capability binding
//! - `constants`: tunables and protocol constants
//! - `error`: the client error taxonomy
//! - `message`: cluster message framing and type tags
//! - `metadata`: metadata client state and request/reply machinery
//! - `monitor`: monitor client state
//! - `mount`: the mount handshake and root resolution
//! - `pool`: the shared background task pool
//! - `readiness`: the map readiness gate
//! - `session`: session lifecycle and message routing
//! - `storage`: storage client state
//! - `transport`: the wire transport interface

pub mod cache;
pub mod constants;
pub mod error;
pub mod message;
pub mod metadata;
pub mod monitor;
pub mod mount;
pub mod pool;
/// Readiness tracking for the three cluster maps.
pub mod readiness;
pub mod session;
pub mod storage;
pub mod transport;

#[cfg(test)]
pub mod testing;
