//! Tunables and protocol constants shared across the client core.

use std::time::Duration;

/// Join attempts before a mount gives up.
pub const MOUNT_ATTEMPTS: u32 = 10;
/// How long one join attempt waits for the cluster maps.
pub const MOUNT_WAIT: Duration = Duration::from_secs(6);

/// How long a metadata request waits for its reply.
pub const REQUEST_WAIT: Duration = Duration::from_secs(30);

/// Worker threads in the shared background task pool.
pub const POOL_WORKERS: usize = 2;

/// Page granularity for storage reply buffer accounting.
pub const PAGE_SIZE: usize = 4096;

/// Identity of a session before the monitor cluster has named it.
pub const WHO_UNASSIGNED: i64 = -1;
