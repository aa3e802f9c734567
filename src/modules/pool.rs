//! Process-wide background task pool, shared between sessions.
//!
//! The first live session brings the worker threads up and the last one
//! tears them down. The count and the pool itself live behind one mutex, so
//! the 0→1 initialization and the 1→0 shutdown are atomic with the count
//! transition; there is no check-then-act gap. Handles are owned values
//! whose drop releases the reference, so the count cannot go negative and
//! cannot leak on an error path.

use crate::modules::constants::POOL_WORKERS;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads draining a job channel.
struct TaskPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    fn start(workers: usize) -> Self {
        let (tx, rx) = channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..workers)
            .map(|n| {
                let rx = rx.clone();
                thread::spawn(move || Self::run_worker(n, rx))
            })
            .collect();
        Self { tx, workers }
    }

    fn run_worker(n: usize, rx: Arc<Mutex<Receiver<Job>>>) {
        debug!("pool worker {} up", n);
        loop {
            let job = {
                let rx = rx.lock();
                rx.recv()
            };
            match job {
                Ok(job) => job(),
                // Sender gone: the pool is shutting down
                Err(_) => break,
            }
        }
        debug!("pool worker {} down", n);
    }

    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            error!("task pool channel closed, job dropped");
        }
    }

    fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if worker.join().is_err() {
                error!("pool worker panicked during shutdown");
            }
        }
    }
}

#[derive(Default)]
struct PoolSlot {
    refs: usize,
    pool: Option<TaskPool>,
}

/// A reference-counted home for the shared pool. Sessions use the process
/// global; tests may carry their own registry for deterministic lifecycle
/// checks.
pub struct PoolRegistry {
    slot: Mutex<PoolSlot>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    /// Creates an empty registry with no live references.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(PoolSlot::default()),
        }
    }

    /// Current reference count. Mostly useful in tests.
    pub fn refs(&self) -> usize {
        self.slot.lock().refs
    }

    /// Whether the worker pool is currently up.
    pub fn is_running(&self) -> bool {
        self.slot.lock().pool.is_some()
    }
}

static GLOBAL: Lazy<Arc<PoolRegistry>> = Lazy::new(|| Arc::new(PoolRegistry::new()));

/// Owned reference to the shared task pool.
///
/// Acquiring the first handle starts the workers; dropping the last joins
/// them. Both transitions happen inside the registry lock.
pub struct PoolHandle {
    registry: Arc<PoolRegistry>,
}

impl PoolHandle {
    /// Acquires a reference against the process-wide registry.
    pub fn acquire() -> Self {
        Self::acquire_in(GLOBAL.clone())
    }

    /// Acquires a reference against the given registry.
    pub fn acquire_in(registry: Arc<PoolRegistry>) -> Self {
        {
            let mut slot = registry.slot.lock();
            if slot.refs == 0 {
                info!("first session, starting task pool");
                slot.pool = Some(TaskPool::start(POOL_WORKERS));
            }
            slot.refs += 1;
        }
        Self { registry }
    }

    /// Hands a job to the workers.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let slot = self.registry.slot.lock();
        match &slot.pool {
            Some(pool) => pool.execute(Box::new(job)),
            // Unreachable while a handle is live; a handle keeps refs > 0
            None => error!("task pool missing while referenced"),
        }
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        let mut slot = self.registry.slot.lock();
        slot.refs -= 1;
        if slot.refs == 0 {
            info!("last session gone, shutting down task pool");
            if let Some(pool) = slot.pool.take() {
                pool.shutdown();
            }
        }
    }
}
