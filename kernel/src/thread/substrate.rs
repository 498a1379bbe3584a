/*!
 * Execution Substrate
 * Starts the logical threads of control that processes run on
 */

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::Priority;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Code a new context runs; it never returns a value to its creator
pub type Entry = Box<dyn FnOnce() + Send + 'static>;

/// Thread creation interface (thread_fork)
pub trait ExecutionSubstrate: Send + Sync {
    /// Begin a new thread of control named `name` running `entry`
    ///
    /// On failure `entry` is dropped without running.
    fn spawn(&self, name: &str, priority: Priority, entry: Entry) -> ProcessResult<()>;

    /// Contexts started and not yet finished
    fn live(&self) -> usize;
}

thread_local! {
    static PRIORITY: Cell<Option<Priority>> = const { Cell::new(None) };
}

/// One named OS thread per context
pub struct ThreadSubstrate {
    live: Arc<AtomicUsize>,
    spawned: AtomicU64,
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ThreadSubstrate {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            spawned: AtomicU64::new(0),
        }
    }

    /// Priority hint the calling context was started with
    pub fn current_priority() -> Option<Priority> {
        PRIORITY.with(Cell::get)
    }

    /// Contexts started over the substrate's lifetime
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Default for ThreadSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionSubstrate for ThreadSubstrate {
    fn spawn(&self, name: &str, priority: Priority, entry: Entry) -> ProcessResult<()> {
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(Arc::clone(&self.live));

        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = guard;
                PRIORITY.with(|p| p.set(Some(priority)));
                entry();
            })
            .map_err(|e| ProcessError::NoMemory(format!("thread creation failed: {}", e)))?;

        self.spawned.fetch_add(1, Ordering::Relaxed);
        trace!(name, priority, "context started");
        Ok(())
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}
