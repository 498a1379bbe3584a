/*!
 * Process Table
 *
 * Creates and destroys process records, owns parentless records (the first
 * user process and adopted orphans) and keeps the counters behind
 * [`TableStats`]. Records owned by a parent are never looked up here.
 */

use super::record::ProcessRecord;
use super::status::WaitStatus;
use super::types::Lifecycle;
use crate::core::errors::ProcessResult;
use crate::core::id::PidAllocator;
use crate::core::limits::SIGKILL;
use crate::core::types::Pid;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Record counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub created: u64,
    pub destroyed: u64,
    pub live: usize,
    /// Parentless records currently owned by the table
    pub table_owned: usize,
    pub orphans_adopted: u64,
}

pub struct ProcessTable {
    pids: PidAllocator,
    owned: DashMap<Pid, Arc<ProcessRecord>, RandomState>,
    created: AtomicU64,
    destroyed: AtomicU64,
    orphans_adopted: AtomicU64,
    live: Mutex<usize>,
    drained: Condvar,
}

impl ProcessTable {
    pub fn new(max_processes: usize) -> Self {
        Self {
            pids: PidAllocator::new(max_processes),
            owned: DashMap::with_hasher(RandomState::new()),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            orphans_adopted: AtomicU64::new(0),
            live: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    /// Create a running record (proc_create)
    ///
    /// A record without a parent is owned by the table from the start; a child
    /// still has to be [`linked`](Self::link) by its parent.
    pub fn create(
        &self,
        name: impl Into<String>,
        parent: Option<&Arc<ProcessRecord>>,
    ) -> ProcessResult<Arc<ProcessRecord>> {
        let pid = self.pids.allocate()?;
        let record = Arc::new(ProcessRecord::new(pid, name.into(), parent));

        self.created.fetch_add(1, Ordering::Relaxed);
        *self.live.lock() += 1;
        if parent.is_none() {
            self.owned.insert(pid, Arc::clone(&record));
        }

        trace!(pid, parent = parent.map(|p| p.pid()), "process record created");
        Ok(record)
    }

    /// Append `child` to `parent`'s children under the parent's lock
    pub fn link(parent: &ProcessRecord, child: Arc<ProcessRecord>) {
        parent.lock().children.push(child);
    }

    /// Take ownership of an orphan
    ///
    /// The caller holds the orphan's lock and has already cleared its parent
    /// link, so the orphan cannot decide to destroy itself before it is here.
    pub(crate) fn adopt(&self, orphan: Arc<ProcessRecord>) {
        debug!(pid = orphan.pid(), "orphan adopted");
        self.orphans_adopted.fetch_add(1, Ordering::Relaxed);
        self.owned.insert(orphan.pid(), orphan);
    }

    /// Give up ownership of a parentless record
    pub(crate) fn release(&self, pid: Pid) -> Option<Arc<ProcessRecord>> {
        self.owned.remove(&pid).map(|(_, record)| record)
    }

    /// Destroy a terminated record (proc_destroy)
    ///
    /// The caller guarantees no other context can reach the record any more.
    ///
    /// # Panics
    ///
    /// When the record is still running, already destroyed, still owns
    /// children or still holds an address space.
    pub fn destroy(&self, record: Arc<ProcessRecord>) {
        let pid = record.pid();
        {
            let mut state = record.lock();
            match state.lifecycle {
                Lifecycle::Running => panic!("destroying running process {}", pid),
                Lifecycle::Destroyed => panic!("process {} destroyed twice", pid),
                Lifecycle::Zombie(_) => {}
            }
            assert!(
                state.children.is_empty(),
                "destroying process {} that still owns children",
                pid
            );
            assert!(
                !record.has_address_space(),
                "destroying process {} that still holds an address space",
                pid
            );
            state.lifecycle = Lifecycle::Destroyed;
            state.parent = None;
        }

        self.pids.recycle(pid);
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        trace!(pid, "process record destroyed");

        let mut live = self.live.lock();
        *live -= 1;
        if *live == 0 {
            self.drained.notify_all();
        }
    }

    /// Destroy a record whose context never started
    pub fn abandon(&self, record: Arc<ProcessRecord>) {
        {
            let mut state = record.lock();
            assert!(
                state.lifecycle.is_running() && state.children.is_empty(),
                "abandoning process {} that already ran",
                record.pid()
            );
            state.lifecycle = Lifecycle::Zombie(WaitStatus::signaled(SIGKILL));
        }
        drop(record.take_space());
        if self.release(record.pid()).is_some() {
            debug!(pid = record.pid(), "abandoned parentless record");
        }
        self.destroy(record);
    }

    /// Block until every record has been destroyed or `timeout` passes
    ///
    /// Returns whether the table drained.
    pub fn wait_quiescent(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.live.lock();
        while *live > 0 {
            if self.drained.wait_until(&mut live, deadline).timed_out() {
                return *live == 0;
            }
        }
        true
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            created: self.created.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            live: *self.live.lock(),
            table_owned: self.owned.len(),
            orphans_adopted: self.orphans_adopted.load(Ordering::Relaxed),
        }
    }

    /// Snapshots of the parentless records
    pub fn owned_pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.owned.iter().map(|e| *e.key()).collect();
        pids.sort_unstable();
        pids
    }

    pub fn capacity(&self) -> usize {
        self.pids.capacity()
    }
}

impl std::fmt::Debug for ProcessTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessTable")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
