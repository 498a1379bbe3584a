/*!
 * Process Records
 *
 * One record per process. The mutable part (lifecycle, parent link, children)
 * lives behind the record's own lock; the condition variable is signalled when
 * the process terminates.
 *
 * # Ownership
 *
 * A record is owned either by its parent's `children` list or, for the first
 * user process and for orphans, by the process table. The child → parent link
 * is a `Weak` that is only consulted under the child's lock. Locks are taken
 * parent → child, never the other way round.
 *
 * The address space sits behind a separate lock that only the process's own
 * context touches, so a parent waiting on the record never contends with the
 * child's memory traffic.
 */

use super::status::WaitStatus;
use super::types::{Lifecycle, ProcessInfo};
use crate::core::types::Pid;
use crate::memory::AddressSpace;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// Mutable record state, guarded by the record lock
#[derive(Debug)]
pub(crate) struct RecordState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) parent: Option<Weak<ProcessRecord>>,
    pub(crate) children: Vec<Arc<ProcessRecord>>,
}

impl RecordState {
    /// Live parent, if the link is present and the parent still exists
    pub(crate) fn live_parent(&self) -> Option<Arc<ProcessRecord>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn child_index(&self, pid: Pid) -> Option<usize> {
        self.children.iter().position(|c| c.pid() == pid)
    }

    pub(crate) fn remove_child(&mut self, child: &Arc<ProcessRecord>) -> Option<Arc<ProcessRecord>> {
        let index = self.children.iter().position(|c| Arc::ptr_eq(c, child))?;
        Some(self.children.remove(index))
    }
}

/// A process
pub struct ProcessRecord {
    pid: Pid,
    name: String,
    state: Mutex<RecordState>,
    exited: Condvar,
    address_space: Mutex<Option<AddressSpace>>,
}

impl ProcessRecord {
    pub(crate) fn new(pid: Pid, name: String, parent: Option<&Arc<ProcessRecord>>) -> Self {
        Self {
            pid,
            name,
            state: Mutex::new(RecordState {
                lifecycle: Lifecycle::Running,
                parent: parent.map(Arc::downgrade),
                children: Vec::new(),
            }),
            exited: Condvar::new(),
            address_space: Mutex::new(None),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, RecordState> {
        self.state.lock()
    }

    /// Block until the record is no longer running
    ///
    /// `guard` must be this record's lock.
    pub(crate) fn wait_terminated(&self, guard: &mut MutexGuard<'_, RecordState>) {
        while guard.lifecycle.is_running() {
            self.exited.wait(guard);
        }
    }

    /// Publish termination; the caller holds this record's lock
    pub(crate) fn publish_exit(&self, state: &mut RecordState, status: WaitStatus) {
        assert!(
            state.lifecycle.is_running(),
            "process {} terminated twice",
            self.pid
        );
        state.lifecycle = Lifecycle::Zombie(status);
        self.exited.notify_all();
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    /// Parent pid while the parent link is live
    pub fn parent_pid(&self) -> Option<Pid> {
        self.lock().live_parent().map(|p| p.pid())
    }

    pub fn info(&self) -> ProcessInfo {
        let state = self.lock();
        ProcessInfo {
            pid: self.pid,
            name: self.name.clone(),
            lifecycle: state.lifecycle,
            parent: state.live_parent().map(|p| p.pid()),
            children: state.children.iter().map(|c| c.pid()).collect(),
            has_address_space: self.address_space.lock().is_some(),
        }
    }

    /// Install `space`, returning the previous one
    pub(crate) fn install_space(&self, space: AddressSpace) -> Option<AddressSpace> {
        self.address_space.lock().replace(space)
    }

    pub(crate) fn take_space(&self) -> Option<AddressSpace> {
        self.address_space.lock().take()
    }

    /// Run `f` on the installed address space
    pub(crate) fn with_space<R>(&self, f: impl FnOnce(&mut AddressSpace) -> R) -> Option<R> {
        self.address_space.lock().as_mut().map(f)
    }

    pub fn has_address_space(&self) -> bool {
        self.address_space.lock().is_some()
    }
}

impl std::fmt::Debug for ProcessRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
