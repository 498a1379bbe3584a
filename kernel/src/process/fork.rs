/*!
 * Process Fork
 * Duplicate the calling process; the child resumes in the same code with 0
 */

use super::table::ProcessTable;
use crate::core::errors::ProcessResult;
use crate::core::limits::FORK_PRIORITY_HINT;
use crate::core::types::Pid;
use crate::thread::usermode::enter_forked_process;
use crate::thread::{TrapFrame, UserThread};
use std::sync::Arc;
use tracing::{info, instrument, warn, Span};

/// `fork()`
///
/// `tf` is the caller's trap frame at the system call; the child starts on a
/// copy of it.
#[instrument(skip(thread, tf), fields(pid, child))]
pub fn sys_fork(thread: &mut UserThread, tf: &TrapFrame) -> ProcessResult<Pid> {
    let parent = thread.current();
    let kernel = thread.kernel().clone();
    let child_frame = *tf;
    Span::current().record("pid", parent.pid());

    let child = kernel.table().create(parent.name(), Some(&parent))?;
    let child_pid = child.pid();
    Span::current().record("child", child_pid);

    let space = match thread.with_space(|space| space.copy()) {
        Ok(space) => space,
        Err(e) => {
            warn!(pid = parent.pid(), error = %e, "address space copy failed");
            kernel.table().abandon(child);
            return Err(e.into());
        }
    };
    child.install_space(space);
    ProcessTable::link(&parent, Arc::clone(&child));

    let entry_kernel = kernel.clone();
    let entry_child = Arc::clone(&child);
    let spawned = kernel.substrate().spawn(
        &format!("{}[{}]", child.name(), child_pid),
        FORK_PRIORITY_HINT,
        Box::new(move || enter_forked_process(entry_kernel, entry_child, child_frame)),
    );

    if let Err(e) = spawned {
        warn!(pid = parent.pid(), child = child_pid, error = %e, "child context could not start");
        parent.lock().remove_child(&child);
        kernel.table().abandon(child);
        return Err(e);
    }

    info!(pid = parent.pid(), child = child_pid, "forked");
    Ok(child_pid)
}
