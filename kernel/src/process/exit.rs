/*!
 * Process Exit
 *
 * Termination resolves ownership of the exiting record and of every child it
 * still owns:
 *
 * - zombie children can never be waited for any more and are destroyed here
 * - running children are adopted by the process table and destroy themselves
 *   when they exit
 * - the exiting record itself stays a zombie while its parent can still reap
 *   it, and destroys itself otherwise
 */

use super::record::ProcessRecord;
use super::status::WaitStatus;
use crate::core::types::ExitCode;
use crate::thread::{ThreadExit, UserThread};
use std::sync::Arc;
use tracing::{debug, info, instrument, Span};

/// `_exit(code)`
#[instrument(skip(thread), fields(pid))]
pub fn sys_exit(thread: &mut UserThread, code: ExitCode) -> ThreadExit {
    terminate(thread, WaitStatus::exited(code))
}

/// Terminate the calling process with `status`
pub(crate) fn terminate(thread: &mut UserThread, status: WaitStatus) -> ThreadExit {
    let record = thread.current();
    let pid = record.pid();
    Span::current().record("pid", pid);

    // Clear the slot before destroying so nothing can reach a dying image
    if let Some(mut space) = record.take_space() {
        space.deactivate();
        space.destroy();
    }

    let (reap, self_destruct) = {
        let mut state = record.lock();
        record.publish_exit(&mut state, status);

        let mut reap: Vec<Arc<ProcessRecord>> = Vec::new();
        for child in std::mem::take(&mut state.children) {
            let mut child_state = child.lock();
            if child_state.lifecycle.is_running() {
                child_state.parent = None;
                thread.kernel().table().adopt(Arc::clone(&child));
            } else {
                drop(child_state);
                reap.push(child);
            }
        }

        (reap, state.live_parent().is_none())
    };

    for child in reap {
        debug!(pid, child = child.pid(), "reclaiming unreaped child");
        thread.kernel().table().destroy(child);
    }

    info!(pid, %status, "process exited");

    let kernel = thread.kernel().clone();
    let record = thread.detach().unwrap_or(record);
    if self_destruct {
        drop(kernel.table().release(pid));
        debug!(pid, "no parent left to reap, destroying");
        kernel.table().destroy(record);
    }

    ThreadExit::new()
}
