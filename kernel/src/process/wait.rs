/*!
 * Process Wait
 * Blocking reap of a specific direct child
 */

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::USER_PTR_SIZE;
use crate::core::types::{Address, Pid};
use crate::memory::copyout_word;
use crate::thread::UserThread;
use tracing::{info, instrument, Span};

/// `waitpid(pid, status, options)`
///
/// A `status` of 0 discards the exit status. No options are supported.
#[instrument(skip(thread), fields(pid))]
pub fn sys_waitpid(
    thread: &mut UserThread,
    child_pid: Pid,
    status: Address,
    options: i32,
) -> ProcessResult<Pid> {
    let record = thread.current();
    Span::current().record("pid", record.pid());

    if options != 0 {
        return Err(ProcessError::InvalidArgument(format!(
            "unsupported waitpid options 0x{:x}",
            options
        )));
    }
    if status != 0 && !thread.with_space(|space| space.is_writable(status, USER_PTR_SIZE)) {
        return Err(ProcessError::Fault(status));
    }

    let child = {
        let state = record.lock();
        state
            .child_index(child_pid)
            .map(|i| state.children[i].clone())
    }
    .ok_or(ProcessError::NoChild(child_pid))?;

    let exit_status = {
        let mut child_state = child.lock();
        child.wait_terminated(&mut child_state);
        match child_state.lifecycle.exit_status() {
            Some(exit_status) => exit_status,
            None => panic!("reaping process {} in state {:?}", child_pid, child_state.lifecycle),
        }
    };

    record.lock().remove_child(&child);
    thread.kernel().table().destroy(child);
    info!(parent = record.pid(), child = child_pid, status = %exit_status, "child reaped");

    if status != 0 {
        thread.with_space(|space| copyout_word(space, status, exit_status.raw() as u32))?;
    }
    Ok(child_pid)
}
