/*!
 * System Call Dispatcher
 *
 * Decodes the call from the trap frame, runs it and writes the result back:
 * `v0` holds the value or errno, `a3` is 0 on success and 1 on failure, and
 * `epc` is advanced past the trapping instruction. Calls that give up the
 * context (`_exit`, a successful `execv`) leave the frame alone.
 */

use super::numbers::*;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::types::Address;
use crate::monitoring::SyscallSpan;
use crate::process::{sys_execv, sys_exit, sys_fork, sys_getpid, sys_getppid, sys_waitpid};
use crate::thread::{ThreadExit, TrapFrame, UserThread};
use tracing::debug;

/// What happens to the calling context after a system call
#[derive(Debug)]
pub enum Trap {
    /// Return to user mode with the result in the trap frame
    Resume,
    /// The calling code is gone; hand the token back to the context entry
    Exit(ThreadExit),
}

/// Handle one system call (syscall)
pub fn dispatch(thread: &mut UserThread, tf: &mut TrapFrame) -> Trap {
    let number = tf.v0;
    let pid = thread.current().pid();
    let span = SyscallSpan::new(syscall_name(number), pid, number == SYS_WAITPID);
    let _entered = span.enter();

    let result: ProcessResult<u32> = match number {
        SYS_FORK => sys_fork(thread, tf),
        SYS_EXECV => match sys_execv(thread, tf.a0 as Address, tf.a1 as Address) {
            Ok(token) => return Trap::Exit(token),
            Err(e) => Err(e),
        },
        SYS_EXIT => return Trap::Exit(sys_exit(thread, tf.a0 as i32)),
        SYS_WAITPID => sys_waitpid(thread, tf.a0, tf.a1 as Address, tf.a2 as i32),
        SYS_GETPID => Ok(sys_getpid(thread)),
        SYS_GETPPID => Ok(sys_getppid(thread)),
        other => Err(ProcessError::NotImplemented(other)),
    };

    match &result {
        Ok(value) => span.record_return(*value),
        Err(e) => {
            span.record_errno(e.errno());
            debug!(pid, syscall = syscall_name(number), error = %e, "system call failed");
        }
    }
    tf.complete(result.map_err(|e| e.errno()));
    Trap::Resume
}
