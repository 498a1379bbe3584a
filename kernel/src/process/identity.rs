/*!
 * Process Identity
 * getpid and getppid
 */

use crate::core::types::Pid;
use crate::thread::UserThread;

/// `getpid()`
pub fn sys_getpid(thread: &UserThread) -> Pid {
    thread.current().pid()
}

/// `getppid()`; 0 once the parent has exited
pub fn sys_getppid(thread: &UserThread) -> Pid {
    thread.current().parent_pid().unwrap_or(0)
}
