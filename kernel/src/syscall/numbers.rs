/*!
 * System Call Numbers
 * [ABI] Call number in `v0`, arguments in `a0..a2`
 */

pub const SYS_FORK: u32 = 0;
pub const SYS_EXECV: u32 = 2;
pub const SYS_EXIT: u32 = 3;
pub const SYS_WAITPID: u32 = 4;
pub const SYS_GETPID: u32 = 5;
pub const SYS_GETPPID: u32 = 6;

/// Name of a call, for tracing
pub fn syscall_name(number: u32) -> &'static str {
    match number {
        SYS_FORK => "fork",
        SYS_EXECV => "execv",
        SYS_EXIT => "_exit",
        SYS_WAITPID => "waitpid",
        SYS_GETPID => "getpid",
        SYS_GETPPID => "getppid",
        _ => "unknown",
    }
}
