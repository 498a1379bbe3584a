/*!
 * Core Types
 * Common types used across the kernel
 */

/// Process ID type
pub type Pid = u32;

/// User virtual address
///
/// User pointers are 32 bits wide in memory (see [`crate::core::limits::USER_PTR_SIZE`]);
/// every user address fits below [`crate::core::limits::USERSPACE_TOP`].
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Scheduling hint handed to the execution substrate (0-255, higher is more important)
pub type Priority = u8;

/// Exit code passed to `_exit`
pub type ExitCode = i32;

/// Kernel error number as seen by user mode
pub type Errno = i32;
