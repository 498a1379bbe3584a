/*!
 * System Limits and Constants
 *
 * Centralized location for all system-wide limits, thresholds, and magic numbers.
 * Organized by domain for maintainability and discoverability.
 *
 * ## Conventions
 * - Values are grouped by domain (memory, exec, process, syscall ABI)
 * - ABI-visible constants are marked with [ABI]
 */

use crate::core::types::{Address, Pid, Priority};

// =============================================================================
// MEMORY LAYOUT
// =============================================================================

/// Page (and frame) size in bytes
pub const PAGE_SIZE: usize = 4096;

/// First address not available to user mode
/// [ABI] Everything at or above this address belongs to the kernel
pub const USERSPACE_TOP: Address = 0x8000_0000;

/// Initial user stack pointer (the stack grows down from here)
/// [ABI]
pub const USERSTACK: Address = USERSPACE_TOP;

/// Conventional base of the text segment for simple images
pub const USER_TEXT_BASE: Address = 0x0040_0000;

/// Conventional base of the data segment for simple images
pub const USER_DATA_BASE: Address = 0x1000_0000;

/// Default number of physical frames in the frame pool (16MB)
pub const DEFAULT_TOTAL_FRAMES: usize = 4096;

/// Default number of pages in a user stack (96KB)
/// Holds a full ARG_MAX argument block; with smaller stacks exec and
/// run_program refuse argument lists that do not fit with E2BIG
pub const DEFAULT_STACK_PAGES: usize = 24;

/// Frames charged for an empty address space (page-table root)
pub const ADDRESS_SPACE_ROOT_FRAMES: usize = 1;

// =============================================================================
// EXEC LIMITS
// =============================================================================

/// Maximum length of a program path including the terminating NUL
pub const PATH_MAX: usize = 1024;

/// Maximum size of the argument block (strings, NULs and pointer slots)
pub const ARG_MAX: usize = 64 * 1024;

/// Maximum number of argv entries
pub const MAX_ARGC: usize = 4096;

/// Width of a user pointer stored in user memory
/// [ABI] 32-bit user mode, little-endian
pub const USER_PTR_SIZE: usize = 4;

/// Alignment of the stack pointer handed to a new program
/// [ABI]
pub const STACK_ALIGN: usize = 8;

/// Alignment of each argument string on the new stack
/// [ABI]
pub const STRING_ALIGN: usize = 4;

// =============================================================================
// PROCESS LIMITS
// =============================================================================

/// Lowest PID handed to a user process
pub const PID_MIN: Pid = 2;

/// Highest PID the allocator will ever hand out
pub const PID_MAX: Pid = 32767;

/// Default cap on simultaneously existing process records
pub const DEFAULT_MAX_PROCESSES: usize = 256;

/// Priority hint used when starting a forked child
pub const FORK_PRIORITY_HINT: Priority = 15;

/// Priority hint used for the first user program
pub const BOOT_PRIORITY_HINT: Priority = 0;

// =============================================================================
// TERMINATION
// =============================================================================

/// Signal number reported when a process is killed by the kernel
/// (unrecoverable exec failure)
pub const SIGKILL: i32 = 9;

/// Signal number reported when user mode jumps to unmapped code
pub const SIGSEGV: i32 = 11;
