/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{Address, Errno, Pid};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export collaborator errors so callers can match on them from one place
pub use crate::loader::LoaderError;
pub use crate::memory::MemoryError;

/// Kernel error numbers visible to user mode
pub mod errno {
    use crate::core::types::Errno;

    /// Function not implemented
    pub const ENOSYS: Errno = 1;
    /// Out of memory
    pub const ENOMEM: Errno = 3;
    /// Bad memory reference
    pub const EFAULT: Errno = 6;
    /// String too long
    pub const ENAMETOOLONG: Errno = 7;
    /// Invalid argument
    pub const EINVAL: Errno = 8;
    /// Too many processes in system
    pub const ENPROC: Errno = 12;
    /// File is not executable
    pub const ENOEXEC: Errno = 13;
    /// Argument list too long
    pub const E2BIG: Errno = 14;
    /// No child processes
    pub const ECHILD: Errno = 16;
    /// No such file or directory
    pub const ENOENT: Errno = 19;
}

/// Process operation result
///
/// # Must Use
/// Process operations can fail and must be handled to prevent resource leaks
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process-lifecycle errors with serialization support
///
/// Every variant maps to exactly one [`errno`] value via [`ProcessError::errno`].
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Out of memory: {0}")]
    #[diagnostic(
        code(process::no_memory),
        help("The frame pool is exhausted. Reap zombies or raise KERNEL_FRAMES.")
    )]
    NoMemory(String),

    #[error("Too many processes in system (limit {limit})")]
    #[diagnostic(
        code(process::too_many),
        help("Every PID is held by a live or unreaped process. Wait for children.")
    )]
    TooManyProcesses { limit: usize },

    #[error("Bad user address 0x{0:x}")]
    #[diagnostic(code(process::fault))]
    Fault(Address),

    #[error("String too long (limit {limit} bytes)")]
    #[diagnostic(code(process::name_too_long))]
    NameTooLong { limit: usize },

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(process::invalid_argument))]
    InvalidArgument(String),

    #[error("Not executable: {0}")]
    #[diagnostic(
        code(process::not_executable),
        help("The program image failed validation. Check its segments and entry point.")
    )]
    NotExecutable(String),

    #[error("Argument list too long: {size} bytes (limit {limit})")]
    #[diagnostic(code(process::argument_list_too_long))]
    ArgumentListTooLong { size: usize, limit: usize },

    #[error("Process {0} is not a child of the caller")]
    #[diagnostic(
        code(process::no_child),
        help("Only direct, unreaped children can be waited for.")
    )]
    NoChild(Pid),

    #[error("No such program: {0}")]
    #[diagnostic(code(process::not_found))]
    NotFound(String),

    #[error("System call {0} not implemented")]
    #[diagnostic(code(process::not_implemented))]
    NotImplemented(u32),
}

impl ProcessError {
    /// Error number reported to user mode
    #[must_use]
    pub const fn errno(&self) -> Errno {
        match self {
            Self::NoMemory(_) => errno::ENOMEM,
            Self::TooManyProcesses { .. } => errno::ENPROC,
            Self::Fault(_) => errno::EFAULT,
            Self::NameTooLong { .. } => errno::ENAMETOOLONG,
            Self::InvalidArgument(_) => errno::EINVAL,
            Self::NotExecutable(_) => errno::ENOEXEC,
            Self::ArgumentListTooLong { .. } => errno::E2BIG,
            Self::NoChild(_) => errno::ECHILD,
            Self::NotFound(_) => errno::ENOENT,
            Self::NotImplemented(_) => errno::ENOSYS,
        }
    }
}

// Allow conversion from MemoryError to ProcessError
impl From<MemoryError> for ProcessError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::InvalidAddress(addr) | MemoryError::ProtectionViolation(addr) => {
                ProcessError::Fault(addr)
            }
            other => ProcessError::NoMemory(other.to_string()),
        }
    }
}

impl From<LoaderError> for ProcessError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::NotFound(path) => ProcessError::NotFound(path),
            LoaderError::InvalidImage(reason) => ProcessError::NotExecutable(reason),
            LoaderError::Memory(mem) => mem.into(),
        }
    }
}
