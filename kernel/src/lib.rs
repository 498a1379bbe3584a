/*!
 * Process Lifecycle Kernel Library
 *
 * Hosted teaching-kernel process subsystem: fork, execv, _exit, waitpid,
 * getpid and getppid over simulated address spaces, one OS thread per process.
 */

pub mod config;
pub mod core;
pub mod kernel;
pub mod loader;
pub mod memory;
pub mod monitoring;
pub mod process;
pub mod syscall;
pub mod thread;

// Re-exports
pub use config::KernelConfig;
pub use crate::core::errors::{errno, LoaderError, MemoryError, ProcessError, ProcessResult};
pub use crate::core::types::{Address, Errno, ExitCode, Pid};
pub use kernel::{Kernel, KernelBuilder, KernelStats};
pub use loader::{ProgramImage, ProgramRegistry};
pub use memory::{AddressSpace, FramePool, Protection};
pub use monitoring::init_tracing;
pub use process::{Lifecycle, ProcessInfo, ProcessRecord, WaitKind, WaitStatus};
pub use syscall::Trap;
pub use thread::{ExecutionSubstrate, ThreadExit, ThreadSubstrate, TrapFrame, UserText, UserThread};
