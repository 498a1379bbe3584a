/*!
 * Process Module
 * Process records and the fork / exec / exit / waitpid lifecycle
 */

pub mod argv;
pub mod exec;
pub mod exit;
pub mod fork;
pub mod identity;
pub mod record;
pub mod status;
pub mod table;
pub mod types;
pub mod wait;

// Re-export for convenience
pub use argv::ArgvLayout;
pub use exec::{sys_execv, Launch};
pub use exit::sys_exit;
pub use fork::sys_fork;
pub use identity::{sys_getpid, sys_getppid};
pub use record::ProcessRecord;
pub use status::{WaitKind, WaitStatus};
pub use table::{ProcessTable, TableStats};
pub use types::{Lifecycle, ProcessInfo};
pub use wait::sys_waitpid;
