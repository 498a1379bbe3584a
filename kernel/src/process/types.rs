/*!
 * Process Types
 * Common types for process lifecycle management
 */

use super::status::WaitStatus;
use crate::core::types::Pid;
use serde::{Deserialize, Serialize};

pub use crate::core::errors::{ProcessError, ProcessResult};

/// Lifecycle of a process record
///
/// Always `Running → Zombie → Destroyed`. A record that never ran is marked a
/// zombie killed by `SIGKILL` before it is destroyed, and a record nobody can
/// reap passes through `Zombie` on its way out of exit. No transition
/// reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "status", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Executing (or about to)
    Running,
    /// Terminated; status kept until the record is reaped
    Zombie(WaitStatus),
    /// Record reclaimed; only reachable through stale handles
    Destroyed,
}

impl Lifecycle {
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running)
    }

    /// Published exit status, once terminated
    #[inline]
    pub fn exit_status(&self) -> Option<WaitStatus> {
        match self {
            Lifecycle::Zombie(status) => Some(*status),
            _ => None,
        }
    }
}

/// Snapshot of a process record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub lifecycle: Lifecycle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Pid>,
    pub children: Vec<Pid>,
    pub has_address_space: bool,
}
