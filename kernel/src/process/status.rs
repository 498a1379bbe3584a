/*!
 * Wait Status
 * Encoded termination status as returned to user mode by waitpid
 */

use crate::core::types::ExitCode;
use serde::{Deserialize, Serialize};

/// How a process stopped running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    Exited,
    Signaled,
    CoreDumped,
    Stopped,
}

/// Wait status word
///
/// [ABI] The low two bits hold the kind, the remaining bits the exit code or
/// signal number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitStatus(i32);

impl WaitStatus {
    const KIND_BITS: i32 = 2;
    const KIND_MASK: i32 = 0b11;

    /// Normal termination through `_exit(code)`
    pub const fn exited(code: ExitCode) -> Self {
        Self(code << Self::KIND_BITS)
    }

    /// Termination by the kernel on behalf of signal `signal`
    pub const fn signaled(signal: i32) -> Self {
        Self((signal << Self::KIND_BITS) | 1)
    }

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn kind(self) -> WaitKind {
        match self.0 & Self::KIND_MASK {
            0 => WaitKind::Exited,
            1 => WaitKind::Signaled,
            2 => WaitKind::CoreDumped,
            _ => WaitKind::Stopped,
        }
    }

    /// Exit code, for normal termination
    pub const fn exit_code(self) -> Option<ExitCode> {
        match self.kind() {
            WaitKind::Exited => Some(self.0 >> Self::KIND_BITS),
            _ => None,
        }
    }

    /// Terminating signal, for abnormal termination
    pub const fn term_signal(self) -> Option<i32> {
        match self.kind() {
            WaitKind::Signaled | WaitKind::CoreDumped => Some(self.0 >> Self::KIND_BITS),
            _ => None,
        }
    }
}

impl std::fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            WaitKind::Exited => write!(f, "exited({})", self.0 >> Self::KIND_BITS),
            WaitKind::Signaled => write!(f, "signaled({})", self.0 >> Self::KIND_BITS),
            WaitKind::CoreDumped => write!(f, "core_dumped({})", self.0 >> Self::KIND_BITS),
            WaitKind::Stopped => write!(f, "stopped({})", self.0 >> Self::KIND_BITS),
        }
    }
}
