/*!
 * Trap Frames
 * Register snapshot saved on entry to the kernel
 */

use crate::core::types::Errno;
use serde::{Deserialize, Serialize};

/// Size of the system-call instruction; `epc` is advanced past it on return
pub const SYSCALL_INSN_SIZE: u32 = 4;

/// MIPS-style user register state
///
/// Only the registers the system-call convention touches are modelled:
/// the call number arrives in `v0`, arguments in `a0..a2`; the result leaves
/// in `v0` with `a3` as the error flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapFrame {
    pub v0: u32,
    pub v1: u32,
    pub a0: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
    pub sp: u32,
    pub epc: u32,
}

impl TrapFrame {
    /// Store a system-call result and step past the trapping instruction
    pub fn complete(&mut self, result: Result<u32, Errno>) {
        match result {
            Ok(value) => {
                self.v0 = value;
                self.a3 = 0;
            }
            Err(errno) => {
                self.v0 = errno as u32;
                self.a3 = 1;
            }
        }
        self.epc = self.epc.wrapping_add(SYSCALL_INSN_SIZE);
    }

    /// Result of the last completed system call
    pub fn result(&self) -> Result<u32, Errno> {
        if self.a3 == 0 {
            Ok(self.v0)
        } else {
            Err(self.v0 as Errno)
        }
    }
}
