/*!
 * ID Generation System
 * Bounded process-ID allocation with recycling support
 */

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{PID_MAX, PID_MIN};
use crate::core::types::Pid;
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// PID Allocator
// ============================================================================

/// PID allocator with recycling support
///
/// Hands out fresh PIDs from an atomic counter until the configured ceiling is
/// reached, then only recycled PIDs. A PID is recycled when its process record
/// is destroyed, never earlier, so no two existing records share an identity.
///
/// # Performance
/// - Lock-free recycling via `SegQueue` (FIFO, so recently freed PIDs are reused last)
/// - Lock-free fresh allocation via `fetch_update`
pub struct PidAllocator {
    next: AtomicU32,
    ceiling: Pid,
    free_list: SegQueue<Pid>,
}

impl PidAllocator {
    /// Create an allocator that supports at most `max_processes` live PIDs
    pub fn new(max_processes: usize) -> Self {
        let span = max_processes.clamp(1, (PID_MAX - PID_MIN + 1) as usize) as Pid;
        Self {
            next: AtomicU32::new(PID_MIN),
            ceiling: PID_MIN + span - 1,
            free_list: SegQueue::new(),
        }
    }

    /// Allocate a PID, preferring recycled ones
    pub fn allocate(&self) -> ProcessResult<Pid> {
        if let Some(pid) = self.free_list.pop() {
            return Ok(pid);
        }

        let ceiling = self.ceiling;
        self.next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= ceiling).then_some(next + 1)
            })
            .or_else(|_| {
                // A PID may have been recycled while the counter was being checked
                self.free_list.pop().ok_or(ProcessError::TooManyProcesses {
                    limit: self.capacity(),
                })
            })
    }

    /// Return a PID to the pool
    #[inline]
    pub fn recycle(&self, pid: Pid) {
        debug_assert!((PID_MIN..=self.ceiling).contains(&pid));
        self.free_list.push(pid);
    }

    /// Number of PIDs this allocator can have outstanding at once
    #[inline]
    pub fn capacity(&self) -> usize {
        (self.ceiling - PID_MIN + 1) as usize
    }
}

// ============================================================================
// Tests
// ============================================================================
