/*!
 * Frame Pool
 *
 * Fixed-capacity accounting of physical page frames. Address spaces charge the
 * pool when they back pages and return the frames when they are dropped, so
 * running out of frames surfaces as `MemoryError::OutOfMemory` at exactly the
 * operation that needed them (as_create, as_copy, load, stack definition).
 */

use super::types::{FrameStats, MemoryError, MemoryPressure, MemoryResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Shared frame pool handle
///
/// Cloning is cheap; all clones account against the same pool.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<FramePoolInner>,
}

struct FramePoolInner {
    total: usize,
    used: AtomicUsize,
}

impl FramePool {
    /// Create a pool with `total` frames
    pub fn new(total: usize) -> Self {
        Self {
            inner: Arc::new(FramePoolInner {
                total,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// Reserve `count` frames, all or nothing
    pub fn allocate(&self, count: usize) -> MemoryResult<()> {
        let total = self.inner.total;
        let result = self
            .inner
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(count).filter(|&next| next <= total)
            });

        match result {
            Ok(used) => {
                trace!(count, used = used + count, total, "frames allocated");
                let stats = self.stats();
                if stats.memory_pressure() == MemoryPressure::Critical {
                    warn!(pressure = %MemoryPressure::Critical, used = stats.used_frames, total, "frame pool nearly exhausted");
                }
                Ok(())
            }
            Err(used) => Err(MemoryError::OutOfMemory {
                requested: count,
                available: total - used,
                used,
                total,
            }),
        }
    }

    /// Return `count` frames to the pool
    pub fn release(&self, count: usize) {
        let previous = self.inner.used.fetch_sub(count, Ordering::AcqRel);
        assert!(
            previous >= count,
            "frame pool underflow: releasing {count} with {previous} in use"
        );
        trace!(count, used = previous - count, "frames released");
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.inner.total
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.total() - self.used()
    }

    pub fn stats(&self) -> FrameStats {
        let total = self.total();
        let used = self.used();
        FrameStats {
            total_frames: total,
            used_frames: used,
            available_frames: total - used,
            usage_percentage: if total == 0 {
                100.0
            } else {
                used as f64 / total as f64 * 100.0
            },
        }
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("total", &self.total())
            .field("used", &self.used())
            .finish()
    }
}
