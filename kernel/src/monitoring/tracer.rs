/*!
 * Tracing
 * Structured tracing for system calls using the tracing crate
 *
 * Features:
 * - Sequential trace IDs for correlating a system call with the lifecycle
 *   events it causes
 * - JSON-formatted logs for structured parsing
 * - Slow-call warnings for calls that are not expected to block
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Calls slower than this are reported, unless they may block
const SLOW_SYSCALL: Duration = Duration::from_millis(10);

static TRACE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing(json: bool) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json, "structured tracing initialized");
    }
    installed
}

/// Next trace ID; unique for the life of the kernel image
pub fn next_trace_id() -> u64 {
    TRACE_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// Span covering one system call from trap to return
pub struct SyscallSpan {
    span: tracing::Span,
    start: Instant,
    syscall: &'static str,
    trace_id: u64,
    may_block: bool,
}

impl SyscallSpan {
    pub fn new(syscall: &'static str, pid: u32, may_block: bool) -> Self {
        let trace_id = next_trace_id();
        let span = span!(
            Level::DEBUG,
            "syscall",
            trace_id,
            syscall,
            pid,
            result = tracing::field::Empty,
            errno = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            syscall,
            trace_id,
            may_block,
        }
    }

    pub fn trace_id(&self) -> u64 {
        self.trace_id
    }

    pub fn record_return(&self, value: u32) {
        self.span.record("result", value);
    }

    pub fn record_errno(&self, errno: i32) {
        self.span.record("errno", errno);
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if !self.may_block && duration > SLOW_SYSCALL {
            warn!(
                trace_id = self.trace_id,
                syscall = self.syscall,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow syscall detected"
            );
        } else {
            debug!(
                trace_id = self.trace_id,
                syscall = self.syscall,
                duration_us = duration.as_micros() as u64,
                "syscall completed"
            );
        }
    }
}
