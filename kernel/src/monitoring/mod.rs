/*!
 * Monitoring
 * Structured tracing for system calls and process lifecycle events
 */

mod tracer;

pub use tracer::{init_tracing, next_trace_id, SyscallSpan};
