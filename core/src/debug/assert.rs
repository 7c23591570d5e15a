use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::TRACE_TARGET;

/// What a failure hook gets to see about a failed assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub message: String,
    pub detail: String,
    pub stack_trace: String,
}

pub type FailureHook = Arc<dyn Fn(&AssertionFailure) + Send + Sync>;

pub type TraceCapture = Arc<dyn Fn() -> String + Send + Sync>;

pub fn default_failure_hook() -> FailureHook {
    Arc::new(|failure: &AssertionFailure| {
        tracing::error!(
            target: TRACE_TARGET,
            message = %failure.message,
            detail = %failure.detail,
            "debug assertion failed"
        );
    })
}

pub fn default_trace_capture() -> TraceCapture {
    Arc::new(|| Backtrace::force_capture().to_string())
}

/// Runs `capture`, turning a panic inside it into an empty trace.
pub(crate) fn capture_trace(capture: &TraceCapture) -> String {
    panic::catch_unwind(AssertUnwindSafe(|| capture())).unwrap_or_else(|_| {
        tracing::trace!(target: TRACE_TARGET, "stack trace capture failed");
        String::new()
    })
}

pub(crate) fn format_banner(failure: &AssertionFailure) -> String {
    let mut out = String::with_capacity(
        128 + failure.message.len() + failure.detail.len() + failure.stack_trace.len(),
    );
    out.push_str("---- DEBUG ASSERTION FAILED ----\n");
    out.push_str("---- Assert Short Message ----\n");
    out.push_str(&failure.message);
    out.push_str("\n---- Assert Long Message ----\n");
    out.push_str(&failure.detail);
    if !failure.stack_trace.is_empty() {
        out.push('\n');
        out.push_str(failure.stack_trace.trim_end());
    }
    out
}
