use std::sync::{Mutex, MutexGuard, PoisonError};

use diagkit_core::debug::{DebugBackend, TRACE_TARGET};

/// Debug backend that turns each completed line into a `tracing` event.
///
/// Partial writes are buffered until a newline arrives (or [`flush`] is
/// called), so one logical line is one event.
///
/// [`flush`]: DebugBackend::flush
#[derive(Default)]
pub struct TracingDebugBackend {
    pending: Mutex<String>,
}

impl TracingDebugBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn append(pending: &mut String, indent: &str, message: &str) {
    for piece in message.split_inclusive('\n') {
        if pending.is_empty() {
            pending.push_str(indent);
        }
        match piece.strip_suffix('\n') {
            Some(body) => {
                pending.push_str(body.strip_suffix('\r').unwrap_or(body));
                emit(pending);
                pending.clear();
            }
            None => pending.push_str(piece),
        }
    }
}

impl DebugBackend for TracingDebugBackend {
    fn write(&self, indent: &str, message: &str) {
        if message.is_empty() {
            return;
        }
        append(&mut self.pending(), indent, message);
    }

    fn write_line(&self, indent: &str, message: &str) {
        let mut pending = self.pending();
        append(&mut pending, indent, message);
        if pending.is_empty() {
            pending.push_str(indent);
        }
        emit(&pending);
        pending.clear();
    }

    fn flush(&self) {
        let mut pending = self.pending();
        if !pending.is_empty() {
            emit(&pending);
            pending.clear();
        }
    }
}

fn emit(line: &str) {
    tracing::debug!(target: TRACE_TARGET, "{line}");
}
