//! Debug-trace facade.
//!
//! [`DebugFacade`] owns the backend (resolved lazily, once) and the
//! facade-wide settings; [`DebugContext`] adds a per-worker indent level.
//! The `dbg_*` macros go through a thread-local context bound to the
//! process-wide facade and compile to nothing unless [`ENABLED`].

mod assert;
mod backend;
mod facade;
mod indent;

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

pub use assert::{
    default_failure_hook, default_trace_capture, AssertionFailure, FailureHook, TraceCapture,
};
pub use backend::{
    BackendFactory, BackendKind, CaptureBuffer, DebugBackend, MinimalBackend, WriterFactory,
};
pub use facade::{DebugContext, DebugFacade, DebugFacadeBuilder, DEFAULT_INDENT_SIZE};
pub use indent::IndentState;

/// `tracing` target for facade diagnostics and forwarded debug lines.
pub const TRACE_TARGET: &str = "diagkit::debug";

/// Whether the `dbg_*` macros do anything in this build.
pub const ENABLED: bool = cfg!(any(debug_assertions, feature = "always-debug"));

static GLOBAL: OnceLock<Arc<DebugFacade>> = OnceLock::new();

thread_local! {
    static CONTEXT: RefCell<Option<DebugContext>> = const { RefCell::new(None) };
}

/// Installs the process-wide facade. Fails with the given facade if one is already set.
pub fn install(facade: Arc<DebugFacade>) -> Result<(), Arc<DebugFacade>> {
    GLOBAL.set(facade)
}

/// The process-wide facade; a default one (minimal backend on stderr) is
/// installed on first use if nobody called [`install`].
pub fn global() -> &'static Arc<DebugFacade> {
    GLOBAL.get_or_init(|| DebugFacade::builder().build())
}

/// Flushes the process-wide backend. Safe to call more than once.
pub fn shutdown() {
    if let Some(facade) = GLOBAL.get() {
        facade.flush();
    }
}

/// Runs `f` with this thread's context on the global facade.
///
/// Re-entrant calls (e.g. from a failure hook) and calls during thread
/// teardown get a fresh context at indent level 0.
pub fn with_context<R>(f: impl FnOnce(&mut DebugContext) -> R) -> R {
    let mut f = Some(f);
    let result = CONTEXT.try_with(|cell| {
        let Ok(mut slot) = cell.try_borrow_mut() else {
            return None;
        };
        let ctx = slot.get_or_insert_with(|| global().context());
        f.take().map(|f| f(ctx))
    });
    match (result, f) {
        (Ok(Some(r)), _) => r,
        (_, Some(f)) => f(&mut global().context()),
        (_, None) => unreachable!("context closure consumed without a result"),
    }
}

#[macro_export]
macro_rules! dbg_write {
    ($($arg:tt)*) => {
        if $crate::debug::ENABLED {
            $crate::debug::with_context(|ctx| ctx.write(&::std::format!($($arg)*)));
        }
    };
}

#[macro_export]
macro_rules! dbg_writeln {
    () => {
        if $crate::debug::ENABLED {
            $crate::debug::with_context(|ctx| ctx.write_line(""));
        }
    };
    ($($arg:tt)*) => {
        if $crate::debug::ENABLED {
            $crate::debug::with_context(|ctx| ctx.write_line(&::std::format!($($arg)*)));
        }
    };
}

#[macro_export]
macro_rules! dbg_assert {
    ($cond:expr $(,)?) => {
        if $crate::debug::ENABLED {
            let cond: bool = $cond;
            if !cond {
                $crate::debug::with_context(|ctx| ctx.assert(false, "", ""));
            }
        }
    };
    ($cond:expr, $msg:expr $(,)?) => {
        if $crate::debug::ENABLED {
            let cond: bool = $cond;
            if !cond {
                let msg = $msg;
                $crate::debug::with_context(|ctx| {
                    ctx.assert(false, ::std::convert::AsRef::<str>::as_ref(&msg), "")
                });
            }
        }
    };
    ($cond:expr, $msg:expr, $($detail:tt)+) => {
        if $crate::debug::ENABLED {
            let cond: bool = $cond;
            if !cond {
                let msg = $msg;
                let detail = ::std::format!($($detail)+);
                $crate::debug::with_context(|ctx| {
                    ctx.assert(false, ::std::convert::AsRef::<str>::as_ref(&msg), &detail)
                });
            }
        }
    };
}

#[macro_export]
macro_rules! dbg_fail {
    ($msg:expr $(,)?) => {
        $crate::dbg_assert!(false, $msg)
    };
    ($msg:expr, $($detail:tt)+) => {
        $crate::dbg_assert!(false, $msg, $($detail)+)
    };
}

#[macro_export]
macro_rules! dbg_indent {
    () => {
        if $crate::debug::ENABLED {
            $crate::debug::with_context(|ctx| ctx.indent());
        }
    };
}

#[macro_export]
macro_rules! dbg_unindent {
    () => {
        if $crate::debug::ENABLED {
            $crate::debug::with_context(|ctx| ctx.unindent());
        }
    };
}
