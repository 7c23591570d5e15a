use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::assert::{
    capture_trace, default_failure_hook, default_trace_capture, format_banner, AssertionFailure,
    FailureHook, TraceCapture,
};
use super::backend::{BackendFactory, DebugBackend, MinimalBackend, WriterFactory};
use super::indent::{clamp_non_negative, IndentState};
use super::TRACE_TARGET;

pub const DEFAULT_INDENT_SIZE: usize = 4;

/// Shared state behind the debug facade: the lazily resolved backend, the
/// indent size and the failure hook.
pub struct DebugFacade {
    backend: OnceLock<Arc<dyn DebugBackend>>,
    plugin: Option<BackendFactory>,
    minimal_writer: WriterFactory,
    indent_size: AtomicUsize,
    failure_hook: RwLock<FailureHook>,
    trace_capture: TraceCapture,
}

pub struct DebugFacadeBuilder {
    plugin: Option<BackendFactory>,
    minimal_writer: Option<WriterFactory>,
    indent_size: usize,
    failure_hook: Option<FailureHook>,
    trace_capture: Option<TraceCapture>,
}

impl Default for DebugFacadeBuilder {
    fn default() -> Self {
        Self {
            plugin: None,
            minimal_writer: None,
            indent_size: DEFAULT_INDENT_SIZE,
            failure_hook: None,
            trace_capture: None,
        }
    }
}

impl DebugFacadeBuilder {
    /// Registers the plugin backend factory tried on first use.
    pub fn plugin<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn DebugBackend>> + Send + Sync + 'static,
    {
        self.plugin = Some(Arc::new(factory));
        self
    }

    /// Where the minimal backend writes. Defaults to stderr.
    pub fn minimal_writer<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Write + Send> + Send + Sync + 'static,
    {
        self.minimal_writer = Some(Arc::new(factory));
        self
    }

    pub fn indent_size(mut self, size: usize) -> Self {
        self.indent_size = size;
        self
    }

    pub fn failure_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&AssertionFailure) + Send + Sync + 'static,
    {
        self.failure_hook = Some(Arc::new(hook));
        self
    }

    pub fn trace_capture<F>(mut self, capture: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.trace_capture = Some(Arc::new(capture));
        self
    }

    pub fn build(self) -> Arc<DebugFacade> {
        Arc::new(DebugFacade {
            backend: OnceLock::new(),
            plugin: self.plugin,
            minimal_writer: self.minimal_writer.unwrap_or_else(|| {
                Arc::new(|| Box::new(std::io::stderr()) as Box<dyn Write + Send>)
            }),
            indent_size: AtomicUsize::new(self.indent_size),
            failure_hook: RwLock::new(self.failure_hook.unwrap_or_else(default_failure_hook)),
            trace_capture: self.trace_capture.unwrap_or_else(default_trace_capture),
        })
    }
}

impl DebugFacade {
    pub fn builder() -> DebugFacadeBuilder {
        DebugFacadeBuilder::default()
    }

    /// A new context with its own indent level, sharing this facade.
    pub fn context(self: &Arc<Self>) -> DebugContext {
        DebugContext {
            facade: self.clone(),
            indent: IndentState::default(),
        }
    }

    /// Resolves the backend on first use.
    ///
    /// Concurrent first callers may each build a candidate; the first one
    /// stored wins and the others are dropped.
    pub fn backend(&self) -> &Arc<dyn DebugBackend> {
        if let Some(backend) = self.backend.get() {
            return backend;
        }

        let candidate = self.construct_backend();
        let kind = candidate.kind();
        match self.backend.set(candidate) {
            Ok(()) => tracing::debug!(target: TRACE_TARGET, ?kind, "debug backend resolved"),
            Err(_redundant) => {
                tracing::trace!(target: TRACE_TARGET, "discarding redundant debug backend")
            }
        }
        self.backend.get_or_init(|| {
            Arc::new(MinimalBackend::new((self.minimal_writer)())) as Arc<dyn DebugBackend>
        })
    }

    fn construct_backend(&self) -> Arc<dyn DebugBackend> {
        if let Some(factory) = self.plugin.as_ref() {
            match panic::catch_unwind(AssertUnwindSafe(|| factory())) {
                Ok(Ok(backend)) => return backend,
                Ok(Err(e)) => tracing::debug!(
                    target: TRACE_TARGET,
                    error = %e,
                    "plugin backend unavailable, using minimal backend"
                ),
                Err(_) => tracing::debug!(
                    target: TRACE_TARGET,
                    "plugin backend factory panicked, using minimal backend"
                ),
            }
        }
        Arc::new(MinimalBackend::new((self.minimal_writer)()))
    }

    pub fn indent_size(&self) -> usize {
        self.indent_size.load(Ordering::Relaxed)
    }

    /// Negative sizes clamp to zero.
    pub fn set_indent_size(&self, size: i64) {
        self.indent_size
            .store(clamp_non_negative(size), Ordering::Relaxed);
    }

    pub fn set_failure_hook<F>(&self, hook: F)
    where
        F: Fn(&AssertionFailure) + Send + Sync + 'static,
    {
        *self
            .failure_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(hook);
    }

    pub fn reset_failure_hook(&self) {
        *self
            .failure_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = default_failure_hook();
    }

    fn failure_hook(&self) -> FailureHook {
        self.failure_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Flushes the backend if one was resolved; never forces resolution.
    pub fn flush(&self) {
        if let Some(backend) = self.backend.get() {
            backend.flush();
        }
    }
}

/// Per-worker view of a [`DebugFacade`] carrying its own indent level.
pub struct DebugContext {
    facade: Arc<DebugFacade>,
    indent: IndentState,
}

impl DebugContext {
    pub fn facade(&self) -> &Arc<DebugFacade> {
        &self.facade
    }

    pub fn write(&mut self, message: &str) {
        let size = self.facade.indent_size();
        let indent = self.indent.indent_string(size);
        self.facade.backend().write(indent, message);
    }

    pub fn write_line(&mut self, message: &str) {
        let size = self.facade.indent_size();
        let indent = self.indent.indent_string(size);
        self.facade.backend().write_line(indent, message);
    }

    pub fn write_if(&mut self, condition: bool, message: &str) {
        if condition {
            self.write(message);
        }
    }

    pub fn write_line_if(&mut self, condition: bool, message: &str) {
        if condition {
            self.write_line(message);
        }
    }

    pub fn assert(&mut self, condition: bool, message: &str, detail: &str) {
        if condition {
            return;
        }
        let failure = AssertionFailure {
            message: message.to_string(),
            detail: detail.to_string(),
            stack_trace: capture_trace(&self.facade.trace_capture),
        };
        self.write_line(&format_banner(&failure));

        // Cloned out of the lock so a hook may replace itself.
        let hook = self.facade.failure_hook();
        hook(&failure);
    }

    pub fn fail(&mut self, message: &str, detail: &str) {
        self.assert(false, message, detail);
    }

    pub fn indent(&mut self) {
        self.indent.increment();
    }

    pub fn unindent(&mut self) {
        self.indent.decrement();
    }

    pub fn indent_level(&self) -> usize {
        self.indent.level()
    }

    /// Negative levels clamp to zero.
    pub fn set_indent_level(&mut self, level: i64) {
        self.indent.set_level(level);
    }

    pub fn indent_size(&self) -> usize {
        self.facade.indent_size()
    }

    pub fn set_indent_size(&self, size: i64) {
        self.facade.set_indent_size(size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::backend::{BackendKind, CaptureBuffer};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};

    fn captured() -> (Arc<DebugFacade>, CaptureBuffer) {
        let buf = CaptureBuffer::new();
        let writer = buf.clone();
        let facade = DebugFacade::builder()
            .minimal_writer(move || Box::new(writer.clone()))
            .trace_capture(|| "  at test_frame".to_string())
            .failure_hook(|_| {})
            .build();
        (facade, buf)
    }

    #[test]
    fn passing_assert_is_silent() {
        let (facade, buf) = captured();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        facade.set_failure_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut ctx = facade.context();
        for msg in ["", "m", "ünïcode"] {
            ctx.assert(true, msg, msg);
        }

        assert_eq!(buf.contents(), "");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_assert_writes_one_banner_and_calls_hook_once() {
        let (facade, buf) = captured();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        facade.set_failure_hook(move |f| sink.lock().unwrap().push(f.clone()));

        facade.context().assert(false, "m", "d");

        let out = buf.contents();
        assert_eq!(out.matches("DEBUG ASSERTION FAILED").count(), 1);
        assert!(out.contains("\nm\n"));
        assert!(out.contains("\nd\n"));
        assert!(out.contains("at test_frame"));
        assert!(out.ends_with('\n'));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "m");
        assert_eq!(seen[0].detail, "d");
    }

    #[test]
    fn failing_assert_survives_panicking_trace_capture() {
        let buf = CaptureBuffer::new();
        let writer = buf.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let facade = DebugFacade::builder()
            .minimal_writer(move || Box::new(writer.clone()))
            .trace_capture(|| panic!("capture exploded"))
            .failure_hook(move |f| {
                assert!(f.stack_trace.is_empty());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        facade.context().fail("m", "d");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let out = buf.contents();
        assert!(out.contains("\nm\n"));
        assert!(out.ends_with("---- Assert Long Message ----\nd\n"));
    }

    #[test]
    fn writes_carry_context_indent() {
        let (facade, buf) = captured();
        facade.set_indent_size(2);
        let mut ctx = facade.context();

        ctx.write_line("top");
        ctx.indent();
        ctx.write("nested ");
        ctx.write_line("line");
        ctx.unindent();
        ctx.unindent();
        ctx.write_line_if(false, "hidden");
        ctx.write_line("back");

        assert_eq!(buf.contents(), "top\n  nested line\nback\n");
    }

    #[test]
    fn contexts_have_independent_levels() {
        let (facade, _buf) = captured();
        let mut a = facade.context();
        let b = facade.context();
        a.indent();
        a.indent();
        assert_eq!(a.indent_level(), 2);
        assert_eq!(b.indent_level(), 0);
        a.set_indent_level(-3);
        assert_eq!(a.indent_level(), 0);
    }

    #[test]
    fn indent_size_clamps() {
        let (facade, _buf) = captured();
        facade.set_indent_size(-1);
        assert_eq!(facade.indent_size(), 0);
        facade.set_indent_size(8);
        assert_eq!(facade.context().indent_size(), 8);
    }

    #[test]
    fn failing_plugin_falls_back_to_minimal() {
        let facade = DebugFacade::builder()
            .plugin(|| Err(anyhow::anyhow!("not installed")))
            .minimal_writer(|| Box::new(std::io::sink()))
            .build();
        assert_eq!(facade.backend().kind(), BackendKind::Minimal);
    }

    #[test]
    fn panicking_plugin_falls_back_to_minimal() {
        let facade = DebugFacade::builder()
            .plugin(|| panic!("bad plugin"))
            .minimal_writer(|| Box::new(std::io::sink()))
            .build();
        assert_eq!(facade.backend().kind(), BackendKind::Minimal);
    }

    struct CountingPlugin;

    impl DebugBackend for CountingPlugin {
        fn write(&self, _indent: &str, _message: &str) {}
    }

    #[test]
    fn concurrent_first_resolution_observes_one_instance() {
        const THREADS: usize = 16;
        let constructed = Arc::new(AtomicUsize::new(0));
        let counter = constructed.clone();
        let facade = DebugFacade::builder()
            .plugin(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::yield_now();
                Ok(Arc::new(CountingPlugin) as Arc<dyn DebugBackend>)
            })
            .build();

        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let facade = facade.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    facade.backend().clone()
                })
            })
            .collect();
        let observed: Vec<Arc<dyn DebugBackend>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winner = facade.backend();
        assert_eq!(winner.kind(), BackendKind::Plugin);
        assert!(observed.iter().all(|b| Arc::ptr_eq(b, winner)));
        assert!(constructed.load(Ordering::SeqCst) >= 1);

        // Resolved once; later calls do not construct again.
        let before = constructed.load(Ordering::SeqCst);
        let _ = facade.backend();
        assert_eq!(constructed.load(Ordering::SeqCst), before);
    }
}
