use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Minimal,
    Plugin,
}

/// Performs the actual I/O behind the debug facade.
///
/// `indent` is the indent string of the calling context; a backend decides
/// where line starts are and prefixes them.
pub trait DebugBackend: Send + Sync {
    fn kind(&self) -> BackendKind {
        BackendKind::Plugin
    }

    fn write(&self, indent: &str, message: &str);

    fn write_line(&self, indent: &str, message: &str) {
        let mut line = String::with_capacity(message.len() + 1);
        line.push_str(message);
        line.push('\n');
        self.write(indent, &line);
    }

    fn flush(&self) {}
}

pub type BackendFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn DebugBackend>> + Send + Sync>;

pub type WriterFactory = Arc<dyn Fn() -> Box<dyn Write + Send> + Send + Sync>;

struct MinimalState {
    out: Box<dyn Write + Send>,
    needs_indent: bool,
}

/// Built-in backend: one lock around the writer so concurrent callers never interleave.
pub struct MinimalBackend {
    state: Mutex<MinimalState>,
}

impl MinimalBackend {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(MinimalState {
                out,
                needs_indent: true,
            }),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl DebugBackend for MinimalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Minimal
    }

    fn write(&self, indent: &str, message: &str) {
        if message.is_empty() {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.needs_indent && !indent.is_empty() {
            let _ = state.out.write_all(indent.as_bytes());
        }
        let _ = state.out.write_all(message.as_bytes());
        let _ = state.out.flush();
        state.needs_indent = message.ends_with('\n');
    }

    fn flush(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = state.out.flush();
    }
}

/// In-memory writer that can be handed to a backend and read back later.
#[derive(Clone, Default)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&g).into_owned()
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
