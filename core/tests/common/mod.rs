#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use diagkit_core::listener::{
    encode_event_line, OpenedSession, SessionConfig, TraceEvent, TracingSubsystem,
};
use tokio::io::{AsyncWriteExt, DuplexStream};

/// Scriptable subsystem: every session is a duplex pipe the test writes into.
#[derive(Default)]
pub struct FakeSubsystem {
    next_id: AtomicU64,
    fail_next_open: Mutex<Option<String>>,
    hang_on_stop: AtomicBool,
    abandoned_stops: AtomicU64,
    opened: Mutex<Vec<(u64, SessionConfig)>>,
    stopped: Mutex<Vec<u64>>,
    writers: tokio::sync::Mutex<HashMap<u64, DuplexStream>>,
}

impl FakeSubsystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        })
    }

    pub fn fail_next_open(&self, msg: &str) {
        *self.fail_next_open.lock().unwrap() = Some(msg.to_string());
    }

    pub fn hang_on_stop(&self) {
        self.hang_on_stop.store(true, Ordering::SeqCst);
    }

    /// Hung stop requests whose future has since been dropped.
    pub fn abandoned_stops(&self) -> u64 {
        self.abandoned_stops.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<(u64, SessionConfig)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn last_config(&self) -> Option<SessionConfig> {
        self.opened.lock().unwrap().last().map(|(_, c)| c.clone())
    }

    pub fn stopped(&self) -> Vec<u64> {
        self.stopped.lock().unwrap().clone()
    }

    /// Writes one event line into session `id`; false if the session is gone.
    pub async fn emit(&self, id: u64, ev: &TraceEvent) -> bool {
        self.emit_raw(id, encode_event_line(ev).as_bytes()).await
    }

    pub async fn emit_raw(&self, id: u64, bytes: &[u8]) -> bool {
        let mut writers = self.writers.lock().await;
        match writers.get_mut(&id) {
            Some(w) => w.write_all(bytes).await.is_ok(),
            None => false,
        }
    }

    /// Ends session `id` from the subsystem side.
    pub async fn close(&self, id: u64) {
        self.writers.lock().await.remove(&id);
    }
}

#[async_trait]
impl TracingSubsystem for FakeSubsystem {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open_session(
        &self,
        _pid: u32,
        config: &SessionConfig,
    ) -> anyhow::Result<OpenedSession> {
        let fail = self.fail_next_open.lock().unwrap().take();
        if let Some(msg) = fail {
            anyhow::bail!(msg);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (writer, reader) = tokio::io::duplex(256 * 1024);
        self.writers.lock().await.insert(id, writer);
        self.opened.lock().unwrap().push((id, config.clone()));
        Ok(OpenedSession {
            session_id: id,
            stream: Box::new(reader),
        })
    }

    async fn stop_session(&self, session_id: u64) -> anyhow::Result<()> {
        if self.hang_on_stop.load(Ordering::SeqCst) {
            let _guard = OnDrop(&self.abandoned_stops);
            std::future::pending::<()>().await;
        }
        self.writers.lock().await.remove(&session_id);
        self.stopped.lock().unwrap().push(session_id);
        Ok(())
    }
}

struct OnDrop<'a>(&'a AtomicU64);

impl Drop for OnDrop<'_> {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn event(provider: &str, name: &str, n: u64) -> TraceEvent {
    let mut ev = TraceEvent::new(provider, name);
    ev.payload = serde_json::json!({ "n": n });
    ev
}

/// Polls `pred` until it holds or `timeout` passes.
pub async fn wait_until<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
