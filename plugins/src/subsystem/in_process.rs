use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use diagkit_core::listener::{
    encode_event_line, EventLevel, OpenedSession, SessionConfig, TraceEvent, TracingSubsystem,
    SESSION_PROVIDER_NAME,
};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const PIPE_CAPACITY: usize = 64 * 1024;
/// Encoded lines queued per session ahead of its pipe.
pub const SINK_CAPACITY: usize = 1024;

struct SessionSink {
    config: SessionConfig,
    tx: mpsc::Sender<String>,
    dropped: u64,
}

impl SessionSink {
    fn wants(&self, provider: &str, level: EventLevel, keywords: u64) -> bool {
        self.config
            .provider(provider)
            .is_some_and(|p| p.wants(level, keywords))
    }
}

/// Tracing subsystem living inside the current process.
///
/// Hosts publish events with [`emit`]; each open session receives the ones
/// its provider set asks for, encoded as event lines on an in-memory pipe.
///
/// [`emit`]: InProcessSubsystem::emit
pub struct InProcessSubsystem {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<u64, SessionSink>>,
    dropped: AtomicU64,
}

impl Default for InProcessSubsystem {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }
}

impl InProcessSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    /// Events discarded because a session's queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Publishes one event. Returns how many sessions accepted it.
    ///
    /// Never blocks: a session whose reader falls [`SINK_CAPACITY`] lines
    /// behind loses the event instead.
    pub fn emit(
        &self,
        provider: &str,
        event: &str,
        level: EventLevel,
        keywords: u64,
        payload: Value,
    ) -> usize {
        let mut sessions = self.sessions();
        if sessions.is_empty() {
            return 0;
        }
        let mut ev = TraceEvent::new(provider, event);
        ev.level = level;
        ev.payload = payload;
        let line = encode_event_line(&ev);

        let mut delivered = 0;
        sessions.retain(|id, sink| {
            if !sink.wants(provider, level, keywords) {
                return true;
            }
            match sink.tx.try_send(line.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    if sink.dropped == 0 {
                        tracing::warn!(session_id = *id, "session queue full, dropping events");
                    }
                    sink.dropped += 1;
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(session_id = *id, "session reader gone, dropping sink");
                    false
                }
            }
        });
        delivered
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SessionSink>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn session_event(name: &str, session_id: u64) -> String {
    let mut ev = TraceEvent::new(SESSION_PROVIDER_NAME, name);
    ev.level = EventLevel::LogAlways;
    ev.payload = serde_json::json!({ "session_id": session_id });
    encode_event_line(&ev)
}

#[async_trait]
impl TracingSubsystem for InProcessSubsystem {
    fn name(&self) -> &str {
        "in_process"
    }

    async fn open_session(&self, pid: u32, config: &SessionConfig) -> Result<OpenedSession> {
        let own = std::process::id();
        if pid != own {
            bail!("in-process subsystem can only trace its own process ({own}), not {pid}");
        }

        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (mut writer, reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (tx, mut rx) = mpsc::channel::<String>(SINK_CAPACITY);

        // Pump: ends (closing the pipe) once the sink is dropped and drained,
        // or when the reader goes away.
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if writer.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = writer.shutdown().await;
        });

        let _ = tx.try_send(session_event("SessionStarted", session_id));
        self.sessions().insert(
            session_id,
            SessionSink {
                config: config.clone(),
                tx,
                dropped: 0,
            },
        );
        tracing::debug!(
            session_id,
            providers = config.providers.len(),
            "in-process session opened"
        );

        Ok(OpenedSession {
            session_id,
            stream: Box::new(reader),
        })
    }

    async fn stop_session(&self, session_id: u64) -> Result<()> {
        let Some(sink) = self.sessions().remove(&session_id) else {
            bail!("unknown session {session_id}");
        };
        if sink.config.request_rundown {
            if let Err(e) = sink.tx.try_send(session_event("RundownEnd", session_id)) {
                tracing::warn!(session_id, error = %e, "rundown marker not queued");
            }
        }
        tracing::debug!(session_id, dropped = sink.dropped, "in-process session stopped");
        Ok(())
    }
}
