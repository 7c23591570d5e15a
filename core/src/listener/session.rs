use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ListenerError;

use super::decode::EventStreamDecoder;
use super::traits::{OpenedSession, TracingSubsystem};
use super::types::TraceEvent;

/// How long an aborted session task gets to unwind after a join timeout.
const ABORT_GRACE: Duration = Duration::from_millis(250);

pub type EventCallback = Arc<dyn Fn(&TraceEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Cancelled,
    EndOfStream,
    StreamError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: u64,
    pub exit: SessionExit,
    pub delivered: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub callback_panics: u64,
}

/// The background task of one streaming session plus its cancel switch.
pub(crate) struct ActiveSession {
    session_id: u64,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<SessionSummary>,
}

impl ActiveSession {
    pub(crate) fn spawn(
        subsystem: Arc<dyn TracingSubsystem>,
        opened: OpenedSession,
        callback: Option<EventCallback>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let session_id = opened.session_id;
        let task = tokio::spawn(run_session(subsystem, opened, callback, cancel_rx));
        Self {
            session_id,
            cancel_tx,
            task,
        }
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub(crate) fn signal_cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Cancels the session and waits for the task to unwind, including the
    /// subsystem stop request it issues.
    ///
    /// Takes `&mut self` so the caller keeps ownership while joining; if this
    /// future is dropped the session is still tracked and can be stopped again.
    /// On timeout the task is aborted and given [`ABORT_GRACE`] to drop its
    /// stream before the error is returned.
    pub(crate) async fn stop(
        &mut self,
        timeout: Duration,
    ) -> Result<SessionSummary, ListenerError> {
        self.signal_cancel();
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => {
                tracing::error!(session_id = self.session_id, error = %e, "session task failed");
                Ok(SessionSummary {
                    session_id: self.session_id,
                    exit: SessionExit::StreamError(e.to_string()),
                    delivered: 0,
                    filtered: 0,
                    malformed: 0,
                    callback_panics: 0,
                })
            }
            Err(_) => {
                self.task.abort();
                if tokio::time::timeout(ABORT_GRACE, &mut self.task).await.is_err() {
                    // Only a callback blocking its thread can get here.
                    tracing::warn!(
                        session_id = self.session_id,
                        grace_ms = ABORT_GRACE.as_millis() as u64,
                        "aborted session task still running"
                    );
                }
                Err(ListenerError::CancellationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

async fn run_session(
    subsystem: Arc<dyn TracingSubsystem>,
    opened: OpenedSession,
    callback: Option<EventCallback>,
    mut cancel_rx: watch::Receiver<bool>,
) -> SessionSummary {
    let OpenedSession {
        session_id,
        mut stream,
    } = opened;
    let mut decoder = EventStreamDecoder::new();
    let mut buf = vec![0u8; 16 * 1024];
    let mut summary = SessionSummary {
        session_id,
        exit: SessionExit::EndOfStream,
        delivered: 0,
        filtered: 0,
        malformed: 0,
        callback_panics: 0,
    };

    tracing::debug!(session_id, "session streaming");

    let exit = loop {
        tokio::select! {
            biased;

            // A dropped sender counts as cancellation too.
            _ = cancel_rx.changed() => break SessionExit::Cancelled,

            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    if let Some(ev) = decoder.finish() {
                        dispatch(&ev, callback.as_ref(), &mut summary);
                    }
                    break SessionExit::EndOfStream;
                }
                Ok(n) => {
                    let mut cancelled = false;
                    for ev in decoder.push(&buf[..n]) {
                        if *cancel_rx.borrow() {
                            cancelled = true;
                            break;
                        }
                        dispatch(&ev, callback.as_ref(), &mut summary);
                    }
                    if cancelled {
                        break SessionExit::Cancelled;
                    }
                }
                Err(e) => break SessionExit::StreamError(e.to_string()),
            },
        }
    };
    summary.exit = exit;
    summary.malformed = decoder.malformed();
    drop(stream);

    if summary.exit != SessionExit::EndOfStream {
        if let Err(e) = subsystem.stop_session(session_id).await {
            tracing::warn!(
                session_id,
                subsystem = subsystem.name(),
                error = %e,
                "stop session request failed"
            );
        }
    }

    tracing::debug!(
        session_id,
        exit = ?summary.exit,
        delivered = summary.delivered,
        filtered = summary.filtered,
        malformed = summary.malformed,
        "session finished"
    );
    summary
}

fn dispatch(ev: &TraceEvent, callback: Option<&EventCallback>, summary: &mut SessionSummary) {
    if ev.is_session_internal() {
        summary.filtered += 1;
        return;
    }
    let Some(cb) = callback else {
        summary.filtered += 1;
        return;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| cb(ev))) {
        Ok(()) => summary.delivered += 1,
        Err(_) => {
            summary.callback_panics += 1;
            tracing::error!(
                provider = %ev.provider_name,
                event = %ev.event_name,
                "event callback panicked"
            );
        }
    }
}
