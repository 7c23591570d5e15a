use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::ListenerConfig;
use crate::error::ListenerError;

use super::registry::ProviderRegistry;
use super::session::{ActiveSession, EventCallback};
use super::traits::TracingSubsystem;
use super::types::{EnableOptions, EventCommand, SessionConfig, TraceEvent};

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub pid: u32,
    pub circular_buffer_mb: u32,
    pub request_rundown: bool,
    pub join_timeout: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self::from(&ListenerConfig::default())
    }
}

impl From<&ListenerConfig> for ListenerOptions {
    fn from(cfg: &ListenerConfig) -> Self {
        Self {
            pid: std::process::id(),
            circular_buffer_mb: cfg.circular_buffer_mb,
            request_rundown: cfg.request_rundown,
            join_timeout: Duration::from_millis(cfg.join_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Streaming { session_id: u64 },
    Faulted,
    Disposed,
}

enum State {
    Idle,
    Streaming(ActiveSession),
    Faulted,
    Disposed,
}

/// Streams events from a tracing subsystem into a callback, one session at a time.
///
/// Every command tears down the running session (cancel, then join) before
/// the registry changes and a new session is opened with the full provider
/// set. Once a command returns, callbacks from earlier sessions can no
/// longer fire.
pub struct EventStreamListener {
    id: Uuid,
    subsystem: Arc<dyn TracingSubsystem>,
    options: ListenerOptions,
    registry: ProviderRegistry,
    callback: Option<EventCallback>,
    state: State,
}

impl EventStreamListener {
    pub fn new(subsystem: Arc<dyn TracingSubsystem>, options: ListenerOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            subsystem,
            options,
            registry: ProviderRegistry::new(),
            callback: None,
            state: State::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn state(&self) -> ListenerState {
        match &self.state {
            State::Idle => ListenerState::Idle,
            State::Streaming(active) => ListenerState::Streaming {
                session_id: active.session_id(),
            },
            State::Faulted => ListenerState::Faulted,
            State::Disposed => ListenerState::Disposed,
        }
    }

    /// True once the active session's stream ended on the subsystem side.
    pub fn session_ended(&self) -> bool {
        matches!(&self.state, State::Streaming(active) if active.is_finished())
    }

    /// Configuration a session opened now would get.
    pub fn session_config(&self) -> SessionConfig {
        self.registry
            .session_config(self.options.circular_buffer_mb, self.options.request_rundown)
    }

    /// Sets the event callback; sessions started afterwards use it.
    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
    }

    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub async fn issue_command(
        &mut self,
        provider_name: &str,
        command: EventCommand,
        options: Option<EnableOptions>,
    ) -> Result<(), ListenerError> {
        match self.state {
            State::Disposed => return Err(ListenerError::Disposed),
            State::Faulted => return Err(ListenerError::Faulted),
            State::Idle | State::Streaming(_) => {}
        }

        self.stop_active().await?;

        self.registry.apply(provider_name, command, options);
        tracing::debug!(
            listener = %self.id,
            provider = provider_name,
            ?command,
            providers = self.registry.len(),
            "provider registry updated"
        );

        if self.registry.is_empty() {
            return Ok(());
        }

        let config = self.session_config();
        let opened = self
            .subsystem
            .open_session(self.options.pid, &config)
            .await
            .map_err(|e| {
                tracing::warn!(
                    listener = %self.id,
                    subsystem = self.subsystem.name(),
                    error = %e,
                    "session open failed"
                );
                ListenerError::SessionOpenFailed(e)
            })?;

        tracing::info!(
            listener = %self.id,
            session_id = opened.session_id,
            providers = config.providers.len(),
            "session opened"
        );
        let active = ActiveSession::spawn(self.subsystem.clone(), opened, self.callback.clone());
        self.state = State::Streaming(active);
        Ok(())
    }

    /// Stops the active session and releases the callback. Idempotent.
    pub async fn dispose(&mut self) -> Result<(), ListenerError> {
        if matches!(self.state, State::Disposed) {
            return Ok(());
        }
        let res = self.stop_active().await;
        self.callback = None;
        self.state = State::Disposed;
        tracing::debug!(listener = %self.id, "listener disposed");
        res
    }

    /// Joins the active session in place. The listener stays `Streaming`
    /// until the join resolves, so a dropped caller leaves the session
    /// tracked instead of orphaning its task.
    async fn stop_active(&mut self) -> Result<(), ListenerError> {
        let State::Streaming(active) = &mut self.state else {
            return Ok(());
        };

        let session_id = active.session_id();
        let joined = active.stop(self.options.join_timeout).await;
        match joined {
            Ok(summary) => {
                self.state = State::Idle;
                tracing::info!(
                    listener = %self.id,
                    session_id,
                    delivered = summary.delivered,
                    exit = ?summary.exit,
                    "session stopped"
                );
                Ok(())
            }
            Err(e) => {
                self.state = State::Faulted;
                tracing::error!(
                    listener = %self.id,
                    session_id,
                    error = %e,
                    "session stop timed out"
                );
                Err(e)
            }
        }
    }
}

impl Drop for EventStreamListener {
    fn drop(&mut self) {
        if let State::Streaming(active) = &self.state {
            active.signal_cancel();
        }
    }
}
