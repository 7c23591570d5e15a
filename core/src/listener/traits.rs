use async_trait::async_trait;
use tokio::io::AsyncRead;

use super::types::SessionConfig;

/// A freshly opened session: its id and the event byte stream.
pub struct OpenedSession {
    pub session_id: u64,
    pub stream: Box<dyn AsyncRead + Unpin + Send>,
}

impl std::fmt::Debug for OpenedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// The platform tracing subsystem a listener talks to.
#[async_trait]
pub trait TracingSubsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Starts a session for process `pid` with the full provider set in `config`.
    async fn open_session(&self, pid: u32, config: &SessionConfig)
        -> anyhow::Result<OpenedSession>;

    async fn stop_session(&self, session_id: u64) -> anyhow::Result<()>;
}
