//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `diagkit_core::api` instead of reaching into internal modules.

pub use crate::config::{
    load_default, AppConfig, DebugBackendKind, DebugConfig, IpcSubsystemConfig, ListenerConfig,
    LoggingConfig, SubsystemConfig,
};
pub use crate::debug::{
    AssertionFailure, BackendKind, CaptureBuffer, DebugBackend, DebugContext, DebugFacade,
    MinimalBackend,
};
pub use crate::error::{CliError, ConfigError, ListenerError};
pub use crate::listener::{
    encode_event_line, EnableOptions, EventCommand, EventLevel, EventStreamListener,
    ListenerOptions, ListenerState, OpenedSession, ProviderConfig, SessionConfig, TraceEvent,
    TracingSubsystem, SESSION_PROVIDER_NAME,
};
