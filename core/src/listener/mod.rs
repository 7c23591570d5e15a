//! Event stream listener.
//!
//! A [`EventStreamListener`] keeps a [`ProviderRegistry`], and on each
//! enable/disable command replaces its streaming session on a
//! [`TracingSubsystem`]. Decoded events are handed to a callback running on
//! the session's background task.

mod decode;
#[allow(clippy::module_inception)]
mod listener;
mod registry;
mod session;
mod traits;
mod types;

pub use decode::{encode_event_line, EventStreamDecoder, MAX_LINE_BYTES};
pub use listener::{EventStreamListener, ListenerOptions, ListenerState};
pub use registry::ProviderRegistry;
pub use session::{EventCallback, SessionExit, SessionSummary};
pub use traits::{OpenedSession, TracingSubsystem};
pub use types::{
    parse_keywords, EnableOptions, EventCommand, EventLevel, ProviderConfig, SerializationFormat,
    SessionConfig, TraceEvent, SESSION_PROVIDER_NAME,
};
