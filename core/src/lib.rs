//! Debug-trace facade and trace event stream listener.
//!
//! Two independent pieces live here:
//! - [`debug`]: a process-wide diagnostic sink with lazily resolved backends.
//! - [`listener`]: an event stream listener driving sessions on a
//!   [`listener::TracingSubsystem`].

pub mod api;
pub mod config;
pub mod debug;
pub mod error;
pub mod listener;
pub mod util;
