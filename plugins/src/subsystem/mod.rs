//! Tracing subsystem adapters.

pub mod in_process;
pub mod ipc;
pub mod protocol;

pub use in_process::InProcessSubsystem;
pub use ipc::{Endpoint, IpcTracingSubsystem};
