use anyhow::{anyhow, Result};
use diagkit_core::listener::SessionConfig;
use serde::{Deserialize, Serialize};

/// Request line sent to a diagnostics endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcCommand {
    CollectTracing { pid: u32, config: SessionConfig },
    StopTracing { session_id: u64 },
}

/// Single response line; on success for `collect_tracing` the rest of the
/// connection is the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok(session_id: Option<u64>) -> Self {
        Self {
            ok: true,
            session_id,
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            session_id: None,
            error: Some(msg.into()),
        }
    }

    pub fn into_result(self) -> Result<Option<u64>> {
        if self.ok {
            Ok(self.session_id)
        } else {
            Err(anyhow!(
                "endpoint refused request: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ))
        }
    }
}

pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(msg)?;
    line.push(b'\n');
    Ok(line)
}
