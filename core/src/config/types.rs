use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub subsystem: SubsystemConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "diagkit_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugBackendKind {
    /// Built-in writer to stderr.
    Minimal,
    /// Forward debug output into `tracing` events.
    Tracing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default = "default_debug_backend")]
    pub backend: DebugBackendKind,

    #[serde(default = "default_indent_size")]
    pub indent_size: usize,
}

fn default_debug_backend() -> DebugBackendKind {
    DebugBackendKind::Minimal
}

fn default_indent_size() -> usize {
    4
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            backend: default_debug_backend(),
            indent_size: default_indent_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_circular_buffer_mb")]
    pub circular_buffer_mb: u32,

    #[serde(default)]
    pub request_rundown: bool,

    /// Upper bound on waiting for a superseded session to unwind.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

fn default_circular_buffer_mb() -> u32 {
    256
}

fn default_join_timeout_ms() -> u64 {
    10_000
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            circular_buffer_mb: default_circular_buffer_mb(),
            request_rundown: false,
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SubsystemConfig {
    #[serde(rename = "ipc")]
    Ipc(IpcSubsystemConfig),
    #[serde(rename = "in_process")]
    InProcess,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        SubsystemConfig::Ipc(IpcSubsystemConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcSubsystemConfig {
    /// `host:port` for TCP, anything else is treated as a Unix socket path.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "127.0.0.1:9330".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for IpcSubsystemConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}
