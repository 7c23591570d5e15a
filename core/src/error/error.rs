use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("session open failed: {0}")]
    SessionOpenFailed(#[source] anyhow::Error),
    #[error("previous session did not stop within {timeout_ms}ms")]
    CancellationTimeout { timeout_ms: u64 },
    #[error("listener disposed")]
    Disposed,
    #[error("listener faulted: a previous session could not be stopped")]
    Faulted,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHome,
    #[error("read {path} failed: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path} failed: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0:#}")]
    Anyhow(#[from] anyhow::Error),
}
