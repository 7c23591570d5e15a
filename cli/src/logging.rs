//! `tracing` subscriber setup for the `diagkit` binary.

use std::path::PathBuf;
use std::sync::OnceLock;

use diagkit_core::config::{DebugBackendKind, DebugConfig, LoggingConfig};
use diagkit_core::debug::TRACE_TARGET;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Filter directives for this run.
///
/// A non-empty `RUST_LOG` is used as is. Otherwise the configured level
/// applies, and when debug output is forwarded into `tracing` its target is
/// raised to `debug` unless the level already names it.
pub fn filter_directives(
    logging: &LoggingConfig,
    debug: &DebugConfig,
    rust_log: Option<&str>,
) -> String {
    if let Some(env) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        return env.to_string();
    }

    let level = logging.level.trim();
    let forwards_debug = debug.backend == DebugBackendKind::Tracing;
    if !forwards_debug || level.contains(TRACE_TARGET) {
        return level.to_string();
    }
    if level.is_empty() {
        format!("{TRACE_TARGET}=debug")
    } else {
        format!("{level},{TRACE_TARGET}=debug")
    }
}

pub fn log_dir(logging: &LoggingConfig) -> PathBuf {
    match logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(d) => PathBuf::from(shellexpand::tilde(d).as_ref()),
        None => std::env::temp_dir().join("diagkit"),
    }
}

/// Installs the global subscriber: stderr and/or a per-process log file.
pub fn init(logging: &LoggingConfig, debug: &DebugConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let rust_log = std::env::var("RUST_LOG").ok();
    let directives = filter_directives(logging, debug, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .map_err(|e| format!("invalid log filter {directives:?}: {e}"))?;

    let mut maybe_writer = None;
    if logging.file {
        let dir = log_dir(logging);
        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("diagkit.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });
    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| format!("install subscriber failed: {e}"))
}
