use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use diagkit_core::api as core_api;
use diagkit_core::{dbg_assert, dbg_writeln};
use diagkit_core::config::{AppConfig, IpcSubsystemConfig, SubsystemConfig};
use diagkit_core::listener::{
    encode_event_line, EventCommand, EventStreamListener, ListenerOptions, TraceEvent,
};
use diagkit_plugins::factory;

use crate::commands::cli::{ListenArgs, OutputFormat};

const END_POLL: Duration = Duration::from_millis(200);

pub async fn handle_listen(
    args: ListenArgs,
    mut cfg: AppConfig,
) -> Result<i32, core_api::CliError> {
    if let Some(endpoint) = args.endpoint.clone() {
        let connect_timeout_ms = match &cfg.subsystem {
            SubsystemConfig::Ipc(ipc) => ipc.connect_timeout_ms,
            SubsystemConfig::InProcess => IpcSubsystemConfig::default().connect_timeout_ms,
        };
        cfg.subsystem = SubsystemConfig::Ipc(IpcSubsystemConfig {
            endpoint,
            connect_timeout_ms,
        });
    }
    if matches!(cfg.subsystem, SubsystemConfig::InProcess) {
        return Err(core_api::CliError::Command(
            "listen needs an ipc subsystem; pass --endpoint".to_string(),
        ));
    }
    if args.rundown {
        cfg.listener.request_rundown = true;
    }

    let subsystem = factory::build_subsystem(&cfg.subsystem)?;
    let mut options = ListenerOptions::from(&cfg.listener);
    if let Some(pid) = args.pid {
        options.pid = pid;
    }

    let mut listener = EventStreamListener::new(subsystem, options);
    let printed = Arc::new(AtomicU64::new(0));
    let counter = printed.clone();
    let format = args.format;
    listener.set_callback(move |ev| {
        let line = format_event(ev, format);
        let mut out = std::io::stdout().lock();
        if out.write_all(line.as_bytes()).is_ok() {
            let _ = out.flush();
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    dbg_writeln!("enabling {} provider(s)", args.providers.len());
    for spec in &args.providers {
        dbg_writeln!(
            "  {} keywords={:#x} level={:?}",
            spec.name,
            spec.options.keywords,
            spec.options.level
        );
        let res = listener
            .issue_command(&spec.name, EventCommand::Enable, Some(spec.options.clone()))
            .await;
        if let Err(e) = res {
            if let Err(dispose_err) = listener.dispose().await {
                tracing::warn!(
                    listener = %listener.id(),
                    error = %dispose_err,
                    "dispose after failed enable"
                );
            }
            return Err(e.into());
        }
    }
    dbg_assert!(
        listener.registry().len() <= args.providers.len(),
        "registry larger than requested provider set"
    );
    tracing::info!(
        listener = %listener.id(),
        providers = listener.registry().len(),
        "listening; press Ctrl-C to stop"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(END_POLL);
    let reason = loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                break "interrupted";
            }
            _ = ticker.tick() => {
                if listener.session_ended() {
                    break "stream ended";
                }
            }
        }
    };

    listener.dispose().await?;
    tracing::info!(
        reason,
        events = printed.load(Ordering::Relaxed),
        "listener stopped"
    );
    Ok(0)
}

pub fn format_event(ev: &TraceEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Jsonl => encode_event_line(ev),
        OutputFormat::Text => {
            let ts = ev.timestamp.format("%H:%M:%S%.3f");
            if ev.payload.is_null() {
                format!("{ts} {}/{} [{:?}]\n", ev.provider_name, ev.event_name, ev.level)
            } else {
                format!(
                    "{ts} {}/{} [{:?}] {}\n",
                    ev.provider_name, ev.event_name, ev.level, ev.payload
                )
            }
        }
    }
}
