use clap::Parser;
use diagkit_cli::commands::{cli, config, listen};
use diagkit_cli::logging;
use diagkit_core::config::AppConfig;
use diagkit_core::error::{self, ListenerError};
use diagkit_plugins::factory;

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    diagkit_core::debug::shutdown();
    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref())?;
    logging::init(&cfg.logging, &cfg.debug).map_err(error::CliError::Command)?;

    if diagkit_core::debug::install(factory::build_debug_facade(&cfg.debug)).is_err() {
        tracing::warn!("debug facade already installed");
    }

    dispatch(args.command, cfg).await
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, error::CliError> {
    let cfg = match path {
        Some(p) => {
            let mut cfg = diagkit_core::config::load_file(p)?;
            diagkit_core::config::apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;
            cfg
        }
        None => diagkit_core::config::load_default()?,
    };
    Ok(cfg)
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: session / IO / subsystem setup error
    // 50: internal/uncategorized
    match e {
        error::CliError::Config(_) => 11,
        error::CliError::Listener(le) => match le {
            ListenerError::SessionOpenFailed(_) => 20,
            ListenerError::CancellationTimeout { .. } => 20,
            ListenerError::Disposed | ListenerError::Faulted => 50,
        },
        error::CliError::Io(_) => 20,
        error::CliError::Command(_) => 20,
        error::CliError::Anyhow(_) => 20,
    }
}

async fn dispatch(cmd: cli::Commands, cfg: AppConfig) -> Result<i32, error::CliError> {
    match cmd {
        cli::Commands::Listen(listen_args) => listen::handle_listen(listen_args, cfg).await,
        cli::Commands::Config => config::handle_config(&cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagkit_core::config::{IpcSubsystemConfig, SubsystemConfig};

    #[test]
    fn exit_codes_by_error_kind() {
        let bad_endpoint = factory::build_subsystem(&SubsystemConfig::Ipc(IpcSubsystemConfig {
            endpoint: String::new(),
            ..IpcSubsystemConfig::default()
        }))
        .err()
        .map(error::CliError::from)
        .unwrap();
        assert_eq!(exit_code_for_error(&bad_endpoint), 20);

        let timeout = error::CliError::from(ListenerError::CancellationTimeout { timeout_ms: 5 });
        assert_eq!(exit_code_for_error(&timeout), 20);
        assert_eq!(exit_code_for_error(&ListenerError::Faulted.into()), 50);
        assert_eq!(
            exit_code_for_error(&error::ConfigError::NoHome.into()),
            11
        );
    }
}
