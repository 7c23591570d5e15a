use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::{AppConfig, DebugBackendKind, SubsystemConfig};

/// Get the default diagkit data directory: ~/.diagkit
pub fn get_diagkit_data_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".diagkit"))
}

pub fn load_default() -> Result<AppConfig, ConfigError> {
    // Priority 1: ~/.diagkit/config.toml (highest)
    let user_config = get_diagkit_data_dir()?.join("config.toml");

    // Priority 2: ./diagkit.toml (current directory)
    let local_config = Path::new("diagkit.toml");

    let mut cfg = if user_config.exists() {
        load_file(&user_config)?
    } else if local_config.exists() {
        load_file(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn load_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut cfg = toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    expand_paths(&mut cfg);
    Ok(cfg)
}

/// Environment variable overrides (Priority 0: highest).
///
/// `lookup` is injected so tests don't have to mutate the process environment.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("DIAGKIT_ENDPOINT") {
        match cfg.subsystem {
            SubsystemConfig::Ipc(ref mut ipc) => ipc.endpoint = v,
            SubsystemConfig::InProcess => {
                tracing::warn!(endpoint = %v, "DIAGKIT_ENDPOINT ignored for in-process subsystem");
            }
        }
    }

    if let Some(v) = get("DIAGKIT_DEBUG_BACKEND") {
        cfg.debug.backend = match v.trim() {
            "minimal" => DebugBackendKind::Minimal,
            "tracing" => DebugBackendKind::Tracing,
            _ => {
                return Err(ConfigError::Invalid {
                    key: "DIAGKIT_DEBUG_BACKEND",
                    value: v,
                })
            }
        };
    }

    if let Some(v) = get("DIAGKIT_JOIN_TIMEOUT_MS") {
        cfg.listener.join_timeout_ms = v.trim().parse().map_err(|_| ConfigError::Invalid {
            key: "DIAGKIT_JOIN_TIMEOUT_MS",
            value: v.clone(),
        })?;
    }

    expand_paths(cfg);
    Ok(())
}

fn expand_paths(cfg: &mut AppConfig) {
    if let Some(dir) = cfg.logging.directory.as_mut() {
        *dir = shellexpand::tilde(dir.as_str()).into_owned();
    }
    if let SubsystemConfig::Ipc(ref mut ipc) = cfg.subsystem {
        ipc.endpoint = shellexpand::tilde(&ipc.endpoint).into_owned();
    }
}
