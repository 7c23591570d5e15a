mod load;
mod types;

pub use load::{apply_env_overrides, get_diagkit_data_dir, load_default, load_file};
pub use types::{
    AppConfig, DebugBackendKind, DebugConfig, IpcSubsystemConfig, ListenerConfig, LoggingConfig,
    SubsystemConfig,
};
