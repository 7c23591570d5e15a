use diagkit_core::api as core_api;
use diagkit_core::config::AppConfig;

pub fn render_config(cfg: &AppConfig) -> Result<String, core_api::CliError> {
    toml::to_string_pretty(cfg)
        .map_err(|e| core_api::CliError::Command(format!("render config failed: {e}")))
}

pub fn handle_config(cfg: &AppConfig) -> Result<i32, core_api::CliError> {
    print!("{}", render_config(cfg)?);
    Ok(0)
}
