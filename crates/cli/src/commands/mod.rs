pub mod chat;
pub mod doctor;
pub mod onboard;
pub mod serve;
pub mod tools;

use std::path::{Path, PathBuf};
use toolbridge_config::AppConfig;
use toolbridge_gateway::BoxError;

pub type CommandResult = Result<(), BoxError>;

/// Where the config lives: the `--config` flag, else the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load, apply environment overrides, and validate.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, BoxError> {
    let path = config_path(explicit);
    tracing::debug!(path = %path.display(), "Loading config");
    AppConfig::load_with_env(&path).map_err(|e| format!("Failed to load config: {e}").into())
}
