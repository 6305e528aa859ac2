//! Workspace config files: config/config.toml, then config/{GENLOOM_ENV}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_NAME_VAR: &str = "GENLOOM_ENV";
const DEFAULT_ENV_NAME: &str = "development";

/// Active environment name, `development` when unset or blank.
pub fn env_name() -> String {
    std::env::var(ENV_NAME_VAR)
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_ENV_NAME.to_string())
}

/// Candidate files in ascending precedence.
pub fn workspace_config_paths(workspace_root: &Path) -> [PathBuf; 2] {
    let dir = workspace_root.join("config");
    [dir.join("config.toml"), dir.join(format!("{}.toml", env_name()))]
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let layered = workspace_config_paths(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Layering workspace configuration");
            builder.add_source(File::from(path.as_path()).required(false))
        });
    Ok(layered)
}
