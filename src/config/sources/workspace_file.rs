//! Workspace config file source: config/buildavoid.toml and config/{env}.toml

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Environment variable selecting the environment-specific file.
pub const ENV_NAME_VAR: &str = "BUILDAVOID_ENV";

/// Add workspace config files to builder.
/// Precedence: config/buildavoid.toml (base) then config/{BUILDAVOID_ENV}.toml.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = workspace_root.join("config");
    let mut builder = builder;

    let base_config_path = config_dir.join("buildavoid.toml");
    if base_config_path.is_file() {
        builder = builder.add_source(File::from(base_config_path).required(false));
    }

    if let Ok(env_name) = std::env::var(ENV_NAME_VAR) {
        let env_config_path = config_dir.join(format!("{}.toml", env_name));
        if env_config_path.is_file() {
            builder = builder.add_source(File::from(env_config_path).required(false));
        }
    }

    Ok(builder)
}
