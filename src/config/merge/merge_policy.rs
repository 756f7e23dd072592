//! Merge rules: defaults and override order.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with engine defaults applied.
///
/// Later sources override earlier ones: defaults, then workspace files, then environment.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("digest", "content")?
        .set_default("state_dir", ".buildavoid/state")?
        .set_default("logging.level", "info")
}
