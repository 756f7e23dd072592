//! Configuration
//!
//! Two separate concerns live here:
//!
//! - [`Configuration`]: the caller's build configuration. The engine never interprets it
//!   beyond computing a digest; a digest change between builds escalates the build.
//! - [`EngineSettings`]: how the engine itself runs (digest mode, where snapshots live,
//!   logging), loaded by [`ConfigLoader`] from defaults, workspace files and environment.

use crate::error::BuildError;
use crate::logging::LoggingConfig;
use crate::resource::DigestMode;
use crate::types::Digest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod merge;
mod sources;

pub use sources::environment::ENV_PREFIX;
pub use sources::workspace_file::ENV_NAME_VAR;

/// Configuration key that forces escalation when set to `"true"`.
///
/// Excluded from the configuration digest, so toggling it does not by itself change the
/// fingerprint of the next build.
pub const CONFIG_ESCALATED: &str = "incremental.escalated";

/// Build configuration fingerprint input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    values: BTreeMap<String, serde_json::Value>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Stable digest of every entry except [`CONFIG_ESCALATED`].
    pub fn digest(&self) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"configuration");
        for (key, value) in &self.values {
            if key == CONFIG_ESCALATED {
                continue;
            }
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            // BTreeMap keys and serde_json output are both deterministic.
            let rendered = value.to_string();
            hasher.update(&(rendered.len() as u64).to_le_bytes());
            hasher.update(rendered.as_bytes());
        }
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    pub fn escalation_requested(&self) -> bool {
        match self.values.get(CONFIG_ESCALATED) {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Configuration
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut configuration = Configuration::new();
        for (key, value) in iter {
            configuration.insert(key, value);
        }
        configuration
    }
}

/// Engine runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default)]
    pub digest: DigestMode,

    /// Directory holding one snapshot per build execution
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".buildavoid/state")
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            digest: DigestMode::default(),
            state_dir: default_state_dir(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineSettings {
    /// Snapshot path for one build execution, e.g. a plugin goal in a given project.
    pub fn state_file(&self, execution_id: &str) -> Result<PathBuf, BuildError> {
        if execution_id.trim().is_empty() {
            return Err(BuildError::InvalidArgument(
                "execution id must not be empty".to_string(),
            ));
        }
        let file_name: String = execution_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(self.state_dir.join(format!("{}.buildstate", file_name)))
    }

    fn resolve_against(mut self, workspace_root: &Path) -> Self {
        if self.state_dir.is_relative() {
            self.state_dir = workspace_root.join(&self.state_dir);
        }
        if self.logging.file.is_relative() {
            self.logging.file = workspace_root.join(&self.logging.file);
        }
        self
    }
}

/// Loads [`EngineSettings`] for a workspace.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Layered load: defaults, `config/buildavoid.toml`, `config/{BUILDAVOID_ENV}.toml`,
    /// then `BUILDAVOID__*` environment variables. Relative paths resolve against
    /// `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<EngineSettings, BuildError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);
        let settings: EngineSettings = builder.build()?.try_deserialize()?;
        Ok(settings.resolve_against(workspace_root))
    }

    /// Load from one explicit file, with defaults but no environment overrides.
    pub fn load_from_file(path: &Path) -> Result<EngineSettings, BuildError> {
        if !path.is_file() {
            return Err(BuildError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let settings: EngineSettings = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        let base = path
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));
        Ok(settings.resolve_against(base))
    }
}
