//! Configuration System
//!
//! Layered configuration: built-in defaults, the global config file, workspace
//! `config/config.toml` and `config/{ANIMATR_ENV}.toml`, then `ANIMATR__*` environment
//! variables. Process-wide configuration is initialized once at startup and read-only after.
//!
//! The QA approval threshold, aspect weights and iteration cap are constants, not configuration.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

mod merge;
mod sources;

pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnimatrConfig {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Render slot capacity and collaborator timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderConfig {
    /// Concurrent render jobs across all projects.
    #[serde(default = "default_slots")]
    pub slots: usize,

    /// How long a cancelled job waits for collaborator acknowledgement before it is forced.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,

    /// Upper bound on a single render collaborator call.
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,

    /// Finished jobs and runs kept in memory; older ones are answered from history only.
    #[serde(default = "default_retain_finished")]
    pub retain_finished: usize,
}

fn default_slots() -> usize {
    2
}

fn default_cancel_grace_ms() -> u64 {
    5_000
}

fn default_collaborator_timeout_ms() -> u64 {
    30 * 60 * 1000
}

fn default_retain_finished() -> usize {
    500
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            cancel_grace_ms: default_cancel_grace_ms(),
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            retain_finished: default_retain_finished(),
        }
    }
}

/// Production history location. No path means history is not recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Render(String),
    Storage(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Render(msg) => write!(f, "Render: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl AnimatrConfig {
    /// Validate the entire configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.render.slots == 0 {
            errors.push(ValidationError::Render(
                "slots must be at least 1".to_string(),
            ));
        }
        if self.render.cancel_grace_ms == 0 {
            errors.push(ValidationError::Render(
                "cancel_grace_ms must be greater than 0".to_string(),
            ));
        }
        if self.render.collaborator_timeout_ms == 0 {
            errors.push(ValidationError::Render(
                "collaborator_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.render.retain_finished == 0 {
            errors.push(ValidationError::Render(
                "retain_finished must be at least 1".to_string(),
            ));
        }

        if let Some(path) = &self.storage.history_path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Storage(
                    "history_path cannot be empty".to_string(),
                ));
            }
        }

        errors.extend(
            self.logging
                .problems()
                .into_iter()
                .map(ValidationError::Logging),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`AnimatrConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load for `workspace_root`, selecting the env file from `ANIMATR_ENV`.
    pub fn load(workspace_root: &Path) -> Result<AnimatrConfig, ConfigError> {
        Self::load_for_env(workspace_root, &sources::workspace_file::env_name())
    }

    pub fn load_for_env(workspace_root: &Path, env_name: &str) -> Result<AnimatrConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root, env_name)?;
        Self::finish(builder)
    }

    /// Load a single explicit file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<AnimatrConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AnimatrConfig, ConfigError> {
        let config: AnimatrConfig = builder
            .add_source(
                Environment::with_prefix("ANIMATR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ConfigError::Invalid(messages.join("\n"))
        })?;
        Ok(config)
    }
}

static GLOBAL: OnceLock<AnimatrConfig> = OnceLock::new();

/// Install the process-wide configuration. Succeeds once per process.
pub fn init_global(config: AnimatrConfig) -> Result<&'static AnimatrConfig, ConfigError> {
    let mut installed = false;
    let stored = GLOBAL.get_or_init(|| {
        installed = true;
        config
    });
    if installed {
        Ok(stored)
    } else {
        Err(ConfigError::AlreadyInitialized)
    }
}

/// The process-wide configuration installed by [`init_global`].
pub fn global() -> Result<&'static AnimatrConfig, ConfigError> {
    GLOBAL.get().ok_or(ConfigError::NotInitialized)
}
