//! Merge rules: built-in defaults underneath every file and environment layer.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("render.slots", 2)?
        .set_default("render.cancel_grace_ms", 5_000)?
        .set_default("render.collaborator_timeout_ms", 1_800_000)?
        .set_default("render.retain_finished", 500)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
