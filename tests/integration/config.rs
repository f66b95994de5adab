use animatr::config::{self, AnimatrConfig, ConfigLoader};
use animatr::error::ConfigError;
use animatr::production::{Collaborators, Production};
use std::fs;
use tempfile::TempDir;

use crate::integration::support::{approved, RenderMode, ScriptedQa, ScriptedRender, ScriptedStages};

#[test]
fn workspace_env_file_overrides_base_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "[render]\nslots = 3\ncancel_grace_ms = 900\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();
    fs::write(config_dir.join("staging.toml"), "[render]\nslots = 6\n").unwrap();

    let staging = ConfigLoader::load_for_env(temp_dir.path(), "staging").unwrap();
    assert_eq!(staging.render.slots, 6);
    assert_eq!(staging.render.cancel_grace_ms, 900);
    assert_eq!(staging.logging.level, "warn");

    let development = ConfigLoader::load_for_env(temp_dir.path(), "development").unwrap();
    assert_eq!(development.render.slots, 3);
}

#[test]
fn empty_workspace_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loaded = ConfigLoader::load_for_env(temp_dir.path(), "development").unwrap();
    assert_eq!(loaded.render, AnimatrConfig::default().render);
    assert_eq!(loaded.logging.output, "stderr");
}

#[test]
fn invalid_logging_section_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("animatr.toml");
    fs::write(&path, "[logging]\noutput = \"syslog\"\n").unwrap();
    match ConfigLoader::load_from_file(&path) {
        Err(ConfigError::Invalid(message)) => assert!(message.contains("syslog")),
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[test]
fn global_config_is_installed_once() {
    let mut installed = AnimatrConfig::default();
    installed.render.slots = 5;

    let stored = config::init_global(installed.clone()).unwrap();
    assert_eq!(stored.render.slots, 5);
    assert!(matches!(
        config::init_global(AnimatrConfig::default()),
        Err(ConfigError::AlreadyInitialized)
    ));
    assert_eq!(config::global().unwrap(), &installed);
}

#[tokio::test]
async fn production_opens_history_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let mut loaded = AnimatrConfig::default();
    loaded.storage.history_path = Some(temp_dir.path().join("history"));

    let production = Production::from_config(
        Collaborators {
            stages: ScriptedStages::new(),
            render: ScriptedRender::new(RenderMode::Complete),
            qa: ScriptedQa::new(vec![approved(0.9)]),
        },
        &loaded,
    )
    .unwrap();
    assert!(production.history().is_some());
}
