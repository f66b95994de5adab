//! Declarative animation schema and the validation capability used by the
//! classifier's bypass check and by the pipeline after spec synthesis.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use thiserror::Error;

/// Schema version accepted by [`SchemaValidator`].
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Spec is not parseable: {0}")]
    Parse(String),

    #[error("Spec must be a mapping at the top level")]
    NotAMapping,

    #[error("Invalid field {field}: {message}")]
    Field { field: String, message: String },
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Webm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_resolution")]
    pub resolution: String,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_resolution() -> String {
    "1920x1080".to_string()
}

fn default_fps() -> u32 {
    30
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            resolution: default_resolution(),
            fps: default_fps(),
        }
    }
}

impl OutputConfig {
    /// Width and height parsed from `WxH`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.resolution.split_once('x')?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        (width > 0 && height > 0).then_some((width, height))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtsProvider {
    #[default]
    Openai,
    Elevenlabs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AudioConfig {
    pub text: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub provider: TtsProvider,
    #[serde(default = "default_unit")]
    pub speed: f64,
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_unit() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Character {
    pub asset: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default = "default_expression")]
    pub expression: String,
    #[serde(default = "default_unit")]
    pub scale: f64,
}

fn default_expression() -> String {
    "neutral".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Background {
    pub color: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scene {
    pub id: String,
    /// Duration in the form `<n>s` or `<n>.<m>s`.
    pub duration: String,
    pub character: Option<Character>,
    pub audio: Option<AudioConfig>,
    pub background: Option<Background>,
}

impl Scene {
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration.strip_suffix('s')?.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AnimationSpec {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub output: OutputConfig,
    pub scenes: Vec<Scene>,
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl AnimationSpec {
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.scenes
            .iter()
            .filter_map(Scene::duration_seconds)
            .sum()
    }

    /// Check every schema constraint serde cannot express.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.version != SCHEMA_VERSION {
            return Err(ValidationError::field(
                "version",
                format!("unsupported version {}", self.version),
            ));
        }
        if self.output.dimensions().is_none() {
            return Err(ValidationError::field(
                "output.resolution",
                format!("expected WxH, got {}", self.output.resolution),
            ));
        }
        if !(1..=120).contains(&self.output.fps) {
            return Err(ValidationError::field(
                "output.fps",
                format!("{} not in 1..=120", self.output.fps),
            ));
        }
        if self.scenes.is_empty() {
            return Err(ValidationError::field("scenes", "at least one scene required"));
        }

        let mut seen = HashSet::new();
        for (index, scene) in self.scenes.iter().enumerate() {
            let prefix = format!("scenes[{index}]");
            if scene.id.trim().is_empty() {
                return Err(ValidationError::field(format!("{prefix}.id"), "empty"));
            }
            if !seen.insert(scene.id.as_str()) {
                return Err(ValidationError::field(
                    format!("{prefix}.id"),
                    format!("duplicate scene id {}", scene.id),
                ));
            }
            if !duration_pattern().is_match(&scene.duration) {
                return Err(ValidationError::field(
                    format!("{prefix}.duration"),
                    format!("expected <seconds>s, got {}", scene.duration),
                ));
            }
            if let Some(character) = &scene.character {
                if character.asset.trim().is_empty() {
                    return Err(ValidationError::field(
                        format!("{prefix}.character.asset"),
                        "empty",
                    ));
                }
                if !(0.1..=3.0).contains(&character.scale) {
                    return Err(ValidationError::field(
                        format!("{prefix}.character.scale"),
                        format!("{} not in 0.1..=3.0", character.scale),
                    ));
                }
            }
            if let Some(audio) = &scene.audio {
                if audio.text.trim().is_empty() {
                    return Err(ValidationError::field(
                        format!("{prefix}.audio.text"),
                        "empty",
                    ));
                }
                if !(0.5..=2.0).contains(&audio.speed) {
                    return Err(ValidationError::field(
                        format!("{prefix}.audio.speed"),
                        format!("{} not in 0.5..=2.0", audio.speed),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn duration_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+(\.\d+)?s$").expect("static regex"))
}

/// An [`AnimationSpec`] that passed every schema check.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ValidSpec(AnimationSpec);

impl ValidSpec {
    pub fn try_from_spec(spec: AnimationSpec) -> Result<Self, ValidationError> {
        spec.check()?;
        Ok(Self(spec))
    }

    pub fn spec(&self) -> &AnimationSpec {
        &self.0
    }

    pub fn into_inner(self) -> AnimationSpec {
        self.0
    }
}

/// Spec-validation capability.
pub trait SpecValidator: Send + Sync {
    fn validate(&self, raw: &str) -> Result<ValidSpec, ValidationError>;
}

/// Validates YAML (and therefore JSON) payloads against [`AnimationSpec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SpecValidator for SchemaValidator {
    fn validate(&self, raw: &str) -> Result<ValidSpec, ValidationError> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|e| ValidationError::Parse(e.to_string()))?;
        let mapping = value.as_mapping_mut().ok_or(ValidationError::NotAMapping)?;

        // `version: 1.0` parses as a float in YAML.
        let version_key = serde_yaml::Value::String("version".to_string());
        if let Some(serde_yaml::Value::Number(n)) = mapping.get(&version_key) {
            let as_text = if n.is_f64() {
                format!("{:.1}", n.as_f64().unwrap_or_default())
            } else {
                n.to_string()
            };
            mapping.insert(version_key, serde_yaml::Value::String(as_text));
        }

        let spec: AnimationSpec =
            serde_yaml::from_value(value).map_err(|e| ValidationError::Parse(e.to_string()))?;
        ValidSpec::try_from_spec(spec)
    }
}
