//! Creative brief shape: a structured mapping of known fields with no free-form narrative.

use crate::intake::request::NormalizedContent;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_yaml::Value;

/// Longest single field value still treated as a brief field rather than narrative.
const MAX_FIELD_CHARS: usize = 280;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CreativeBrief {
    pub topic: String,
    pub duration: Option<u32>,
    pub tone: Option<String>,
    pub audience: Option<String>,
    pub style: Option<String>,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BriefField {
    Topic,
    Duration,
    Tone,
    Audience,
    Style,
    KeyPoints,
}

impl BriefField {
    fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "topic" | "tema" => Some(BriefField::Topic),
            "duration" | "duración" | "duracion" => Some(BriefField::Duration),
            "tone" | "tono" => Some(BriefField::Tone),
            "audience" | "audiencia" => Some(BriefField::Audience),
            "style" | "estilo" => Some(BriefField::Style),
            "key_points" | "keypoints" | "puntos_clave" => Some(BriefField::KeyPoints),
            _ => None,
        }
    }
}

impl CreativeBrief {
    pub fn to_content(&self) -> NormalizedContent {
        let mut content = NormalizedContent::new();
        content.insert("topic".to_string(), json!(self.topic));
        if let Some(duration) = self.duration {
            content.insert("duration".to_string(), json!(duration));
        }
        for (name, value) in [
            ("tone", &self.tone),
            ("audience", &self.audience),
            ("style", &self.style),
        ] {
            if let Some(value) = value {
                content.insert(name.to_string(), json!(value));
            }
        }
        if !self.key_points.is_empty() {
            content.insert("key_points".to_string(), json!(self.key_points));
        }
        content
    }
}

/// Parse `text` as a brief. Returns `None` whenever the brief shape does not hold,
/// so the caller can fall through to the script and prompt checks.
pub fn parse_brief(text: &str) -> Option<CreativeBrief> {
    let value: Value = serde_yaml::from_str(text).ok()?;
    let mapping = value.as_mapping()?;
    if mapping.is_empty() {
        return None;
    }

    let mut brief = CreativeBrief::default();
    for (key, value) in mapping {
        let field = BriefField::from_key(key.as_str()?)?;
        if value.is_null() {
            continue;
        }
        match field {
            BriefField::Topic => brief.topic = short_text(value)?,
            BriefField::Duration => brief.duration = Some(duration_seconds(value)?),
            BriefField::Tone => brief.tone = Some(short_text(value)?),
            BriefField::Audience => brief.audience = Some(short_text(value)?),
            BriefField::Style => brief.style = Some(short_text(value)?),
            BriefField::KeyPoints => brief.key_points = key_points(value)?,
        }
    }

    (!brief.topic.is_empty()).then_some(brief)
}

fn short_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let narrative = text.contains('\n') || text.chars().count() > MAX_FIELD_CHARS;
    (!narrative).then_some(text)
}

fn duration_seconds(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn key_points(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Sequence(items) => items.iter().map(short_text).collect(),
        other => short_text(other).map(|point| vec![point]),
    }
}
