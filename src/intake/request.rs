use crate::schema::ValidSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// How much of the production pipeline a request needs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Complete declarative spec: render directly.
    SpecBypass,
    /// Structured brief: skip intake.
    Brief,
    /// Scene/dialogue script: full pipeline.
    Script,
    /// Free text: full pipeline plus discovery.
    Prompt,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::SpecBypass => "spec_bypass",
            InputKind::Brief => "brief",
            InputKind::Script => "script",
            InputKind::Prompt => "prompt",
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named fields extracted from the raw input, shaped by [`InputKind`].
pub type NormalizedContent = BTreeMap<String, Value>;

/// A classified production request. Immutable once built; the kind never changes.
#[derive(Debug, Clone, Serialize)]
pub struct ProductionRequest {
    id: Uuid,
    raw: String,
    kind: InputKind,
    content: NormalizedContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec: Option<ValidSpec>,
}

impl ProductionRequest {
    pub(crate) fn new(
        raw: String,
        kind: InputKind,
        content: NormalizedContent,
        spec: Option<ValidSpec>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            raw,
            kind,
            content,
            spec,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn content(&self) -> &NormalizedContent {
        &self.content
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.content.get(name)
    }

    /// Validated spec carried by `SpecBypass` requests.
    pub fn spec(&self) -> Option<&ValidSpec> {
        self.spec.as_ref()
    }

    /// Prompt requests ask intake for a discovery pass.
    pub fn needs_discovery(&self) -> bool {
        self.kind == InputKind::Prompt
    }
}
