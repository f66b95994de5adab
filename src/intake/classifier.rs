use crate::error::ClassificationError;
use crate::intake::brief::parse_brief;
use crate::intake::request::{InputKind, NormalizedContent, ProductionRequest};
use crate::intake::script::outline;
use crate::schema::{SchemaValidator, SpecValidator};
use serde_json::json;
use tracing::debug;

/// Decides how much of the pipeline a raw input needs.
///
/// Checks run in fixed precedence: schema-valid spec, brief shape, script markers,
/// and finally free-text prompt. The first match wins.
pub struct InputClassifier<V: SpecValidator = SchemaValidator> {
    validator: V,
}

impl InputClassifier<SchemaValidator> {
    pub fn new() -> Self {
        Self {
            validator: SchemaValidator,
        }
    }
}

impl Default for InputClassifier<SchemaValidator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: SpecValidator> InputClassifier<V> {
    pub fn with_validator(validator: V) -> Self {
        Self { validator }
    }

    pub fn classify(&self, raw: &[u8]) -> Result<ProductionRequest, ClassificationError> {
        let text = std::str::from_utf8(raw)
            .map_err(|e| ClassificationError::Unreadable(e.to_string()))?;
        self.classify_str(text)
    }

    pub fn classify_str(&self, raw: &str) -> Result<ProductionRequest, ClassificationError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ClassificationError::Empty);
        }

        let request = match self.validator.validate(text) {
            Ok(spec) => {
                let mut content = NormalizedContent::new();
                content.insert("version".to_string(), json!(spec.spec().version));
                content.insert("scene_count".to_string(), json!(spec.spec().scene_count()));
                content.insert(
                    "total_duration_s".to_string(),
                    json!(spec.spec().total_duration_seconds()),
                );
                ProductionRequest::new(raw.to_string(), InputKind::SpecBypass, content, Some(spec))
            }
            Err(reason) => {
                debug!(reason = %reason, "input is not a renderable spec");
                self.classify_unstructured(raw, text)
            }
        };

        debug!(
            request_id = %request.id(),
            kind = %request.kind(),
            fields = request.content().len(),
            "classified production input"
        );
        Ok(request)
    }

    fn classify_unstructured(&self, raw: &str, text: &str) -> ProductionRequest {
        if let Some(brief) = parse_brief(text) {
            return ProductionRequest::new(raw.to_string(), InputKind::Brief, brief.to_content(), None);
        }

        if let Some(script) = outline(text) {
            let mut content = NormalizedContent::new();
            content.insert("script".to_string(), json!(text));
            content.insert("scene_count".to_string(), json!(script.scene_count));
            content.insert("characters".to_string(), json!(script.characters));
            return ProductionRequest::new(raw.to_string(), InputKind::Script, content, None);
        }

        let mut content = NormalizedContent::new();
        content.insert("prompt".to_string(), json!(text));
        content.insert("discovery".to_string(), json!(true));
        ProductionRequest::new(raw.to_string(), InputKind::Prompt, content, None)
    }
}
