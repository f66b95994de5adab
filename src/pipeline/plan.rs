use crate::intake::InputKind;
use crate::pipeline::stage::Stage;
use serde::Serialize;

/// Ordered subset of stages a run needs, derived from its input kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductionPlan {
    kind: InputKind,
    stages: Vec<Stage>,
    discovery: bool,
}

impl ProductionPlan {
    pub fn for_kind(kind: InputKind) -> Self {
        let stages = match kind {
            InputKind::SpecBypass => vec![Stage::Render, Stage::QualityReview, Stage::Delivery],
            InputKind::Brief => Stage::CANONICAL
                .into_iter()
                .filter(|stage| *stage != Stage::Intake)
                .collect(),
            InputKind::Script | InputKind::Prompt => Stage::CANONICAL.to_vec(),
        };
        Self {
            kind,
            stages,
            discovery: kind == InputKind::Prompt,
        }
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Whether intake runs a discovery sub-step.
    pub fn discovery(&self) -> bool {
        self.discovery
    }

    pub fn authoring_stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.stages.iter().copied().filter(|stage| stage.is_authoring())
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|stage| stage.as_str().to_string()).collect()
    }
}
