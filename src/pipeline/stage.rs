use serde::{Deserialize, Serialize};
use std::fmt;

/// Production stages, declared in canonical execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Scripting,
    Design,
    SpecSynthesis,
    Render,
    QualityReview,
    Delivery,
}

impl Stage {
    pub const CANONICAL: [Stage; 7] = [
        Stage::Intake,
        Stage::Scripting,
        Stage::Design,
        Stage::SpecSynthesis,
        Stage::Render,
        Stage::QualityReview,
        Stage::Delivery,
    ];

    /// Stages executed through a [`StageRunner`](crate::pipeline::StageRunner). Render runs as a
    /// render job; quality review and delivery belong to the feedback loop.
    pub const AUTHORING: [Stage; 4] = [
        Stage::Intake,
        Stage::Scripting,
        Stage::Design,
        Stage::SpecSynthesis,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Scripting => "scripting",
            Stage::Design => "design",
            Stage::SpecSynthesis => "spec_synthesis",
            Stage::Render => "render",
            Stage::QualityReview => "quality_review",
            Stage::Delivery => "delivery",
        }
    }

    pub fn is_authoring(self) -> bool {
        self < Stage::Render
    }

    /// Stages the feedback loop may send a run back to.
    pub fn is_reentry_point(self) -> bool {
        self <= Stage::Render
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
