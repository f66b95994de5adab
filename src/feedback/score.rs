use crate::error::FeedbackError;
use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Minimum composite (and per-aspect) score that counts as passing.
pub const APPROVAL_THRESHOLD: f64 = 0.80;

/// Float slack when comparing weighted sums against the threshold.
const SCORE_EPSILON: f64 = 1e-9;

/// Weight of every aspect, in hundredths. Sums to exactly 100.
const WEIGHT_POINTS_TOTAL: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    LipSync,
    Dialogue,
    Pacing,
    Visual,
    Audio,
    Technical,
}

impl Aspect {
    pub const ALL: [Aspect; 6] = [
        Aspect::LipSync,
        Aspect::Dialogue,
        Aspect::Pacing,
        Aspect::Visual,
        Aspect::Audio,
        Aspect::Technical,
    ];

    /// Routing priority: heavier aspects first, equal weights in listing order.
    pub const BY_WEIGHT: [Aspect; 6] = [
        Aspect::LipSync,
        Aspect::Dialogue,
        Aspect::Visual,
        Aspect::Pacing,
        Aspect::Audio,
        Aspect::Technical,
    ];

    pub fn weight_points(self) -> u32 {
        match self {
            Aspect::LipSync => 25,
            Aspect::Dialogue => 20,
            Aspect::Pacing => 15,
            Aspect::Visual => 20,
            Aspect::Audio => 15,
            Aspect::Technical => 5,
        }
    }

    pub fn weight(self) -> f64 {
        f64::from(self.weight_points()) / f64::from(WEIGHT_POINTS_TOTAL)
    }

    /// Pipeline stage that owns fixes for this aspect.
    pub fn owning_stage(self) -> Stage {
        match self {
            Aspect::LipSync | Aspect::Audio | Aspect::Technical => Stage::Render,
            Aspect::Dialogue | Aspect::Pacing => Stage::Scripting,
            Aspect::Visual => Stage::Design,
        }
    }

    fn priority(self) -> usize {
        Self::BY_WEIGHT
            .iter()
            .position(|aspect| *aspect == self)
            .unwrap_or(Self::BY_WEIGHT.len())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Aspect::LipSync => "lip_sync",
            Aspect::Dialogue => "dialogue",
            Aspect::Pacing => "pacing",
            Aspect::Visual => "visual",
            Aspect::Audio => "audio",
            Aspect::Technical => "technical",
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn passes(value: f64) -> bool {
    value + SCORE_EPSILON >= APPROVAL_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaIssue {
    pub aspect: Aspect,
    pub description: String,
    #[serde(default)]
    pub critical: bool,
}

/// Per-aspect QA scores for one rendered output, plus any critical-issue flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaScore {
    scores: BTreeMap<Aspect, f64>,
    #[serde(default)]
    critical: BTreeSet<Aspect>,
    #[serde(default)]
    issues: Vec<QaIssue>,
}

impl QaScore {
    /// Build a score from all six aspect values, each in `[0, 1]`.
    pub fn new<I>(scores: I) -> Result<Self, FeedbackError>
    where
        I: IntoIterator<Item = (Aspect, f64)>,
    {
        let score = Self {
            scores: scores.into_iter().collect(),
            critical: BTreeSet::new(),
            issues: Vec::new(),
        };
        score.check()?;
        Ok(score)
    }

    /// Same value for every aspect.
    pub fn uniform(value: f64) -> Result<Self, FeedbackError> {
        Self::new(Aspect::ALL.into_iter().map(|aspect| (aspect, value)))
    }

    pub fn with_critical(mut self, aspect: Aspect) -> Self {
        self.critical.insert(aspect);
        self
    }

    /// Attach an issue; critical issues also set the aspect's critical flag.
    pub fn with_issue(mut self, issue: QaIssue) -> Self {
        if issue.critical {
            self.critical.insert(issue.aspect);
        }
        self.issues.push(issue);
        self
    }

    /// Every aspect present, every value finite and in range.
    pub fn check(&self) -> Result<(), FeedbackError> {
        for aspect in Aspect::ALL {
            let value = *self
                .scores
                .get(&aspect)
                .ok_or_else(|| FeedbackError::MissingScore(aspect.to_string()))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(FeedbackError::InvalidScore {
                    aspect: aspect.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    pub fn aspect(&self, aspect: Aspect) -> f64 {
        self.scores.get(&aspect).copied().unwrap_or(0.0)
    }

    pub fn scores(&self) -> &BTreeMap<Aspect, f64> {
        &self.scores
    }

    pub fn critical(&self) -> &BTreeSet<Aspect> {
        &self.critical
    }

    pub fn issues(&self) -> &[QaIssue] {
        &self.issues
    }

    pub fn has_critical(&self) -> bool {
        !self.critical.is_empty()
    }

    /// Weighted composite: the sum of weight times aspect score.
    pub fn composite(&self) -> f64 {
        Aspect::ALL
            .iter()
            .map(|aspect| f64::from(aspect.weight_points()) * self.aspect(*aspect))
            .sum::<f64>()
            / f64::from(WEIGHT_POINTS_TOTAL)
    }

    /// Composite at or above the threshold and no critical flag.
    pub fn approved(&self) -> bool {
        passes(self.composite()) && !self.has_critical()
    }

    /// Aspects below the threshold or flagged critical.
    pub fn failing_aspects(&self) -> Vec<Aspect> {
        Aspect::BY_WEIGHT
            .into_iter()
            .filter(|aspect| !passes(self.aspect(*aspect)) || self.critical.contains(aspect))
            .collect()
    }

    /// Lowest-scoring failing aspect; equal scores go to the heavier aspect.
    pub fn weakest_failing(&self) -> Option<Aspect> {
        self.failing_aspects().into_iter().min_by(|a, b| {
            self.aspect(*a)
                .total_cmp(&self.aspect(*b))
                .then(a.priority().cmp(&b.priority()))
        })
    }
}
