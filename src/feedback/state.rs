use crate::feedback::score::{Aspect, QaScore};
use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};

/// Automated revision cycles allowed before a run goes to human review. Fixed business rule.
pub const MAX_ITERATIONS: u32 = 3;

/// Outcome of one QA evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Deliver,
    Revise {
        stage: Stage,
        aspect: Aspect,
        reason: String,
    },
    /// Automated iteration is exhausted; human review required.
    Escalate,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Deliver => "deliver",
            Decision::Revise { .. } => "revise",
            Decision::Escalate => "escalate",
        }
    }
}

/// Why a stage is being re-entered, handed to its collaborator through the stage context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionNote {
    pub stage: Stage,
    pub aspect: Aspect,
    pub reason: String,
    /// Iteration count after the revision was granted (1-based).
    pub iteration: u32,
}

/// One evaluation in a run's feedback history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// 1-based evaluation number within the run.
    pub evaluation: u32,
    /// Iteration count when the evaluation was made.
    pub iteration: u32,
    pub composite: f64,
    pub score: QaScore,
    pub decision: Decision,
}

impl FeedbackRecord {
    pub fn revision_note(&self) -> Option<RevisionNote> {
        match &self.decision {
            Decision::Revise {
                stage,
                aspect,
                reason,
            } => Some(RevisionNote {
                stage: *stage,
                aspect: *aspect,
                reason: reason.clone(),
                iteration: self.iteration + 1,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSummary {
    pub evaluations: usize,
    pub iterations: u32,
    pub max_iterations: u32,
    pub approved: bool,
    pub escalated: bool,
    pub score_progression: Vec<f64>,
    pub issues_per_evaluation: Vec<usize>,
    pub critical_per_evaluation: Vec<usize>,
}

/// Feedback loop state for a single production run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackState {
    iteration: u32,
    history: Vec<FeedbackRecord>,
}

impl FeedbackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revisions granted so far; never exceeds [`MAX_ITERATIONS`].
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn max_iterations(&self) -> u32 {
        MAX_ITERATIONS
    }

    pub fn history(&self) -> &[FeedbackRecord] {
        &self.history
    }

    pub fn last(&self) -> Option<&FeedbackRecord> {
        self.history.last()
    }

    pub fn is_exhausted(&self) -> bool {
        self.iteration >= MAX_ITERATIONS
    }

    /// Append an evaluation. A revise decision consumes one iteration.
    pub(crate) fn record(&mut self, score: QaScore, decision: Decision) -> FeedbackRecord {
        let record = FeedbackRecord {
            evaluation: self.history.len() as u32 + 1,
            iteration: self.iteration,
            composite: score.composite(),
            score,
            decision,
        };
        if matches!(record.decision, Decision::Revise { .. }) {
            self.iteration = (self.iteration + 1).min(MAX_ITERATIONS);
        }
        self.history.push(record.clone());
        record
    }

    pub fn summary(&self) -> FeedbackSummary {
        let last = self.history.last().map(|record| &record.decision);
        FeedbackSummary {
            evaluations: self.history.len(),
            iterations: self.iteration,
            max_iterations: MAX_ITERATIONS,
            approved: matches!(last, Some(Decision::Deliver)),
            escalated: matches!(last, Some(Decision::Escalate)),
            score_progression: self.history.iter().map(|r| r.composite).collect(),
            issues_per_evaluation: self.history.iter().map(|r| r.score.issues().len()).collect(),
            critical_per_evaluation: self.history.iter().map(|r| r.score.critical().len()).collect(),
        }
    }
}
