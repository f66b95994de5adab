use crate::feedback::{FeedbackRecord, FeedbackState, FeedbackSummary, RevisionNote};
use crate::intake::InputKind;
use crate::pipeline::{ProductionPlan, Stage};
use crate::progress::RunStatus;
use crate::render::{JobId, ProjectId, RenderJob};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a production run stands. Every variant except `InProgress` is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress {
        stage: Stage,
    },
    Delivered {
        path: String,
        composite: f64,
        iterations: u32,
    },
    /// Automated iteration exhausted; the run needs human review.
    Escalated {
        composite: f64,
        iterations: u32,
        reason: String,
    },
    Failed {
        stage: Stage,
        reason: String,
    },
    Cancelled {
        job: JobId,
        forced: bool,
    },
}

impl RunOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunOutcome::InProgress { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::InProgress { .. } => "in_progress",
            RunOutcome::Delivered { .. } => "delivered",
            RunOutcome::Escalated { .. } => "escalated",
            RunOutcome::Failed { .. } => "failed",
            RunOutcome::Cancelled { .. } => "cancelled",
        }
    }

    pub(crate) fn history_status(&self) -> RunStatus {
        match self {
            RunOutcome::InProgress { .. } => RunStatus::Active,
            RunOutcome::Delivered { .. } => RunStatus::Delivered,
            RunOutcome::Escalated { .. } => RunStatus::Escalated,
            RunOutcome::Failed { .. } => RunStatus::Failed,
            RunOutcome::Cancelled { .. } => RunStatus::Cancelled,
        }
    }

    pub(crate) fn history_detail(&self) -> Option<String> {
        match self {
            RunOutcome::InProgress { .. } => None,
            RunOutcome::Delivered { path, .. } => Some(path.clone()),
            RunOutcome::Escalated { reason, .. } => Some(reason.clone()),
            RunOutcome::Failed { stage, reason } => Some(format!("{stage}: {reason}")),
            RunOutcome::Cancelled { job, forced } => {
                Some(format!("job {job} cancelled{}", if *forced { " (forced)" } else { "" }))
            }
        }
    }
}

/// Everything needed to explain how a run ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub kind: InputKind,
    pub plan: ProductionPlan,
    pub outcome: RunOutcome,
    pub jobs: Vec<RenderJob>,
    pub evaluations: Vec<FeedbackRecord>,
    pub feedback: FeedbackSummary,
    pub revision_notes: Vec<RevisionNote>,
}

#[derive(Debug, Default)]
pub(crate) struct RunProgress {
    pub feedback: FeedbackState,
    pub jobs: Vec<JobId>,
    pub notes: Vec<RevisionNote>,
}

/// Shared state of one production run.
pub(crate) struct RunEntry {
    pub id: RunId,
    pub project_id: ProjectId,
    pub kind: InputKind,
    pub plan: ProductionPlan,
    pub progress: Mutex<RunProgress>,
    outcome_tx: watch::Sender<RunOutcome>,
}

impl RunEntry {
    pub fn new(id: RunId, project_id: ProjectId, kind: InputKind, plan: ProductionPlan) -> Self {
        let first = plan.stages().first().copied().unwrap_or(Stage::Render);
        let (outcome_tx, _) = watch::channel(RunOutcome::InProgress { stage: first });
        Self {
            id,
            project_id,
            kind,
            plan,
            progress: Mutex::new(RunProgress::default()),
            outcome_tx,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunOutcome> {
        self.outcome_tx.subscribe()
    }

    pub fn enter_stage(&self, stage: Stage) {
        self.outcome_tx.send_if_modified(|outcome| match outcome {
            RunOutcome::InProgress { stage: current } if *current != stage => {
                *current = stage;
                true
            }
            _ => false,
        });
    }

    /// Set the terminal outcome. Later calls are ignored.
    pub fn finish(&self, terminal: RunOutcome) -> bool {
        self.outcome_tx.send_if_modified(|outcome| {
            if outcome.is_terminal() {
                return false;
            }
            *outcome = terminal;
            true
        })
    }
}
