//! QA evaluation and the deliver / revise / escalate decision.

use crate::error::FeedbackError;
use crate::feedback::score::QaScore;
use crate::feedback::state::{Decision, FeedbackRecord, FeedbackState, MAX_ITERATIONS};
use crate::pipeline::SpecArtifact;
use crate::progress::{FeedbackEventData, HistoryRuntime};
use crate::render::{JobStatus, RenderJob};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// QA capability: scores a completed render of an artifact.
#[async_trait]
pub trait QaScorer: Send + Sync {
    async fn score(&self, artifact: &SpecArtifact, job: &RenderJob) -> Result<QaScore, FeedbackError>;
}

/// Decide what happens after an evaluation, given revisions already granted.
pub fn decide(iteration: u32, score: &QaScore) -> Decision {
    if score.approved() {
        return Decision::Deliver;
    }
    if iteration >= MAX_ITERATIONS {
        return Decision::Escalate;
    }
    match score.weakest_failing() {
        Some(aspect) => {
            let value = score.aspect(aspect);
            let mut reason = format!(
                "{aspect} scored {value:.2}; composite {:.2}",
                score.composite()
            );
            if score.critical().contains(&aspect) {
                reason.push_str("; critical issue flagged");
            }
            Decision::Revise {
                stage: aspect.owning_stage(),
                aspect,
                reason,
            }
        }
        None => Decision::Escalate,
    }
}

pub struct FeedbackController {
    scorer: Arc<dyn QaScorer>,
    history: Option<Arc<HistoryRuntime>>,
}

impl FeedbackController {
    pub fn new(scorer: Arc<dyn QaScorer>, history: Option<Arc<HistoryRuntime>>) -> Self {
        Self { scorer, history }
    }

    /// Score the completed `job` for `artifact` and record the decision in `state`.
    pub async fn evaluate(
        &self,
        state: &mut FeedbackState,
        artifact: &SpecArtifact,
        job: &RenderJob,
    ) -> Result<FeedbackRecord, FeedbackError> {
        if job.status != JobStatus::Completed || job.output.is_none() {
            return Err(FeedbackError::JobNotCompleted(job.id));
        }

        let score = self.scorer.score(artifact, job).await?;
        score.check()?;

        let decision = decide(state.iteration(), &score);
        let record = state.record(score, decision);

        match &record.decision {
            Decision::Deliver => info!(
                run_id = %artifact.run_id(),
                job_id = %job.id,
                composite = record.composite,
                "QA approved render"
            ),
            Decision::Revise { stage, aspect, .. } => info!(
                run_id = %artifact.run_id(),
                job_id = %job.id,
                composite = record.composite,
                stage = %stage,
                aspect = %aspect,
                iteration = state.iteration(),
                "QA requested revision"
            ),
            Decision::Escalate => warn!(
                run_id = %artifact.run_id(),
                job_id = %job.id,
                composite = record.composite,
                "QA iterations exhausted; human review required"
            ),
        }

        if let Some(history) = &self.history {
            history.record_qa_best_effort(artifact.run_id(), &job.id.to_string(), &record);
            let (stage, reason) = match &record.decision {
                Decision::Revise { stage, reason, .. } => {
                    (Some(stage.as_str().to_string()), Some(reason.clone()))
                }
                _ => (None, None),
            };
            let data = FeedbackEventData {
                iteration: record.iteration,
                composite: record.composite,
                decision: record.decision.as_str().to_string(),
                stage,
                reason,
            };
            history.emit_event_best_effort(artifact.run_id(), "qa_evaluated", json!(data));
        }

        Ok(record)
    }
}
