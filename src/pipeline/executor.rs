//! Stage pipeline executor: runs the authoring stages of a plan against a stage runner.
//! Owns ordering, failure propagation and history events; stage work stays with collaborators.

use crate::error::{PipelineError, StageFailure};
use crate::pipeline::context::{SpecArtifact, StageContext};
use crate::pipeline::plan::ProductionPlan;
use crate::pipeline::stage::Stage;
use crate::progress::{HistoryRuntime, StageEventData};
use crate::schema::ValidSpec;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Performs the work of a single authoring stage.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run_stage(
        &self,
        stage: Stage,
        context: StageContext,
    ) -> Result<StageContext, StageFailure>;
}

/// Spec artifact plus the context that produced it, kept for later re-entry.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub artifact: SpecArtifact,
    pub context: StageContext,
}

pub struct PipelineExecutor {
    runner: Arc<dyn StageRunner>,
    history: Option<Arc<HistoryRuntime>>,
}

impl PipelineExecutor {
    pub fn new(runner: Arc<dyn StageRunner>, history: Option<Arc<HistoryRuntime>>) -> Self {
        Self { runner, history }
    }

    /// Run every authoring stage of `plan` in canonical order.
    pub async fn run(
        &self,
        plan: &ProductionPlan,
        context: StageContext,
    ) -> Result<PipelineOutput, PipelineError> {
        let stages: Vec<Stage> = plan.authoring_stages().collect();
        debug!(
            run_id = %context.run_id(),
            kind = %plan.kind(),
            stages = stages.len(),
            "running production plan"
        );
        self.execute(&stages, context).await
    }

    /// Re-enter at `stage` and run every authoring stage downstream of it.
    /// Re-entering at render runs no stage and hands back the current spec.
    pub async fn resume_at(
        &self,
        stage: Stage,
        context: StageContext,
    ) -> Result<PipelineOutput, PipelineError> {
        if !stage.is_reentry_point() {
            return Err(PipelineError::NotAPipelineStage(stage));
        }
        let stages: Vec<Stage> = Stage::AUTHORING
            .into_iter()
            .filter(|candidate| *candidate >= stage)
            .collect();
        info!(
            run_id = %context.run_id(),
            stage = %stage,
            iteration = context.iteration(),
            "re-entering production pipeline"
        );
        self.execute(&stages, context).await
    }

    async fn execute(
        &self,
        stages: &[Stage],
        mut context: StageContext,
    ) -> Result<PipelineOutput, PipelineError> {
        for &stage in stages {
            let run_id = context.run_id().to_string();
            let iteration = context.iteration();
            self.emit_stage(&run_id, "stage_started", stage, iteration, None, None);
            if stage == Stage::Intake && context.discovery() {
                self.emit_event(&run_id, "discovery_requested", json!({ "iteration": iteration }));
            }

            let started = Instant::now();
            match self.runner.run_stage(stage, context).await {
                Ok(next) => {
                    context = next;
                    context.mark_completed(stage);
                    self.emit_stage(
                        &run_id,
                        "stage_completed",
                        stage,
                        iteration,
                        Some(started.elapsed().as_millis()),
                        None,
                    );
                }
                Err(failure) => {
                    let failure = StageFailure::new(stage, failure.cause);
                    warn!(run_id = %run_id, stage = %stage, cause = %failure.cause, "stage failed");
                    self.emit_stage(
                        &run_id,
                        "stage_failed",
                        stage,
                        iteration,
                        Some(started.elapsed().as_millis()),
                        Some(failure.cause.clone()),
                    );
                    return Err(failure.into());
                }
            }
        }

        let last = stages.last().copied().unwrap_or(Stage::Render);
        let spec = context
            .spec()
            .cloned()
            .ok_or(PipelineError::MissingSpec(last))?;
        let spec =
            ValidSpec::try_from_spec(spec).map_err(|e| PipelineError::InvalidSpec(e.to_string()))?;

        if stages.contains(&Stage::SpecSynthesis) {
            self.emit_event(
                context.run_id(),
                "spec_synthesized",
                json!({
                    "iteration": context.iteration(),
                    "scene_count": spec.spec().scene_count(),
                    "total_duration_s": spec.spec().total_duration_seconds(),
                }),
            );
        }

        let artifact = SpecArtifact::from_context(&context, spec);
        Ok(PipelineOutput { artifact, context })
    }

    fn emit_stage(
        &self,
        run_id: &str,
        event_type: &str,
        stage: Stage,
        iteration: u32,
        duration_ms: Option<u128>,
        error: Option<String>,
    ) {
        let data = StageEventData {
            stage: stage.as_str().to_string(),
            iteration,
            duration_ms,
            error,
        };
        self.emit_event(run_id, event_type, json!(data));
    }

    fn emit_event(&self, run_id: &str, event_type: &str, payload: serde_json::Value) {
        if let Some(history) = &self.history {
            history.emit_event_best_effort(run_id, event_type, payload);
        }
    }
}
