//! Production orchestrator
//!
//! Drives one production run per submission as an independent task:
//! classify, run the authoring stages, render, score, then deliver, revise or escalate.

use crate::config::AnimatrConfig;
use crate::error::{PipelineError, ProductionError};
use crate::feedback::{Decision, FeedbackController, FeedbackState, QaScorer};
use crate::intake::{InputClassifier, ProductionRequest};
use crate::pipeline::{PipelineExecutor, PipelineOutput, Stage, StageContext, StageRunner};
use crate::production::run::{RunEntry, RunId, RunOutcome, RunReport};
use crate::progress::{HistoryRuntime, PrunePolicy};
use crate::render::{
    CancelOutcome, JobId, JobStatus, ProjectId, RenderCollaborator, RenderJob, RenderJobManager,
    RenderSettings,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// External capabilities the core delegates to.
#[derive(Clone)]
pub struct Collaborators {
    pub stages: Arc<dyn StageRunner>,
    pub render: Arc<dyn RenderCollaborator>,
    pub qa: Arc<dyn QaScorer>,
}

struct ProductionInner {
    classifier: InputClassifier,
    pipeline: PipelineExecutor,
    jobs: RenderJobManager,
    feedback: FeedbackController,
    history: Option<Arc<HistoryRuntime>>,
    runs: RwLock<HashMap<RunId, Arc<RunEntry>>>,
    finished_runs: Mutex<VecDeque<RunId>>,
    retain_finished: usize,
}

/// Outbound interface of the production core.
#[derive(Clone)]
pub struct Production {
    inner: Arc<ProductionInner>,
}

impl Production {
    pub fn new(
        collaborators: Collaborators,
        settings: RenderSettings,
        history: Option<Arc<HistoryRuntime>>,
    ) -> Self {
        Self {
            inner: Arc::new(ProductionInner {
                classifier: InputClassifier::new(),
                pipeline: PipelineExecutor::new(collaborators.stages, history.clone()),
                jobs: RenderJobManager::new(collaborators.render, settings, history.clone()),
                feedback: FeedbackController::new(collaborators.qa, history.clone()),
                history,
                runs: RwLock::new(HashMap::new()),
                finished_runs: Mutex::new(VecDeque::new()),
                retain_finished: settings.retain_finished.max(1),
            }),
        }
    }

    /// Build from loaded configuration, opening the history store when a path is configured.
    /// Runs a previous process left active are marked interrupted.
    pub fn from_config(
        collaborators: Collaborators,
        config: &AnimatrConfig,
    ) -> Result<Self, ProductionError> {
        let history = match &config.storage.history_path {
            Some(path) => {
                let runtime = HistoryRuntime::open(path)?;
                let interrupted = runtime.mark_interrupted_runs()?;
                if interrupted > 0 {
                    warn!(interrupted, "marked unfinished production runs as interrupted");
                }
                let pruned = runtime.prune(PrunePolicy::default())?;
                info!(path = %path.display(), pruned, "opened production history");
                Some(Arc::new(runtime))
            }
            None => None,
        };
        Ok(Self::new(
            collaborators,
            RenderSettings::from(&config.render),
            history,
        ))
    }

    pub fn submit_production(&self, raw: &[u8]) -> Result<RunId, ProductionError> {
        self.submit_production_for(ProjectId::new(), raw)
    }

    /// Classify `raw` and start a run for `project`. Classification errors surface here;
    /// everything after is reported through the run outcome.
    pub fn submit_production_for(
        &self,
        project: ProjectId,
        raw: &[u8],
    ) -> Result<RunId, ProductionError> {
        let request = Arc::new(self.inner.classifier.classify(raw)?);
        let plan = crate::pipeline::ProductionPlan::for_kind(request.kind());
        let run_id = RunId::new();
        let entry = Arc::new(RunEntry::new(run_id, project, request.kind(), plan));
        self.inner.runs.write().insert(run_id, entry.clone());

        if let Some(history) = &self.inner.history {
            if let Err(err) = history.start_run(
                &run_id.to_string(),
                &project.to_string(),
                request.kind().as_str(),
                entry.plan.stage_names(),
            ) {
                warn!(run_id = %run_id, error = %err, "failed to record run start");
            }
        }
        info!(
            run_id = %run_id,
            project_id = %project,
            kind = %request.kind(),
            stages = entry.plan.stages().len(),
            "production run submitted"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.drive(&entry, request).await;
            inner.conclude(&entry, outcome);
        });
        Ok(run_id)
    }

    pub fn get_job_status(&self, job: JobId) -> Result<RenderJob, ProductionError> {
        Ok(self.inner.jobs.status(job)?)
    }

    pub fn cancel_job(&self, job: JobId) -> Result<CancelOutcome, ProductionError> {
        Ok(self.inner.jobs.cancel(job)?)
    }

    pub fn get_run_outcome(&self, run: RunId) -> Result<RunOutcome, ProductionError> {
        Ok(self.inner.run(run)?.outcome())
    }

    pub async fn wait_for_outcome(&self, run: RunId) -> Result<RunOutcome, ProductionError> {
        let entry = self.inner.run(run)?;
        let mut rx = entry.subscribe();
        loop {
            let outcome = rx.borrow_and_update().clone();
            if outcome.is_terminal() {
                return Ok(outcome);
            }
            if rx.changed().await.is_err() {
                return Ok(entry.outcome());
            }
        }
    }

    pub fn run_report(&self, run: RunId) -> Result<RunReport, ProductionError> {
        let entry = self.inner.run(run)?;
        let progress = entry.progress.lock();
        let jobs = progress
            .jobs
            .iter()
            .filter_map(|id| self.inner.jobs.status(*id).ok())
            .collect();
        Ok(RunReport {
            run_id: entry.id,
            project_id: entry.project_id,
            kind: entry.kind,
            plan: entry.plan.clone(),
            outcome: entry.outcome(),
            jobs,
            evaluations: progress.feedback.history().to_vec(),
            feedback: progress.feedback.summary(),
            revision_notes: progress.notes.clone(),
        })
    }

    /// Jobs currently known for `project`, oldest first.
    pub fn project_jobs(&self, project: ProjectId) -> Vec<RenderJob> {
        self.inner.jobs.list_jobs(project)
    }

    pub fn history(&self) -> Option<&Arc<HistoryRuntime>> {
        self.inner.history.as_ref()
    }

    pub fn shutdown(&self) {
        self.inner.jobs.shutdown();
    }
}

impl ProductionInner {
    fn run(&self, run: RunId) -> Result<Arc<RunEntry>, ProductionError> {
        self.runs
            .read()
            .get(&run)
            .cloned()
            .ok_or_else(|| ProductionError::RunNotFound(run.to_string()))
    }

    async fn drive(&self, entry: &RunEntry, request: Arc<ProductionRequest>) -> RunOutcome {
        let context = StageContext::new(entry.id.to_string(), entry.project_id, request);
        if let Some(first) = entry.plan.authoring_stages().next() {
            entry.enter_stage(first);
        }
        let mut output = match self.pipeline.run(&entry.plan, context).await {
            Ok(output) => output,
            Err(err) => return failed_from_pipeline(err),
        };

        let mut feedback = FeedbackState::new();
        loop {
            entry.enter_stage(Stage::Render);
            let job = match self.render(entry, &output).await {
                Ok(job) => job,
                Err(outcome) => return outcome,
            };

            entry.enter_stage(Stage::QualityReview);
            let evaluated = self
                .feedback
                .evaluate(&mut feedback, &output.artifact, &job)
                .await;
            entry.progress.lock().feedback = feedback.clone();
            let record = match evaluated {
                Ok(record) => record,
                Err(err) => {
                    return RunOutcome::Failed {
                        stage: Stage::QualityReview,
                        reason: err.to_string(),
                    }
                }
            };

            match &record.decision {
                Decision::Deliver => {
                    entry.enter_stage(Stage::Delivery);
                    let path = job.output.clone().unwrap_or_default();
                    self.emit(entry, "delivered", json!({ "path": path, "job_id": job.id }));
                    return RunOutcome::Delivered {
                        path,
                        composite: record.composite,
                        iterations: feedback.iteration(),
                    };
                }
                Decision::Escalate => {
                    return RunOutcome::Escalated {
                        composite: record.composite,
                        iterations: feedback.iteration(),
                        reason: format!(
                            "QA did not approve after {} revisions",
                            feedback.max_iterations()
                        ),
                    };
                }
                Decision::Revise { stage, .. } => {
                    let stage = *stage;
                    let Some(note) = record.revision_note() else {
                        return RunOutcome::Failed {
                            stage: Stage::QualityReview,
                            reason: "revision without a note".to_string(),
                        };
                    };
                    entry.progress.lock().notes.push(note.clone());
                    let mut context = output.context;
                    context.begin_revision(note);
                    entry.enter_stage(stage);
                    output = match self.pipeline.resume_at(stage, context).await {
                        Ok(output) => output,
                        Err(err) => return failed_from_pipeline(err),
                    };
                }
            }
        }
    }

    /// Submit the artifact as a render job and wait for it to finish.
    /// A job that does not complete ends the run.
    async fn render(
        &self,
        entry: &RunEntry,
        output: &PipelineOutput,
    ) -> Result<RenderJob, RunOutcome> {
        let failed = |reason: String| RunOutcome::Failed {
            stage: Stage::Render,
            reason,
        };
        let job_id = self
            .jobs
            .submit(output.artifact.clone())
            .map_err(|err| failed(err.to_string()))?;
        entry.progress.lock().jobs.push(job_id);

        let job = self
            .jobs
            .wait(job_id)
            .await
            .map_err(|err| failed(err.to_string()))?;
        match job.status {
            JobStatus::Completed => Ok(job),
            JobStatus::Cancelled => Err(RunOutcome::Cancelled {
                job: job.id,
                forced: job.forced_cancel,
            }),
            _ => Err(failed(
                job.error
                    .clone()
                    .unwrap_or_else(|| format!("render job ended as {}", job.status)),
            )),
        }
    }

    fn conclude(&self, entry: &RunEntry, outcome: RunOutcome) {
        match &outcome {
            RunOutcome::Failed { stage, reason } => {
                error!(run_id = %entry.id, stage = %stage, reason = %reason, "production run failed")
            }
            other => info!(run_id = %entry.id, outcome = other.as_str(), "production run finished"),
        }
        if let Some(history) = &self.history {
            history.finish_run_best_effort(
                &entry.id.to_string(),
                outcome.history_status(),
                outcome.history_detail(),
            );
        }
        entry.finish(outcome);
        self.retire(entry.id);
    }

    fn retire(&self, run: RunId) {
        let evicted = {
            let mut finished = self.finished_runs.lock();
            finished.push_back(run);
            if finished.len() > self.retain_finished {
                finished.pop_front()
            } else {
                None
            }
        };
        if let Some(old) = evicted {
            self.runs.write().remove(&old);
            debug!(run_id = %old, "evicted finished production run");
        }
    }

    fn emit(&self, entry: &RunEntry, event_type: &str, payload: serde_json::Value) {
        if let Some(history) = &self.history {
            history.emit_event_best_effort(&entry.id.to_string(), event_type, payload);
        }
    }
}

fn failed_from_pipeline(err: PipelineError) -> RunOutcome {
    let stage = match &err {
        PipelineError::Stage(failure) => failure.stage,
        PipelineError::MissingSpec(_) | PipelineError::InvalidSpec(_) => Stage::SpecSynthesis,
        PipelineError::NotAPipelineStage(stage) => *stage,
    };
    let reason = match err {
        PipelineError::Stage(failure) => failure.cause,
        other => other.to_string(),
    };
    RunOutcome::Failed { stage, reason }
}
