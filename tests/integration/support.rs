//! Scripted collaborators shared by the integration tests.

use animatr::error::{FeedbackError, JobFailure, StageFailure};
use animatr::feedback::{Aspect, QaScore, QaScorer};
use animatr::pipeline::{SpecArtifact, Stage, StageContext, StageRunner};
use animatr::render::{ProgressReporter, RenderCollaborator, RenderJob, RenderOutcome};
use animatr::schema::{AnimationSpec, OutputConfig, Scene};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BRIEF: &str = r#"{"topic":"blockchain","duration":30,"tone":"casual"}"#;

pub const SPEC_YAML: &str = r#"
version: "1.0"
output:
  resolution: 1280x720
  fps: 24
scenes:
  - id: intro
    duration: 3s
    audio:
      text: Hello there
  - id: outro
    duration: 2.5s
"#;

pub fn synthesized_spec() -> AnimationSpec {
    AnimationSpec {
        version: "1.0".to_string(),
        output: OutputConfig::default(),
        scenes: vec![
            Scene {
                id: "s1".to_string(),
                duration: "4s".to_string(),
                character: None,
                audio: None,
                background: None,
            },
            Scene {
                id: "s2".to_string(),
                duration: "6s".to_string(),
                character: None,
                audio: None,
                background: None,
            },
        ],
    }
}

/// Records every stage call with the iteration it ran in. Synthesizes a spec at SpecSynthesis.
#[derive(Default)]
pub struct ScriptedStages {
    pub calls: Mutex<Vec<(Stage, u32)>>,
    fail_at: Option<Stage>,
}

impl ScriptedStages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_at(stage: Stage) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_at: Some(stage),
        })
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.calls.lock().iter().map(|(stage, _)| *stage).collect()
    }
}

#[async_trait]
impl StageRunner for ScriptedStages {
    async fn run_stage(
        &self,
        stage: Stage,
        mut context: StageContext,
    ) -> Result<StageContext, StageFailure> {
        self.calls.lock().push((stage, context.iteration()));
        if self.fail_at == Some(stage) {
            return Err(StageFailure::new(stage, format!("{stage} collaborator unavailable")));
        }
        context.put_artifact(stage.as_str(), json!({ "iteration": context.iteration() }));
        if stage == Stage::SpecSynthesis {
            context.set_spec(synthesized_spec());
        }
        Ok(context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Complete,
    /// Report one scene, then wait until cancelled.
    HoldUntilCancelled,
    Fail,
}

pub struct ScriptedRender {
    mode: RenderMode,
    pub renders: AtomicUsize,
}

impl ScriptedRender {
    pub fn new(mode: RenderMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            renders: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderCollaborator for ScriptedRender {
    async fn render(
        &self,
        artifact: &SpecArtifact,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<RenderOutcome, JobFailure> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RenderMode::Complete => {
                let scenes: Vec<String> =
                    artifact.spec().scenes.iter().map(|s| s.id.clone()).collect();
                for (index, scene) in scenes.iter().enumerate() {
                    reporter.report(index as f64 / scenes.len() as f64, Some(scene));
                    reporter.scene_completed(scene);
                }
                Ok(RenderOutcome::Completed {
                    output: format!("renders/{}-v{}.mp4", artifact.run_id(), artifact.iteration()),
                })
            }
            RenderMode::HoldUntilCancelled => {
                reporter.report(0.25, Some("s1"));
                cancel.cancelled().await;
                Ok(RenderOutcome::Cancelled)
            }
            RenderMode::Fail => Err(JobFailure::Collaborator("tts quota exceeded".to_string())),
        }
    }
}

/// Returns queued scores in order; errors once the queue is empty.
pub struct ScriptedQa {
    scores: Mutex<VecDeque<QaScore>>,
}

impl ScriptedQa {
    pub fn new(scores: Vec<QaScore>) -> Arc<Self> {
        Arc::new(Self {
            scores: Mutex::new(scores.into()),
        })
    }
}

#[async_trait]
impl QaScorer for ScriptedQa {
    async fn score(&self, _artifact: &SpecArtifact, _job: &RenderJob) -> Result<QaScore, FeedbackError> {
        self.scores
            .lock()
            .pop_front()
            .ok_or_else(|| FeedbackError::Scorer("no scripted score left".to_string()))
    }
}

/// Scores in listing order: lip sync, dialogue, pacing, visual, audio, technical.
pub fn score(values: [f64; 6]) -> QaScore {
    QaScore::new(Aspect::ALL.into_iter().zip(values)).unwrap()
}

/// Composite 0.72 with dialogue the weakest failing aspect.
pub fn weak_dialogue() -> QaScore {
    score([0.8, 0.4, 0.8, 0.8, 0.8, 0.8])
}

/// Composite 0.72 with lip sync the weakest failing aspect.
pub fn weak_lip_sync() -> QaScore {
    score([0.4, 0.9, 0.8, 0.8, 0.8, 0.8])
}

pub fn approved(value: f64) -> QaScore {
    QaScore::uniform(value).unwrap()
}

pub fn fast_settings() -> animatr::render::RenderSettings {
    animatr::render::RenderSettings {
        slots: 2,
        cancel_grace: Duration::from_millis(100),
        collaborator_timeout: Duration::from_secs(5),
        retain_finished: 64,
    }
}
