use crate::error::JobFailure;
use crate::pipeline::SpecArtifact;
use crate::render::job::JobId;
use crate::render::manager::JobEntry;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// How a render collaborator finished a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed { output: String },
    /// Stopped in response to a cancellation request.
    Cancelled,
}

/// Render/TTS capability that turns a spec artifact into an output file.
///
/// Implementations should watch `cancel` and return [`RenderOutcome::Cancelled`]
/// once they have stopped.
#[async_trait]
pub trait RenderCollaborator: Send + Sync {
    async fn render(
        &self,
        artifact: &SpecArtifact,
        reporter: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<RenderOutcome, JobFailure>;
}

/// Progress channel from a render collaborator back to its job.
#[derive(Clone)]
pub struct ProgressReporter {
    entry: Arc<JobEntry>,
}

impl ProgressReporter {
    pub(crate) fn new(entry: Arc<JobEntry>) -> Self {
        Self { entry }
    }

    pub fn job_id(&self) -> JobId {
        self.entry.id()
    }

    /// Report overall progress. Returns whether the update was applied.
    pub fn report(&self, progress: f64, scene: Option<&str>) -> bool {
        let applied = self.entry.update(|job| job.apply_progress(progress, scene));
        if !applied {
            warn!(
                job_id = %self.entry.id(),
                progress,
                "rejected render progress update"
            );
        }
        applied
    }

    pub fn scene_completed(&self, scene: &str) -> bool {
        let applied = self.entry.update(|job| job.apply_scene_completed(scene));
        if !applied {
            warn!(job_id = %self.entry.id(), scene, "rejected scene completion");
        }
        applied
    }

    pub fn cancel_requested(&self) -> bool {
        self.entry.snapshot().cancel_requested
    }
}
