use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Owner of render jobs. At most one job per project is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Queued or processing: holds the project's single active slot.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Processing)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: JobId,
    pub project_id: ProjectId,
    pub status: JobStatus,
    /// Fraction in `[0.0, 1.0]`, non-decreasing while processing.
    pub progress: f64,
    pub current_scene: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub total_scenes: usize,
    pub completed_scenes: usize,
    pub cancel_requested: bool,
    /// Cancelled after the grace period without collaborator acknowledgement.
    pub forced_cancel: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RenderJob {
    pub(crate) fn new(project_id: ProjectId, total_scenes: usize) -> Self {
        Self {
            id: JobId::new(),
            project_id,
            status: JobStatus::Pending,
            progress: 0.0,
            current_scene: None,
            output: None,
            error: None,
            total_scenes,
            completed_scenes: 0,
            cancel_requested: false,
            forced_cancel: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a progress update. Rejected unless processing, in range, and not below current progress.
    pub(crate) fn apply_progress(&mut self, progress: f64, scene: Option<&str>) -> bool {
        if self.status != JobStatus::Processing
            || !(0.0..=1.0).contains(&progress)
            || progress < self.progress
        {
            return false;
        }
        self.progress = progress;
        if let Some(scene) = scene {
            self.current_scene = Some(scene.to_string());
        }
        true
    }

    pub(crate) fn apply_scene_completed(&mut self, scene: &str) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        self.completed_scenes = (self.completed_scenes + 1).min(self.total_scenes.max(1));
        if self.total_scenes > 0 {
            let fraction = self.completed_scenes as f64 / self.total_scenes as f64;
            self.progress = self.progress.max(fraction.min(1.0));
        }
        self.current_scene = Some(scene.to_string());
        true
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was cancelled, or cancellation is now pending collaborator acknowledgement.
    Requested,
    /// The job had already reached a terminal state; nothing changed.
    NotCancellable,
}
