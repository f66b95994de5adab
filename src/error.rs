//! Error types for the production orchestration core.
//!
//! Every error the core surfaces names the component that produced it. Benign
//! outcomes (a job that cannot be cancelled, a run escalated to human review)
//! are values, not errors.

use crate::pipeline::Stage;
use crate::render::{JobId, JobStatus, ProjectId};
use thiserror::Error;

/// Raw input could not be turned into a production request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("Input is empty")]
    Empty,

    #[error("Input is unreadable: {0}")]
    Unreadable(String),
}

/// A collaborator failed to complete a pipeline stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage {stage} failed: {cause}")]
pub struct StageFailure {
    pub stage: Stage,
    pub cause: String,
}

impl StageFailure {
    pub fn new(stage: Stage, cause: impl Into<String>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

/// Stage pipeline errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error("No renderable spec after {0}")]
    MissingSpec(Stage),

    #[error("Stage {0} cannot be executed by the stage pipeline")]
    NotAPipelineStage(Stage),

    #[error("Synthesized spec is invalid: {0}")]
    InvalidSpec(String),
}

/// Render job manager errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Render job not found: {0}")]
    NotFound(JobId),

    #[error("Project {project} already has an active render job {active}")]
    ProjectBusy { project: ProjectId, active: JobId },

    #[error("Render job {job} cannot move from {from} to {to}")]
    InvalidTransition {
        job: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Render job manager is shut down")]
    ShutDown,
}

/// Render collaborator failure reported for a single job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobFailure {
    #[error("Render collaborator failed: {0}")]
    Collaborator(String),

    #[error("Render collaborator timed out after {0} ms")]
    TimedOut(u64),
}

/// Feedback loop errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedbackError {
    #[error("Aspect score for {aspect} out of range: {value}")]
    InvalidScore { aspect: String, value: f64 },

    #[error("Missing aspect score: {0}")]
    MissingScore(String),

    #[error("Render job {0} has not completed with an output")]
    JobNotCompleted(JobId),

    #[error("QA scorer failed: {0}")]
    Scorer(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(String),

    #[error("Configuration validation failed:\n{0}")]
    Invalid(String),

    #[error("Global configuration already initialized")]
    AlreadyInitialized,

    #[error("Global configuration not initialized")]
    NotInitialized,
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Load(err.to_string())
    }
}

/// Top-level errors returned by the production facade.
#[derive(Debug, Error)]
pub enum ProductionError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Production run not found: {0}")]
    RunNotFound(String),
}
