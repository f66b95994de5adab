//! Render jobs: lifecycle, the render collaborator seam, and the job manager.

pub mod collaborator;
pub mod job;
pub mod manager;

pub use collaborator::{ProgressReporter, RenderCollaborator, RenderOutcome};
pub use job::{CancelOutcome, JobId, JobStatus, ProjectId, RenderJob};
pub use manager::{RenderJobManager, RenderSettings};
