//! Production runs: the outbound interface combining classifier, pipeline, render jobs and QA.

pub mod orchestrator;
pub mod run;

pub use orchestrator::{Collaborators, Production};
pub use run::{RunId, RunOutcome, RunReport};
