use crate::feedback::RevisionNote;
use crate::intake::ProductionRequest;
use crate::pipeline::stage::Stage;
use crate::render::ProjectId;
use crate::schema::{AnimationSpec, ValidSpec};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Accumulated artifacts handed from stage to stage.
///
/// Stage collaborators receive the context by value and return it with their
/// outputs added. The request it was built from cannot be replaced.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: String,
    project_id: ProjectId,
    request: Arc<ProductionRequest>,
    artifacts: BTreeMap<String, Value>,
    spec: Option<AnimationSpec>,
    iteration: u32,
    revision_notes: Vec<RevisionNote>,
    completed: Vec<Stage>,
}

impl StageContext {
    /// Start a context for `request`. Spec-bypass requests are seeded with their spec.
    pub fn new(
        run_id: impl Into<String>,
        project_id: ProjectId,
        request: Arc<ProductionRequest>,
    ) -> Self {
        let spec = request.spec().map(|valid| valid.spec().clone());
        Self {
            run_id: run_id.into(),
            project_id,
            request,
            artifacts: BTreeMap::new(),
            spec,
            iteration: 0,
            revision_notes: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn request(&self) -> &ProductionRequest {
        &self.request
    }

    /// Intake should run its discovery sub-step.
    pub fn discovery(&self) -> bool {
        self.request.needs_discovery()
    }

    pub fn artifact(&self, name: &str) -> Option<&Value> {
        self.artifacts.get(name)
    }

    pub fn artifacts(&self) -> &BTreeMap<String, Value> {
        &self.artifacts
    }

    pub fn put_artifact(&mut self, name: impl Into<String>, value: Value) {
        self.artifacts.insert(name.into(), value);
    }

    pub fn spec(&self) -> Option<&AnimationSpec> {
        self.spec.as_ref()
    }

    pub fn set_spec(&mut self, spec: AnimationSpec) {
        self.spec = Some(spec);
    }

    /// Number of revisions requested so far; 0 on the first pass.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn revision_notes(&self) -> &[RevisionNote] {
        &self.revision_notes
    }

    pub fn latest_revision(&self) -> Option<&RevisionNote> {
        self.revision_notes.last()
    }

    /// Stages completed on this context, in execution order across all passes.
    pub fn completed_stages(&self) -> &[Stage] {
        &self.completed
    }

    pub(crate) fn begin_revision(&mut self, note: RevisionNote) {
        self.iteration = note.iteration;
        self.revision_notes.push(note);
    }

    pub(crate) fn mark_completed(&mut self, stage: Stage) {
        self.completed.push(stage);
    }
}

/// A complete renderable spec: the contract handed to the render job manager.
#[derive(Debug, Clone, Serialize)]
pub struct SpecArtifact {
    run_id: String,
    project_id: ProjectId,
    iteration: u32,
    spec: ValidSpec,
    revision_notes: Vec<RevisionNote>,
}

impl SpecArtifact {
    pub(crate) fn from_context(context: &StageContext, spec: ValidSpec) -> Self {
        Self {
            run_id: context.run_id.clone(),
            project_id: context.project_id,
            iteration: context.iteration,
            spec,
            revision_notes: context.revision_notes.clone(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn spec(&self) -> &AnimationSpec {
        self.spec.spec()
    }

    pub fn valid_spec(&self) -> &ValidSpec {
        &self.spec
    }

    /// Revision notes addressed to the stages that produced this artifact.
    pub fn revision_notes(&self) -> &[RevisionNote] {
        &self.revision_notes
    }
}
