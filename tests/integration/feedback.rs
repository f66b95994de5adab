use animatr::error::FeedbackError;
use animatr::feedback::{
    decide, Aspect, Decision, FeedbackController, FeedbackState, QaIssue, MAX_ITERATIONS,
};
use animatr::intake::InputClassifier;
use animatr::pipeline::{PipelineExecutor, ProductionPlan, SpecArtifact, Stage, StageContext};
use animatr::progress::HistoryRuntime;
use animatr::render::{JobStatus, ProjectId, RenderJob, RenderJobManager};
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::support::{
    approved, fast_settings, weak_dialogue, weak_lip_sync, RenderMode, ScriptedQa,
    ScriptedRender, ScriptedStages, BRIEF,
};

async fn rendered(run_id: &str) -> (SpecArtifact, RenderJob) {
    let request = Arc::new(InputClassifier::new().classify_str(BRIEF).unwrap());
    let plan = ProductionPlan::for_kind(request.kind());
    let artifact = PipelineExecutor::new(ScriptedStages::new(), None)
        .run(&plan, StageContext::new(run_id, ProjectId::new(), request))
        .await
        .unwrap()
        .artifact;
    let manager = RenderJobManager::new(
        ScriptedRender::new(RenderMode::Complete),
        fast_settings(),
        None,
    );
    let id = manager.submit(artifact.clone()).unwrap();
    let job = manager.wait(id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    (artifact, job)
}

#[tokio::test]
async fn revisions_are_routed_until_the_cap_then_escalated() {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryRuntime::open(&temp_dir.path().join("history")).unwrap());
    let qa = ScriptedQa::new(vec![
        weak_dialogue(),
        weak_lip_sync(),
        weak_dialogue(),
        weak_dialogue(),
    ]);
    let controller = FeedbackController::new(qa, Some(history.clone()));
    let (artifact, job) = rendered("run-feedback").await;
    let mut state = FeedbackState::new();

    let first = controller.evaluate(&mut state, &artifact, &job).await.unwrap();
    assert!(matches!(
        first.decision,
        Decision::Revise { stage: Stage::Scripting, aspect: Aspect::Dialogue, .. }
    ));
    assert!((first.composite - 0.72).abs() < 1e-9);
    assert_eq!(first.revision_note().unwrap().iteration, 1);

    let second = controller.evaluate(&mut state, &artifact, &job).await.unwrap();
    assert!(matches!(
        second.decision,
        Decision::Revise { stage: Stage::Render, aspect: Aspect::LipSync, .. }
    ));

    controller.evaluate(&mut state, &artifact, &job).await.unwrap();
    assert_eq!(state.iteration(), MAX_ITERATIONS);

    let last = controller.evaluate(&mut state, &artifact, &job).await.unwrap();
    assert_eq!(last.decision, Decision::Escalate);
    assert_eq!(state.iteration(), MAX_ITERATIONS);

    let summary = state.summary();
    assert_eq!(summary.evaluations, 4);
    assert!(summary.escalated);
    assert!(!summary.approved);

    let stored = history.store().read_qa("run-feedback").unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored[3].record.decision, Decision::Escalate);
    let qa_events = history
        .store()
        .read_events("run-feedback")
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == "qa_evaluated")
        .count();
    assert_eq!(qa_events, 4);
}

#[tokio::test]
async fn scorer_failure_is_reported_and_not_recorded() {
    let controller = FeedbackController::new(ScriptedQa::new(Vec::new()), None);
    let (artifact, job) = rendered("run-empty").await;
    let mut state = FeedbackState::new();

    assert!(matches!(
        controller.evaluate(&mut state, &artifact, &job).await,
        Err(FeedbackError::Scorer(_))
    ));
    assert!(state.history().is_empty());
}

#[tokio::test]
async fn unfinished_job_cannot_be_scored() {
    let controller = FeedbackController::new(ScriptedQa::new(vec![approved(0.9)]), None);
    let (artifact, mut job) = rendered("run-unfinished").await;
    job.status = JobStatus::Failed;
    job.output = None;

    let mut state = FeedbackState::new();
    assert_eq!(
        controller.evaluate(&mut state, &artifact, &job).await.unwrap_err(),
        FeedbackError::JobNotCompleted(job.id)
    );
}

#[test]
fn critical_issue_blocks_approval_and_names_the_aspect() {
    let score = approved(0.95).with_issue(QaIssue {
        aspect: Aspect::Visual,
        description: "character clips through the frame".to_string(),
        critical: true,
    });
    assert!(score.composite() > 0.9);

    match decide(0, &score) {
        Decision::Revise { stage, aspect, reason } => {
            assert_eq!(stage, Stage::Design);
            assert_eq!(aspect, Aspect::Visual);
            assert!(reason.ends_with("critical issue flagged"));
        }
        other => panic!("expected a revision, got {other:?}"),
    }
}
