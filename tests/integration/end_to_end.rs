//! Full production runs against scripted collaborators.

use animatr::error::{ClassificationError, ProductionError};
use animatr::feedback::{Aspect, Decision};
use animatr::intake::InputKind;
use animatr::pipeline::Stage;
use animatr::production::{Collaborators, Production, RunOutcome};
use animatr::render::{CancelOutcome, JobStatus, ProjectId};
use std::sync::Arc;
use std::time::Duration;

use crate::integration::support::{
    approved, fast_settings, weak_dialogue, weak_lip_sync, RenderMode, ScriptedQa,
    ScriptedRender, ScriptedStages, BRIEF, SPEC_YAML,
};

fn production(
    stages: Arc<ScriptedStages>,
    render: Arc<ScriptedRender>,
    qa: Arc<ScriptedQa>,
) -> Production {
    Production::new(
        Collaborators { stages, render, qa },
        fast_settings(),
        None,
    )
}

#[tokio::test]
async fn brief_is_revised_once_then_delivered() {
    let stages = ScriptedStages::new();
    let render = ScriptedRender::new(RenderMode::Complete);
    let production = production(
        stages.clone(),
        render.clone(),
        ScriptedQa::new(vec![weak_dialogue(), approved(0.86)]),
    );

    let run = production.submit_production(BRIEF.as_bytes()).unwrap();
    let outcome = production.wait_for_outcome(run).await.unwrap();

    match &outcome {
        RunOutcome::Delivered { path, composite, iterations } => {
            assert_eq!(path, &format!("renders/{run}-v1.mp4"));
            assert!((composite - 0.86).abs() < 1e-9);
            assert_eq!(*iterations, 1);
        }
        other => panic!("expected delivery, got {other:?}"),
    }

    // Scripting re-entry reruns design and synthesis in the next iteration.
    let calls = stages.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            (Stage::Scripting, 0),
            (Stage::Design, 0),
            (Stage::SpecSynthesis, 0),
            (Stage::Scripting, 1),
            (Stage::Design, 1),
            (Stage::SpecSynthesis, 1),
        ]
    );
    assert_eq!(render.count(), 2);

    let report = production.run_report(run).unwrap();
    assert_eq!(report.kind, InputKind::Brief);
    assert_eq!(report.jobs.len(), 2);
    assert!(report.jobs.iter().all(|job| job.status == JobStatus::Completed));
    assert_eq!(report.revision_notes.len(), 1);
    assert_eq!(report.revision_notes[0].aspect, Aspect::Dialogue);
    assert_eq!(report.revision_notes[0].iteration, 1);
    assert!(report.feedback.approved);
    assert_eq!(report.feedback.evaluations, 2);
    assert!((report.feedback.score_progression[0] - 0.72).abs() < 1e-9);
}

#[tokio::test]
async fn valid_spec_goes_straight_to_render() {
    let stages = ScriptedStages::new();
    let production = production(
        stages.clone(),
        ScriptedRender::new(RenderMode::Complete),
        ScriptedQa::new(vec![approved(0.90)]),
    );

    let run = production.submit_production(SPEC_YAML.as_bytes()).unwrap();
    let outcome = production.wait_for_outcome(run).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Delivered { iterations: 0, .. }));
    assert!(stages.calls.lock().is_empty());
    let report = production.run_report(run).unwrap();
    assert_eq!(report.kind, InputKind::SpecBypass);
    assert!(report.revision_notes.is_empty());
}

#[tokio::test]
async fn render_revision_reuses_the_spec() {
    let stages = ScriptedStages::new();
    let render = ScriptedRender::new(RenderMode::Complete);
    let production = production(
        stages.clone(),
        render.clone(),
        ScriptedQa::new(vec![weak_lip_sync(), approved(0.82)]),
    );

    let run = production.submit_production(BRIEF.as_bytes()).unwrap();
    let outcome = production.wait_for_outcome(run).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Delivered { iterations: 1, .. }));
    assert_eq!(stages.calls.lock().len(), 3);
    assert_eq!(render.count(), 2);
}

#[tokio::test]
async fn run_escalates_after_three_revisions() {
    let production = production(
        ScriptedStages::new(),
        ScriptedRender::new(RenderMode::Complete),
        ScriptedQa::new(vec![
            weak_dialogue(),
            weak_dialogue(),
            weak_lip_sync(),
            weak_dialogue(),
        ]),
    );

    let run = production.submit_production(BRIEF.as_bytes()).unwrap();
    let outcome = production.wait_for_outcome(run).await.unwrap();

    match outcome {
        RunOutcome::Escalated { iterations, .. } => assert_eq!(iterations, 3),
        other => panic!("expected escalation, got {other:?}"),
    }
    let report = production.run_report(run).unwrap();
    assert_eq!(report.evaluations.len(), 4);
    assert_eq!(report.evaluations[3].decision, Decision::Escalate);
    assert_eq!(report.jobs.len(), 4);
    assert!(report.feedback.escalated);
}

#[tokio::test]
async fn stage_failure_ends_the_run_without_rendering() {
    let render = ScriptedRender::new(RenderMode::Complete);
    let production = production(
        ScriptedStages::failing_at(Stage::Design),
        render.clone(),
        ScriptedQa::new(Vec::new()),
    );

    let run = production.submit_production(BRIEF.as_bytes()).unwrap();
    let outcome = production.wait_for_outcome(run).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { stage: Stage::Design, .. }));
    assert_eq!(render.count(), 0);
}

#[tokio::test]
async fn render_failure_fails_the_run_at_render() {
    let production = production(
        ScriptedStages::new(),
        ScriptedRender::new(RenderMode::Fail),
        ScriptedQa::new(Vec::new()),
    );

    let run = production.submit_production(SPEC_YAML.as_bytes()).unwrap();
    match production.wait_for_outcome(run).await.unwrap() {
        RunOutcome::Failed { stage, reason } => {
            assert_eq!(stage, Stage::Render);
            assert!(reason.contains("tts quota exceeded"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelling_the_render_job_cancels_the_run() {
    let production = production(
        ScriptedStages::new(),
        ScriptedRender::new(RenderMode::HoldUntilCancelled),
        ScriptedQa::new(Vec::new()),
    );
    let project = ProjectId::new();
    let run = production
        .submit_production_for(project, SPEC_YAML.as_bytes())
        .unwrap();

    let mut job = None;
    for _ in 0..400 {
        if let Some(found) = production
            .project_jobs(project)
            .into_iter()
            .find(|j| j.status == JobStatus::Processing)
        {
            job = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let job = job.expect("render job should start processing");
    assert_eq!(production.get_job_status(job.id).unwrap().current_scene.as_deref(), Some("s1"));

    assert_eq!(production.cancel_job(job.id).unwrap(), CancelOutcome::Requested);
    let outcome = production.wait_for_outcome(run).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Cancelled {
            job: job.id,
            forced: false
        }
    );
    assert_eq!(production.cancel_job(job.id).unwrap(), CancelOutcome::NotCancellable);
}

#[tokio::test]
async fn unclassifiable_input_is_rejected_at_submission() {
    let production = production(
        ScriptedStages::new(),
        ScriptedRender::new(RenderMode::Complete),
        ScriptedQa::new(Vec::new()),
    );
    assert!(matches!(
        production.submit_production(b"  \n"),
        Err(ProductionError::Classification(ClassificationError::Empty))
    ));
}

#[tokio::test]
async fn only_the_newest_finished_runs_stay_queryable() {
    let settings = animatr::render::RenderSettings {
        retain_finished: 1,
        ..fast_settings()
    };
    let production = Production::new(
        Collaborators {
            stages: ScriptedStages::new(),
            render: ScriptedRender::new(RenderMode::Complete),
            qa: ScriptedQa::new(vec![approved(0.9), approved(0.9)]),
        },
        settings,
        None,
    );

    let first = production.submit_production(SPEC_YAML.as_bytes()).unwrap();
    assert!(matches!(
        production.wait_for_outcome(first).await.unwrap(),
        RunOutcome::Delivered { .. }
    ));
    let second = production.submit_production(SPEC_YAML.as_bytes()).unwrap();
    assert!(matches!(
        production.wait_for_outcome(second).await.unwrap(),
        RunOutcome::Delivered { .. }
    ));

    assert!(matches!(
        production.get_run_outcome(first),
        Err(ProductionError::RunNotFound(_))
    ));
    assert!(production.get_run_outcome(second).is_ok());
}
