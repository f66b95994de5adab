use animatr::error::PipelineError;
use animatr::intake::InputClassifier;
use animatr::pipeline::{PipelineExecutor, ProductionPlan, Stage, StageContext};
use animatr::progress::HistoryRuntime;
use animatr::render::ProjectId;
use std::sync::Arc;
use tempfile::TempDir;

use crate::integration::support::{ScriptedStages, BRIEF};

fn context(raw: &str) -> (ProductionPlan, StageContext) {
    let request = Arc::new(InputClassifier::new().classify_str(raw).unwrap());
    let plan = ProductionPlan::for_kind(request.kind());
    (plan, StageContext::new("run-pipeline", ProjectId::new(), request))
}

#[tokio::test]
async fn prompt_runs_every_authoring_stage_and_requests_discovery() {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryRuntime::open(&temp_dir.path().join("history")).unwrap());
    let stages = ScriptedStages::new();
    let executor = PipelineExecutor::new(stages.clone(), Some(history.clone()));

    let (plan, ctx) = context("a calm explainer about tides");
    let output = executor.run(&plan, ctx).await.unwrap();

    assert_eq!(stages.stages(), Stage::AUTHORING.to_vec());
    assert_eq!(output.artifact.spec().scene_count(), 2);
    assert_eq!(output.context.completed_stages(), &Stage::AUTHORING);

    let events = history.store().read_events("run-pipeline").unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types.first(), Some(&"stage_started"));
    assert!(types.contains(&"discovery_requested"));
    assert_eq!(types.iter().filter(|t| **t == "stage_completed").count(), 4);
    assert_eq!(types.last(), Some(&"spec_synthesized"));
    assert!(events.windows(2).all(|w| w[1].seq == w[0].seq + 1));
}

#[tokio::test]
async fn failing_stage_stops_downstream_work() {
    let stages = ScriptedStages::failing_at(Stage::Design);
    let executor = PipelineExecutor::new(stages.clone(), None);

    let (plan, ctx) = context(BRIEF);
    let err = executor.run(&plan, ctx).await.unwrap_err();

    match err {
        PipelineError::Stage(failure) => assert_eq!(failure.stage, Stage::Design),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stages.stages(), vec![Stage::Scripting, Stage::Design]);
}

#[tokio::test]
async fn resume_reruns_only_downstream_stages() {
    let stages = ScriptedStages::new();
    let executor = PipelineExecutor::new(stages.clone(), None);

    let (plan, ctx) = context(BRIEF);
    let first = executor.run(&plan, ctx).await.unwrap();
    stages.calls.lock().clear();

    let revised = executor.resume_at(Stage::Design, first.context).await.unwrap();
    assert_eq!(stages.stages(), vec![Stage::Design, Stage::SpecSynthesis]);
    assert_eq!(revised.artifact.spec(), first.artifact.spec());
}

#[tokio::test]
async fn resume_after_render_is_rejected() {
    let executor = PipelineExecutor::new(ScriptedStages::new(), None);
    let (_, ctx) = context(BRIEF);
    assert_eq!(
        executor.resume_at(Stage::Delivery, ctx).await.unwrap_err(),
        PipelineError::NotAPipelineStage(Stage::Delivery)
    );
}
