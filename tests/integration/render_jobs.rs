use animatr::error::JobError;
use animatr::intake::InputClassifier;
use animatr::pipeline::{PipelineExecutor, ProductionPlan, SpecArtifact, StageContext};
use animatr::progress::HistoryRuntime;
use animatr::render::{
    CancelOutcome, JobId, JobStatus, ProjectId, RenderJob, RenderJobManager, RenderSettings,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::integration::support::{
    fast_settings, RenderMode, ScriptedRender, ScriptedStages, SPEC_YAML,
};

async fn artifact(run_id: &str, project: ProjectId) -> SpecArtifact {
    let request = Arc::new(InputClassifier::new().classify_str(SPEC_YAML).unwrap());
    let plan = ProductionPlan::for_kind(request.kind());
    PipelineExecutor::new(ScriptedStages::new(), None)
        .run(&plan, StageContext::new(run_id, project, request))
        .await
        .unwrap()
        .artifact
}

async fn wait_for<F>(manager: &RenderJobManager, id: JobId, check: F) -> RenderJob
where
    F: Fn(&RenderJob) -> bool,
{
    for _ in 0..400 {
        let job = manager.status(id).unwrap();
        if check(&job) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never reached the expected state");
}

#[tokio::test]
async fn completed_job_is_recorded_in_history() {
    let temp_dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryRuntime::open(&temp_dir.path().join("history")).unwrap());
    let manager = RenderJobManager::new(
        ScriptedRender::new(RenderMode::Complete),
        fast_settings(),
        Some(history.clone()),
    );

    let project = ProjectId::new();
    let id = manager.submit(artifact("run-render", project).await).unwrap();
    let job = manager.wait(id).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 1.0);
    assert_eq!(job.completed_scenes, 2);
    assert_eq!(job.output.as_deref(), Some("renders/run-render-v0.mp4"));
    assert!(job.completed_at.is_some());
    assert!(manager.active_job(project).is_none());

    let stored = history.store().read_jobs("run-render").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, JobStatus::Completed);

    let types: Vec<String> = history
        .store()
        .read_events("run-render")
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        types,
        vec!["job_pending", "job_queued", "job_processing", "job_completed"]
    );
}

#[tokio::test]
async fn slots_are_shared_across_projects() {
    let settings = RenderSettings {
        slots: 1,
        ..fast_settings()
    };
    let manager = RenderJobManager::new(
        ScriptedRender::new(RenderMode::HoldUntilCancelled),
        settings,
        None,
    );

    let first = manager.submit(artifact("run-a", ProjectId::new()).await).unwrap();
    wait_for(&manager, first, |job| job.status == JobStatus::Processing).await;

    let second = manager.submit(artifact("run-b", ProjectId::new()).await).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.status(second).unwrap().status, JobStatus::Queued);

    assert_eq!(manager.cancel(first).unwrap(), CancelOutcome::Requested);
    let first = manager.wait(first).await.unwrap();
    assert_eq!(first.status, JobStatus::Cancelled);
    assert!(!first.forced_cancel);

    wait_for(&manager, second, |job| job.status == JobStatus::Processing).await;
    manager.shutdown();
    assert_eq!(manager.wait(second).await.unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn project_accepts_a_new_job_once_the_previous_one_ends() {
    let manager = RenderJobManager::new(
        ScriptedRender::new(RenderMode::Fail),
        fast_settings(),
        None,
    );
    let project = ProjectId::new();
    let artifact = artifact("run-1", project).await;

    let first = manager.submit(artifact.clone()).unwrap();
    assert!(matches!(
        manager.submit(artifact.clone()),
        Err(JobError::ProjectBusy { active, .. }) if active == first
    ));

    let failed = manager.wait(first).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("tts quota exceeded"));

    let second = manager.submit(artifact).unwrap();
    manager.wait(second).await.unwrap();
    let jobs = manager.list_jobs(project);
    assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![first, second]);
    assert_eq!(manager.cancel(second).unwrap(), CancelOutcome::NotCancellable);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listing_jobs_while_submitting_never_stalls() {
    const JOBS: usize = 400;
    let settings = RenderSettings {
        slots: 4,
        retain_finished: JOBS,
        ..fast_settings()
    };
    let manager = RenderJobManager::new(ScriptedRender::new(RenderMode::Complete), settings, None);

    let projects: Vec<ProjectId> = (0..JOBS).map(|_| ProjectId::new()).collect();
    let mut artifacts = Vec::with_capacity(JOBS);
    for (n, project) in projects.iter().enumerate() {
        artifacts.push(artifact(&format!("run-{n}"), *project).await);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handle = tokio::runtime::Handle::current();
    let listers: Vec<_> = (0..2)
        .map(|offset| {
            let manager = manager.clone();
            let projects = projects.clone();
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || {
                let mut n = offset;
                while !stop.load(Ordering::SeqCst) {
                    manager.list_jobs(projects[n % projects.len()]);
                    n += 1;
                }
            })
        })
        .collect();

    let half = artifacts.split_off(JOBS / 2);
    let submitters: Vec<_> = [artifacts, half]
        .into_iter()
        .map(|batch| {
            let manager = manager.clone();
            let handle = handle.clone();
            tokio::task::spawn_blocking(move || {
                let _runtime = handle.enter();
                batch
                    .into_iter()
                    .map(|artifact| manager.submit(artifact).unwrap())
                    .collect::<Vec<JobId>>()
            })
        })
        .collect();

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        let mut ids = Vec::new();
        for submitter in submitters {
            ids.extend(submitter.await.unwrap());
        }
        let mut jobs = Vec::new();
        for id in &ids {
            jobs.push(manager.wait(*id).await.unwrap());
        }
        jobs
    })
    .await;
    stop.store(true, Ordering::SeqCst);
    for lister in listers {
        lister.await.unwrap();
    }

    let jobs = finished.expect("submitting and listing stalled");
    assert_eq!(jobs.len(), JOBS);
    assert!(jobs.iter().all(|job| job.status == JobStatus::Completed));
    assert!(projects.iter().all(|project| manager.active_job(*project).is_none()));
}
