//! Render job manager
//!
//! Accepts spec artifacts as render jobs, runs them on a bounded number of render
//! slots, and keeps one active job per project. Cancellation is cooperative: the
//! collaborator is asked to stop and the job is forced to `cancelled` only after the
//! grace period runs out.

use crate::config::RenderConfig;
use crate::error::{JobError, JobFailure};
use crate::pipeline::SpecArtifact;
use crate::progress::{HistoryRuntime, JobEventData};
use crate::render::collaborator::{ProgressReporter, RenderCollaborator, RenderOutcome};
use crate::render::job::{CancelOutcome, JobId, JobStatus, ProjectId, RenderJob};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-job state shared between the manager, the job task and the progress reporter.
pub(crate) struct JobEntry {
    id: JobId,
    run_id: String,
    job: Mutex<RenderJob>,
    cancel: CancellationToken,
    watch_tx: watch::Sender<RenderJob>,
}

impl JobEntry {
    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn snapshot(&self) -> RenderJob {
        self.job.lock().clone()
    }

    /// Mutate the job under its lock; publishes the new snapshot when `apply` returns true.
    pub(crate) fn update<F>(&self, apply: F) -> bool
    where
        F: FnOnce(&mut RenderJob) -> bool,
    {
        let snapshot = {
            let mut job = self.job.lock();
            if !apply(&mut job) {
                return false;
            }
            job.clone()
        };
        self.watch_tx.send_replace(snapshot);
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub slots: usize,
    pub cancel_grace: Duration,
    pub collaborator_timeout: Duration,
    /// Terminal jobs kept in memory for status queries.
    pub retain_finished: usize,
}

impl From<&RenderConfig> for RenderSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            slots: config.slots.max(1),
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            collaborator_timeout: Duration::from_millis(config.collaborator_timeout_ms),
            retain_finished: config.retain_finished.max(1),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

struct ManagerInner {
    collaborator: Arc<dyn RenderCollaborator>,
    settings: RenderSettings,
    slots: Arc<Semaphore>,
    jobs: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    active: Mutex<HashMap<ProjectId, JobId>>,
    finished: Mutex<VecDeque<JobId>>,
    history: Option<Arc<HistoryRuntime>>,
    shut_down: AtomicBool,
}

#[derive(Clone)]
pub struct RenderJobManager {
    inner: Arc<ManagerInner>,
}

impl RenderJobManager {
    pub fn new(
        collaborator: Arc<dyn RenderCollaborator>,
        settings: RenderSettings,
        history: Option<Arc<HistoryRuntime>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                collaborator,
                settings,
                slots: Arc::new(Semaphore::new(settings.slots)),
                jobs: RwLock::new(HashMap::new()),
                active: Mutex::new(HashMap::new()),
                finished: Mutex::new(VecDeque::new()),
                history,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Accept `artifact` as a new render job for its project.
    ///
    /// Rejected with [`JobError::ProjectBusy`] while the project already has a queued or
    /// processing job. Must be called from within a tokio runtime.
    pub fn submit(&self, artifact: SpecArtifact) -> Result<JobId, JobError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(JobError::ShutDown);
        }
        let project = artifact.project_id();

        let mut job = RenderJob::new(project, artifact.spec().scene_count());
        let pending = job.clone();
        job.status = JobStatus::Queued;
        let (watch_tx, _) = watch::channel(job.clone());
        let entry = Arc::new(JobEntry {
            id: job.id,
            run_id: artifact.run_id().to_string(),
            job: Mutex::new(job),
            cancel: CancellationToken::new(),
            watch_tx,
        });

        // Lock order: no lock is held while another is taken. `active` is the reservation.
        let busy = {
            let mut active = self.inner.active.lock();
            match active.get(&project) {
                Some(active_job) => Some(*active_job),
                None => {
                    active.insert(project, entry.id);
                    None
                }
            }
        };
        if let Some(active_job) = busy {
            warn!(project_id = %project, active_job = %active_job, "project already has an active render job");
            return Err(JobError::ProjectBusy {
                project,
                active: active_job,
            });
        }

        self.inner.record(&entry.run_id, &pending);
        let snapshot = entry.snapshot();
        self.inner.record(&entry.run_id, &snapshot);
        self.inner.jobs.write().insert(entry.id, entry.clone());
        info!(
            job_id = %entry.id,
            project_id = %project,
            run_id = %entry.run_id,
            scenes = snapshot.total_scenes,
            "render job queued"
        );

        let job_id = entry.id;
        let inner = self.inner.clone();
        tokio::spawn(async move {
            ManagerInner::run_job(inner, entry, artifact).await;
        });
        Ok(job_id)
    }

    pub fn status(&self, id: JobId) -> Result<RenderJob, JobError> {
        self.inner.entry(id).map(|entry| entry.snapshot())
    }

    /// Request cancellation. Terminal jobs are left untouched.
    pub fn cancel(&self, id: JobId) -> Result<CancelOutcome, JobError> {
        let entry = self.inner.entry(id)?;
        loop {
            let status = entry.snapshot().status;
            match status {
                s if s.is_terminal() => {
                    debug!(job_id = %id, status = %s, "cancel ignored for terminal job");
                    return Ok(CancelOutcome::NotCancellable);
                }
                // Not yet accepted; only queued or processing jobs are cancellable.
                JobStatus::Pending => return Ok(CancelOutcome::NotCancellable),
                JobStatus::Queued => {
                    let cancelled = self.inner.transition(
                        &entry,
                        JobStatus::Queued,
                        JobStatus::Cancelled,
                        |job| job.cancel_requested = true,
                    );
                    if cancelled {
                        entry.cancel.cancel();
                        info!(job_id = %id, "queued render job cancelled");
                        return Ok(CancelOutcome::Requested);
                    }
                }
                _ => {
                    let requested = entry.update(|job| {
                        if job.status != JobStatus::Processing {
                            return false;
                        }
                        job.cancel_requested = true;
                        true
                    });
                    if requested {
                        entry.cancel.cancel();
                        self.inner.emit(&entry.run_id, "job_cancel_requested", &entry.snapshot(), None);
                        info!(job_id = %id, "cancellation requested from render collaborator");
                        return Ok(CancelOutcome::Requested);
                    }
                }
            }
        }
    }

    /// Wait until the job reaches a terminal state and return that snapshot.
    pub async fn wait(&self, id: JobId) -> Result<RenderJob, JobError> {
        let entry = self.inner.entry(id)?;
        let mut rx = entry.watch_tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.status.is_terminal() {
                return Ok(current);
            }
            if rx.changed().await.is_err() {
                return Ok(entry.snapshot());
            }
        }
    }

    /// The project's queued or processing job, if any.
    pub fn active_job(&self, project: ProjectId) -> Option<RenderJob> {
        let id = self.inner.active.lock().get(&project).copied()?;
        self.status(id).ok()
    }

    /// Jobs for `project` still held in memory, oldest first.
    pub fn list_jobs(&self, project: ProjectId) -> Vec<RenderJob> {
        let entries: Vec<Arc<JobEntry>> = self.inner.jobs.read().values().cloned().collect();
        let mut jobs: Vec<RenderJob> = entries
            .iter()
            .map(|entry| entry.snapshot())
            .filter(|job| job.project_id == project)
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Stop accepting jobs, cancel queued ones and ask running collaborators to stop.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.slots.close();
        let entries: Vec<Arc<JobEntry>> = self.inner.jobs.read().values().cloned().collect();
        for entry in entries {
            if entry.snapshot().status.is_terminal() {
                continue;
            }
            if let Err(err) = self.cancel(entry.id) {
                warn!(job_id = %entry.id, error = %err, "failed to cancel render job during shutdown");
            }
        }
        info!("render job manager shut down");
    }
}

impl ManagerInner {
    fn entry(&self, id: JobId) -> Result<Arc<JobEntry>, JobError> {
        self.jobs.read().get(&id).cloned().ok_or(JobError::NotFound(id))
    }

    async fn run_job(inner: Arc<ManagerInner>, entry: Arc<JobEntry>, artifact: SpecArtifact) {
        let permit = tokio::select! {
            _ = entry.cancel.cancelled() => {
                inner.transition(&entry, JobStatus::Queued, JobStatus::Cancelled, |job| job.cancel_requested = true);
                return;
            }
            permit = inner.slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    inner.transition(&entry, JobStatus::Queued, JobStatus::Cancelled, |job| {
                        job.error = Some("render job manager shut down".to_string());
                    });
                    return;
                }
            },
        };

        let started = inner.transition(&entry, JobStatus::Queued, JobStatus::Processing, |job| {
            job.started_at = Some(Utc::now());
        });
        if !started {
            return;
        }

        let settings = inner.settings;
        let reporter = ProgressReporter::new(entry.clone());
        let render = inner
            .collaborator
            .render(&artifact, reporter, entry.cancel.clone());
        let grace_expired = async {
            entry.cancel.cancelled().await;
            tokio::time::sleep(settings.cancel_grace).await;
        };

        let result = tokio::select! {
            result = tokio::time::timeout(settings.collaborator_timeout, render) => Some(result),
            _ = grace_expired => None,
        };
        drop(permit);

        match result {
            None => {
                warn!(
                    job_id = %entry.id,
                    grace_ms = settings.cancel_grace.as_millis() as u64,
                    "render collaborator did not acknowledge cancellation; forcing"
                );
                inner.transition(&entry, JobStatus::Processing, JobStatus::Cancelled, |job| {
                    job.forced_cancel = true;
                });
            }
            Some(Ok(Ok(RenderOutcome::Completed { output }))) => {
                inner.transition(&entry, JobStatus::Processing, JobStatus::Completed, |job| {
                    job.progress = 1.0;
                    job.completed_scenes = job.total_scenes;
                    job.output = Some(output);
                });
            }
            Some(Ok(Ok(RenderOutcome::Cancelled))) => {
                if entry.snapshot().cancel_requested {
                    inner.transition(&entry, JobStatus::Processing, JobStatus::Cancelled, |_| {});
                } else {
                    inner.fail(&entry, "collaborator stopped without a cancellation request".to_string());
                }
            }
            Some(Ok(Err(failure))) => inner.fail(&entry, failure.to_string()),
            Some(Err(_elapsed)) => {
                let failure = JobFailure::TimedOut(settings.collaborator_timeout.as_millis() as u64);
                inner.fail(&entry, failure.to_string());
            }
        }
    }

    fn fail(&self, entry: &JobEntry, message: String) {
        error!(job_id = %entry.id, error = %message, "render job failed");
        self.transition(entry, JobStatus::Processing, JobStatus::Failed, |job| {
            job.error = Some(message);
        });
    }

    /// Move `entry` from `from` to `to`, applying `apply` under the job lock.
    /// Returns false without side effects if the job is no longer in `from`.
    fn transition<F>(&self, entry: &JobEntry, from: JobStatus, to: JobStatus, apply: F) -> bool
    where
        F: FnOnce(&mut RenderJob),
    {
        let snapshot = {
            let mut job = entry.job.lock();
            if job.status != from || !from.can_transition_to(to) {
                debug!(job_id = %entry.id, from = %from, to = %to, "render job transition skipped");
                return false;
            }
            job.status = to;
            apply(&mut job);
            if to.is_terminal() {
                job.completed_at = Some(Utc::now());
            }
            job.clone()
        };
        if to.is_terminal() {
            // Released before publishing so a waiter can resubmit for the project at once.
            let mut active = self.active.lock();
            if active.get(&snapshot.project_id) == Some(&entry.id) {
                active.remove(&snapshot.project_id);
            }
        }
        debug!(
            job_id = %entry.id,
            project_id = %snapshot.project_id,
            from = %from,
            to = %to,
            "render job transition"
        );
        // Waiters only observe states already recorded in history.
        self.record(&entry.run_id, &snapshot);
        entry.watch_tx.send_replace(snapshot);
        if to.is_terminal() {
            self.retire(entry.id);
        }
        true
    }

    /// Keep at most `retain_finished` terminal jobs in memory; older ones live on in history.
    fn retire(&self, id: JobId) {
        let evicted = {
            let mut finished = self.finished.lock();
            finished.push_back(id);
            if finished.len() > self.settings.retain_finished {
                finished.pop_front()
            } else {
                None
            }
        };
        if let Some(old) = evicted {
            self.jobs.write().remove(&old);
            debug!(job_id = %old, "evicted finished render job");
        }
    }

    fn record(&self, run_id: &str, job: &RenderJob) {
        if let Some(history) = &self.history {
            history.record_job_best_effort(run_id, job);
        }
        self.emit(run_id, &format!("job_{}", job.status.as_str()), job, job.error.clone());
    }

    fn emit(&self, run_id: &str, event_type: &str, job: &RenderJob, detail: Option<String>) {
        if let Some(history) = &self.history {
            let data = JobEventData {
                job_id: job.id.to_string(),
                project_id: job.project_id.to_string(),
                status: job.status.as_str().to_string(),
                progress: Some(job.progress),
                detail: detail.or_else(|| job.output.clone()),
            };
            history.emit_event_best_effort(run_id, event_type, json!(data));
        }
    }
}
