//! Run lifecycle helpers for production history.

use std::sync::mpsc::SendError;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use crate::error::StorageError;
use crate::feedback::FeedbackRecord;
use crate::progress::bus::ProgressBus;
use crate::progress::event::ProgressEnvelope;
use crate::progress::ingestor::{EventIngestor, SharedIngestor};
use crate::progress::now_millis;
use crate::progress::store::{HistoryStore, QaRecord, RunMeta, RunRecord, RunStatus};
use crate::render::RenderJob;

#[derive(Debug, Clone, Copy)]
pub struct PrunePolicy {
    pub max_finished: usize,
    pub max_age_ms: u64,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            max_finished: 500,
            max_age_ms: 1000 * 60 * 60 * 24 * 14,
        }
    }
}

/// Write-through history for production runs. Control decisions never depend on it.
#[derive(Clone)]
pub struct HistoryRuntime {
    store: Arc<HistoryStore>,
    bus: ProgressBus,
    ingestor: SharedIngestor,
}

impl HistoryRuntime {
    pub fn new(db: sled::Db) -> Result<Self, StorageError> {
        let store = HistoryStore::shared(db)?;
        let (bus, rx) = ProgressBus::new_pair();
        let ingestor = SharedIngestor::new(EventIngestor::new(store.clone(), rx));
        Ok(Self {
            store,
            bus,
            ingestor,
        })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        Self::new(db)
    }

    pub fn start_run(
        &self,
        run_id: &str,
        project_id: &str,
        input_kind: &str,
        plan: Vec<String>,
    ) -> Result<(), StorageError> {
        let started = now_millis();
        self.store.put_run(&RunRecord {
            run_id: run_id.to_string(),
            project_id: project_id.to_string(),
            input_kind: input_kind.to_string(),
            plan: plan.clone(),
            started_at_ms: started,
            ended_at_ms: None,
            status: RunStatus::Active,
            status_text: RunStatus::Active.as_str().to_string(),
            detail: None,
        })?;
        self.store.put_meta(
            run_id,
            &RunMeta {
                next_seq: 1,
                latest_status: RunStatus::Active,
                updated_at_ms: started,
            },
        )?;
        self.emit_event(
            run_id,
            "run_started",
            json!({ "project_id": project_id, "input_kind": input_kind, "plan": plan }),
        )
    }

    pub fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        detail: Option<String>,
    ) -> Result<(), StorageError> {
        self.emit_event(
            run_id,
            "run_ended",
            json!({ "status": status.as_str(), "detail": detail }),
        )?;
        let mut record = self
            .store
            .get_run(run_id)?
            .ok_or_else(|| StorageError::NotFound(format!("run record {run_id}")))?;
        record.status = status;
        record.status_text = status.as_str().to_string();
        record.ended_at_ms = Some(now_millis());
        record.detail = detail;
        self.store.put_run(&record)?;
        if let Some(mut meta) = self.store.get_meta(run_id)? {
            meta.latest_status = status;
            meta.updated_at_ms = now_millis();
            self.store.put_meta(run_id, &meta)?;
        }
        self.store.flush()
    }

    /// Events are durable once sled's background flush runs or the run finishes.
    pub fn emit_event(&self, run_id: &str, event_type: &str, data: Value) -> Result<(), StorageError> {
        self.bus
            .emit(run_id.to_string(), event_type, data)
            .map_err(to_storage_error)?;
        self.ingestor.drain()?;
        Ok(())
    }

    pub fn emit_event_best_effort(&self, run_id: &str, event_type: &str, data: Value) {
        if let Err(err) = self.emit_event(run_id, event_type, data) {
            warn!(
                run_id = %run_id,
                event_type = %event_type,
                error = %err,
                "failed to emit history event"
            );
        }
    }

    pub fn record_job_best_effort(&self, run_id: &str, job: &RenderJob) {
        if let Err(err) = self.store.put_job(run_id, job) {
            warn!(run_id = %run_id, job_id = %job.id, error = %err, "failed to record render job");
        }
    }

    pub fn record_qa_best_effort(&self, run_id: &str, job_id: &str, record: &FeedbackRecord) {
        let qa = QaRecord {
            run_id: run_id.to_string(),
            job_id: job_id.to_string(),
            record: record.clone(),
        };
        if let Err(err) = self.store.put_qa(&qa) {
            warn!(run_id = %run_id, job_id = %job_id, error = %err, "failed to record QA score");
        }
    }

    pub fn finish_run_best_effort(&self, run_id: &str, status: RunStatus, detail: Option<String>) {
        if let Err(err) = self.finish_run(run_id, status, detail) {
            warn!(run_id = %run_id, status = status.as_str(), error = %err, "failed to finish run record");
        }
    }

    pub fn mark_interrupted_runs(&self) -> Result<usize, StorageError> {
        let changed = self.store.mark_interrupted_runs()?;
        self.store.flush()?;
        Ok(changed)
    }

    pub fn prune(&self, policy: PrunePolicy) -> Result<usize, StorageError> {
        let pruned = self
            .store
            .prune_finished(policy.max_finished, policy.max_age_ms, now_millis())?;
        self.store.flush()?;
        Ok(pruned)
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }
}

fn to_storage_error(err: SendError<ProgressEnvelope>) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        err.to_string(),
    ))
}
