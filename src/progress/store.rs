//! Durable sled-backed production history: runs, render jobs, QA records and events.

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::StorageError;
use crate::feedback::FeedbackRecord;
use crate::progress::event::ProgressEvent;
use crate::progress::now_millis;
use crate::render::RenderJob;

const TREE_RUNS: &str = "history_runs";
const TREE_RUN_META: &str = "history_run_meta";
const TREE_EVENTS: &str = "history_events";
const TREE_JOBS: &str = "history_jobs";
const TREE_QA: &str = "history_qa";
const SEQ_KEY_PAD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Delivered,
    Escalated,
    Failed,
    Cancelled,
    Interrupted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Active => "active",
            RunStatus::Delivered => "delivered",
            RunStatus::Escalated => "escalated",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub project_id: String,
    pub input_kind: String,
    pub plan: Vec<String>,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub status: RunStatus,
    pub status_text: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub next_seq: u64,
    pub latest_status: RunStatus,
    pub updated_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRecord {
    pub run_id: String,
    pub job_id: String,
    pub record: FeedbackRecord,
}

#[derive(Clone)]
pub struct HistoryStore {
    db: Db,
    runs: Tree,
    meta: Tree,
    events: Tree,
    jobs: Tree,
    qa: Tree,
}

impl HistoryStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        Ok(Self {
            runs: db.open_tree(TREE_RUNS).map_err(to_storage_io)?,
            meta: db.open_tree(TREE_RUN_META).map_err(to_storage_io)?,
            events: db.open_tree(TREE_EVENTS).map_err(to_storage_io)?,
            jobs: db.open_tree(TREE_JOBS).map_err(to_storage_io)?,
            qa: db.open_tree(TREE_QA).map_err(to_storage_io)?,
            db,
        })
    }

    pub fn shared(db: Db) -> Result<Arc<Self>, StorageError> {
        Ok(Arc::new(Self::new(db)?))
    }

    pub fn put_run(&self, record: &RunRecord) -> Result<(), StorageError> {
        put_json(&self.runs, record.run_id.as_bytes(), record)
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>, StorageError> {
        get_json(&self.runs, run_id.as_bytes())
    }

    pub fn list_runs(&self) -> Result<Vec<RunRecord>, StorageError> {
        let mut out: Vec<RunRecord> = scan_json(self.runs.iter())?;
        out.sort_by_key(|r| std::cmp::Reverse(r.started_at_ms));
        Ok(out)
    }

    pub fn put_meta(&self, run_id: &str, meta: &RunMeta) -> Result<(), StorageError> {
        put_json(&self.meta, run_id.as_bytes(), meta)
    }

    pub fn get_meta(&self, run_id: &str) -> Result<Option<RunMeta>, StorageError> {
        get_json(&self.meta, run_id.as_bytes())
    }

    pub fn append_event(&self, event: &ProgressEvent) -> Result<(), StorageError> {
        let key = encode_seq_key(&event.run, event.seq);
        put_json(&self.events, key.as_bytes(), event)
    }

    pub fn read_events(&self, run_id: &str) -> Result<Vec<ProgressEvent>, StorageError> {
        let prefix = format!("{run_id}:");
        let mut out: Vec<ProgressEvent> = scan_json(self.events.scan_prefix(prefix.as_bytes()))?;
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    /// Job records are keyed by run so a run's jobs read back in submission order.
    pub fn put_job(&self, run_id: &str, job: &RenderJob) -> Result<(), StorageError> {
        let key = format!("{run_id}:{}", job.id);
        put_json(&self.jobs, key.as_bytes(), job)
    }

    pub fn read_jobs(&self, run_id: &str) -> Result<Vec<RenderJob>, StorageError> {
        let prefix = format!("{run_id}:");
        let mut out: Vec<RenderJob> = scan_json(self.jobs.scan_prefix(prefix.as_bytes()))?;
        out.sort_by_key(|j| j.created_at);
        Ok(out)
    }

    pub fn put_qa(&self, record: &QaRecord) -> Result<(), StorageError> {
        let key = encode_seq_key(&record.run_id, u64::from(record.record.evaluation));
        put_json(&self.qa, key.as_bytes(), record)
    }

    pub fn read_qa(&self, run_id: &str) -> Result<Vec<QaRecord>, StorageError> {
        let prefix = format!("{run_id}:");
        scan_json(self.qa.scan_prefix(prefix.as_bytes()))
    }

    pub fn mark_interrupted_runs(&self) -> Result<usize, StorageError> {
        let mut changed = 0usize;
        for mut run in self.list_runs()? {
            if run.status == RunStatus::Active {
                run.status = RunStatus::Interrupted;
                run.status_text = RunStatus::Interrupted.as_str().to_string();
                run.ended_at_ms = Some(now_millis());
                self.put_run(&run)?;
                if let Some(mut meta) = self.get_meta(&run.run_id)? {
                    meta.latest_status = RunStatus::Interrupted;
                    meta.updated_at_ms = now_millis();
                    self.put_meta(&run.run_id, &meta)?;
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    pub fn prune_finished(
        &self,
        max_finished: usize,
        max_age_ms: u64,
        now_ms: u64,
    ) -> Result<usize, StorageError> {
        // list_runs is newest first
        let finished: Vec<RunRecord> = self
            .list_runs()?
            .into_iter()
            .filter(|r| r.status.is_terminal())
            .collect();
        let mut removed = 0usize;
        let mut kept = 0usize;
        for run in finished {
            let ended = run.ended_at_ms.unwrap_or(run.started_at_ms);
            let expired = now_ms.saturating_sub(ended) > max_age_ms;
            if expired || kept >= max_finished {
                self.delete_run(&run.run_id)?;
                removed += 1;
            } else {
                kept += 1;
            }
        }
        Ok(removed)
    }

    pub fn delete_run(&self, run_id: &str) -> Result<(), StorageError> {
        self.runs.remove(run_id.as_bytes()).map_err(to_storage_io)?;
        self.meta.remove(run_id.as_bytes()).map_err(to_storage_io)?;
        let prefix = format!("{run_id}:");
        for tree in [&self.events, &self.jobs, &self.qa] {
            let keys: Vec<sled::IVec> = tree
                .scan_prefix(prefix.as_bytes())
                .keys()
                .filter_map(Result::ok)
                .collect();
            for key in keys {
                tree.remove(key).map_err(to_storage_io)?;
            }
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }

    pub fn encode_seq_key(run_id: &str, seq: u64) -> String {
        encode_seq_key(run_id, seq)
    }
}

fn encode_seq_key(run_id: &str, seq: u64) -> String {
    format!("{run_id}:{seq:0SEQ_KEY_PAD$}")
}

fn put_json<T: Serialize>(tree: &Tree, key: &[u8], value: &T) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(value).map_err(to_storage_data)?;
    tree.insert(key, bytes).map_err(to_storage_io)?;
    Ok(())
}

fn get_json<T: for<'de> Deserialize<'de>>(
    tree: &Tree,
    key: &[u8],
) -> Result<Option<T>, StorageError> {
    let Some(raw) = tree.get(key).map_err(to_storage_io)? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&raw).map_err(to_storage_data)?))
}

fn scan_json<T, I>(iter: I) -> Result<Vec<T>, StorageError>
where
    T: for<'de> Deserialize<'de>,
    I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
{
    let mut out = Vec::new();
    for entry in iter {
        let (_, value) = entry.map_err(to_storage_io)?;
        out.push(serde_json::from_slice(&value).map_err(to_storage_data)?);
    }
    Ok(out)
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
}
