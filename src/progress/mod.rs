//! Production history: write-through run, job and QA records plus a per-run event log.

pub mod bus;
pub mod event;
pub mod ingestor;
pub mod runtime;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

pub use bus::ProgressBus;
pub use event::{FeedbackEventData, JobEventData, ProgressEnvelope, ProgressEvent, StageEventData};
pub use ingestor::EventIngestor;
pub use runtime::{HistoryRuntime, PrunePolicy};
pub use store::{HistoryStore, QaRecord, RunMeta, RunRecord, RunStatus};

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
