//! Event ingestion and per-run sequence assignment.

use std::sync::mpsc::Receiver;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StorageError;
use crate::progress::event::{ProgressEnvelope, ProgressEvent};
use crate::progress::store::{HistoryStore, RunMeta, RunStatus};
use crate::progress::now_millis;

pub struct EventIngestor {
    store: Arc<HistoryStore>,
    receiver: Receiver<ProgressEnvelope>,
}

impl EventIngestor {
    pub fn new(store: Arc<HistoryStore>, receiver: Receiver<ProgressEnvelope>) -> Self {
        Self { store, receiver }
    }

    pub fn ingest_pending(&mut self) -> Result<usize, StorageError> {
        let mut count = 0usize;
        while let Ok(envelope) = self.receiver.try_recv() {
            self.ingest_one(envelope)?;
            count += 1;
        }
        Ok(count)
    }

    fn ingest_one(&self, envelope: ProgressEnvelope) -> Result<(), StorageError> {
        let mut meta = self.store.get_meta(&envelope.run)?.unwrap_or(RunMeta {
            next_seq: 1,
            latest_status: RunStatus::Active,
            updated_at_ms: now_millis(),
        });

        let event = ProgressEvent::from_envelope(envelope, meta.next_seq);
        self.store.append_event(&event)?;
        meta.next_seq += 1;
        meta.updated_at_ms = now_millis();
        self.store.put_meta(&event.run, &meta)?;
        Ok(())
    }
}

/// Ingestor shared between runs; draining is serialized so sequence numbers stay gapless.
#[derive(Clone)]
pub struct SharedIngestor(Arc<Mutex<EventIngestor>>);

impl SharedIngestor {
    pub fn new(inner: EventIngestor) -> Self {
        Self(Arc::new(Mutex::new(inner)))
    }

    pub fn drain(&self) -> Result<usize, StorageError> {
        self.0.lock().ingest_pending()
    }
}
