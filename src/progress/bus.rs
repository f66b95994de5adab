//! In-process event bus for production history events.

use std::sync::mpsc::{channel, Receiver, SendError, Sender};

use serde_json::Value;

use crate::progress::event::ProgressEnvelope;

#[derive(Clone)]
pub struct ProgressBus {
    sender: Sender<ProgressEnvelope>,
}

impl ProgressBus {
    pub fn new_pair() -> (Self, Receiver<ProgressEnvelope>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn emit(
        &self,
        run: impl Into<String>,
        event_type: impl Into<String>,
        data: Value,
    ) -> Result<(), SendError<ProgressEnvelope>> {
        self.sender
            .send(ProgressEnvelope::with_now(run, event_type, data))
    }
}
