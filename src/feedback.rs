//! Feedback loop: QA scoring, the deliver/revise/escalate rule, and per-run iteration state.

pub mod controller;
pub mod score;
pub mod state;

pub use controller::{decide, FeedbackController, QaScorer};
pub use score::{Aspect, QaIssue, QaScore, APPROVAL_THRESHOLD};
pub use state::{
    Decision, FeedbackRecord, FeedbackState, FeedbackSummary, RevisionNote, MAX_ITERATIONS,
};
