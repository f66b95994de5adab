//! Input classification: raw production input in, typed [`ProductionRequest`] out.

pub mod brief;
pub mod classifier;
pub mod request;
pub mod script;

pub use brief::CreativeBrief;
pub use classifier::InputClassifier;
pub use request::{InputKind, NormalizedContent, ProductionRequest};
pub use script::ScriptOutline;
