//! Stage pipeline: canonical stage order, per-kind plans, and the executor that
//! drives authoring stages until a renderable spec exists.

pub mod context;
pub mod executor;
pub mod plan;
pub mod stage;

pub use context::{SpecArtifact, StageContext};
pub use executor::{PipelineExecutor, PipelineOutput, StageRunner};
pub use plan::ProductionPlan;
pub use stage::Stage;
