//! Run planning, the reconstruction pipeline interface, and the unit run loop.

mod metrics;
mod orchestrator;
mod params;
mod plan;
mod reconstruction;

pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use orchestrator::{CancellationFlag, RunStats, UnitOrchestrator, UnitStage};
pub use params::{
    resolve_post, resolve_pre, DenoiseParams, ProcessingParams, RegistrationParams,
    DEFAULT_LEVEL, DEFAULT_THRESHOLD,
};
pub use plan::{PlanSummary, RunPlan};
pub use reconstruction::{
    DeconvolutionChannels, DeconvolutionMode, Deconvolved, ReconstructionPipeline, UnitResult,
};
