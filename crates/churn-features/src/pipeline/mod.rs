//! Pipeline module.
//!
//! The orchestrator plus its progress reporting and cancellation support.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, PipelineOutput};
pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
