// quire/src/pipeline/mod.rs

//! Defines `StepPipeline` (a handler's ordered steps and their phase execution)
//! and the `WorkerPool` running BUILD pipelines.

pub mod definition;
pub mod execution;
pub mod pool;

pub use definition::StepPipeline;
pub use pool::{JobOutcome, WorkerPool};
