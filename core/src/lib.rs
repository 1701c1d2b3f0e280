// quire/src/lib.rs

//! Quire: an ASYNC document-build pipeline core.
//!
//! Quire decides which handler owns each input file and drives the owning
//! handlers' steps over all documents in three strictly sequenced phases:
//!  - PRE_BUILD: per handler, each step sees the whole batch, one step after the other.
//!  - BUILD: per document, the handler's steps run in order; documents run in
//!    parallel on a fixed-size worker pool and fail independently.
//!  - POST_BUILD: per handler, each step sees the surviving batch for aggregation.
//!
//! Parsing and rendering are the handlers' business (`DocumentHandler::load` /
//! `save`); quire only orders, schedules and isolates them.

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod report;

// --- Re-exports for the Public API ---

pub use crate::core::cancel::CancellationToken;
pub use crate::core::context::{BuildContext, ContextKey, ContextSlot, ContextSnapshot, ScopedContext};
pub use crate::core::handler::{DocumentHandler, ProcessingPriority};
pub use crate::core::model::{Artifact, DocumentModel, InputFile};
pub use crate::core::phase::{Phase, PhaseState};
pub use crate::core::reference::{MapResolver, ReferenceResolver};
pub use crate::core::step::{order_steps, BuildStep};

pub use crate::pipeline::{JobOutcome, StepPipeline, WorkerPool};

pub use crate::config::{BuildConfig, UnhandledPolicy};
pub use crate::error::{QuireError, QuireResult};
pub use crate::orchestrator::Orchestrator;
pub use crate::registry::{Assignment, Conflict, HandlerAssignment, HandlerRegistry};
pub use crate::report::{
  AbortedHandler, BuiltDocument, Diagnostic, DiagnosticLevel, FailedDocument, FailureStage, RunReport,
};

// Async step methods are declared with this attribute.
pub use async_trait::async_trait;

/*
    Core Workflow:
    1. Implement `BuildStep` for each unit of work, giving it a name and a build order.
    2. Implement `DocumentHandler` for each kind of input: `can_handle` returns a
       `ProcessingPriority`, `load` turns an `InputFile` into a `DocumentModel`,
       `save` turns the final model into an `Artifact`, `steps` lists the steps.
    3. Register handlers with a `HandlerRegistry`.
    4. Build an `Orchestrator` from the registry and a `BuildConfig`.
    5. Call `orchestrator.run(files).await` and inspect the `RunReport`.
*/
