pub mod cancel;
pub mod context;
pub mod handler;
pub mod model;
pub mod phase;
pub mod reference;
pub mod step;

// Re-export key types for easier access from other quire modules (and lib.rs)
pub use cancel::CancellationToken;
pub use context::{BuildContext, ContextKey, ContextSlot, ContextSnapshot, ScopedContext};
pub use handler::{DocumentHandler, ProcessingPriority};
pub use model::{Artifact, DocumentModel, InputFile};
pub use phase::{Phase, PhaseState};
pub use reference::{MapResolver, ReferenceResolver};
pub use step::{order_steps, BuildStep};
