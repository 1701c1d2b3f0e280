// quire/src/core/handler.rs

//! Defines the `DocumentHandler` trait: ownership of input files, load/save of
//! document models, and the step list a handler's documents go through.

use crate::core::model::{Artifact, DocumentModel, InputFile};
use crate::core::reference::ReferenceResolver;
use crate::core::step::{order_steps, BuildStep};
use std::sync::Arc;

/// How strongly a handler claims a file. `NotSupported` means no claim at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessingPriority {
  NotSupported,
  Lowest,
  Low,
  BelowNormal,
  Normal,
  AboveNormal,
  High,
  Highest,
}

impl ProcessingPriority {
  pub fn is_supported(self) -> bool {
    self != ProcessingPriority::NotSupported
  }
}

/// A handler owns the files it wins at assignment and supplies their pipeline.
///
/// `load` and `save` are the only places input bytes and output artifacts are
/// touched; the orchestrator never reads or writes storage itself.
pub trait DocumentHandler: Send + Sync + 'static {
  /// Unique among registered handlers.
  fn name(&self) -> &str;

  fn can_handle(&self, file: &InputFile) -> ProcessingPriority;

  /// Parses `file` into a model. The model must keep the file's key.
  fn load(&self, file: &InputFile) -> anyhow::Result<DocumentModel>;

  /// Produces the output artifact. Must be deterministic for an unchanged model.
  fn save(&self, model: &DocumentModel) -> anyhow::Result<Artifact>;

  /// Steps in registration order.
  fn steps(&self) -> Vec<Arc<dyn BuildStep>>;

  /// Steps sorted ascending by build order, ties in registration order.
  fn ordered_steps(&self) -> Vec<Arc<dyn BuildStep>> {
    order_steps(self.steps())
  }

  /// Whether `update_references` does anything for this handler.
  fn supports_references(&self) -> bool {
    false
  }

  /// Rewrites references in `model` through `resolver`. Identity unless overridden.
  fn update_references(&self, model: DocumentModel, _resolver: &dyn ReferenceResolver) -> anyhow::Result<DocumentModel> {
    Ok(model)
  }
}

impl std::fmt::Debug for dyn DocumentHandler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DocumentHandler").field("name", &self.name()).finish()
  }
}
