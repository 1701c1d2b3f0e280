// quire/src/core/step.rs

//! Defines the `BuildStep` trait, a named, ordered unit implementing the
//! three-phase contract for one handler.

use crate::core::context::ScopedContext;
use crate::core::model::DocumentModel;
use async_trait::async_trait;
use std::sync::Arc;

/// A step of a handler's pipeline.
///
/// Every phase method has a pass-through default, so a step only implements the
/// phases it takes part in. Errors are plain `anyhow` errors; the orchestrator
/// attaches handler, step and document identity when reporting them.
#[async_trait]
pub trait BuildStep: Send + Sync + 'static {
  fn name(&self) -> &str;

  /// Ascending execution order within the handler. Equal orders run in registration order.
  fn build_order(&self) -> i32;

  /// Receives the whole batch for the handler and returns the batch the next step's
  /// `prebuild` (and then BUILD) works on. May reorder, filter or annotate.
  async fn prebuild(&self, batch: Vec<DocumentModel>, _ctx: &ScopedContext) -> anyhow::Result<Vec<DocumentModel>> {
    Ok(batch)
  }

  /// Transforms exactly one document. Runs concurrently with other documents' pipelines.
  async fn build(&self, document: DocumentModel, _ctx: &ScopedContext) -> anyhow::Result<DocumentModel> {
    Ok(document)
  }

  /// Receives the final surviving batch once every BUILD pipeline has finished.
  async fn postbuild(&self, _batch: &[DocumentModel], _ctx: &ScopedContext) -> anyhow::Result<()> {
    Ok(())
  }
}

impl std::fmt::Debug for dyn BuildStep {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildStep")
      .field("name", &self.name())
      .field("build_order", &self.build_order())
      .finish()
  }
}

/// Sorts steps ascending by build order. The sort is stable, so ties keep registration order.
pub fn order_steps(mut steps: Vec<Arc<dyn BuildStep>>) -> Vec<Arc<dyn BuildStep>> {
  steps.sort_by_key(|step| step.build_order());
  steps
}
