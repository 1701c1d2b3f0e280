// quire/src/pipeline/execution.rs

//! Contains the phase methods of `StepPipeline`: batch PRE_BUILD and POST_BUILD,
//! and the per-document BUILD pipeline.

use crate::core::cancel::CancellationToken;
use crate::core::context::{BuildContext, ContextKey};
use crate::core::model::DocumentModel;
use crate::core::phase::Phase;
use crate::error::QuireError;
use crate::pipeline::definition::StepPipeline;
use anyhow::anyhow;
use std::collections::HashSet;
use tracing::{event, instrument, span, Instrument, Level};

impl StepPipeline {
  /// Runs every step's `prebuild` in order, threading the batch through.
  ///
  /// The first failure aborts the whole batch; each step's returned batch must be a
  /// subset of its input, with documents of this handler and unique keys.
  #[instrument(
        name = "StepPipeline::prebuild",
        skip_all,
        fields(handler = %self.handler_name(), num_steps = self.steps.len(), batch = batch.len()),
        err(Display)
    )]
  pub async fn prebuild(&self, mut batch: Vec<DocumentModel>, context: &BuildContext) -> Result<Vec<DocumentModel>, QuireError> {
    event!(Level::DEBUG, "Prebuild starting.");
    for (step_idx, step) in self.steps.iter().enumerate() {
      let step_span = span!(Level::INFO, "prebuild_step", step_name = step.name(), step_index = step_idx);
      let scope = context.scope(ContextKey::step(self.handler_name(), step.name()), Phase::PreBuild, None);
      let input_keys: HashSet<String> = batch.iter().map(|doc| doc.key().to_string()).collect();

      batch = step
        .prebuild(batch, &scope)
        .instrument(step_span)
        .await
        .map_err(|source| {
          event!(Level::ERROR, step = %step.name(), error = %source, "Prebuild step failed.");
          QuireError::PrebuildStep {
            handler: self.handler_name().to_string(),
            step: step.name().to_string(),
            source,
          }
        })?;

      self.check_batch(&batch, &input_keys).map_err(|source| QuireError::PrebuildStep {
        handler: self.handler_name().to_string(),
        step: step.name().to_string(),
        source,
      })?;
      event!(Level::TRACE, step = %step.name(), batch = batch.len(), "Prebuild step finished.");
    }
    event!(Level::DEBUG, "Prebuild completed.");
    Ok(batch)
  }

  /// Runs every step's `build` on one document, in order.
  ///
  /// The token is checked before each step; a cancelled pipeline stops at the next boundary.
  #[instrument(
        name = "StepPipeline::build",
        skip_all,
        fields(handler = %self.handler_name(), document = %document.key())
    )]
  pub async fn build(
    &self,
    mut document: DocumentModel,
    context: &BuildContext,
    cancel: &CancellationToken,
  ) -> Result<DocumentModel, QuireError> {
    let key = document.key().to_string();
    for (step_idx, step) in self.steps.iter().enumerate() {
      if cancel.is_cancelled() {
        event!(Level::INFO, step = %step.name(), "Cancellation observed at step boundary.");
        return Err(QuireError::Cancelled { document: key });
      }
      let step_span = span!(Level::DEBUG, "build_step", step_name = step.name(), step_index = step_idx);
      let scope = context.scope(ContextKey::step(self.handler_name(), step.name()), Phase::Build, Some(&key));

      document = step
        .build(document, &scope)
        .instrument(step_span)
        .await
        .map_err(|source| self.build_error(step.name(), &key, source))?;

      if document.key() != key || document.handler() != self.handler_name() {
        return Err(self.build_error(
          step.name(),
          &key,
          anyhow!(
            "step returned document '{}' of handler '{}'",
            document.key(),
            document.handler()
          ),
        ));
      }
    }
    Ok(document)
  }

  /// Runs every step's `postbuild` in order over the surviving batch.
  #[instrument(
        name = "StepPipeline::postbuild",
        skip_all,
        fields(handler = %self.handler_name(), num_steps = self.steps.len(), batch = batch.len()),
        err(Display)
    )]
  pub async fn postbuild(&self, batch: &[DocumentModel], context: &BuildContext) -> Result<(), QuireError> {
    event!(Level::DEBUG, "Postbuild starting.");
    for (step_idx, step) in self.steps.iter().enumerate() {
      let step_span = span!(Level::INFO, "postbuild_step", step_name = step.name(), step_index = step_idx);
      let scope = context.scope(ContextKey::step(self.handler_name(), step.name()), Phase::PostBuild, None);

      step
        .postbuild(batch, &scope)
        .instrument(step_span)
        .await
        .map_err(|source| {
          event!(Level::ERROR, step = %step.name(), error = %source, "Postbuild step failed.");
          QuireError::PostbuildStep {
            handler: self.handler_name().to_string(),
            step: step.name().to_string(),
            source,
          }
        })?;
    }
    event!(Level::DEBUG, "Postbuild completed.");
    Ok(())
  }

  pub(crate) fn build_error(&self, step: &str, document: &str, source: anyhow::Error) -> QuireError {
    event!(Level::WARN, step = %step, document = %document, error = %source, "Build step failed.");
    QuireError::BuildStep {
      handler: self.handler_name().to_string(),
      step: step.to_string(),
      document: document.to_string(),
      source,
    }
  }

  // Output must be a subset of the step's input: no foreign or injected documents.
  fn check_batch(&self, batch: &[DocumentModel], input_keys: &HashSet<String>) -> anyhow::Result<()> {
    let mut keys = HashSet::new();
    for document in batch {
      if !input_keys.contains(document.key()) {
        return Err(anyhow!("batch contains '{}', which was not in the step's input", document.key()));
      }
      if document.handler() != self.handler_name() {
        return Err(anyhow!(
          "batch contains '{}' owned by handler '{}'",
          document.key(),
          document.handler()
        ));
      }
      if !keys.insert(document.key()) {
        return Err(anyhow!("batch contains '{}' more than once", document.key()));
      }
    }
    Ok(())
  }
}
