// quire/src/pipeline/definition.rs

//! Contains the `StepPipeline` struct: one handler together with its steps, ordered
//! once at run start and shared by all three phases.

use crate::core::handler::DocumentHandler;
use crate::core::step::BuildStep;
use crate::error::{QuireError, QuireResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{event, Level};

/// The ordered step list of one handler.
///
/// Built once per run from `DocumentHandler::ordered_steps`, so PRE_BUILD, BUILD and
/// POST_BUILD all see the same order. Cloning shares the step list.
#[derive(Clone)]
pub struct StepPipeline {
  pub(crate) handler: Arc<dyn DocumentHandler>,
  pub(crate) steps: Arc<[Arc<dyn BuildStep>]>,
}

impl StepPipeline {
  /// Orders the handler's steps and checks that step names are unique within it.
  pub fn for_handler(handler: Arc<dyn DocumentHandler>) -> QuireResult<Self> {
    let steps = handler.ordered_steps();

    let mut names = HashSet::new();
    for step in &steps {
      if !names.insert(step.name().to_string()) {
        event!(Level::ERROR, handler = %handler.name(), step = %step.name(), "Duplicate step name.");
        return Err(QuireError::configuration(format!(
          "handler '{}' declares step '{}' more than once",
          handler.name(),
          step.name()
        )));
      }
    }

    event!(
      Level::DEBUG,
      handler = %handler.name(),
      steps = ?steps.iter().map(|s| (s.name().to_string(), s.build_order())).collect::<Vec<_>>(),
      "Step pipeline ordered."
    );
    Ok(Self {
      handler,
      steps: steps.into(),
    })
  }

  pub fn handler(&self) -> &Arc<dyn DocumentHandler> {
    &self.handler
  }

  pub fn handler_name(&self) -> &str {
    self.handler.name()
  }

  /// Steps in execution order.
  pub fn steps(&self) -> &[Arc<dyn BuildStep>] {
    &self.steps
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|step| step.name()).collect()
  }
}

impl std::fmt::Debug for StepPipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepPipeline")
      .field("handler", &self.handler_name())
      .field("steps", &self.step_names())
      .finish()
  }
}
