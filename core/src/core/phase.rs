// quire/src/core/phase.rs

//! Phases of a run and the per-handler phase state machine.

use crate::error::QuireError;
use std::fmt;

/// One of the three global stages a step participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
  PreBuild,
  Build,
  PostBuild,
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Phase::PreBuild => f.write_str("PRE_BUILD"),
      Phase::Build => f.write_str("BUILD"),
      Phase::PostBuild => f.write_str("POST_BUILD"),
    }
  }
}

/// Where a handler's batch currently is.
///
/// ```text
/// PreBuild -> Build -> PostBuild -> Done
///     |         |          |
///     |         +-> Cancelled
///     +-> Aborted / Cancelled  +-> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
  PreBuild,
  Build,
  PostBuild,
  /// Every phase completed.
  Done,
  /// A batch-wide step failed in PRE_BUILD or POST_BUILD.
  Aborted,
  /// The run-level cancellation token fired before POST_BUILD.
  Cancelled,
}

impl PhaseState {
  pub fn is_terminal(self) -> bool {
    matches!(self, PhaseState::Done | PhaseState::Aborted | PhaseState::Cancelled)
  }

  /// The phase steps are invoked for in this state, if any.
  pub fn phase(self) -> Option<Phase> {
    match self {
      PhaseState::PreBuild => Some(Phase::PreBuild),
      PhaseState::Build => Some(Phase::Build),
      PhaseState::PostBuild => Some(Phase::PostBuild),
      _ => None,
    }
  }

  pub fn can_transition_to(self, next: PhaseState) -> bool {
    use PhaseState::*;
    matches!(
      (self, next),
      (PreBuild, Build)
        | (PreBuild, Aborted)
        | (PreBuild, Cancelled)
        | (Build, PostBuild)
        | (Build, Cancelled)
        | (PostBuild, Done)
        | (PostBuild, Aborted)
    )
  }

  /// Moves to `next`, refusing re-entry and skipped phases.
  pub fn advance(&mut self, next: PhaseState) -> Result<(), QuireError> {
    if !self.can_transition_to(next) {
      return Err(QuireError::Internal(format!(
        "illegal phase transition {:?} -> {:?}",
        self, next
      )));
    }
    *self = next;
    Ok(())
  }
}
