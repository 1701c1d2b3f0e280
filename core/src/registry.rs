// quire/src/registry.rs

//! Defines `HandlerRegistry`, which resolves for every input file the single
//! `DocumentHandler` that owns it, and the immutable `Assignment` it produces.

use crate::core::handler::{DocumentHandler, ProcessingPriority};
use crate::core::model::InputFile;
use crate::error::{QuireError, QuireResult};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Files won by one handler, in input order.
#[derive(Debug, Clone)]
pub struct HandlerAssignment {
  pub handler: Arc<dyn DocumentHandler>,
  pub files: Vec<InputFile>,
}

/// Two or more handlers tied at the top priority for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
  pub file: String,
  /// Tied handlers, in registration order.
  pub handlers: Vec<String>,
  pub priority: ProcessingPriority,
}

impl From<Conflict> for QuireError {
  fn from(conflict: Conflict) -> Self {
    QuireError::HandlerConflict {
      file: conflict.file,
      handlers: conflict.handlers,
      priority: conflict.priority,
    }
  }
}

/// Result of assigning a set of files. Computed once per run and never mutated.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
  groups: Vec<HandlerAssignment>,
  unhandled: Vec<String>,
  conflicts: Vec<Conflict>,
  duplicates: Vec<String>,
}

impl Assignment {
  /// Per-handler groupings, in handler registration order. Handlers that won no file are absent.
  pub fn groups(&self) -> &[HandlerAssignment] {
    &self.groups
  }

  /// Keys of files no handler claims.
  pub fn unhandled(&self) -> &[String] {
    &self.unhandled
  }

  pub fn conflicts(&self) -> &[Conflict] {
    &self.conflicts
  }

  /// Keys supplied more than once; only the first occurrence was assigned.
  pub fn duplicates(&self) -> &[String] {
    &self.duplicates
  }

  /// The handler owning `file`, if any.
  pub fn handler_for(&self, file: &str) -> Option<&Arc<dyn DocumentHandler>> {
    self
      .groups
      .iter()
      .find(|group| group.files.iter().any(|f| f.key() == file))
      .map(|group| &group.handler)
  }

  pub fn assigned_count(&self) -> usize {
    self.groups.iter().map(|group| group.files.len()).sum()
  }
}

enum Claim {
  Owner(usize),
  Unhandled,
  Conflict(Conflict),
}

/// Registered handlers, in registration order.
///
/// Registration goes through `&self`, so a registry can be shared (e.g. in an `Arc`)
/// with whatever discovers plugins. Assignment works on a snapshot of the list.
#[derive(Default)]
pub struct HandlerRegistry {
  handlers: RwLock<Vec<Arc<dyn DocumentHandler>>>,
}

impl HandlerRegistry {
  /// Creates a new, empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a handler. Names must be unique.
  pub fn register(&self, handler: Arc<dyn DocumentHandler>) -> QuireResult<()> {
    let mut handlers = self.handlers.write();
    if handlers.iter().any(|h| h.name() == handler.name()) {
      event!(Level::ERROR, handler = %handler.name(), "Duplicate handler registration.");
      return Err(QuireError::configuration(format!(
        "a handler named '{}' is already registered",
        handler.name()
      )));
    }
    event!(Level::DEBUG, handler = %handler.name(), steps = handler.steps().len(), "Registering handler.");
    handlers.push(handler);
    Ok(())
  }

  /// Snapshot of the registered handlers.
  pub fn handlers(&self) -> Vec<Arc<dyn DocumentHandler>> {
    self.handlers.read().clone()
  }

  pub fn len(&self) -> usize {
    self.handlers.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.read().is_empty()
  }

  /// The single handler owning `file`.
  pub fn resolve(&self, file: &InputFile) -> QuireResult<Arc<dyn DocumentHandler>> {
    let handlers = self.handlers();
    match claim(&handlers, file) {
      Claim::Owner(idx) => Ok(handlers[idx].clone()),
      Claim::Unhandled => Err(QuireError::UnsupportedFile {
        file: file.key().to_string(),
      }),
      Claim::Conflict(conflict) => Err(conflict.into()),
    }
  }

  /// Assigns every file to at most one handler.
  #[instrument(name = "HandlerRegistry::assign", skip_all, fields(files = files.len()))]
  pub fn assign(&self, files: Vec<InputFile>) -> Assignment {
    let handlers = self.handlers();
    let mut per_handler: Vec<Vec<InputFile>> = vec![Vec::new(); handlers.len()];
    let mut assignment = Assignment::default();
    let mut seen = HashSet::new();

    for file in files {
      if !seen.insert(file.key().to_string()) {
        event!(Level::WARN, file = %file.key(), "Duplicate input key, keeping the first occurrence.");
        assignment.duplicates.push(file.key().to_string());
        continue;
      }
      match claim(&handlers, &file) {
        Claim::Owner(idx) => {
          event!(Level::TRACE, file = %file.key(), handler = %handlers[idx].name(), "File assigned.");
          per_handler[idx].push(file);
        }
        Claim::Unhandled => {
          event!(Level::DEBUG, file = %file.key(), "No handler claims file.");
          assignment.unhandled.push(file.key().to_string());
        }
        Claim::Conflict(conflict) => {
          event!(Level::WARN, file = %conflict.file, handlers = ?conflict.handlers, "Handler conflict.");
          assignment.conflicts.push(conflict);
        }
      }
    }

    assignment.groups = handlers
      .into_iter()
      .zip(per_handler)
      .filter(|(_, files)| !files.is_empty())
      .map(|(handler, files)| HandlerAssignment { handler, files })
      .collect();

    event!(
      Level::DEBUG,
      assigned = assignment.assigned_count(),
      unhandled = assignment.unhandled.len(),
      conflicts = assignment.conflicts.len(),
      "Assignment computed."
    );
    assignment
  }
}

impl std::fmt::Debug for HandlerRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let names: Vec<String> = self.handlers.read().iter().map(|h| h.name().to_string()).collect();
    f.debug_struct("HandlerRegistry").field("handlers", &names).finish()
  }
}

// Strictly greatest priority wins; a tie at the top is a conflict whatever the registration order.
fn claim(handlers: &[Arc<dyn DocumentHandler>], file: &InputFile) -> Claim {
  let claims: Vec<(usize, ProcessingPriority)> = handlers
    .iter()
    .enumerate()
    .map(|(idx, handler)| (idx, handler.can_handle(file)))
    .filter(|(_, priority)| priority.is_supported())
    .collect();

  let Some(top) = claims.iter().map(|(_, priority)| *priority).max() else {
    return Claim::Unhandled;
  };
  let winners: Vec<usize> = claims
    .iter()
    .filter(|(_, priority)| *priority == top)
    .map(|(idx, _)| *idx)
    .collect();

  if winners.len() == 1 {
    Claim::Owner(winners[0])
  } else {
    Claim::Conflict(Conflict {
      file: file.key().to_string(),
      handlers: winners.iter().map(|idx| handlers[*idx].name().to_string()).collect(),
      priority: top,
    })
  }
}
