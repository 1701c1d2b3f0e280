// quire/src/error.rs
use crate::core::handler::ProcessingPriority;
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuireError {
    #[error("No handler claims file '{file}'")]
    UnsupportedFile { file: String },

    #[error("Handlers {handlers:?} claim file '{file}' at the same priority ({priority:?})")]
    HandlerConflict {
        file: String,
        handlers: Vec<String>,
        priority: ProcessingPriority,
    },

    #[error("Input file '{file}' was supplied more than once")]
    DuplicateInput { file: String },

    #[error("Run rejected: {} file(s) have no handler: {files:?}", files.len())]
    UnhandledFilesRejected { files: Vec<String> },

    #[error("Handler '{handler}' failed to load '{file}'. Source: {source}")]
    Load {
        handler: String,
        file: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Prebuild of step '{step}' (handler '{handler}') failed. Source: {source}")]
    PrebuildStep {
        handler: String,
        step: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Build of step '{step}' (handler '{handler}') failed for document '{document}'. Source: {source}")]
    BuildStep {
        handler: String,
        step: String,
        document: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Postbuild of step '{step}' (handler '{handler}') failed. Source: {source}")]
    PostbuildStep {
        handler: String,
        step: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Handler '{handler}' failed to update references of '{document}'. Source: {source}")]
    UpdateReferences {
        handler: String,
        document: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Handler '{handler}' failed to save '{document}'. Source: {source}")]
    Save {
        handler: String,
        document: String,
        #[source]
        source: AnyhowError,
    },

    #[error("Build context error for '{owner}': {message}")]
    Context { owner: String, message: String },

    #[error("Run cancelled before '{document}' finished")]
    Cancelled { document: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Error in user-provided handler or step. Source: {source}")]
    HandlerError {
        #[source]
        source: AnyhowError,
    },

    #[error("Internal quire error: {0}")]
    Internal(String),
}

impl QuireError {
  pub(crate) fn configuration(message: impl Into<String>) -> Self {
    QuireError::Configuration { message: message.into() }
  }

  /// True for failures confined to a single document.
  pub fn is_document_level(&self) -> bool {
    matches!(
      self,
      QuireError::Load { .. }
        | QuireError::BuildStep { .. }
        | QuireError::UpdateReferences { .. }
        | QuireError::Save { .. }
        | QuireError::Cancelled { .. }
    )
  }
}

// A user step may bail with a QuireError (e.g. a context conflict) wrapped in anyhow.
// The orchestrator wraps it again with step identity, so plain re-wrapping is enough here.
impl From<AnyhowError> for QuireError {
  fn from(err: AnyhowError) -> Self {
    QuireError::HandlerError { source: err }
  }
}

pub type QuireResult<T, E = QuireError> = std::result::Result<T, E>;
