// quire/src/report.rs

//! The result set of one run: succeeded and failed documents, skipped files,
//! aborted handlers, and the diagnostics emitted along the way.

use crate::core::context::ContextSnapshot;
use crate::core::model::{Artifact, DocumentModel};
use crate::error::QuireError;
use crate::registry::Conflict;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
  Info,
  Warning,
  Error,
}

/// Stable machine-readable diagnostic codes.
pub mod codes {
  pub const UNHANDLED_FILE: &str = "UnhandledFile";
  pub const HANDLER_CONFLICT: &str = "HandlerConflict";
  pub const DUPLICATE_INPUT: &str = "DuplicateInput";
  pub const LOAD_FAILED: &str = "LoadFailed";
  pub const PREBUILD_FAILED: &str = "PrebuildFailed";
  pub const DOCUMENT_FILTERED: &str = "DocumentFiltered";
  pub const BUILD_FAILED: &str = "BuildFailed";
  pub const POSTBUILD_FAILED: &str = "PostbuildFailed";
  pub const UPDATE_REFERENCES_FAILED: &str = "UpdateReferencesFailed";
  pub const SAVE_FAILED: &str = "SaveFailed";
  pub const RUN_CANCELLED: &str = "RunCancelled";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub level: DiagnosticLevel,
  pub code: &'static str,
  pub message: String,
  pub file: Option<String>,
  pub handler: Option<String>,
}

impl Diagnostic {
  pub fn new(level: DiagnosticLevel, code: &'static str, message: impl Into<String>) -> Self {
    Self {
      level,
      code,
      message: message.into(),
      file: None,
      handler: None,
    }
  }

  pub fn with_file(mut self, file: impl Into<String>) -> Self {
    self.file = Some(file.into());
    self
  }

  pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
    self.handler = Some(handler.into());
    self
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:?}] {}", self.level, self.code)?;
    if let Some(handler) = &self.handler {
      write!(f, " ({})", handler)?;
    }
    if let Some(file) = &self.file {
      write!(f, " {}", file)?;
    }
    write!(f, ": {}", self.message)
  }
}

/// A document that went through every phase and was saved.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltDocument {
  pub handler: String,
  pub model: DocumentModel,
  pub artifact: Artifact,
}

/// Stage at which a document dropped out of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
  Load,
  Build,
  UpdateReferences,
  Save,
  Cancelled,
}

#[derive(Debug)]
pub struct FailedDocument {
  pub key: String,
  pub handler: String,
  pub stage: FailureStage,
  pub error: QuireError,
}

/// A handler whose batch-wide phase failed; none of its remaining documents succeeded.
#[derive(Debug)]
pub struct AbortedHandler {
  pub handler: String,
  pub error: QuireError,
  /// Documents in the batch when the phase failed.
  pub documents: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RunReport {
  pub succeeded: Vec<BuiltDocument>,
  pub failed: Vec<FailedDocument>,
  /// Documents dropped by a prebuild step, by key.
  pub filtered: Vec<String>,
  pub unhandled: Vec<String>,
  pub conflicts: Vec<Conflict>,
  pub duplicates: Vec<String>,
  pub aborted: Vec<AbortedHandler>,
  pub diagnostics: Vec<Diagnostic>,
  /// The token had fired by the time BUILD finished; later cancellation is ignored.
  pub cancelled: bool,
  /// Build context contents after the last phase ran.
  pub context: ContextSnapshot,
}

impl RunReport {
  /// True when every input was built and saved and nothing was skipped or aborted.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
      && self.unhandled.is_empty()
      && self.conflicts.is_empty()
      && self.duplicates.is_empty()
      && self.aborted.is_empty()
      && !self.cancelled
  }

  pub fn document(&self, key: &str) -> Option<&BuiltDocument> {
    self.succeeded.iter().find(|doc| doc.model.key() == key)
  }

  pub fn failure(&self, key: &str) -> Option<&FailedDocument> {
    self.failed.iter().find(|doc| doc.key == key)
  }

  pub fn succeeded_keys(&self) -> Vec<&str> {
    self.succeeded.iter().map(|doc| doc.model.key()).collect()
  }

  pub fn failed_keys(&self) -> Vec<&str> {
    self.failed.iter().map(|doc| doc.key.as_str()).collect()
  }

  pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
    self.succeeded.iter().map(|doc| &doc.artifact)
  }

  pub fn diagnostics_with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
    self.diagnostics.iter().filter(move |d| d.code == code)
  }

  pub fn has_errors(&self) -> bool {
    self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
  }

  /// One-line summary for logs.
  pub fn summary(&self) -> String {
    format!(
      "{} succeeded, {} failed, {} filtered, {} unhandled, {} conflicts, {} aborted handlers{}",
      self.succeeded.len(),
      self.failed.len(),
      self.filtered.len(),
      self.unhandled.len(),
      self.conflicts.len(),
      self.aborted.len(),
      if self.cancelled { ", cancelled" } else { "" }
    )
  }

  pub(crate) fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
    match diagnostic.level {
      DiagnosticLevel::Info => tracing::info!(code = diagnostic.code, "{}", diagnostic),
      DiagnosticLevel::Warning => tracing::warn!(code = diagnostic.code, "{}", diagnostic),
      DiagnosticLevel::Error => tracing::error!(code = diagnostic.code, "{}", diagnostic),
    }
    self.diagnostics.push(diagnostic);
  }

  pub(crate) fn push_failure(&mut self, handler: &str, key: &str, stage: FailureStage, error: QuireError) {
    let (level, code) = match stage {
      FailureStage::Load => (DiagnosticLevel::Error, codes::LOAD_FAILED),
      FailureStage::Build => (DiagnosticLevel::Error, codes::BUILD_FAILED),
      FailureStage::UpdateReferences => (DiagnosticLevel::Error, codes::UPDATE_REFERENCES_FAILED),
      FailureStage::Save => (DiagnosticLevel::Error, codes::SAVE_FAILED),
      FailureStage::Cancelled => (DiagnosticLevel::Warning, codes::RUN_CANCELLED),
    };
    self.push_diagnostic(
      Diagnostic::new(level, code, error.to_string())
        .with_file(key)
        .with_handler(handler),
    );
    self.failed.push(FailedDocument {
      key: key.to_string(),
      handler: handler.to_string(),
      stage,
      error,
    });
  }
}
