// quire/src/core/reference.rs

//! The reference-resolution seam consumed by `DocumentHandler::update_references`.
//! Resolution semantics belong to the caller.

use std::collections::HashMap;

pub trait ReferenceResolver: Send + Sync {
  /// Maps a reference (e.g. a source-relative link target) to its resolved form.
  fn resolve(&self, reference: &str) -> Option<String>;
}

impl<F> ReferenceResolver for F
where
  F: Fn(&str) -> Option<String> + Send + Sync,
{
  fn resolve(&self, reference: &str) -> Option<String> {
    self(reference)
  }
}

/// Resolves from a fixed table.
#[derive(Debug, Clone, Default)]
pub struct MapResolver(pub HashMap<String, String>);

impl ReferenceResolver for MapResolver {
  fn resolve(&self, reference: &str) -> Option<String> {
    self.0.get(reference).cloned()
  }
}
