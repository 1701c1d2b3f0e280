// quire/src/core/model.rs

//! Boundary types handlers produce and consume: `InputFile`, `DocumentModel`, `Artifact`.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A file handed to the run. Immutable once read; clones share the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct InputFile {
  key: String,
  bytes: Arc<[u8]>,
}

impl InputFile {
  pub fn new(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self {
      key: key.into(),
      bytes: Arc::from(bytes.into()),
    }
  }

  /// Stable identity of the file (usually a path relative to the source root).
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  /// The bytes as UTF-8, if they are.
  pub fn as_str(&self) -> Option<&str> {
    std::str::from_utf8(&self.bytes).ok()
  }

  /// File extension of the key, without the dot.
  pub fn extension(&self) -> Option<&str> {
    let name = self.key.rsplit(['/', '\\']).next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
      None
    } else {
      Some(ext)
    }
  }
}

impl fmt::Debug for InputFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InputFile")
      .field("key", &self.key)
      .field("len", &self.bytes.len())
      .finish()
  }
}

/// The per-file payload threaded through all phases.
///
/// Content is an ordered map from string keys to `serde_json::Value`. A model is
/// owned by exactly one pipeline at a time and is moved, never aliased, between steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentModel {
  key: String,
  handler: String,
  #[serde(skip)]
  source: InputFile,
  content: IndexMap<String, Value>,
}

impl DocumentModel {
  /// Creates an empty model for `source`, owned by `handler`.
  pub fn new(source: &InputFile, handler: impl Into<String>) -> Self {
    Self {
      key: source.key().to_string(),
      handler: handler.into(),
      source: source.clone(),
      content: IndexMap::new(),
    }
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
    self.content.insert(name.into(), value.into());
    self
  }

  /// Key of the source file. Never changes during a run.
  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn handler(&self) -> &str {
    &self.handler
  }

  pub fn source(&self) -> &InputFile {
    &self.source
  }

  pub fn get(&self, name: &str) -> Option<&Value> {
    self.content.get(name)
  }

  pub fn get_str(&self, name: &str) -> Option<&str> {
    self.content.get(name).and_then(Value::as_str)
  }

  pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
    self.content.get_mut(name)
  }

  /// Inserts or replaces an entry. A replaced entry keeps its position.
  pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
    self.content.insert(name.into(), value.into())
  }

  /// Removes an entry, preserving the order of the rest.
  pub fn remove(&mut self, name: &str) -> Option<Value> {
    self.content.shift_remove(name)
  }

  pub fn contains_key(&self, name: &str) -> bool {
    self.content.contains_key(name)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
    self.content.iter()
  }

  pub fn len(&self) -> usize {
    self.content.len()
  }

  pub fn is_empty(&self) -> bool {
    self.content.is_empty()
  }

  pub fn content(&self) -> &IndexMap<String, Value> {
    &self.content
  }

  /// The content as a JSON object, in insertion order.
  pub fn to_json(&self) -> Value {
    Value::Object(self.content.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
  }
}

/// Output of `DocumentHandler::save`. Writing it anywhere is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub document_key: String,
  pub output_key: String,
  pub content: Vec<u8>,
}

impl Artifact {
  pub fn new(document: &DocumentModel, output_key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    Self {
      document_key: document.key().to_string(),
      output_key: output_key.into(),
      content: content.into(),
    }
  }
}
