// quire/src/core/context.rs

//! Defines `BuildContext`, the one intentionally shared mutable object of a run,
//! and `ScopedContext`, the owner-bound view steps receive.
//!
//! Write ownership: a step only writes under its own `ContextKey`. During the batch
//! phases it inserts named, write-once entries; during BUILD it appends values
//! recorded under the document being built. Reads are unrestricted.

use crate::core::phase::Phase;
use crate::error::{QuireError, QuireResult};
use indexmap::IndexMap;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity a context slot is owned by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContextKey {
  Handler(String),
  Step { handler: String, step: String },
}

impl ContextKey {
  pub fn handler(name: impl Into<String>) -> Self {
    ContextKey::Handler(name.into())
  }

  pub fn step(handler: impl Into<String>, step: impl Into<String>) -> Self {
    ContextKey::Step {
      handler: handler.into(),
      step: step.into(),
    }
  }
}

impl fmt::Display for ContextKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ContextKey::Handler(name) => write!(f, "{}", name),
      ContextKey::Step { handler, step } => write!(f, "{}::{}", handler, step),
    }
  }
}

/// Everything written under one `ContextKey`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSlot {
  /// Named entries written during PRE_BUILD / POST_BUILD, in write order.
  pub entries: IndexMap<String, Value>,
  /// Values appended during BUILD, per document key.
  pub documents: BTreeMap<String, Vec<Value>>,
}

/// A point-in-time copy of the whole context. Slot order is by key, so two
/// snapshots of equal contents compare and print the same.
pub type ContextSnapshot = BTreeMap<ContextKey, ContextSlot>;

/// Shared artifact store for one run.
///
/// Cloning is cheap and shares the same store. Lock guards are blocking and are
/// never held across `.await` points inside this crate.
#[derive(Debug, Clone, Default)]
pub struct BuildContext(Arc<RwLock<ContextSnapshot>>);

impl BuildContext {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a view bound to `owner`, `phase` and (during BUILD) `document`.
  pub fn scope(&self, owner: ContextKey, phase: Phase, document: Option<&str>) -> ScopedContext {
    ScopedContext {
      context: self.clone(),
      owner,
      phase,
      document: document.map(str::to_string),
    }
  }

  pub fn get(&self, owner: &ContextKey, name: &str) -> Option<Value> {
    self.0.read().get(owner).and_then(|slot| slot.entries.get(name).cloned())
  }

  /// Read guard over one slot.
  pub fn slot(&self, owner: &ContextKey) -> Option<MappedRwLockReadGuard<'_, ContextSlot>> {
    RwLockReadGuard::try_map(self.0.read(), |slots| slots.get(owner)).ok()
  }

  pub fn snapshot(&self) -> ContextSnapshot {
    self.0.read().clone()
  }

  pub fn is_empty(&self) -> bool {
    self.0.read().is_empty()
  }

  /// Drops every slot. Runs start from a fresh context, this is for callers
  /// reusing one across independent runs.
  pub fn clear(&self) {
    self.0.write().clear();
  }

  pub(crate) fn insert_entry(&self, owner: &ContextKey, name: &str, value: Value) -> QuireResult<()> {
    let mut slots = self.0.write();
    let slot = slots.entry(owner.clone()).or_default();
    if slot.entries.contains_key(name) {
      return Err(QuireError::Context {
        owner: owner.to_string(),
        message: format!("entry '{}' already written", name),
      });
    }
    slot.entries.insert(name.to_string(), value);
    Ok(())
  }

  pub(crate) fn append_for_document(&self, owner: &ContextKey, document: &str, value: Value) {
    self
      .0
      .write()
      .entry(owner.clone())
      .or_default()
      .documents
      .entry(document.to_string())
      .or_default()
      .push(value);
  }
}

/// The context as seen by one step in one phase.
#[derive(Debug, Clone)]
pub struct ScopedContext {
  context: BuildContext,
  owner: ContextKey,
  phase: Phase,
  document: Option<String>,
}

impl ScopedContext {
  pub fn owner(&self) -> &ContextKey {
    &self.owner
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// The document being built. `None` outside BUILD.
  pub fn document(&self) -> Option<&str> {
    self.document.as_deref()
  }

  /// Writes a named entry under this step's own key. PRE_BUILD / POST_BUILD only; write-once.
  pub fn insert(&self, name: &str, value: impl Into<Value>) -> QuireResult<()> {
    if self.phase == Phase::Build {
      return Err(QuireError::Context {
        owner: self.owner.to_string(),
        message: format!("named entry '{}' cannot be written during {}; use append", name, self.phase),
      });
    }
    self.context.insert_entry(&self.owner, name, value.into())
  }

  /// Appends a value under this step's own key for the current document. BUILD only.
  pub fn append(&self, value: impl Into<Value>) -> QuireResult<()> {
    match &self.document {
      Some(document) => {
        self.context.append_for_document(&self.owner, document, value.into());
        Ok(())
      }
      None => Err(QuireError::Context {
        owner: self.owner.to_string(),
        message: format!("append is only available during BUILD, not {}", self.phase),
      }),
    }
  }

  /// Reads a named entry from this step's own slot.
  pub fn own(&self, name: &str) -> Option<Value> {
    self.context.get(&self.owner, name)
  }

  /// Reads a named entry from any slot.
  pub fn get(&self, owner: &ContextKey, name: &str) -> Option<Value> {
    self.context.get(owner, name)
  }

  /// Values appended during BUILD under `owner`, by document.
  pub fn document_entries(&self, owner: &ContextKey) -> BTreeMap<String, Vec<Value>> {
    self
      .context
      .slot(owner)
      .map(|slot| slot.documents.clone())
      .unwrap_or_default()
  }

  pub fn snapshot(&self) -> ContextSnapshot {
    self.context.snapshot()
  }
}
