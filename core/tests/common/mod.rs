// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use anyhow::anyhow;
use parking_lot::Mutex;
use quire::{
  async_trait, Artifact, BuildConfig, BuildStep, CancellationToken, DocumentHandler, DocumentModel, HandlerRegistry,
  InputFile, Orchestrator, ProcessingPriority, ScopedContext,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

// --- Shared event log ---
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
  Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &EventLog) -> Vec<String> {
  log.lock().clone()
}

pub fn position(log: &[String], entry: &str) -> usize {
  log
    .iter()
    .position(|e| e == entry)
    .unwrap_or_else(|| panic!("'{}' not found in {:?}", entry, log))
}

fn keys_of(batch: &[DocumentModel]) -> String {
  batch.iter().map(|doc| doc.key().to_string()).collect::<Vec<_>>().join(",")
}

// --- Recording step ---

/// A step that records every phase call as `Name.phase(keys)` and leaves a trail
/// in the document and in its context slot.
pub struct RecordingStep {
  pub name: String,
  pub order: i32,
  pub log: EventLog,
  pub fail_prebuild: bool,
  pub fail_postbuild: bool,
  pub fail_build_on: Option<String>,
  pub panic_build_on: Option<String>,
  pub drop_in_prebuild: Option<String>,
  pub cancel_on: Option<(String, CancellationToken)>,
  pub cancel_in_postbuild: Option<CancellationToken>,
  pub inject_in_prebuild: Option<InputFile>,
  pub delay_ms: u64,
  pub jitter: bool,
}

impl RecordingStep {
  pub fn new(name: &str, order: i32, log: &EventLog) -> Self {
    Self {
      name: name.to_string(),
      order,
      log: log.clone(),
      fail_prebuild: false,
      fail_postbuild: false,
      fail_build_on: None,
      panic_build_on: None,
      drop_in_prebuild: None,
      cancel_on: None,
      cancel_in_postbuild: None,
      inject_in_prebuild: None,
      delay_ms: 0,
      jitter: false,
    }
  }

  pub fn failing_prebuild(mut self) -> Self {
    self.fail_prebuild = true;
    self
  }

  pub fn failing_postbuild(mut self) -> Self {
    self.fail_postbuild = true;
    self
  }

  pub fn failing_build_on(mut self, key: &str) -> Self {
    self.fail_build_on = Some(key.to_string());
    self
  }

  pub fn panicking_build_on(mut self, key: &str) -> Self {
    self.panic_build_on = Some(key.to_string());
    self
  }

  pub fn dropping_in_prebuild(mut self, key: &str) -> Self {
    self.drop_in_prebuild = Some(key.to_string());
    self
  }

  pub fn cancelling_on(mut self, key: &str, token: &CancellationToken) -> Self {
    self.cancel_on = Some((key.to_string(), token.clone()));
    self
  }

  pub fn cancelling_in_postbuild(mut self, token: &CancellationToken) -> Self {
    self.cancel_in_postbuild = Some(token.clone());
    self
  }

  /// Adds a document for `file`, claimed for this step's handler, to the prebuild output.
  pub fn injecting_in_prebuild(mut self, file: InputFile) -> Self {
    self.inject_in_prebuild = Some(file);
    self
  }

  /// Sleeps `millis` in `build` before doing any work.
  pub fn with_delay(mut self, millis: u64) -> Self {
    self.delay_ms = millis;
    self
  }

  /// Sleeps a key-dependent few milliseconds in `build` so pipelines interleave.
  pub fn with_jitter(mut self) -> Self {
    self.jitter = true;
    self
  }

  pub fn arc(self) -> Arc<dyn BuildStep> {
    Arc::new(self)
  }
}

#[async_trait]
impl BuildStep for RecordingStep {
  fn name(&self) -> &str {
    &self.name
  }

  fn build_order(&self) -> i32 {
    self.order
  }

  async fn prebuild(&self, batch: Vec<DocumentModel>, ctx: &ScopedContext) -> anyhow::Result<Vec<DocumentModel>> {
    self.log.lock().push(format!("{}.prebuild([{}])", self.name, keys_of(&batch)));
    if self.fail_prebuild {
      return Err(anyhow!("{} refuses the batch", self.name));
    }
    ctx.insert("batch_size", batch.len())?;
    let mut batch: Vec<DocumentModel> = batch
      .into_iter()
      .filter(|doc| self.drop_in_prebuild.as_deref() != Some(doc.key()))
      .collect();
    let handler = batch.first().map(|doc| doc.handler().to_string());
    if let (Some(file), Some(handler)) = (&self.inject_in_prebuild, handler) {
      batch.push(DocumentModel::new(file, handler));
    }
    Ok(batch)
  }

  async fn build(&self, mut document: DocumentModel, ctx: &ScopedContext) -> anyhow::Result<DocumentModel> {
    let key = document.key().to_string();
    if let Some((cancel_key, token)) = &self.cancel_on {
      if *cancel_key == key {
        token.cancel();
      }
    }
    if self.delay_ms > 0 {
      tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
    }
    if self.jitter {
      let millis = key.bytes().map(u64::from).sum::<u64>() % 7;
      tokio::time::sleep(Duration::from_millis(millis)).await;
    }
    if self.panic_build_on.as_deref() == Some(key.as_str()) {
      panic!("{} exploded on {}", self.name, key);
    }
    if self.fail_build_on.as_deref() == Some(key.as_str()) {
      self.log.lock().push(format!("{}.build({}) failed", self.name, key));
      return Err(anyhow!("injected failure in {} for {}", self.name, key));
    }

    let mut trail = document
      .get("trail")
      .and_then(Value::as_array)
      .cloned()
      .unwrap_or_default();
    trail.push(json!(self.name));
    let depth = trail.len();
    document.insert("trail", trail);
    ctx.append(json!({ "depth": depth }))?;

    self.log.lock().push(format!("{}.build({})", self.name, key));
    Ok(document)
  }

  async fn postbuild(&self, batch: &[DocumentModel], ctx: &ScopedContext) -> anyhow::Result<()> {
    self.log.lock().push(format!("{}.postbuild([{}])", self.name, keys_of(batch)));
    if let Some(token) = &self.cancel_in_postbuild {
      token.cancel();
    }
    if self.fail_postbuild {
      return Err(anyhow!("{} cannot aggregate", self.name));
    }
    let keys: Vec<&str> = batch.iter().map(|doc| doc.key()).collect();
    ctx.insert("seen", json!(keys))?;
    Ok(())
  }
}

// --- Test handler ---

/// Claims files by extension and loads their text into `body`.
pub struct TestHandler {
  pub name: String,
  pub extension: String,
  pub priority: ProcessingPriority,
  pub steps: Vec<Arc<dyn BuildStep>>,
  pub fail_load_on: Option<String>,
  pub fail_save_on: Option<String>,
}

impl TestHandler {
  pub fn new(name: &str, extension: &str) -> Self {
    Self {
      name: name.to_string(),
      extension: extension.to_string(),
      priority: ProcessingPriority::Normal,
      steps: Vec::new(),
      fail_load_on: None,
      fail_save_on: None,
    }
  }

  pub fn with_priority(mut self, priority: ProcessingPriority) -> Self {
    self.priority = priority;
    self
  }

  pub fn with_step(mut self, step: Arc<dyn BuildStep>) -> Self {
    self.steps.push(step);
    self
  }

  pub fn failing_load_on(mut self, key: &str) -> Self {
    self.fail_load_on = Some(key.to_string());
    self
  }

  pub fn failing_save_on(mut self, key: &str) -> Self {
    self.fail_save_on = Some(key.to_string());
    self
  }

  pub fn arc(self) -> Arc<dyn DocumentHandler> {
    Arc::new(self)
  }
}

impl DocumentHandler for TestHandler {
  fn name(&self) -> &str {
    &self.name
  }

  fn can_handle(&self, file: &InputFile) -> ProcessingPriority {
    if file.extension() == Some(self.extension.as_str()) {
      self.priority
    } else {
      ProcessingPriority::NotSupported
    }
  }

  fn load(&self, file: &InputFile) -> anyhow::Result<DocumentModel> {
    if self.fail_load_on.as_deref() == Some(file.key()) {
      return Err(anyhow!("malformed input"));
    }
    Ok(DocumentModel::new(file, &self.name).with("body", file.as_str().unwrap_or_default()))
  }

  fn save(&self, model: &DocumentModel) -> anyhow::Result<Artifact> {
    if self.fail_save_on.as_deref() == Some(model.key()) {
      return Err(anyhow!("disk full"));
    }
    let content = serde_json::to_vec(&model.to_json())?;
    Ok(Artifact::new(model, format!("{}.json", model.key()), content))
  }

  fn steps(&self) -> Vec<Arc<dyn BuildStep>> {
    self.steps.clone()
  }
}

// --- Helpers ---

pub fn files(keys: &[&str]) -> Vec<InputFile> {
  keys
    .iter()
    .map(|key| InputFile::new(*key, format!("content of {}", key)))
    .collect()
}

pub fn registry_with(handlers: Vec<Arc<dyn DocumentHandler>>) -> Arc<HandlerRegistry> {
  let registry = HandlerRegistry::new();
  for handler in handlers {
    registry.register(handler).expect("handler names are unique in tests");
  }
  Arc::new(registry)
}

pub fn orchestrator(handlers: Vec<Arc<dyn DocumentHandler>>, workers: usize) -> Orchestrator {
  Orchestrator::new(registry_with(handlers), BuildConfig::default().with_worker_pool_size(workers))
    .expect("valid test configuration")
}

pub fn trail(model: &DocumentModel) -> Vec<String> {
  model
    .get("trail")
    .and_then(Value::as_array)
    .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
    .unwrap_or_default()
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
