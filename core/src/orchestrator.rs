// quire/src/orchestrator.rs

//! Defines the `Orchestrator`, which drives one run: assignment, load, the three
//! global phases, and finally reference update and save of surviving documents.

use crate::config::{BuildConfig, UnhandledPolicy};
use crate::core::cancel::CancellationToken;
use crate::core::context::{BuildContext, ContextKey};
use crate::core::model::{DocumentModel, InputFile};
use crate::core::phase::PhaseState;
use crate::core::reference::ReferenceResolver;
use crate::error::{QuireError, QuireResult};
use crate::pipeline::{JobOutcome, StepPipeline, WorkerPool};
use crate::registry::{Assignment, HandlerRegistry};
use crate::report::{codes, AbortedHandler, BuiltDocument, Diagnostic, DiagnosticLevel, FailureStage, RunReport};
use anyhow::anyhow;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// One handler's share of the run.
struct HandlerBatch {
  pipeline: StepPipeline,
  state: PhaseState,
  documents: Vec<DocumentModel>,
}

impl HandlerBatch {
  fn name(&self) -> &str {
    self.pipeline.handler_name()
  }

  fn keys(&self) -> Vec<String> {
    self.documents.iter().map(|doc| doc.key().to_string()).collect()
  }
}

/// Drives runs over the handlers of a `HandlerRegistry`.
///
/// Phases are global: every handler finishes PRE_BUILD before any document starts
/// BUILD, and every BUILD pipeline finishes before any handler starts POST_BUILD.
pub struct Orchestrator {
  registry: Arc<HandlerRegistry>,
  config: BuildConfig,
  resolver: Option<Arc<dyn ReferenceResolver>>,
}

impl Orchestrator {
  pub fn new(registry: Arc<HandlerRegistry>, config: BuildConfig) -> QuireResult<Self> {
    config.validate()?;
    Ok(Self {
      registry,
      config,
      resolver: None,
    })
  }

  /// Surviving documents go through `DocumentHandler::update_references` with this
  /// resolver before they are saved.
  pub fn with_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
    self.resolver = Some(resolver);
    self
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn registry(&self) -> &Arc<HandlerRegistry> {
    &self.registry
  }

  pub async fn run(&self, files: Vec<InputFile>) -> QuireResult<RunReport> {
    self.run_with_cancellation(files, &CancellationToken::new()).await
  }

  /// Runs every phase over `files`.
  ///
  /// Returns `Err` only when the run is rejected before any phase begins (invalid
  /// step configuration, or unhandled files under `UnhandledPolicy::Fail`). Every
  /// document- and handler-level failure is reported in the `RunReport`.
  #[instrument(
        name = "Orchestrator::run",
        skip_all,
        fields(files = files.len(), workers = self.config.worker_pool_size),
        err(Display)
    )]
  pub async fn run_with_cancellation(&self, files: Vec<InputFile>, cancel: &CancellationToken) -> QuireResult<RunReport> {
    let mut report = RunReport::default();

    let assignment = self.registry.assign(files);
    self.report_assignment(&assignment, &mut report)?;

    let pipelines = assignment
      .groups()
      .iter()
      .map(|group| StepPipeline::for_handler(group.handler.clone()))
      .collect::<QuireResult<Vec<_>>>()?;

    let mut batches = Vec::with_capacity(pipelines.len());
    for (pipeline, group) in pipelines.into_iter().zip(assignment.groups()) {
      let documents = load_group(&pipeline, &group.files, &mut report);
      if documents.is_empty() {
        event!(Level::DEBUG, handler = %pipeline.handler_name(), "No documents loaded, handler skipped.");
        continue;
      }
      batches.push(HandlerBatch {
        pipeline,
        state: PhaseState::PreBuild,
        documents,
      });
    }

    let context = BuildContext::new();
    prebuild_phase(&mut batches, &context, cancel, &mut report).await?;
    self.build_phase(&mut batches, &context, cancel, &mut report).await?;
    postbuild_phase(&mut batches, &context, &mut report).await?;
    self.finalize(&mut batches, &mut report);

    report.context = context.snapshot();
    event!(Level::INFO, summary = %report.summary(), "Run finished.");
    Ok(report)
  }

  fn report_assignment(&self, assignment: &Assignment, report: &mut RunReport) -> QuireResult<()> {
    let unhandled_level = match self.config.unhandled_files {
      UnhandledPolicy::Warn => DiagnosticLevel::Warning,
      UnhandledPolicy::Fail => DiagnosticLevel::Error,
    };
    for file in assignment.unhandled() {
      report.push_diagnostic(
        Diagnostic::new(unhandled_level, codes::UNHANDLED_FILE, "no handler claims this file").with_file(file),
      );
    }
    for file in assignment.duplicates() {
      report.push_diagnostic(
        Diagnostic::new(
          DiagnosticLevel::Warning,
          codes::DUPLICATE_INPUT,
          "input key supplied more than once, later copies ignored",
        )
        .with_file(file),
      );
    }
    for conflict in assignment.conflicts() {
      let error = QuireError::from(conflict.clone());
      report.push_diagnostic(
        Diagnostic::new(DiagnosticLevel::Error, codes::HANDLER_CONFLICT, error.to_string()).with_file(&conflict.file),
      );
    }

    report.unhandled = assignment.unhandled().to_vec();
    report.duplicates = assignment.duplicates().to_vec();
    report.conflicts = assignment.conflicts().to_vec();

    if self.config.unhandled_files == UnhandledPolicy::Fail && !report.unhandled.is_empty() {
      return Err(QuireError::UnhandledFilesRejected {
        files: report.unhandled.clone(),
      });
    }
    Ok(())
  }

  /// Runs one BUILD pipeline per document on the worker pool, across all handlers.
  #[instrument(name = "Orchestrator::build_phase", skip_all, fields(workers = self.config.worker_pool_size))]
  async fn build_phase(
    &self,
    batches: &mut [HandlerBatch],
    context: &BuildContext,
    cancel: &CancellationToken,
    report: &mut RunReport,
  ) -> QuireResult<()> {
    let pipelines: Vec<StepPipeline> = batches.iter().map(|batch| batch.pipeline.clone()).collect();

    let mut jobs = Vec::new();
    for (batch_idx, batch) in batches.iter_mut().enumerate() {
      if batch.state == PhaseState::Build {
        jobs.extend(std::mem::take(&mut batch.documents).into_iter().map(|doc| (batch_idx, doc)));
      }
    }
    let job_keys: Vec<(usize, String)> = jobs.iter().map(|(idx, doc)| (*idx, doc.key().to_string())).collect();
    event!(Level::DEBUG, documents = jobs.len(), "Build phase starting.");

    let pool = WorkerPool::new(self.config.worker_pool_size);
    let outcomes = pool
      .run(jobs, cancel, |(batch_idx, document)| {
        let pipeline = pipelines[batch_idx].clone();
        let context = context.clone();
        let cancel = cancel.clone();
        async move { pipeline.build(document, &context, &cancel).await }
      })
      .await;

    // The pool returns outcomes in submission order, so survivors keep their batch order.
    for ((batch_idx, key), outcome) in job_keys.into_iter().zip(outcomes) {
      let batch = &mut batches[batch_idx];
      let handler = batch.name().to_string();
      match outcome {
        JobOutcome::Completed(Ok(document)) => batch.documents.push(document),
        JobOutcome::Completed(Err(error @ QuireError::Cancelled { .. })) => {
          report.push_failure(&handler, &key, FailureStage::Cancelled, error)
        }
        JobOutcome::Completed(Err(error)) => report.push_failure(&handler, &key, FailureStage::Build, error),
        JobOutcome::Panicked(message) => {
          let error = batch
            .pipeline
            .build_error("unknown", &key, anyhow!("build pipeline panicked: {}", message));
          report.push_failure(&handler, &key, FailureStage::Build, error)
        }
        JobOutcome::NotStarted => report.push_failure(
          &handler,
          &key,
          FailureStage::Cancelled,
          QuireError::Cancelled { document: key.clone() },
        ),
      }
    }

    // The BUILD/POST_BUILD boundary is the last point cancellation is observed.
    let cancelled = cancel.is_cancelled();
    report.cancelled = cancelled;
    for batch in batches.iter_mut().filter(|batch| batch.state == PhaseState::Build) {
      if cancelled {
        // Finished pipelines still never reach POST_BUILD.
        let handler = batch.name().to_string();
        for document in std::mem::take(&mut batch.documents) {
          let key = document.key().to_string();
          report.push_failure(&handler, &key, FailureStage::Cancelled, QuireError::Cancelled { document: key.clone() });
        }
        batch.state.advance(PhaseState::Cancelled)?;
      } else {
        batch.state.advance(PhaseState::PostBuild)?;
      }
    }
    if cancelled {
      report.push_diagnostic(Diagnostic::new(
        DiagnosticLevel::Warning,
        codes::RUN_CANCELLED,
        "run cancelled before POST_BUILD, POST_BUILD skipped",
      ));
    }
    Ok(())
  }

  /// Reference update and save for every handler that reached `Done`.
  fn finalize(&self, batches: &mut [HandlerBatch], report: &mut RunReport) {
    for batch in batches.iter_mut().filter(|batch| batch.state == PhaseState::Done) {
      let handler = batch.pipeline.handler().clone();
      for document in std::mem::take(&mut batch.documents) {
        let key = document.key().to_string();
        let document = match &self.resolver {
          Some(resolver) if handler.supports_references() => {
            match handler.update_references(document, resolver.as_ref()) {
              Ok(document) => document,
              Err(source) => {
                let error = QuireError::UpdateReferences {
                  handler: handler.name().to_string(),
                  document: key.clone(),
                  source,
                };
                report.push_failure(handler.name(), &key, FailureStage::UpdateReferences, error);
                continue;
              }
            }
          }
          _ => document,
        };
        match handler.save(&document) {
          Ok(artifact) => report.succeeded.push(BuiltDocument {
            handler: handler.name().to_string(),
            model: document,
            artifact,
          }),
          Err(source) => {
            let error = QuireError::Save {
              handler: handler.name().to_string(),
              document: key.clone(),
              source,
            };
            report.push_failure(handler.name(), &key, FailureStage::Save, error);
          }
        }
      }
    }
  }
}

impl std::fmt::Debug for Orchestrator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Orchestrator")
      .field("registry", &self.registry)
      .field("config", &self.config)
      .field("resolver_present", &self.resolver.is_some())
      .finish()
  }
}

fn load_group(pipeline: &StepPipeline, files: &[InputFile], report: &mut RunReport) -> Vec<DocumentModel> {
  let handler = pipeline.handler();
  let mut documents = Vec::with_capacity(files.len());
  for file in files {
    let loaded = handler.load(file).and_then(|model| {
      if model.key() != file.key() || model.handler() != handler.name() {
        Err(anyhow!(
          "loaded model is '{}' of handler '{}'",
          model.key(),
          model.handler()
        ))
      } else {
        Ok(model)
      }
    });
    match loaded {
      Ok(model) => documents.push(model),
      Err(source) => {
        let error = QuireError::Load {
          handler: handler.name().to_string(),
          file: file.key().to_string(),
          source,
        };
        report.push_failure(handler.name(), file.key(), FailureStage::Load, error);
      }
    }
  }
  documents
}

#[instrument(name = "Orchestrator::prebuild_phase", skip_all, fields(handlers = batches.len()))]
async fn prebuild_phase(
  batches: &mut [HandlerBatch],
  context: &BuildContext,
  cancel: &CancellationToken,
  report: &mut RunReport,
) -> QuireResult<()> {
  for batch in batches.iter_mut() {
    let handler = batch.name().to_string();
    if cancel.is_cancelled() {
      for key in batch.keys() {
        report.push_failure(&handler, &key, FailureStage::Cancelled, QuireError::Cancelled { document: key.clone() });
      }
      batch.documents.clear();
      batch.state.advance(PhaseState::Cancelled)?;
      continue;
    }

    let input_keys = batch.keys();
    let input = std::mem::take(&mut batch.documents);
    let result = batch.pipeline.prebuild(input, context).await;
    match result {
      Ok(output) => {
        let kept: HashSet<&str> = output.iter().map(|doc| doc.key()).collect();
        for key in input_keys.iter().filter(|key| !kept.contains(key.as_str())) {
          report.push_diagnostic(
            Diagnostic::new(DiagnosticLevel::Info, codes::DOCUMENT_FILTERED, "removed from the batch during prebuild")
              .with_file(key)
              .with_handler(&handler),
          );
          report.filtered.push(key.clone());
        }
        batch.documents = output;
        context.insert_entry(&ContextKey::handler(&handler), "documents", json!(batch.keys()))?;
        batch.state.advance(PhaseState::Build)?;
      }
      Err(error) => {
        report.push_diagnostic(
          Diagnostic::new(DiagnosticLevel::Error, codes::PREBUILD_FAILED, error.to_string()).with_handler(&handler),
        );
        report.aborted.push(AbortedHandler {
          handler,
          error,
          documents: input_keys,
        });
        batch.state.advance(PhaseState::Aborted)?;
      }
    }
  }
  Ok(())
}

#[instrument(name = "Orchestrator::postbuild_phase", skip_all)]
async fn postbuild_phase(batches: &mut [HandlerBatch], context: &BuildContext, report: &mut RunReport) -> QuireResult<()> {
  for batch in batches.iter_mut().filter(|batch| batch.state == PhaseState::PostBuild) {
    let handler = batch.name().to_string();
    context.insert_entry(&ContextKey::handler(&handler), "survivors", json!(batch.keys()))?;
    let result = batch.pipeline.postbuild(&batch.documents, context).await;
    match result {
      Ok(()) => batch.state.advance(PhaseState::Done)?,
      Err(error) => {
        report.push_diagnostic(
          Diagnostic::new(DiagnosticLevel::Error, codes::POSTBUILD_FAILED, error.to_string()).with_handler(&handler),
        );
        let documents = batch.keys();
        batch.documents.clear();
        report.aborted.push(AbortedHandler {
          handler,
          error,
          documents,
        });
        batch.state.advance(PhaseState::Aborted)?;
      }
    }
  }
  Ok(())
}
