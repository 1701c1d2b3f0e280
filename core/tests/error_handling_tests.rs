// tests/error_handling_tests.rs
mod common;

use common::*;
use quire::{
  report::codes, BuildConfig, DiagnosticLevel, DocumentHandler, FailureStage, InputFile, Orchestrator, QuireError,
  RunReport, UnhandledPolicy,
};
use std::sync::Arc;

fn markdown_with(foo: RecordingStep, bar: RecordingStep) -> Arc<dyn DocumentHandler> {
  TestHandler::new("markdown", "md").with_step(foo.arc()).with_step(bar.arc()).arc()
}

async fn clean_run() -> RunReport {
  let log = new_log();
  let handler = markdown_with(RecordingStep::new("Foo", 1, &log), RecordingStep::new("Bar", 2, &log));
  orchestrator(vec![handler], 2)
    .run(files(&["A.md", "B.md", "C.md"]))
    .await
    .unwrap()
}

#[tokio::test]
async fn test_build_failure_is_isolated_to_one_document() {
  setup_tracing();
  let log = new_log();
  let handler = markdown_with(
    RecordingStep::new("Foo", 1, &log),
    RecordingStep::new("Bar", 2, &log).failing_build_on("B.md"),
  );
  let report = orchestrator(vec![handler], 2)
    .run(files(&["A.md", "B.md", "C.md"]))
    .await
    .unwrap();

  assert!(!report.is_success());
  assert_eq!(report.succeeded_keys(), vec!["A.md", "C.md"]);
  assert_eq!(report.failed_keys(), vec!["B.md"]);

  let failure = report.failure("B.md").unwrap();
  assert_eq!(failure.stage, FailureStage::Build);
  assert_eq!(failure.handler, "markdown");
  match &failure.error {
    QuireError::BuildStep { step, document, source, .. } => {
      assert_eq!(step, "Bar");
      assert_eq!(document, "B.md");
      assert!(source.to_string().contains("injected failure"));
    }
    other => panic!("Expected BuildStep error, got {:?}", other),
  }
  assert!(failure.error.is_document_level());

  // Surviving documents are exactly what a clean run produces.
  let clean = clean_run().await;
  for key in ["A.md", "C.md"] {
    assert_eq!(report.document(key), clean.document(key));
  }

  let log = entries(&log);
  assert!(log.contains(&"Bar.build(B.md) failed".to_string()));
  assert!(log.contains(&"Foo.postbuild([A.md,C.md])".to_string()));
  assert!(log.contains(&"Bar.postbuild([A.md,C.md])".to_string()));

  let diagnostics: Vec<_> = report.diagnostics_with_code(codes::BUILD_FAILED).collect();
  assert_eq!(diagnostics.len(), 1);
  assert_eq!(diagnostics[0].file.as_deref(), Some("B.md"));
  assert!(report.has_errors());
}

#[tokio::test]
async fn test_prebuild_failure_aborts_only_its_handler() {
  setup_tracing();
  let log = new_log();
  let markdown = markdown_with(
    RecordingStep::new("Foo", 1, &log).failing_prebuild(),
    RecordingStep::new("Bar", 2, &log),
  );
  let yaml = TestHandler::new("yaml", "yml")
    .with_step(RecordingStep::new("Yml", 1, &log).arc())
    .arc();
  let report = orchestrator(vec![markdown, yaml], 2)
    .run(files(&["a.md", "b.md", "c.yml"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["c.yml"]);
  assert_eq!(report.aborted.len(), 1);
  let aborted = &report.aborted[0];
  assert_eq!(aborted.handler, "markdown");
  assert_eq!(aborted.documents, vec!["a.md", "b.md"]);
  assert!(matches!(&aborted.error, QuireError::PrebuildStep { step, .. } if step == "Foo"));
  assert!(!aborted.error.is_document_level());

  let log = entries(&log);
  assert!(log.contains(&"Foo.prebuild([a.md,b.md])".to_string()));
  assert!(!log.iter().any(|e| e.starts_with("Bar.")));
  assert!(!log.iter().any(|e| e.starts_with("Foo.build")));
  assert!(log.contains(&"Yml.postbuild([c.yml])".to_string()));
  assert_eq!(report.diagnostics_with_code(codes::PREBUILD_FAILED).count(), 1);
}

#[tokio::test]
async fn test_prebuild_cannot_claim_another_handlers_file() {
  setup_tracing();
  let log = new_log();
  let markdown = TestHandler::new("markdown", "md")
    .with_step(
      RecordingStep::new("Foo", 1, &log)
        .injecting_in_prebuild(InputFile::new("b.yml", "stolen"))
        .arc(),
    )
    .arc();
  let yaml = TestHandler::new("yaml", "yml").arc();
  let report = orchestrator(vec![markdown, yaml], 2)
    .run(files(&["a.md", "b.yml"]))
    .await
    .unwrap();

  // b.yml stays with its one owner.
  let owners: Vec<(&str, &str)> = report
    .succeeded
    .iter()
    .map(|doc| (doc.model.key(), doc.handler.as_str()))
    .collect();
  assert_eq!(owners, vec![("b.yml", "yaml")]);

  assert!(!report.is_success());
  assert_eq!(report.aborted.len(), 1);
  assert_eq!(report.aborted[0].handler, "markdown");
  match &report.aborted[0].error {
    QuireError::PrebuildStep { step, source, .. } => {
      assert_eq!(step, "Foo");
      assert!(source.to_string().contains("b.yml"));
    }
    other => panic!("Expected PrebuildStep error, got {:?}", other),
  }
  assert!(!entries(&log).iter().any(|e| e.starts_with("Foo.build")));
}

#[tokio::test]
async fn test_prebuild_cannot_invent_documents() {
  setup_tracing();
  let log = new_log();
  let handler = TestHandler::new("markdown", "md")
    .with_step(
      RecordingStep::new("Foo", 1, &log)
        .injecting_in_prebuild(InputFile::new("ghost.md", ""))
        .arc(),
    )
    .arc();
  let report = orchestrator(vec![handler], 1)
    .run(files(&["a.md"]))
    .await
    .unwrap();

  assert!(report.succeeded.is_empty());
  assert!(matches!(&report.aborted[0].error, QuireError::PrebuildStep { .. }));
  assert_eq!(report.aborted[0].documents, vec!["a.md"]);
}

#[tokio::test]
async fn test_postbuild_failure_aborts_handler_after_build() {
  setup_tracing();
  let log = new_log();
  let markdown = markdown_with(
    RecordingStep::new("Foo", 1, &log).failing_postbuild(),
    RecordingStep::new("Bar", 2, &log),
  );
  let yaml = TestHandler::new("yaml", "yml").arc();
  let report = orchestrator(vec![markdown, yaml], 2)
    .run(files(&["a.md", "b.yml"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["b.yml"]);
  assert_eq!(report.aborted.len(), 1);
  assert!(matches!(&report.aborted[0].error, QuireError::PostbuildStep { step, .. } if step == "Foo"));
  assert_eq!(report.aborted[0].documents, vec!["a.md"]);

  let log = entries(&log);
  assert!(log.contains(&"Bar.build(a.md)".to_string()));
  assert!(log.contains(&"Foo.postbuild([a.md])".to_string()));
  assert!(!log.contains(&"Bar.postbuild([a.md])".to_string()));
}

#[tokio::test]
async fn test_load_failure_keeps_rest_of_batch() {
  setup_tracing();
  let log = new_log();
  let handler = TestHandler::new("markdown", "md")
    .with_step(RecordingStep::new("Foo", 1, &log).arc())
    .failing_load_on("bad.md")
    .arc();
  let report = orchestrator(vec![handler], 2)
    .run(files(&["good.md", "bad.md"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["good.md"]);
  let failure = report.failure("bad.md").unwrap();
  assert_eq!(failure.stage, FailureStage::Load);
  assert!(matches!(&failure.error, QuireError::Load { file, .. } if file == "bad.md"));
  assert_eq!(entries(&log)[0], "Foo.prebuild([good.md])");
}

#[tokio::test]
async fn test_save_failure_is_reported_per_document() {
  setup_tracing();
  let handler = TestHandler::new("markdown", "md").failing_save_on("b.md").arc();
  let report = orchestrator(vec![handler], 1)
    .run(files(&["a.md", "b.md"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["a.md"]);
  assert_eq!(report.failure("b.md").unwrap().stage, FailureStage::Save);
  assert_eq!(report.diagnostics_with_code(codes::SAVE_FAILED).count(), 1);
  assert_eq!(report.artifacts().count(), 1);
}

#[tokio::test]
async fn test_build_panic_is_contained() {
  setup_tracing();
  let log = new_log();
  let handler = markdown_with(
    RecordingStep::new("Foo", 1, &log).panicking_build_on("B.md"),
    RecordingStep::new("Bar", 2, &log),
  );
  let report = orchestrator(vec![handler], 3)
    .run(files(&["A.md", "B.md", "C.md"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["A.md", "C.md"]);
  let failure = report.failure("B.md").unwrap();
  assert_eq!(failure.stage, FailureStage::Build);
  match &failure.error {
    QuireError::BuildStep { source, .. } => assert!(source.to_string().contains("Foo exploded on B.md")),
    other => panic!("Expected BuildStep error, got {:?}", other),
  }
  assert!(entries(&log).contains(&"Bar.postbuild([A.md,C.md])".to_string()));
}

#[tokio::test]
async fn test_unhandled_files_warn_by_default() {
  setup_tracing();
  let report = orchestrator(vec![TestHandler::new("markdown", "md").arc()], 1)
    .run(files(&["a.md", "logo.png"]))
    .await
    .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["a.md"]);
  assert_eq!(report.unhandled, vec!["logo.png"]);
  assert!(!report.is_success());
  let warning = report.diagnostics_with_code(codes::UNHANDLED_FILE).next().unwrap();
  assert_eq!(warning.level, DiagnosticLevel::Warning);
  assert!(!report.has_errors());
}

#[tokio::test]
async fn test_unhandled_files_rejected_under_fail_policy() {
  setup_tracing();
  let log = new_log();
  let handler = TestHandler::new("markdown", "md")
    .with_step(RecordingStep::new("Foo", 1, &log).arc())
    .arc();
  let config = BuildConfig::default()
    .with_worker_pool_size(1)
    .with_unhandled_files(UnhandledPolicy::Fail);
  let orchestrator = Orchestrator::new(registry_with(vec![handler]), config).unwrap();

  match orchestrator.run(files(&["a.md", "logo.png", "font.ttf"])).await {
    Err(QuireError::UnhandledFilesRejected { files }) => assert_eq!(files, vec!["logo.png", "font.ttf"]),
    other => panic!("Expected UnhandledFilesRejected, got {:?}", other.map(|r| r.summary())),
  }
  // Rejected before any phase began.
  assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn test_conflicted_file_excluded_from_run() {
  setup_tracing();
  let report = orchestrator(
    vec![
      TestHandler::new("alpha", "md").arc(),
      TestHandler::new("beta", "md").arc(),
      TestHandler::new("yaml", "yml").arc(),
    ],
    2,
  )
  .run(files(&["x.md", "y.yml"]))
  .await
  .unwrap();

  assert_eq!(report.succeeded_keys(), vec!["y.yml"]);
  assert_eq!(report.conflicts.len(), 1);
  assert_eq!(report.conflicts[0].handlers, vec!["alpha", "beta"]);
  let diagnostic = report.diagnostics_with_code(codes::HANDLER_CONFLICT).next().unwrap();
  assert_eq!(diagnostic.level, DiagnosticLevel::Error);
  assert_eq!(diagnostic.file.as_deref(), Some("x.md"));
}

#[test]
fn test_zero_workers_rejected() {
  let result = Orchestrator::new(
    registry_with(vec![TestHandler::new("markdown", "md").arc()]),
    BuildConfig::default().with_worker_pool_size(0),
  );
  assert!(matches!(result, Err(QuireError::Configuration { .. })));
}
