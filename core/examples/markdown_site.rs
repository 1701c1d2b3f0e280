// quire/examples/markdown_site.rs

use quire::{
  async_trait, Artifact, BuildConfig, BuildStep, ContextKey, DocumentHandler, DocumentModel, HandlerRegistry,
  InputFile, MapResolver, Orchestrator, ProcessingPriority, QuireError, ReferenceResolver, ScopedContext,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

// 1. Steps. Each one takes part in whichever phases it needs.

/// PRE_BUILD: collects every page title so pages can link to each other.
struct CollectTitles;

#[async_trait]
impl BuildStep for CollectTitles {
  fn name(&self) -> &str {
    "titles"
  }

  fn build_order(&self) -> i32 {
    0
  }

  async fn prebuild(&self, batch: Vec<DocumentModel>, ctx: &ScopedContext) -> anyhow::Result<Vec<DocumentModel>> {
    // Drafts never make it past this point.
    let batch: Vec<DocumentModel> = batch.into_iter().filter(|doc| !doc.key().starts_with("_")).collect();
    let titles: Vec<_> = batch
      .iter()
      .map(|doc| json!({ "page": doc.key(), "title": doc.get_str("title").unwrap_or(doc.key()) }))
      .collect();
    ctx.insert("titles", titles)?;
    Ok(batch)
  }
}

/// BUILD: renders one page.
struct Render;

#[async_trait]
impl BuildStep for Render {
  fn name(&self) -> &str {
    "render"
  }

  fn build_order(&self) -> i32 {
    10
  }

  async fn build(&self, mut document: DocumentModel, ctx: &ScopedContext) -> anyhow::Result<DocumentModel> {
    let body = document.get_str("body").unwrap_or_default();
    let html: Vec<String> = body
      .lines()
      .map(|line| match line.strip_prefix("# ") {
        Some(heading) => format!("<h1>{}</h1>", heading),
        None => format!("<p>{}</p>", line),
      })
      .collect();
    ctx.append(json!({ "lines": html.len() }))?;
    document.insert("html", html.join("\n"));

    let site_size = ctx
      .get(&ContextKey::step("markdown", "titles"), "titles")
      .and_then(|titles| titles.as_array().map(Vec::len))
      .unwrap_or(0);
    document.insert("site_size", site_size);
    Ok(document)
  }
}

/// POST_BUILD: aggregates over every page that built.
struct SiteIndex;

#[async_trait]
impl BuildStep for SiteIndex {
  fn name(&self) -> &str {
    "index"
  }

  fn build_order(&self) -> i32 {
    20
  }

  async fn postbuild(&self, batch: &[DocumentModel], ctx: &ScopedContext) -> anyhow::Result<()> {
    let pages: Vec<&str> = batch.iter().map(|doc| doc.key()).collect();
    info!(pages = pages.len(), "Index built.");
    ctx.insert("pages", json!(pages))?;
    Ok(())
  }
}

// 2. The handler: claims `.md`, loads, saves, rewrites links.

struct MarkdownHandler;

impl DocumentHandler for MarkdownHandler {
  fn name(&self) -> &str {
    "markdown"
  }

  fn can_handle(&self, file: &InputFile) -> ProcessingPriority {
    match file.extension() {
      Some("md") => ProcessingPriority::High,
      Some("txt") => ProcessingPriority::Lowest,
      _ => ProcessingPriority::NotSupported,
    }
  }

  fn load(&self, file: &InputFile) -> anyhow::Result<DocumentModel> {
    let text = file
      .as_str()
      .ok_or_else(|| anyhow::anyhow!("'{}' is not UTF-8", file.key()))?;
    let title = text.lines().find_map(|line| line.strip_prefix("# ")).unwrap_or_default();
    Ok(
      DocumentModel::new(file, self.name())
        .with("title", title)
        .with("body", text)
        .with("link", text.lines().find_map(|line| line.strip_prefix("see: ")).unwrap_or_default()),
    )
  }

  fn save(&self, model: &DocumentModel) -> anyhow::Result<Artifact> {
    let output = model.key().replace(".md", ".html");
    Ok(Artifact::new(model, output, model.get_str("html").unwrap_or_default()))
  }

  fn steps(&self) -> Vec<Arc<dyn BuildStep>> {
    vec![Arc::new(SiteIndex), Arc::new(Render), Arc::new(CollectTitles)]
  }

  fn supports_references(&self) -> bool {
    true
  }

  fn update_references(&self, mut model: DocumentModel, resolver: &dyn ReferenceResolver) -> anyhow::Result<DocumentModel> {
    let link = model.get_str("link").unwrap_or_default().to_string();
    if let Some(target) = resolver.resolve(&link) {
      model.insert("link", target);
    }
    Ok(model)
  }
}

#[tokio::main]
async fn main() -> Result<(), QuireError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Markdown Site Example ---");

  // 3. Register handlers and build the orchestrator.
  let registry = HandlerRegistry::new();
  registry.register(Arc::new(MarkdownHandler))?;

  let config = BuildConfig::from_toml_str("worker_pool_size = 2")?.apply_env_overrides()?;
  let resolver = MapResolver(
    [("guide.md".to_string(), "guide.html".to_string())]
      .into_iter()
      .collect(),
  );
  let orchestrator = Orchestrator::new(Arc::new(registry), config)?.with_resolver(Arc::new(resolver));

  // 4. Run.
  let report = orchestrator
    .run(vec![
      InputFile::new("index.md", "# Home\nWelcome.\nsee: guide.md"),
      InputFile::new("guide.md", "# Guide\nStep one.\nStep two."),
      InputFile::new("_draft.md", "# Unfinished"),
      InputFile::new("logo.png", vec![0x89, 0x50, 0x4e, 0x47]),
    ])
    .await?;

  // 5. Inspect the report.
  info!("{}", report.summary());
  for artifact in report.artifacts() {
    info!(output = %artifact.output_key, bytes = artifact.content.len(), "Artifact ready.");
  }
  for diagnostic in &report.diagnostics {
    info!("{}", diagnostic);
  }
  Ok(())
}
