//! Content processing: one source file in, metadata + HTML fragment out.
//!
//! Each content file is pushed through a [`ContentPipeline`], a
//! priority-ordered list of [`ContentStage`]s sharing one mutable
//! [`ContentContext`]. The standard stages (see [`stages`]) parse front
//! matter, set the draft flag, resolve paths, attach timestamps, pick a
//! template and render markdown; config-selected and programmatic stages
//! slot in by priority.
//!
//! Two source kinds exist:
//!
//! - **Markdown** (`.md`, `.markdown`): optional YAML front matter + body.
//! - **Component descriptors** (`.page`): a YAML document naming a template
//!   and its props. There is no body; the template renders everything.
//!
//! Files are processed independently. [`process_batch`] runs a batch on the
//! worker pool and keeps every outcome, so a failing file never aborts its
//! siblings. Drafts are dropped by [`publishable`] before metadata is shared
//! with the rest of the build, unless drafts are being rendered.

pub mod frontmatter;
pub mod stages;

use crate::batch;
use crate::config::SiteConfig;
use crate::pipeline::{Pipeline, StageError, StageResult, StageSpec};
use pulldown_cmark::Options;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// How a source file is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Markdown,
    Component,
}

impl SourceKind {
    /// Classify by extension: `md`/`markdown` or `page`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "page" => Some(Self::Component),
            _ => None,
        }
    }
}

/// Everything the content pipeline learns about a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub frontmatter: Map<String, Value>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub draft: bool,
    pub template: String,
    pub rel_path: String,
    pub output_path: String,
    pub file_name: String,
    pub created: Option<u64>,
    pub modified: Option<u64>,
}

/// Mutable state shared by the stages of one file.
#[derive(Debug, Clone)]
pub struct ContentContext {
    pub source: PathBuf,
    pub content_root: PathBuf,
    pub kind: SourceKind,
    /// File contents as read.
    pub raw: String,
    /// Markdown body after front matter is removed.
    pub body: String,
    /// Extensions the render stage enables.
    pub markdown_options: Options,
    pub metadata: NodeMetadata,
    /// Rendered HTML fragment.
    pub html: String,
}

impl ContentContext {
    pub fn new(source: PathBuf, content_root: PathBuf, kind: SourceKind, raw: String) -> Self {
        Self {
            source,
            content_root,
            kind,
            raw,
            body: String::new(),
            markdown_options: Options::empty(),
            metadata: NodeMetadata::default(),
            html: String::new(),
        }
    }
}

/// One step of content processing.
pub trait ContentStage: Send + Sync {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult;
}

impl<F> ContentStage for F
where
    F: Fn(&mut ContentContext) -> StageResult + Send + Sync,
{
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        self(ctx)
    }
}

pub type ContentPipeline = Pipeline<dyn ContentStage>;

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedContent {
    pub metadata: NodeMetadata,
    pub html: String,
}

/// The six standard stages, without config plugins.
pub fn standard_pipeline(config: &SiteConfig) -> ContentPipeline {
    let mut pipeline = ContentPipeline::new();
    pipeline.register(
        "parse-front-matter",
        stages::PARSE_FRONT_MATTER,
        Box::new(stages::ParseFrontMatter),
    );
    pipeline.register("set-draft", stages::STANDARD, Box::new(stages::SetDraft));
    pipeline.register("resolve-paths", stages::STANDARD, Box::new(stages::ResolvePaths));
    pipeline.register("file-info", stages::STANDARD, Box::new(stages::FileInfo));
    pipeline.register(
        "set-template",
        stages::STANDARD,
        Box::new(stages::SetTemplate {
            default: config.templates.default.clone(),
            directories: config.templates.directories.clone(),
        }),
    );
    pipeline.register(
        "render-markdown",
        stages::RENDER_MARKDOWN,
        Box::new(stages::RenderMarkdown),
    );
    pipeline
}

/// Standard stages plus the optional stages named in `[[processing.plugins]]`.
pub fn configured_pipeline(config: &SiteConfig) -> ContentPipeline {
    let mut pipeline = standard_pipeline(config);
    for entry in &config.processing.plugins {
        let name = entry.name.clone().unwrap_or_default();
        let stage = entry.name.as_deref().and_then(stages::optional_stage);
        pipeline.register_spec(StageSpec {
            name,
            priority: entry.priority,
            stage,
        });
    }
    pipeline
}

/// Process the already-read contents of one file.
pub fn process_contents(
    pipeline: &ContentPipeline,
    source: &Path,
    content_root: &Path,
    kind: SourceKind,
    raw: String,
) -> Result<ProcessedContent, ContentError> {
    let mut ctx = ContentContext::new(
        source.to_path_buf(),
        content_root.to_path_buf(),
        kind,
        raw,
    );
    pipeline.run(&mut ctx, |stage, ctx| stage.apply(ctx))?;
    Ok(ProcessedContent {
        metadata: ctx.metadata,
        html: ctx.html,
    })
}

/// Read and process one file.
pub fn process_file(
    pipeline: &ContentPipeline,
    source: &Path,
    content_root: &Path,
    kind: SourceKind,
) -> Result<ProcessedContent, ContentError> {
    let raw = std::fs::read_to_string(source)?;
    process_contents(pipeline, source, content_root, kind, raw)
}

/// Process a batch of files concurrently. Results are keyed by source path.
pub fn process_batch(
    pipeline: &ContentPipeline,
    files: Vec<(PathBuf, SourceKind)>,
    content_root: &Path,
) -> Vec<(String, Result<ProcessedContent, ContentError>)> {
    batch::run_batch(
        files,
        |(path, _)| path.to_string_lossy().into_owned(),
        |(path, kind)| process_file(pipeline, &path, content_root, kind),
    )
}

/// Whether a processed file belongs in the published site.
pub fn publishable(metadata: &NodeMetadata, render_drafts: bool) -> bool {
    render_drafts || !metadata.draft
}
