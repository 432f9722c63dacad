//! Post-processing: rendered page HTML in, published HTML out.
//!
//! A [`PostPipeline`] runs over one page at a time. The standard stages
//! parse the page, rewrite source links to output paths, turn local images
//! into responsive `<picture>` elements, and serialize the result (see
//! [`stages`]). Stages share a [`PostContext`]: the HTML string, the parsed
//! [`Document`] between the parse and serialize stages, the page being
//! processed, and a build-wide [`PostEnv`].
//!
//! Images found here are recorded in the env's [`ImageMap`]; the image
//! phase of the build generates their variants afterwards.

pub mod links;
pub mod stages;

use crate::config::SiteConfig;
use crate::html::Document;
use crate::image_cache::{ImageMap, variant_config};
use crate::imaging::ImageBackend;
use crate::paths::parent_dir;
use crate::pipeline::{Pipeline, StageError, StageResult, StageSpec};
use links::LinkIndex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostError {
    #[error("{0} needs a parsed document; register parse-html before it")]
    NotParsed(&'static str),
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// The page a post-processing run belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRef {
    pub id: String,
    pub rel_path: String,
    pub output_path: String,
    /// Generated pages have no source file.
    pub synthetic: bool,
}

impl PageRef {
    /// Directory relative links are resolved against: the source directory,
    /// or the output directory for generated pages.
    pub fn base_dir(&self) -> &str {
        if self.synthetic {
            parent_dir(&self.output_path)
        } else {
            parent_dir(&self.rel_path)
        }
    }
}

/// Build-wide state shared by every page.
#[derive(Clone, Copy)]
pub struct PostEnv<'a> {
    pub links: &'a LinkIndex,
    pub images: &'a ImageMap,
    pub backend: &'a dyn ImageBackend,
    pub content_root: &'a Path,
}

pub struct PostContext<'a> {
    pub html: String,
    pub document: Option<Document>,
    pub page: &'a PageRef,
    pub env: PostEnv<'a>,
}

impl PostContext<'_> {
    pub fn document_mut(&mut self, stage: &'static str) -> Result<&mut Document, PostError> {
        self.document.as_mut().ok_or(PostError::NotParsed(stage))
    }
}

/// One step of post-processing.
pub trait PostStage: Send + Sync {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult;
}

impl<F> PostStage for F
where
    F: Fn(&mut PostContext<'_>) -> StageResult + Send + Sync,
{
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        self(ctx)
    }
}

pub type PostPipeline = Pipeline<dyn PostStage>;

/// The four standard stages, configured from `[images]`.
pub fn standard_pipeline(config: &SiteConfig) -> PostPipeline {
    let mut pipeline = PostPipeline::new();
    pipeline.register("parse-html", stages::PARSE_HTML, Box::new(stages::ParseHtml));
    pipeline.register("rewrite-links", stages::REWRITE, Box::new(stages::RewriteLinks));
    pipeline.register(
        "rewrite-images",
        stages::REWRITE,
        Box::new(stages::RewriteImages {
            exclude_class: config.images.exclude_class.clone(),
            blur_placeholder: config.images.blur_placeholder,
            variants: variant_config(&config.images),
        }),
    );
    pipeline.register(
        "serialize-html",
        stages::SERIALIZE_HTML,
        Box::new(stages::SerializeHtml),
    );
    pipeline
}

/// Standard stages plus the optional stages named in
/// `[[post_processing.plugins]]`.
pub fn configured_pipeline(config: &SiteConfig) -> PostPipeline {
    let mut pipeline = standard_pipeline(config);
    for entry in &config.post_processing.plugins {
        pipeline.register_spec(StageSpec {
            name: entry.name.clone().unwrap_or_default(),
            priority: entry.priority,
            stage: entry.name.as_deref().and_then(stages::optional_stage),
        });
    }
    pipeline
}

/// Run the pipeline over one page's HTML.
pub fn post_process(
    pipeline: &PostPipeline,
    html: String,
    page: &PageRef,
    env: PostEnv<'_>,
) -> Result<String, PostError> {
    let mut ctx = PostContext {
        html,
        document: None,
        page,
        env,
    };
    pipeline.run(&mut ctx, |stage, ctx| stage.apply(ctx))?;
    if let Some(document) = ctx.document {
        return Ok(document.to_html());
    }
    Ok(ctx.html)
}
