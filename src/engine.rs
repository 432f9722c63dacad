//! Build sequencing.
//!
//! A [`BuildEngine`] owns every piece of state that survives between builds:
//! the [`NodeStore`], the previous build's [`NodeMetaMap`] and the bundler
//! cache. One engine per site; tests create as many as they like.
//!
//! # Phases
//!
//! Phases run strictly in sequence. Work inside a phase runs on the rayon
//! pool through [`batch::run_batch`], and every unit's outcome is collected
//! before the next phase starts.
//!
//! ```text
//! bundle     content/  →  entries        (reconcile the node store)
//! import     entries   →  metadata       (content pipeline, per file)
//! dynamic    nodeMeta  →  synthetic nodes (only when nodeMeta changed)
//! render     props     →  .sitewright/rendered/*.html
//! publish    rendered  →  public/*.html  (post-processing pipeline)
//! images     ImageMap  →  public variants
//! assets     content/  →  public/        (images via the cache, others copied)
//! static     static/   →  public/static/
//! site       sitemap.txt, site.webmanifest, robots.txt
//! ```
//!
//! # Skipping work
//!
//! When the metadata of all pages equals the previous build's, nothing that
//! depends on other pages can have changed: generated pages are kept as
//! they are, rendered pages skip straight past prop computation, and pages
//! that were not re-rendered keep their published HTML. When it differs,
//! props are recomputed for every page and compared with the props of its
//! last render (see [`should_skip_render`]).
//!
//! # Failures
//!
//! A unit that fails (bad front matter, renderer error, write error) drops
//! its node from the store so the next build retries it from scratch; the
//! failure is logged and counted in the phase report. A failing bundler
//! yields an empty entry set. Only an unreadable content root aborts a
//! build.

use crate::batch::{self, PhaseReport};
use crate::bundle::{BundleCache, BundleOutput, Bundler, ContentBundler};
use crate::config::{ProjectDirs, SiteConfig, SiteMetadata};
use crate::content::{self, ContentPipeline, SourceKind};
use crate::dynamic::{BlogPages, DynamicPageSource};
use crate::image_cache::{
    ImageCache, ImageCacheError, ImageMap, VariantOutcome, copy_if_newer, variant_config,
};
use crate::imaging::{ImageBackend, RustBackend};
use crate::nodes::{ContentNode, NodeMetaMap, NodeSource, NodeStore, artifact_path, should_skip_render};
use crate::postprocess::links::LinkIndex;
use crate::postprocess::{self, PageRef, PostEnv, PostError, PostPipeline};
use crate::publish::{self, MANIFEST_FILENAME, SITEMAP_FILENAME};
use crate::render::{BasicRenderer, RenderError, Renderer, document_shell};
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("cannot read content root {path}: {source}")]
    ContentRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of one unit inside a phase.
#[derive(Error, Debug)]
enum UnitError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Post(#[from] PostError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Image(#[from] ImageCacheError),
}

/// Per-phase outcome of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub phases: Vec<PhaseReport>,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.name == name)
    }

    pub fn failed(&self) -> usize {
        self.phases.iter().map(PhaseReport::failed).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.phases.iter().map(|p| p.succeeded).sum()
    }
}

/// Everything the renderer needs for one page.
struct RenderJob {
    id: String,
    template: String,
    title: String,
    output_path: String,
    props: Value,
}

pub struct BuildEngine {
    config: SiteConfig,
    dirs: ProjectDirs,
    content: ContentPipeline,
    post: PostPipeline,
    bundler: Box<dyn Bundler>,
    renderer: Box<dyn Renderer>,
    backend: Box<dyn ImageBackend + Send>,
    dynamic: Box<dyn DynamicPageSource>,
    store: NodeStore,
    previous_meta: Option<NodeMetaMap>,
    bundle_cache: BundleCache,
}

impl BuildEngine {
    /// An engine for the project at `root` with the built-in collaborators
    /// and the pipelines selected by `config`.
    pub fn new(config: SiteConfig, root: &Path) -> Self {
        let dirs = ProjectDirs::resolve(root, &config.paths);
        let store = NodeStore::new(dirs.rendered(), dirs.public.clone());
        Self {
            content: content::configured_pipeline(&config),
            post: postprocess::configured_pipeline(&config),
            bundler: Box::new(ContentBundler),
            renderer: Box::new(BasicRenderer),
            backend: Box::new(RustBackend::new()),
            dynamic: Box::new(BlogPages::new(config.dynamic.clone())),
            bundle_cache: BundleCache::load(&dirs.build),
            previous_meta: None,
            store,
            dirs,
            config,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_bundler(mut self, bundler: Box<dyn Bundler>) -> Self {
        self.bundler = bundler;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn ImageBackend + Send>) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the generated-page hook.
    pub fn with_dynamic_pages(mut self, source: Box<dyn DynamicPageSource>) -> Self {
        self.dynamic = source;
        self
    }

    /// For registering programmatic content stages.
    pub fn content_pipeline_mut(&mut self) -> &mut ContentPipeline {
        &mut self.content
    }

    /// For registering programmatic post-processing stages.
    pub fn post_pipeline_mut(&mut self) -> &mut PostPipeline {
        &mut self.post
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn dirs(&self) -> &ProjectDirs {
        &self.dirs
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Run one build. Per-node failures are reported in the summary; only
    /// an unreadable content root is an error.
    pub fn build(&mut self) -> Result<BuildSummary, BuildError> {
        let started = Instant::now();
        fs::read_dir(&self.dirs.content).map_err(|source| BuildError::ContentRoot {
            path: self.dirs.content.clone(),
            source,
        })?;
        let render_drafts = self.config.build.render_drafts;

        let bundle = match self.bundler.bundle(&self.dirs.content, &self.bundle_cache) {
            Ok(output) => output,
            Err(e) => {
                warn!(phase = "bundle", error = %e, "bundler failed, building with no entries");
                BundleOutput::default()
            }
        };
        let reconciled = self.store.reconcile(&bundle);
        info!(
            phase = "bundle",
            created = reconciled.created,
            changed = reconciled.changed,
            removed = reconciled.removed,
            unchanged = reconciled.unchanged,
            "reconciled"
        );

        let mut phases = vec![self.import_phase()];

        let meta = self.store.node_meta(render_drafts);
        let global_unchanged = self.previous_meta.as_ref() == Some(&meta);
        if global_unchanged {
            debug!(phase = "dynamic", "page metadata unchanged");
        } else {
            let pages = self.dynamic.pages(&meta);
            info!(phase = "dynamic", pages = pages.len(), "generated pages");
            self.store.replace_synthetic(pages);
        }

        let (render, rendered_now) = self.render_phase(&meta, global_unchanged);
        phases.push(render);

        let images = ImageMap::new();
        phases.push(self.publish_phase(&meta, global_unchanged, &rendered_now, &images));
        phases.push(self.image_phase(&images));
        phases.push(self.asset_phase(&images));
        phases.push(self.static_phase());
        phases.push(self.site_phase());

        self.previous_meta = Some(meta);
        self.bundle_cache = bundle.cache;
        if let Err(e) = self.bundle_cache.save(&self.dirs.build) {
            warn!(error = %e, "cannot save bundle cache");
        }

        Ok(BuildSummary {
            phases,
            elapsed: started.elapsed(),
        })
    }

    fn import_phase(&mut self) -> PhaseReport {
        let mut report = PhaseReport::new("import");
        let owners: HashMap<String, String> = self
            .store
            .nodes()
            .filter(|n| n.metadata.is_none())
            .filter_map(|n| match &n.source {
                NodeSource::File { path, .. } => {
                    Some((path.to_string_lossy().into_owned(), n.id.clone()))
                }
                NodeSource::Synthetic(_) => None,
            })
            .collect();

        let pending = self.store.pending_import();
        let results = content::process_batch(&self.content, pending, &self.dirs.content);
        for (key, result) in results {
            let Some(id) = owners.get(&key) else {
                continue;
            };
            match result {
                Ok(processed) => {
                    if let Some(node) = self.store.get_mut(id) {
                        node.metadata = Some(processed.metadata);
                        node.fragment = processed.html;
                    }
                    report.success();
                }
                Err(e) => {
                    error!(phase = "import", node = %id, error = %e, "cannot import");
                    self.store.remove(id);
                    report.fail(id.as_str(), e);
                }
            }
        }
        report
    }

    fn render_phase(
        &mut self,
        meta: &NodeMetaMap,
        global_unchanged: bool,
    ) -> (PhaseReport, HashSet<String>) {
        let mut report = PhaseReport::new("render");
        let mut jobs = Vec::new();
        for id in self.store.publishable_ids(self.config.build.render_drafts) {
            let Some(node) = self.store.get(&id) else {
                continue;
            };
            if node.is_rendered && global_unchanged {
                report.skip();
                continue;
            }
            let Some(job) = render_job(node, meta, &self.config.site, self.renderer.as_ref()) else {
                continue;
            };
            if should_skip_render(node, &job.props, global_unchanged) {
                debug!(phase = "render", node = %id, "props unchanged");
                report.skip();
                continue;
            }
            jobs.push(job);
        }

        let renderer = self.renderer.as_ref();
        let site = &self.config.site;
        let rendered_dir = self.store.rendered_dir().to_path_buf();
        let results = batch::run_batch(
            jobs,
            |job| job.id.clone(),
            |job| -> Result<Value, UnitError> {
                let rendered = renderer.render(&job.template, &job.props)?;
                let html = document_shell(&rendered, site, &job.title);
                publish::write_artifact(&rendered_dir, &job.output_path, &html)?;
                Ok(job.props)
            },
        );

        let mut rendered_now = HashSet::new();
        for (id, result) in results {
            match result {
                Ok(props) => {
                    if let Some(node) = self.store.get_mut(&id) {
                        node.is_rendered = true;
                        node.last_render_props = Some(props);
                    }
                    report.success();
                    rendered_now.insert(id);
                }
                Err(e) => {
                    error!(phase = "render", node = %id, error = %e, "cannot render");
                    self.store.remove(&id);
                    report.fail(id, e);
                }
            }
        }
        (report, rendered_now)
    }

    fn publish_phase(
        &mut self,
        meta: &NodeMetaMap,
        global_unchanged: bool,
        rendered_now: &HashSet<String>,
        images: &ImageMap,
    ) -> PhaseReport {
        let mut report = PhaseReport::new("publish");
        let mut links = LinkIndex::new();
        for entry in meta.values() {
            links.insert(&entry.rel_path, &entry.output_path);
        }
        for node in self.store.nodes().filter(|n| n.is_synthetic()) {
            if let Some(output_path) = node.output_path() {
                links.insert(&node.id, output_path);
            }
        }

        let mut pages: Vec<PageRef> = Vec::new();
        for id in self.store.publishable_ids(self.config.build.render_drafts) {
            let Some(page) = self.store.get(&id).filter(|n| n.is_rendered).and_then(ContentNode::page_ref) else {
                continue;
            };
            if global_unchanged
                && !rendered_now.contains(&id)
                && artifact_path(self.store.public_dir(), &page.output_path).exists()
            {
                report.skip();
                continue;
            }
            pages.push(page);
        }

        let env = PostEnv {
            links: &links,
            images,
            backend: self.backend.as_ref(),
            content_root: &self.dirs.content,
        };
        let post = &self.post;
        let rendered_dir = self.store.rendered_dir();
        let public_dir = self.store.public_dir();
        let results = batch::run_batch(
            pages,
            |page| page.id.clone(),
            |page| -> Result<(), UnitError> {
                let html = fs::read_to_string(artifact_path(rendered_dir, &page.output_path))?;
                let html = postprocess::post_process(post, html, &page, env)?;
                publish::write_artifact(public_dir, &page.output_path, &html)?;
                Ok(())
            },
        );

        for (id, result) in results {
            match result {
                Ok(()) => report.success(),
                Err(e) => {
                    error!(phase = "publish", node = %id, error = %e, "cannot publish");
                    self.store.remove(&id);
                    report.fail(id, e);
                }
            }
        }
        report
    }

    fn image_cache(&self) -> ImageCache<'_> {
        ImageCache::new(self.backend.as_ref(), variant_config(&self.config.images))
    }

    /// Variants for every image the published pages reference.
    fn image_phase(&self, images: &ImageMap) -> PhaseReport {
        let mut report = PhaseReport::new("images");
        let cache = self.image_cache();
        let public_dir = &self.dirs.public;
        let results = batch::run_batch(
            images.entries(),
            |entry| entry.src.clone(),
            |entry| cache.ensure_variant(&entry.source, &artifact_path(public_dir, &entry.src)),
        );
        for (src, result) in results {
            match result {
                Ok(VariantOutcome::Fresh) => report.skip(),
                Ok(VariantOutcome::Generated { .. }) => report.success(),
                Err(e) => {
                    warn!(phase = "images", image = %src, error = %e, "cannot transform image");
                    report.fail(src, e);
                }
            }
        }
        report
    }

    /// Every other non-content file under the content root.
    fn asset_phase(&self, images: &ImageMap) -> PhaseReport {
        let mut report = PhaseReport::new("assets");
        let content_root = &self.dirs.content;
        let mut files = Vec::new();
        let walker = WalkDir::new(content_root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(phase = "assets", error = %e, "cannot walk content");
                    report.fail(content_root.display().to_string(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file()
                || SourceKind::from_path(entry.path()).is_some()
                || images.get(entry.path()).is_some()
            {
                continue;
            }
            files.push(entry.into_path());
        }

        let cache = self.image_cache();
        let images_config = &self.config.images;
        let public_dir = &self.dirs.public;
        let results = batch::run_batch(
            files,
            |path| path.display().to_string(),
            |path| -> Result<bool, UnitError> {
                let rel = path.strip_prefix(content_root).unwrap_or(path.as_path());
                let dest = public_dir.join(rel);
                if images_config.is_image(&path) {
                    let outcome = cache.ensure_variant(&path, &dest)?;
                    Ok(outcome != VariantOutcome::Fresh)
                } else {
                    Ok(copy_if_newer(&path, &dest)?)
                }
            },
        );
        for (key, result) in results {
            match result {
                Ok(true) => report.success(),
                Ok(false) => report.skip(),
                Err(e) => {
                    warn!(phase = "assets", file = %key, error = %e, "cannot publish asset");
                    report.fail(key, e);
                }
            }
        }
        report
    }

    fn static_phase(&self) -> PhaseReport {
        let mut report = PhaseReport::new("static");
        match publish::mirror_dir(&self.dirs.static_dir, &self.dirs.public.join("static")) {
            Ok(stats) => {
                report.succeeded = stats.copied;
                report.skipped = stats.fresh;
                if stats.pruned > 0 {
                    info!(phase = "static", pruned = stats.pruned, "removed stale files");
                }
            }
            Err(e) => {
                warn!(phase = "static", error = %e, "cannot mirror static directory");
                report.fail(self.dirs.static_dir.display().to_string(), e);
            }
        }
        report
    }

    /// `sitemap.txt`, `site.webmanifest` and the robots.txt sitemap line.
    fn site_phase(&self) -> PhaseReport {
        let mut report = PhaseReport::new("site");
        let public_dir = &self.dirs.public;
        let site = &self.config.site;

        if self.config.build.generate_sitemap {
            let outputs: Vec<&str> = self
                .store
                .publishable_ids(self.config.build.render_drafts)
                .iter()
                .filter_map(|id| self.store.get(id))
                .filter(|n| n.is_rendered)
                .filter_map(ContentNode::output_path)
                .collect();
            let text = publish::sitemap(&site.url, outputs);
            let sitemap_url = format!("{}/{SITEMAP_FILENAME}", site.url.trim_end_matches('/'));
            let result = publish::write_if_changed(&public_dir.join(SITEMAP_FILENAME), &text)
                .and_then(|written| {
                    publish::register_sitemap(public_dir, &sitemap_url)
                        .map(|registered| written || registered)
                });
            record_write(&mut report, SITEMAP_FILENAME, result);
        }

        if self.config.build.generate_manifest {
            let result = publish::web_manifest(site)
                .map_err(io::Error::from)
                .and_then(|json| publish::write_if_changed(&public_dir.join(MANIFEST_FILENAME), &json));
            record_write(&mut report, MANIFEST_FILENAME, result);
        }
        report
    }
}

fn record_write(report: &mut PhaseReport, file: &str, result: io::Result<bool>) {
    match result {
        Ok(true) => report.success(),
        Ok(false) => report.skip(),
        Err(e) => {
            warn!(phase = "site", file, error = %e, "cannot write");
            report.fail(file, e);
        }
    }
}

/// Template, title and props for one page.
///
/// Props are `nodeData`, `siteMeta`, `metadata`, `htmlContent` and
/// `isDraft`, then the renderer's derived props, then a generated page's
/// own props.
fn render_job(
    node: &ContentNode,
    meta: &NodeMetaMap,
    site: &SiteMetadata,
    renderer: &dyn Renderer,
) -> Option<RenderJob> {
    let metadata = node.metadata.as_ref()?;
    let mut props = Map::new();
    props.insert(
        "nodeData".into(),
        json!({
            "id": node.id,
            "relPath": metadata.rel_path,
            "outputPath": metadata.output_path,
        }),
    );
    props.insert("siteMeta".into(), serde_json::to_value(site).unwrap_or_default());
    props.insert("metadata".into(), serde_json::to_value(metadata).unwrap_or_default());
    props.insert("htmlContent".into(), Value::String(node.fragment.clone()));
    props.insert("isDraft".into(), Value::Bool(metadata.draft));
    props.extend(renderer.derive_props(&metadata.template, &node.id, meta));

    let mut title = metadata.title.clone().unwrap_or_default();
    if let NodeSource::Synthetic(page) = &node.source {
        props.extend(page.props.clone());
        if title.is_empty() {
            title = ["term", "taxonomy"]
                .iter()
                .find_map(|key| page.props.get(*key).and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();
        }
    }

    Some(RenderJob {
        id: node.id.clone(),
        template: metadata.template.clone(),
        title,
        output_path: metadata.output_path.clone(),
        props: Value::Object(props),
    })
}
