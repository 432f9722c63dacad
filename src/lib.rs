//! # Sitewright
//!
//! An incremental static site build engine. Markdown files and `.page`
//! component descriptors under a content root become HTML pages; generated
//! feed and taxonomy pages are derived from the metadata of all pages; local
//! images become responsive `<picture>` elements.
//!
//! # Architecture: Phased Builds Over a Persistent Node Store
//!
//! ```text
//! bundle    content/  →  entries         (stable per-file output ids)
//! import    entries   →  metadata + HTML (content pipeline)
//! dynamic   metadata  →  generated pages (feed, categories, tags)
//! render    props     →  rendered HTML   (template renderer)
//! publish   rendered  →  public/         (post-processing pipeline)
//! assets    images, other files, static/ →  public/
//! ```
//!
//! The [`engine::BuildEngine`] keeps its [`nodes::NodeStore`] between
//! builds. A rebuild re-imports only files whose content changed, renders
//! only pages whose props changed, and re-encodes only images older than
//! their source. In watch mode a [`scheduler::Scheduler`] coalesces any
//! number of file events during a build into one follow-up build.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`engine`] | Build sequencing; owns all state that survives between builds |
//! | [`nodes`] | Node store, reconciliation against the bundle, skip-render rule |
//! | [`bundle`] | Bundler collaborator and the built-in content-hash bundler |
//! | [`content`] | Content pipeline: front matter, paths, template, markdown |
//! | [`paths`] | Relative and output path resolution, front-matter overrides |
//! | [`pipeline`] | Priority-ordered stage lists shared by both pipelines |
//! | [`dynamic`] | Pagination, taxonomies and the generated-page hook |
//! | [`render`] | Template renderer collaborator and the built-in templates |
//! | [`postprocess`] | Link and image rewriting over a parsed HTML tree |
//! | [`html`] | The small HTML tree post-processing works on |
//! | [`image_cache`] | Image variant freshness, `ImageMap`, copy-if-newer |
//! | [`imaging`] | Pure-Rust image operations: identify, resize, encode |
//! | [`publish`] | Output writing, sitemap, web manifest, static mirror |
//! | [`batch`] | Parallel phase batches that keep every outcome |
//! | [`scheduler`] | Coalescing build scheduler |
//! | [`watch`] | File watcher driving the scheduler |
//! | [`config`] | `site.toml` loading and validation |
//! | [`output`] | CLI output formatting of build summaries |
//!
//! # Design Decisions
//!
//! ## Collaborators Behind Traits
//!
//! Bundling, rendering, image encoding and generated pages sit behind
//! [`bundle::Bundler`], [`render::Renderer`], [`imaging::ImageBackend`] and
//! [`dynamic::DynamicPageSource`]. The engine only compares the bundler's
//! output identifiers and hands props to the renderer, so either can be
//! swapped without touching the build logic.
//!
//! ## Maud For Built-in Templates
//!
//! The built-in renderer uses [Maud](https://maud.lambda.xyz/): malformed
//! HTML is a compile error and all interpolation is escaped.
//!
//! ## Pure-Rust Imaging
//!
//! Image variants are produced with the `image` crate only. No system
//! libraries, so the binary runs anywhere.

pub mod batch;
pub mod bundle;
pub mod config;
pub mod content;
pub mod dynamic;
pub mod engine;
pub mod html;
pub mod image_cache;
pub mod imaging;
pub mod nodes;
pub mod output;
pub mod paths;
pub mod pipeline;
pub mod postprocess;
pub mod publish;
pub mod render;
pub mod scheduler;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
