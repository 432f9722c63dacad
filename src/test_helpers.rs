//! Shared test utilities for the sitewright test suite.
//!
//! Provides a throw-away project tree and a renderer that counts its calls.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = TestSite::new();
//! site.write("blog/first.md", "# First");
//! let mut engine = site.engine();
//! engine.build().unwrap();
//! assert!(site.public("blog/first.html").contains("First"));
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::config::{ProjectDirs, SiteConfig};
use crate::engine::BuildEngine;
use crate::imaging::backend::tests::MockBackend;
use crate::nodes::NodeMetaMap;
use crate::render::{BasicRenderer, RenderError, Rendered, Renderer};
use serde_json::{Map, Value};

// =========================================================================
// Project tree
// =========================================================================

/// A project root in a temp directory with an empty content root.
pub struct TestSite {
    tmp: TempDir,
}

impl TestSite {
    pub fn new() -> Self {
        let site = Self {
            tmp: TempDir::new().unwrap(),
        };
        fs::create_dir_all(site.dirs().content).unwrap();
        site
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// Default config with a recognizable site name and URL.
    pub fn config(&self) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.site.name = "Test Site".into();
        config.site.url = "https://example.test".into();
        config
    }

    pub fn dirs(&self) -> ProjectDirs {
        ProjectDirs::resolve(self.root(), &self.config().paths)
    }

    /// An engine over this site that never decodes images.
    pub fn engine(&self) -> BuildEngine {
        BuildEngine::new(self.config(), self.root())
            .with_backend(Box::new(MockBackend::with_dimensions(800, 600)))
    }

    pub fn content_path(&self, rel: &str) -> PathBuf {
        self.dirs().content.join(rel)
    }

    /// Node id of a content file.
    pub fn id(&self, rel: &str) -> String {
        self.content_path(rel).to_string_lossy().into_owned()
    }

    /// Write a content file, creating directories.
    pub fn write(&self, rel: &str, content: &str) {
        write_file(&self.content_path(rel), content);
    }

    pub fn write_static(&self, rel: &str, content: &str) {
        write_file(&self.dirs().static_dir.join(rel), content);
    }

    /// Contents of a published file. Panics with the published file list
    /// when missing.
    pub fn public(&self, rel: &str) -> String {
        let path = self.dirs().public.join(rel);
        fs::read_to_string(&path).unwrap_or_else(|_| {
            panic!(
                "{rel} not published. Published: {:?}",
                list_files(&self.dirs().public)
            )
        })
    }

    pub fn public_exists(&self, rel: &str) -> bool {
        self.dirs().public.join(rel).exists()
    }
}

fn write_file(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Every file under `dir`, relative and sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| crate::paths::relative_slash_path(e.path(), dir))
        .collect();
    files.sort();
    files
}

// =========================================================================
// Renderer
// =========================================================================

/// [`BasicRenderer`] that counts `render` calls. Clones share the counter.
#[derive(Clone, Default)]
pub struct CountingRenderer {
    calls: Arc<AtomicUsize>,
}

impl CountingRenderer {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Renderer for CountingRenderer {
    fn render(&self, template: &str, props: &Value) -> Result<Rendered, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BasicRenderer.render(template, props)
    }

    fn derive_props(&self, template: &str, id: &str, meta: &NodeMetaMap) -> Map<String, Value> {
        BasicRenderer.derive_props(template, id, meta)
    }
}
