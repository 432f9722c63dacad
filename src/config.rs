//! Site configuration module.
//!
//! Handles loading and validating `site.toml` from the project root. Every
//! key is optional; a missing file yields the stock defaults.
//!
//! ## Project layout
//!
//! ```text
//! my-site/
//! ├── site.toml             # This file (optional)
//! ├── src/
//! │   ├── content/          # Markdown + .page descriptors + images
//! │   └── static/           # Copied verbatim to public/static
//! ├── .sitewright/          # Intermediate rendered HTML
//! └── public/               # Published output
//! ```
//!
//! ## Configuration Options
//!
//! See [`stock_config_toml`] for the full documented file. Sections:
//!
//! - `[paths]`: content, static, build and public directories
//! - `[site]`: site metadata forwarded to every render, sitemap and manifest
//! - `[build]`: drafts, sitemap/manifest toggles, worker count
//! - `[templates]`: default template and per-directory templates
//! - `[images]`: variant sizes, quality, `<picture>` rewriting
//! - `[dynamic]`: blog feed pagination and taxonomies
//! - `[[processing.plugins]]` / `[[post_processing.plugins]]`: optional stages
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the config file in the project root.
pub const CONFIG_FILENAME: &str = "site.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `site.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub paths: PathsConfig,
    /// Site metadata, forwarded into every render as `siteMeta`.
    pub site: SiteMetadata,
    pub build: BuildConfig,
    pub templates: TemplatesConfig,
    pub images: ImagesConfig,
    pub dynamic: DynamicConfig,
    /// Optional content-processing stages.
    pub processing: PluginsConfig,
    /// Optional post-processing stages.
    pub post_processing: PluginsConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.images.quality == 0 || self.images.quality > 100 {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.max_width == 0 || self.images.max_height == 0 {
            return Err(ConfigError::Validation(
                "images.max_width and images.max_height must be non-zero".into(),
            ));
        }
        if self.images.tiny_size == 0 {
            return Err(ConfigError::Validation(
                "images.tiny_size must be non-zero".into(),
            ));
        }
        let decodable = crate::imaging::rust_backend::supported_input_extensions();
        if let Some(ext) = self
            .images
            .extensions
            .iter()
            .find(|ext| !decodable.contains(&ext.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "images.extensions: cannot decode `{ext}`"
            )));
        }
        let encodable = crate::imaging::rust_backend::supported_output_extensions();
        if let Some(ext) = self
            .images
            .alternate_formats
            .iter()
            .find(|ext| !encodable.contains(&ext.to_ascii_lowercase().as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "images.alternate_formats: cannot encode `{ext}`"
            )));
        }
        if self.dynamic.per_page == 0 {
            return Err(ConfigError::Validation(
                "dynamic.per_page must be non-zero".into(),
            ));
        }
        if self.templates.default.trim().is_empty() {
            return Err(ConfigError::Validation(
                "templates.default must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Directory layout, relative to the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub content: String,
    pub static_dir: String,
    pub build: String,
    pub public: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: "src/content".into(),
            static_dir: "src/static".into(),
            build: ".sitewright".into(),
            public: "public".into(),
        }
    }
}

/// Absolute project directories resolved from [`PathsConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    pub content: PathBuf,
    pub static_dir: PathBuf,
    pub build: PathBuf,
    pub public: PathBuf,
}

impl ProjectDirs {
    pub fn resolve(root: &Path, paths: &PathsConfig) -> Self {
        Self {
            content: root.join(&paths.content),
            static_dir: root.join(&paths.static_dir),
            build: root.join(&paths.build),
            public: root.join(&paths.public),
        }
    }

    /// Where rendered (pre-post-processing) HTML is cached between builds.
    pub fn rendered(&self) -> PathBuf {
        self.build.join("rendered")
    }
}

/// Metadata describing the site as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteMetadata {
    /// Absolute base URL, used by the sitemap.
    pub url: String,
    pub name: String,
    pub short_name: String,
    pub description: String,
    pub theme_color: String,
    pub background_color: String,
    pub display: String,
    pub icons: Vec<ManifestIcon>,
}

impl Default for SiteMetadata {
    fn default() -> Self {
        Self {
            url: "https://www.example.com".into(),
            name: "My Site".into(),
            short_name: "Site".into(),
            description: String::new(),
            theme_color: "#ffffff".into(),
            background_color: "#ffffff".into(),
            display: "standalone".into(),
            icons: Vec::new(),
        }
    }
}

/// A web manifest icon entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestIcon {
    pub src: String,
    pub sizes: String,
    #[serde(rename = "type")]
    pub mime: String,
}

/// Build behavior switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Publish nodes whose front matter sets `draft: true`.
    pub render_drafts: bool,
    pub generate_sitemap: bool,
    pub generate_manifest: bool,
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            render_drafts: false,
            generate_sitemap: true,
            generate_manifest: true,
            max_processes: None,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &BuildConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}

/// Template resolution: explicit front matter wins, then the node's
/// top-level content directory, then `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplatesConfig {
    pub default: String,
    pub directories: BTreeMap<String, String>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            default: "Default".into(),
            directories: BTreeMap::from([("blog".to_string(), "Post".to_string())]),
        }
    }
}

/// Image variant and `<picture>` settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    /// Content files with these extensions go through the image cache.
    pub extensions: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    /// Edge of the square the blur placeholder fits in.
    pub tiny_size: u32,
    pub quality: u32,
    /// `<img>` elements carrying this class are left untouched.
    pub exclude_class: String,
    /// Point `src` at the tiny variant and move the full one to `data-lazy-src`.
    pub blur_placeholder: bool,
    /// Alternate encodings offered as `<source>` elements.
    pub alternate_formats: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into(), "webp".into()],
            max_width: 2000,
            max_height: 1200,
            tiny_size: 10,
            quality: 80,
            exclude_class: "cover".into(),
            blur_placeholder: true,
            alternate_formats: vec!["avif".into(), "webp".into()],
        }
    }
}

impl ImagesConfig {
    pub fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

/// Blog feed pagination and taxonomy pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DynamicConfig {
    pub enabled: bool,
    /// Nodes whose relative path starts with `<section>/` form the feed.
    pub section: String,
    pub per_page: usize,
    pub feed_template: String,
    pub categories: bool,
    pub tags: bool,
    pub term_template: String,
    pub taxonomy_template: String,
}

impl Default for DynamicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            section: "blog".into(),
            per_page: 10,
            feed_template: "Feed".into(),
            categories: true,
            tags: true,
            term_template: "Term".into(),
            taxonomy_template: "Taxonomy".into(),
        }
    }
}

/// A list of optional stages selected by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginsConfig {
    pub plugins: Vec<PluginEntry>,
}

/// One optional stage. Both fields are checked when the pipeline is
/// assembled; an entry missing either is dropped with a warning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginEntry {
    #[serde(rename = "use", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Load `site.toml` from the project root, falling back to defaults when
/// the file does not exist.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let path = root.join(CONFIG_FILENAME);
    if !path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: SiteConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// A documented `site.toml` with every option at its default value.
pub fn stock_config_toml() -> &'static str {
    r##"# sitewright configuration
# All options are optional - defaults shown below.

[paths]
content = "src/content"        # Markdown, .page descriptors, images
static_dir = "src/static"      # Copied to <public>/static
build = ".sitewright"          # Intermediate rendered HTML
public = "public"              # Published site

[site]
url = "https://www.example.com"
name = "My Site"
short_name = "Site"
description = ""
theme_color = "#ffffff"
background_color = "#ffffff"
display = "standalone"
icons = []                     # [{ src = "/static/icon.png", sizes = "192x192", type = "image/png" }]

[build]
render_drafts = false          # Publish `draft: true` nodes
generate_sitemap = true        # <public>/sitemap.txt
generate_manifest = true       # <public>/site.webmanifest
# max_processes = 4            # Max parallel workers (omit for auto = CPU cores)

[templates]
default = "Default"            # Used when nothing more specific applies

[templates.directories]        # Top-level content directory -> template
blog = "Post"

[images]
extensions = ["jpg", "jpeg", "png", "webp"]
max_width = 2000               # Full-size variant bounding box
max_height = 1200
tiny_size = 10                 # Blur placeholder bounding square
quality = 80                   # Lossy encoding quality (1-100)
exclude_class = "cover"        # <img class="cover"> is left untouched
blur_placeholder = true        # src = tiny variant, data-lazy-src = full
alternate_formats = ["avif", "webp"]

[dynamic]
enabled = true
section = "blog"               # Feed = nodes under content/blog/
per_page = 10
feed_template = "Feed"
categories = true              # blog/categories/<term>
tags = true                    # blog/tags/<term>
term_template = "Term"
taxonomy_template = "Taxonomy"

# Optional content stages: "gfm", "footnotes", "smart-punctuation"
# [[processing.plugins]]
# use = "gfm"
# priority = 25

# Optional post-processing stages: "external-noopener", "heading-ids"
# [[post_processing.plugins]]
# use = "heading-ids"
# priority = 40
"##
}
