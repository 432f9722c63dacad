//! Href classification and resolution against the build's link index.
//!
//! Authors link to *sources* (`../index.md`, `/blog/post.md`); the published
//! site needs *outputs* (`/blog/index.html`). [`rewrite_href`] maps one to
//! the other:
//!
//! | Href | Treatment |
//! |---|---|
//! | `https://…`, `//cdn…` | external: unchanged, opened in a new tab |
//! | `mailto:`, `tel:`, `data:` … | unchanged |
//! | `#top`, empty | unchanged |
//! | `/blog/post.md` | looked up from the content root |
//! | `../index.md` | resolved against the page's directory, then looked up |
//!
//! A `?query` or `#fragment` suffix is split off before lookup and put back
//! afterwards. Paths not in the index fall back to swapping a content
//! extension for `.html`.

use crate::paths::{join_normalized, strip_extension, strip_invalid_chars};
use std::collections::HashMap;

/// Extensions the fallback treats as content sources.
const CONTENT_EXTENSIONS: &[&str] = &["md", "markdown", "page", "dynamic"];

/// How an href is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrefKind<'a> {
    Empty,
    Fragment,
    External,
    /// A scheme other than http(s): `mailto:`, `tel:`, `data:` …
    OtherScheme,
    Absolute(&'a str),
    Relative(&'a str),
}

/// Matches `^[A-Za-z0-9]*:?//`: `https://x`, `//cdn.x`, `ftp://x`.
pub fn is_external(href: &str) -> bool {
    let scheme_end = href
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(href.len());
    let rest = &href[scheme_end..];
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    rest.starts_with("//")
}

fn has_scheme(href: &str) -> bool {
    let Some((scheme, _)) = href.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

pub fn classify(href: &str) -> HrefKind<'_> {
    let href = href.trim();
    if href.is_empty() {
        HrefKind::Empty
    } else if href.starts_with('#') {
        HrefKind::Fragment
    } else if is_external(href) {
        HrefKind::External
    } else if has_scheme(href) {
        HrefKind::OtherScheme
    } else if href.starts_with('/') {
        HrefKind::Absolute(href)
    } else {
        HrefKind::Relative(href)
    }
}

/// Split `path?query#frag` into `("path", "?query#frag")`.
pub fn split_suffix(href: &str) -> (&str, &str) {
    match href.find(['?', '#']) {
        Some(i) => href.split_at(i),
        None => (href, ""),
    }
}

/// Maps source paths and synthetic ids to output paths.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    targets: HashMap<String, String>,
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page under `key` (relative path or synthetic id). The key
    /// without its extension and the output path itself also resolve.
    pub fn insert(&mut self, key: &str, output_path: &str) {
        let key = key.trim_start_matches('/');
        let output = output_path.to_string();
        self.targets
            .entry(output_path.trim_start_matches('/').to_string())
            .or_insert_with(|| output.clone());
        self.targets
            .entry(strip_extension(key).to_string())
            .or_insert_with(|| output.clone());
        self.targets.insert(key.to_string(), output);
    }

    /// Output path for a content-root-relative path, tried as given and
    /// without its extension.
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let path = path.trim_start_matches('/');
        self.targets
            .get(path)
            .or_else(|| self.targets.get(strip_extension(path)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// What to do with one `<a href>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRewrite {
    Unchanged,
    /// Leave the href, open in a new tab.
    External,
    Internal(String),
}

/// Content-root-relative path an href points at, or `None` for hrefs that
/// are not local paths.
fn local_target(href: &str, base_dir: &str) -> Option<(String, bool)> {
    match classify(href) {
        HrefKind::Absolute(p) => Some((join_normalized("", p), p.ends_with('/'))),
        HrefKind::Relative(p) => Some((join_normalized(base_dir, p), p.ends_with('/'))),
        _ => None,
    }
}

fn swap_content_extension(path: &str) -> String {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[segment_start..].rfind('.') {
        Some(dot) => {
            let ext = &path[segment_start + dot + 1..];
            if CONTENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                format!("{}.html", &path[..segment_start + dot])
            } else {
                path.to_string()
            }
        }
        None => path.to_string(),
    }
}

/// Rewrite one href found on a page whose source lives in `base_dir`.
pub fn rewrite_href(href: &str, base_dir: &str, index: &LinkIndex) -> LinkRewrite {
    let href = href.trim();
    match classify(href) {
        HrefKind::External => return LinkRewrite::External,
        HrefKind::Empty | HrefKind::Fragment | HrefKind::OtherScheme => {
            return LinkRewrite::Unchanged;
        }
        HrefKind::Absolute(_) | HrefKind::Relative(_) => {}
    }

    let (path, suffix) = split_suffix(href);
    let Some((target, trailing_slash)) = local_target(path, base_dir) else {
        return LinkRewrite::Unchanged;
    };
    let resolved = match index.lookup(&target) {
        Some(output) => output.to_string(),
        None if target.is_empty() => "/".to_string(),
        None => {
            let mut fallback = format!("/{}", swap_content_extension(&target));
            if trailing_slash {
                fallback.push('/');
            }
            fallback
        }
    };
    LinkRewrite::Internal(format!("{resolved}{suffix}"))
}

/// Content-root-relative path of a local asset (e.g. an `<img src>`), with
/// characters outside the path alphabet stripped. `None` for external,
/// scheme and empty sources.
pub fn resolve_asset(src: &str, base_dir: &str) -> Option<String> {
    let (path, _) = split_suffix(src.trim());
    let (target, _) = local_target(path, base_dir)?;
    let cleaned = strip_invalid_chars(&target);
    (!cleaned.is_empty()).then_some(cleaned)
}
