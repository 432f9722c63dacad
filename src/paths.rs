//! Content identity and output path resolution.
//!
//! Every content file gets four derived values, computed purely from its
//! location under the content root and (optionally) its front matter:
//!
//! | Field | Example for `content/blog/My Post.md` |
//! |---|---|
//! | `id` | the source path as given (`/site/content/blog/My Post.md`) |
//! | `rel_path` | `blog/MyPost.md` |
//! | `output_path` | `/blog/mypost.html` |
//! | `file_name` | `MyPost` |
//!
//! The first non-empty front-matter value among `permalink`, `path`, `route`
//! and `slug` (in that order) replaces the location-derived output path.
//!
//! Resolution is deterministic and never fails: the build diff compares these
//! values across builds, so the same input must always produce the same paths.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path};

/// Front-matter keys that override the output path, in priority order.
pub const OVERRIDE_KEYS: &[&str] = &["permalink", "path", "route", "slug"];

/// Identity and output location of one content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPaths {
    pub id: String,
    pub rel_path: String,
    pub output_path: String,
    pub file_name: String,
}

/// Whether `c` may appear in a relative or output path.
pub fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.')
}

/// Remove every character outside `[A-Za-z0-9_\-/.]`.
pub fn strip_invalid_chars(s: &str) -> String {
    s.chars().filter(|c| is_path_char(*c)).collect()
}

/// Strip the trailing extension run of the last path segment.
///
/// The run is every `.`-separated part after the first dot that starts a
/// sequence of non-empty parts, so compound extensions go together:
///
/// - `blog/post.md` → `blog/post`
/// - `archive.tar.gz` → `archive`
/// - `v1.2/notes` → `v1.2/notes`
pub fn strip_extension(path: &str) -> &str {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let segment = &path[segment_start..];
    for (i, _) in segment.match_indices('.') {
        if segment[i + 1..].split('.').all(|part| !part.is_empty()) {
            return &path[..segment_start + i];
        }
    }
    path
}

/// Collapse a `/`-separated path: drop empty, `.` and `..` segments.
///
/// `..` is dropped rather than applied, so the result can never climb above
/// the root it is later joined to.
fn sanitize_segments(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve `..` and `.` segments of a `/`-separated relative path.
///
/// Used for hrefs, where `..` is meaningful. Segments that would climb above
/// the root are discarded.
///
/// - `("blog/posts", "../index.md")` → `blog/index.md`
/// - `("", "./a/b.md")` → `a/b.md`
pub fn join_normalized(dir: &str, relative: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(relative.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Directory part of a `/`-separated path (empty for top-level files).
pub fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.rfind('/') {
        Some(i) => &trimmed[..i],
        None => "",
    }
}

/// First segment of a relative path that lives in a directory.
///
/// `blog/2021/post.md` → `Some("blog")`, `about.md` → `None`.
pub fn top_level_dir(rel_path: &str) -> Option<&str> {
    rel_path
        .trim_start_matches('/')
        .split_once('/')
        .map(|(first, _)| first)
        .filter(|first| !first.is_empty())
}

/// Lowercase URL slug: alphanumerics kept, whitespace, `-` and `_` collapse
/// to a single `-`, everything else dropped.
///
/// `"Rust & Web Dev"` → `rust-web-dev`
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Path of `source` relative to `root` with `/` separators.
///
/// Falls back to the full path when `source` is not under `root`.
pub fn relative_slash_path(source: &Path, root: &Path) -> String {
    let rel = source.strip_prefix(root).unwrap_or(source);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Read the first usable override among [`OVERRIDE_KEYS`].
fn override_value(frontmatter: &Map<String, Value>) -> Option<String> {
    OVERRIDE_KEYS.iter().find_map(|key| {
        let value = match frontmatter.get(*key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!value.is_empty()).then_some(value)
    })
}

/// Normalize a front-matter override into a path base.
///
/// Strips a leading `./` or `/`, the extension and invalid characters.
fn normalize_override(value: &str) -> String {
    let trimmed = value
        .strip_prefix("./")
        .or_else(|| value.strip_prefix('/'))
        .unwrap_or(value);
    sanitize_segments(&strip_invalid_chars(strip_extension(trimmed)))
}

/// Compute identifier, relative path, output path and file name for a
/// content file.
///
/// `frontmatter` may be `None` when resolving before front matter is known.
pub fn resolve(
    source: &Path,
    content_root: &Path,
    frontmatter: Option<&Map<String, Value>>,
) -> ResolvedPaths {
    let id = source.to_string_lossy().into_owned();
    let rel_path = strip_invalid_chars(&relative_slash_path(source, content_root));

    let base = frontmatter
        .and_then(override_value)
        .map(|v| normalize_override(&v))
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| sanitize_segments(strip_extension(&rel_path)).to_lowercase());

    let last_segment = rel_path.rsplit('/').next().unwrap_or_default();
    let file_name = strip_extension(last_segment).to_string();

    ResolvedPaths {
        id,
        output_path: format!("/{base}.html"),
        rel_path,
        file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fm(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    // =========================================================================
    // resolve
    // =========================================================================

    #[test]
    fn resolve_location_derived() {
        let paths = resolve(
            Path::new("/site/content/blog/Hello-World.md"),
            Path::new("/site/content"),
            None,
        );
        assert_eq!(paths.id, "/site/content/blog/Hello-World.md");
        assert_eq!(paths.rel_path, "blog/Hello-World.md");
        assert_eq!(paths.output_path, "/blog/hello-world.html");
        assert_eq!(paths.file_name, "Hello-World");
    }

    #[test]
    fn resolve_strips_invalid_characters() {
        let paths = resolve(
            Path::new("/c/blog/My Post!.md"),
            Path::new("/c"),
            None,
        );
        assert_eq!(paths.rel_path, "blog/MyPost.md");
        assert_eq!(paths.output_path, "/blog/mypost.html");
        assert_eq!(paths.file_name, "MyPost");
    }

    #[test]
    fn resolve_front_matter_path_override() {
        let paths = resolve(
            Path::new("/c/x.md"),
            Path::new("/c"),
            Some(&fm(json!({"path": "foo/bar"}))),
        );
        assert_eq!(paths.output_path, "/foo/bar.html");
        assert_eq!(paths.rel_path, "x.md");
    }

    #[test]
    fn resolve_override_priority_order() {
        let paths = resolve(
            Path::new("/c/x.md"),
            Path::new("/c"),
            Some(&fm(json!({"slug": "from-slug", "permalink": "/from-permalink.html"}))),
        );
        assert_eq!(paths.output_path, "/from-permalink.html");
    }

    #[test]
    fn resolve_override_strips_dot_slash_and_extension() {
        let paths = resolve(
            Path::new("/c/x.md"),
            Path::new("/c"),
            Some(&fm(json!({"route": "./docs/intro.md"}))),
        );
        assert_eq!(paths.output_path, "/docs/intro.html");
    }

    #[test]
    fn resolve_empty_override_is_ignored() {
        let paths = resolve(
            Path::new("/c/About.md"),
            Path::new("/c"),
            Some(&fm(json!({"permalink": "", "slug": "  "}))),
        );
        assert_eq!(paths.output_path, "/about.html");
    }

    #[test]
    fn resolve_numeric_slug() {
        let paths = resolve(
            Path::new("/c/x.md"),
            Path::new("/c"),
            Some(&fm(json!({"slug": 2021}))),
        );
        assert_eq!(paths.output_path, "/2021.html");
    }

    #[test]
    fn resolve_override_cannot_escape_root() {
        let paths = resolve(
            Path::new("/c/x.md"),
            Path::new("/c"),
            Some(&fm(json!({"path": "../../etc/passwd"}))),
        );
        assert_eq!(paths.output_path, "/etc/passwd.html");
    }

    #[test]
    fn resolve_is_deterministic() {
        let a = resolve(Path::new("/c/a/b.md"), Path::new("/c"), None);
        let b = resolve(Path::new("/c/a/b.md"), Path::new("/c"), None);
        assert_eq!(a, b);
    }

    // =========================================================================
    // helpers
    // =========================================================================

    #[test]
    fn strip_extension_compound() {
        assert_eq!(strip_extension("archive.tar.gz"), "archive");
        assert_eq!(strip_extension("blog/post.md"), "blog/post");
        assert_eq!(strip_extension("v1.2/notes"), "v1.2/notes");
        assert_eq!(strip_extension("trailing."), "trailing.");
    }

    #[test]
    fn join_normalized_handles_parent_segments() {
        assert_eq!(join_normalized("blog/posts", "../index.md"), "blog/index.md");
        assert_eq!(join_normalized("", "./a/b.md"), "a/b.md");
        assert_eq!(join_normalized("a", "../../b.md"), "b.md");
    }

    #[test]
    fn parent_and_top_level_dirs() {
        assert_eq!(parent_dir("blog/posts/a.md"), "blog/posts");
        assert_eq!(parent_dir("/about.html"), "");
        assert_eq!(top_level_dir("blog/2021/post.md"), Some("blog"));
        assert_eq!(top_level_dir("about.md"), None);
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Rust & Web Dev"), "rust-web-dev");
        assert_eq!(slugify("  snake_case--name "), "snake-case-name");
        assert_eq!(slugify("Café"), "café");
        assert_eq!(slugify("!!!"), "");
    }
}
