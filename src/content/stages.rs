//! Standard and optional content stages.
//!
//! | Stage | Priority | Effect |
//! |---|---|---|
//! | `parse-front-matter` | 100 | split + parse YAML, derive title/date/tags/category |
//! | `set-draft` | 50 | `metadata.draft` from front matter |
//! | `resolve-paths` | 50 | id, relative path, output path, file name |
//! | `file-info` | 50 | created / modified timestamps |
//! | `set-template` | 50 | template name |
//! | `render-markdown` | -100 | body → HTML fragment |
//!
//! Optional stages (selected by name from config) toggle markdown
//! extensions and run at whatever priority the config gives them, normally
//! between 1 and 99 so they precede `render-markdown`.

use super::frontmatter;
use super::{ContentContext, ContentStage, SourceKind};
use crate::paths;
use crate::pipeline::StageResult;
use pulldown_cmark::{Options, Parser, html};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::UNIX_EPOCH;

pub const PARSE_FRONT_MATTER: i32 = 100;
pub const STANDARD: i32 = 50;
pub const RENDER_MARKDOWN: i32 = -100;

/// Splits front matter from the body and derives the common fields.
pub struct ParseFrontMatter;

impl ContentStage for ParseFrontMatter {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        let (frontmatter, body) = match ctx.kind {
            SourceKind::Markdown => {
                let (yaml, body) = frontmatter::split(&ctx.raw);
                let fm = match yaml {
                    Some(yaml) => frontmatter::parse(yaml)?,
                    None => Map::new(),
                };
                (fm, body.to_string())
            }
            SourceKind::Component => (frontmatter::parse(&ctx.raw)?, String::new()),
        };

        ctx.metadata.title = Some(
            string_field(&frontmatter, "title")
                .or_else(|| first_heading(&body))
                .unwrap_or_else(|| file_stem(ctx)),
        );
        ctx.metadata.date = string_field(&frontmatter, "date");
        ctx.metadata.category = string_field(&frontmatter, "category");
        ctx.metadata.tags = list_field(&frontmatter, "tags");
        ctx.metadata.frontmatter = frontmatter;
        ctx.body = body;
        Ok(())
    }
}

/// Scalar front-matter value as a string (numbers included).
fn string_field(fm: &Map<String, Value>, key: &str) -> Option<String> {
    match fm.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A list of scalars, or a single scalar treated as a one-element list.
fn list_field(fm: &Map<String, Value>, key: &str) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    match fm.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(other) => scalar(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// First `# ` heading of a markdown body.
fn first_heading(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.trim().strip_prefix("# "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
}

fn file_stem(ctx: &ContentContext) -> String {
    let name = ctx
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    paths::strip_extension(&name).to_string()
}

/// Sets the draft flag from a truthy front-matter `draft`.
pub struct SetDraft;

impl ContentStage for SetDraft {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        ctx.metadata.draft = ctx.metadata.frontmatter.get("draft").is_some_and(is_truthy);
        Ok(())
    }
}

/// Loose truthiness: null, `false`, zero and the empty string are false,
/// everything else (including `"false"` and `"no"`) is true.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Computes identity and output paths.
pub struct ResolvePaths;

impl ContentStage for ResolvePaths {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        let resolved = paths::resolve(
            &ctx.source,
            &ctx.content_root,
            Some(&ctx.metadata.frontmatter),
        );
        ctx.metadata.rel_path = resolved.rel_path;
        ctx.metadata.output_path = resolved.output_path;
        ctx.metadata.file_name = resolved.file_name;
        Ok(())
    }
}

/// Attaches filesystem timestamps as seconds since the Unix epoch.
pub struct FileInfo;

impl ContentStage for FileInfo {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        let meta = std::fs::metadata(&ctx.source)?;
        let secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
        };
        ctx.metadata.created = secs(meta.created());
        ctx.metadata.modified = secs(meta.modified());
        Ok(())
    }
}

/// Resolves the template: explicit front matter, then the node's top-level
/// content directory, then the default.
pub struct SetTemplate {
    pub default: String,
    pub directories: BTreeMap<String, String>,
}

impl ContentStage for SetTemplate {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        let explicit = string_field(&ctx.metadata.frontmatter, "template");
        let by_directory = || {
            paths::top_level_dir(&ctx.metadata.rel_path)
                .and_then(|dir| self.directories.get(dir))
                .cloned()
        };
        ctx.metadata.template = explicit
            .or_else(by_directory)
            .unwrap_or_else(|| self.default.clone());
        Ok(())
    }
}

/// Renders the markdown body. Component descriptors have no body and
/// produce an empty fragment.
pub struct RenderMarkdown;

impl ContentStage for RenderMarkdown {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        ctx.html = match ctx.kind {
            SourceKind::Markdown => {
                let parser = Parser::new_ext(&ctx.body, ctx.markdown_options);
                let mut out = String::new();
                html::push_html(&mut out, parser);
                out
            }
            SourceKind::Component => String::new(),
        };
        Ok(())
    }
}

/// Enables a set of markdown extensions for the render stage.
pub struct MarkdownExtensions(pub Options);

impl ContentStage for MarkdownExtensions {
    fn apply(&self, ctx: &mut ContentContext) -> StageResult {
        ctx.markdown_options.insert(self.0);
        Ok(())
    }
}

/// Look up an optional stage by its config name.
pub fn optional_stage(name: &str) -> Option<Box<dyn ContentStage>> {
    let options = match name {
        "gfm" => Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS,
        "footnotes" => Options::ENABLE_FOOTNOTES,
        "smart-punctuation" => Options::ENABLE_SMART_PUNCTUATION,
        _ => return None,
    };
    Some(Box::new(MarkdownExtensions(options)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn ctx(rel: &str, raw: &str, kind: SourceKind) -> ContentContext {
        ContentContext::new(
            PathBuf::from("/c").join(rel),
            PathBuf::from("/c"),
            kind,
            raw.to_string(),
        )
    }

    #[test]
    fn parse_front_matter_derives_fields() {
        let mut c = ctx(
            "blog/a.md",
            "---\ntitle: Hello\ndate: 2021-01-02\ntags: [Rust, web]\ncategory: Notes\n---\nbody",
            SourceKind::Markdown,
        );
        ParseFrontMatter.apply(&mut c).unwrap();

        assert_eq!(c.metadata.title.as_deref(), Some("Hello"));
        assert_eq!(c.metadata.date.as_deref(), Some("2021-01-02"));
        assert_eq!(c.metadata.tags, vec!["Rust", "web"]);
        assert_eq!(c.metadata.category.as_deref(), Some("Notes"));
        assert_eq!(c.body, "body");
    }

    #[test]
    fn title_falls_back_to_heading_then_file_name() {
        let mut c = ctx("a.md", "intro\n\n# The Heading\n", SourceKind::Markdown);
        ParseFrontMatter.apply(&mut c).unwrap();
        assert_eq!(c.metadata.title.as_deref(), Some("The Heading"));

        let mut c = ctx("notes.md", "no heading", SourceKind::Markdown);
        ParseFrontMatter.apply(&mut c).unwrap();
        assert_eq!(c.metadata.title.as_deref(), Some("notes"));
    }

    #[test]
    fn single_tag_string_becomes_list() {
        let mut c = ctx("a.md", "---\ntags: solo\n---\n", SourceKind::Markdown);
        ParseFrontMatter.apply(&mut c).unwrap();
        assert_eq!(c.metadata.tags, vec!["solo"]);
    }

    #[test]
    fn component_descriptor_is_all_front_matter() {
        let mut c = ctx(
            "contact.page",
            "template: Contact\nemail: me@example.com\n",
            SourceKind::Component,
        );
        ParseFrontMatter.apply(&mut c).unwrap();
        assert_eq!(c.metadata.frontmatter["email"], json!("me@example.com"));
        assert!(c.body.is_empty());
    }

    #[test]
    fn invalid_yaml_fails_stage() {
        let mut c = ctx("a.md", "---\ntitle: [oops\n---\n", SourceKind::Markdown);
        assert!(ParseFrontMatter.apply(&mut c).is_err());
    }

    #[test]
    fn draft_flag_variants() {
        for (value, expected) in [
            (json!(true), true),
            (json!(false), false),
            (json!("true"), true),
            (json!("yes"), true),
            (json!("no"), true),
            (json!("false"), true),
            (json!(""), false),
            (json!(1), true),
            (json!(0), false),
            (json!(0.0), false),
            (json!(null), false),
            (json!(["x"]), true),
        ] {
            let mut c = ctx("a.md", "", SourceKind::Markdown);
            c.metadata.frontmatter.insert("draft".into(), value.clone());
            SetDraft.apply(&mut c).unwrap();
            assert_eq!(c.metadata.draft, expected, "draft: {value}");
        }
    }

    #[test]
    fn template_resolution_order() {
        let stage = SetTemplate {
            default: "Default".into(),
            directories: BTreeMap::from([("blog".to_string(), "Post".to_string())]),
        };

        let mut c = ctx("blog/a.md", "", SourceKind::Markdown);
        c.metadata.rel_path = "blog/a.md".into();
        stage.apply(&mut c).unwrap();
        assert_eq!(c.metadata.template, "Post");

        c.metadata
            .frontmatter
            .insert("template".into(), json!("Landing"));
        stage.apply(&mut c).unwrap();
        assert_eq!(c.metadata.template, "Landing");

        let mut c = ctx("about.md", "", SourceKind::Markdown);
        c.metadata.rel_path = "about.md".into();
        stage.apply(&mut c).unwrap();
        assert_eq!(c.metadata.template, "Default");
    }

    #[test]
    fn render_respects_enabled_extensions() {
        let mut c = ctx("a.md", "", SourceKind::Markdown);
        c.body = "| a |\n|---|\n| 1 |\n".into();
        RenderMarkdown.apply(&mut c).unwrap();
        assert!(!c.html.contains("<table>"));

        optional_stage("gfm").unwrap().apply(&mut c).unwrap();
        RenderMarkdown.apply(&mut c).unwrap();
        assert!(c.html.contains("<table>"));
    }

    #[test]
    fn unknown_optional_stage_is_none() {
        assert!(optional_stage("mdsvex").is_none());
    }
}
