//! Template renderer collaborator and the HTML document shell.
//!
//! The engine hands a [`Renderer`] a template name and a props object and
//! gets back `{html, css, head}`. It never looks inside a template. The
//! renderer may also derive extra props for a page from the metadata of all
//! pages ([`Renderer::derive_props`]); derived props take part in the
//! skip-render comparison, so a page re-renders when, say, a sibling's title
//! changes.
//!
//! Props passed to `render`:
//!
//! | Key | Value |
//! |---|---|
//! | `nodeData` | `{id, relPath, outputPath}` |
//! | `siteMeta` | the `[site]` table |
//! | `metadata` | front matter and derived fields |
//! | `htmlContent` | the content fragment (empty for generated pages) |
//! | `isDraft` | draft flag |
//! | … | derived props, then generated-page props |
//!
//! [`BasicRenderer`] is the built-in renderer (maud) with five templates:
//! `Default`, `Post`, `Feed`, `Term` and `Taxonomy`. Links it emits point at
//! sources (`/blog/a.md`) and generated-page ids (`/blog/page-2.dynamic`);
//! post-processing turns them into output paths.

use crate::config::SiteMetadata;
use crate::nodes::{NodeMetaEntry, NodeMetaMap};
use crate::paths::top_level_dir;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use serde_json::{Map, Value, json};
use thiserror::Error;

const BASE_CSS: &str = include_str!("../static/base.css");
const LAZY_JS: &str = include_str!("../static/lazy.js");

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("unknown template `{0}`")]
    UnknownTemplate(String),
    #[error("template `{template}` failed: {message}")]
    Template { template: String, message: String },
}

/// Output of one render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub html: String,
    pub css: String,
    /// Extra markup for `<head>`.
    pub head: String,
}

pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, props: &Value) -> Result<Rendered, RenderError>;

    /// Extra props for page `id` computed from all pages' metadata.
    fn derive_props(&self, _template: &str, _id: &str, _meta: &NodeMetaMap) -> Map<String, Value> {
        Map::new()
    }
}

/// Wrap rendered output in a complete HTML document.
pub fn document_shell(rendered: &Rendered, site: &SiteMetadata, title: &str) -> String {
    let full_title = match (title.is_empty(), site.name.is_empty()) {
        (false, false) if title != site.name => format!("{title} | {}", site.name),
        (true, _) => site.name.clone(),
        _ => title.to_string(),
    };
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (full_title) }
                @if !site.description.is_empty() {
                    meta name="description" content=(site.description);
                }
                @if !site.theme_color.is_empty() {
                    meta name="theme-color" content=(site.theme_color);
                }
                link rel="manifest" href="/site.webmanifest";
                @if !rendered.css.is_empty() {
                    style { (PreEscaped(&rendered.css)) }
                }
                (PreEscaped(&rendered.head))
            }
            body {
                (PreEscaped(&rendered.html))
            }
        }
    }
    .into_string()
}

fn str_at<'a>(props: &'a Value, pointer: &str) -> &'a str {
    props.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn array_at<'a>(props: &'a Value, pointer: &str) -> &'a [Value] {
    props
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// `/` + relative path, the form post-processing resolves.
fn source_href(node: &Value) -> String {
    format!("/{}", str_at(node, "/relPath"))
}

fn node_title(node: &Value) -> &str {
    match str_at(node, "/title") {
        "" => str_at(node, "/relPath"),
        title => title,
    }
}

fn node_list(nodes: &[Value]) -> Markup {
    html! {
        ul.nodes {
            @for node in nodes {
                li {
                    a href=(source_href(node)) { (node_title(node)) }
                    @let date = str_at(node, "/date");
                    @if !date.is_empty() {
                        " " time.meta { (date) }
                    }
                }
            }
        }
    }
}

/// Built-in maud templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicRenderer;

impl BasicRenderer {
    fn article(props: &Value, post: bool) -> Markup {
        let tags = array_at(props, "/metadata/tags");
        let date = str_at(props, "/metadata/date");
        let siblings = array_at(props, "/siblings");
        html! {
            article class=[post.then_some("post")] {
                h1 { (str_at(props, "/metadata/title")) }
                @if post && !date.is_empty() {
                    p.meta { time { (date) } }
                }
                (PreEscaped(str_at(props, "/htmlContent")))
                @if post && !tags.is_empty() {
                    ul.tags {
                        @for tag in tags {
                            li { (tag.as_str().unwrap_or_default()) }
                        }
                    }
                }
            }
            @if !siblings.is_empty() {
                nav.siblings {
                    (node_list(siblings))
                }
            }
        }
    }

    fn feed(props: &Value) -> Markup {
        let current = props.get("pageNumber").and_then(Value::as_u64).unwrap_or(0);
        let slugs = array_at(props, "/pageSlugs");
        html! {
            (node_list(array_at(props, "/nodes")))
            @if slugs.len() > 1 {
                nav.pagination {
                    @for (i, slug) in slugs.iter().enumerate() {
                        @let href = format!("/{}", slug.as_str().unwrap_or_default());
                        @if i as u64 == current {
                            a href=(href) aria-current="page" { (i + 1) }
                        } @else {
                            a href=(href) { (i + 1) }
                        }
                        " "
                    }
                }
            }
        }
    }

    fn term(props: &Value) -> Markup {
        html! {
            h1 { (str_at(props, "/term")) }
            (node_list(array_at(props, "/nodes")))
            p {
                a href=(format!("/{}", str_at(props, "/taxonomyHome"))) {
                    "All " (str_at(props, "/taxonomy"))
                }
            }
        }
    }

    fn taxonomy(props: &Value) -> Markup {
        let empty = Map::new();
        let terms = props
            .get("terms")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        html! {
            h1 { (str_at(props, "/taxonomy")) }
            ul.terms {
                @for (term, entry) in terms {
                    li {
                        a href=(format!("/{}", str_at(entry, "/slug"))) { (term) }
                        " (" (entry.get("count").and_then(Value::as_u64).unwrap_or(0)) ")"
                    }
                }
            }
        }
    }
}

impl Renderer for BasicRenderer {
    fn render(&self, template: &str, props: &Value) -> Result<Rendered, RenderError> {
        let body = match template {
            "Default" => Self::article(props, false),
            "Post" => Self::article(props, true),
            "Feed" => Self::feed(props),
            "Term" => Self::term(props),
            "Taxonomy" => Self::taxonomy(props),
            other => return Err(RenderError::UnknownTemplate(other.to_string())),
        };
        Ok(Rendered {
            html: html! { main { (body) } }.into_string(),
            css: BASE_CSS.to_string(),
            head: html! { script { (PreEscaped(LAZY_JS)) } }.into_string(),
        })
    }

    /// Posts list the other pages of their top-level section, newest first.
    fn derive_props(&self, template: &str, id: &str, meta: &NodeMetaMap) -> Map<String, Value> {
        let mut derived = Map::new();
        if template != "Post" {
            return derived;
        }
        let Some(section) = meta.get(id).and_then(|n| top_level_dir(&n.rel_path)) else {
            return derived;
        };
        let mut siblings: Vec<&NodeMetaEntry> = meta
            .values()
            .filter(|n| n.id != id && top_level_dir(&n.rel_path) == Some(section))
            .collect();
        siblings.sort_by(|a, b| b.date.cmp(&a.date));
        let siblings: Vec<Value> = siblings
            .into_iter()
            .map(|n| json!({ "title": n.title, "relPath": n.rel_path, "date": n.date }))
            .collect();
        derived.insert("siblings".into(), Value::Array(siblings));
        derived
    }
}
