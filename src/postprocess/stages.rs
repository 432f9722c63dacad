//! Standard and optional post-processing stages.
//!
//! | Stage | Priority | Effect |
//! |---|---|---|
//! | `parse-html` | 100 | HTML string → [`Document`] |
//! | `rewrite-links` | 50 | source hrefs → output paths, external links open in a new tab |
//! | `rewrite-images` | 50 | `<img>` → responsive `<picture>` |
//! | `serialize-html` | 0 | [`Document`] → HTML string |
//!
//! Optional stages operate on the parsed document, so their priority must
//! lie between 1 and 99.

use super::links::{self, LinkRewrite};
use super::{PostContext, PostStage};
use crate::html::{Document, Element, Node};
use crate::image_cache::ImageEntry;
use crate::imaging::{BackendError, VariantConfig, get_dimensions};
use crate::paths::slugify;
use crate::pipeline::StageResult;
use std::collections::HashSet;
use tracing::warn;

pub const PARSE_HTML: i32 = 100;
pub const REWRITE: i32 = 50;
pub const SERIALIZE_HTML: i32 = 0;

pub struct ParseHtml;

impl PostStage for ParseHtml {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        ctx.document = Some(Document::parse(&ctx.html)?);
        Ok(())
    }
}

pub struct SerializeHtml;

impl PostStage for SerializeHtml {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        if let Some(document) = ctx.document.take() {
            ctx.html = document.to_html();
        }
        Ok(())
    }
}

/// Rewrites `<a href>` from source paths to output paths.
pub struct RewriteLinks;

impl PostStage for RewriteLinks {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        let index = ctx.env.links;
        let base_dir = ctx.page.base_dir().to_string();
        let document = ctx.document_mut("rewrite-links")?;
        document.for_each_element_mut(&mut |el| {
            if el.name != "a" {
                return;
            }
            let Some(href) = el.attr("href") else {
                return;
            };
            match links::rewrite_href(&href, &base_dir, index) {
                LinkRewrite::Unchanged => {}
                LinkRewrite::External => el.set_attr("target", "_blank"),
                LinkRewrite::Internal(target) => el.set_attr("href", &target),
            }
        });
        Ok(())
    }
}

/// Replaces local `<img>` elements with `<picture>` offering the alternate
/// encodings, and registers each image in the build's image map.
pub struct RewriteImages {
    /// Images carrying this class are left as they are.
    pub exclude_class: String,
    /// Serve the tiny placeholder first and the full image via
    /// `data-lazy-src`.
    pub blur_placeholder: bool,
    pub variants: VariantConfig,
}

impl PostStage for RewriteImages {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        let env = ctx.env;
        let base_dir = ctx.page.base_dir().to_string();
        let page_id = ctx.page.id.clone();
        let document = ctx.document_mut("rewrite-images")?;

        document.replace_elements("img", &["picture"], &mut |img| {
            if img.has_class(&self.exclude_class) {
                return None;
            }
            let rel = links::resolve_asset(&img.attr("src")?, &base_dir)?;
            let source = env.content_root.join(&rel);
            let entry = env.images.get_or_try_insert(&source, || {
                let dims = get_dimensions(env.backend, &source)?;
                Ok::<_, BackendError>(ImageEntry::new(
                    source.clone(),
                    format!("/{rel}"),
                    dims,
                    &self.variants,
                ))
            });
            match entry {
                Ok(entry) => Some(picture(img, &entry, self.blur_placeholder)),
                Err(error) => {
                    warn!(page = %page_id, image = %source.display(), %error, "cannot read image");
                    None
                }
            }
        });
        Ok(())
    }
}

/// `<picture>` with one `<source>` per alternate and the original `<img>`
/// (class, alt and other attributes kept) as fallback.
fn picture(img: &Element, entry: &ImageEntry, blur_placeholder: bool) -> Element {
    let mut fallback = img.clone();
    if blur_placeholder {
        fallback.set_attr("src", &entry.tiny);
        fallback.set_attr("data-lazy-src", &entry.src);
    } else {
        fallback.set_attr("src", &entry.src);
    }
    if !fallback.has_attr("width") {
        fallback.set_attr("width", &entry.width.to_string());
    }
    if !fallback.has_attr("height") {
        fallback.set_attr("height", &entry.height.to_string());
    }
    fallback.set_attr("loading", "lazy");

    let mut picture = Element::new("picture");
    for source in &entry.sources {
        picture.children.push(Node::Element(
            Element::new("source")
                .with_attr("srcset", &source.srcset)
                .with_attr("type", &source.mime),
        ));
    }
    picture.with_child(Node::Element(fallback))
}

/// Adds `rel="noopener noreferrer"` to links that open a new tab.
pub struct ExternalNoopener;

impl PostStage for ExternalNoopener {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        ctx.document_mut("external-noopener")?
            .for_each_element_mut(&mut |el| {
                if el.name == "a"
                    && el.attr("target").as_deref() == Some("_blank")
                    && !el.has_attr("rel")
                {
                    el.set_attr("rel", "noopener noreferrer");
                }
            });
        Ok(())
    }
}

/// Gives every heading without an `id` a slug of its text, unique within
/// the page.
pub struct HeadingIds;

impl PostStage for HeadingIds {
    fn apply(&self, ctx: &mut PostContext<'_>) -> StageResult {
        let document = ctx.document_mut("heading-ids")?;
        let mut seen: HashSet<String> = HashSet::new();
        for el in ["h1", "h2", "h3", "h4", "h5", "h6"]
            .iter()
            .flat_map(|h| document.find_all(h))
        {
            if let Some(id) = el.attr("id") {
                seen.insert(id);
            }
        }

        document.for_each_element_mut(&mut |el| {
            let is_heading = el.name.len() == 2
                && el.name.starts_with('h')
                && matches!(el.name.as_bytes()[1], b'1'..=b'6');
            if !is_heading || el.has_attr("id") {
                return;
            }
            let base = slugify(&el.text_content());
            let base = if base.is_empty() { "section".to_string() } else { base };
            let mut id = base.clone();
            let mut n = 1;
            while seen.contains(&id) {
                id = format!("{base}-{n}");
                n += 1;
            }
            el.set_attr("id", &id);
            seen.insert(id);
        });
        Ok(())
    }
}

/// Look up an optional stage by its config name.
pub fn optional_stage(name: &str) -> Option<Box<dyn PostStage>> {
    match name {
        "external-noopener" => Some(Box::new(ExternalNoopener)),
        "heading-ids" => Some(Box::new(HeadingIds)),
        _ => None,
    }
}
