//! Synthetic pages derived from the metadata of real pages.
//!
//! Two algorithms cover the usual cases:
//!
//! - [`paginate`] splits an ordered list of pages into fixed-size chunks, one
//!   feed page per chunk.
//! - [`build_taxonomy`] groups pages by extracted terms (tags, categories);
//!   [`TaxonomyPages`] turns the grouping into one page per term plus a home
//!   page listing every term.
//!
//! A [`DynamicPageSource`] decides which pages to derive. [`BlogPages`] is the
//! configurable default (`[dynamic]` in `site.toml`): a paginated feed of one
//! content section plus category and tag pages. Any closure over the
//! [`NodeMetaMap`] can replace it.
//!
//! Every synthetic page is addressed by a slug such as `blog/page-2`. Its id
//! is the slug plus [`DYNAMIC_SUFFIX`], so authors can link to
//! `/blog/page-2.dynamic` and link rewriting resolves the real output path.
//!
//! Ordering uses [`sort_by_date_desc`], which compares dates as strings. This
//! is correct for ISO-8601 dates only; pages without a date sort last.

use crate::config::DynamicConfig;
use crate::nodes::{NodeMetaEntry, NodeMetaMap};
use crate::paths::slugify;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub const DYNAMIC_SUFFIX: &str = ".dynamic";

/// A page to be generated from other pages' metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicPage {
    /// Slash-separated slug without extension, e.g. `blog/tags/rust`.
    pub slug: String,
    pub template: String,
    pub props: Map<String, Value>,
}

impl DynamicPage {
    pub fn new(slug: &str, template: &str, props: Map<String, Value>) -> Self {
        let slug = slug.trim_start_matches('/');
        Self {
            slug: slug.strip_suffix(DYNAMIC_SUFFIX).unwrap_or(slug).to_string(),
            template: template.to_string(),
            props,
        }
    }

    pub fn id(&self) -> String {
        dynamic_id(&self.slug)
    }

    pub fn output_path(&self) -> String {
        format!("/{}.html", self.slug)
    }
}

/// `blog/page-2` → `blog/page-2.dynamic`
pub fn dynamic_id(slug: &str) -> String {
    let slug = slug.trim_start_matches('/');
    if slug.ends_with(DYNAMIC_SUFFIX) {
        slug.to_string()
    } else {
        format!("{slug}{DYNAMIC_SUFFIX}")
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Split `nodes` into pages of at most `per_page` entries.
///
/// Page `i` (0-indexed) gets the slug `slug_for(i)` and the props
/// `{nodes, pageNumber, numPages, pageSlugs}`, where `pageSlugs` lists the
/// ids of every page so templates can link between them. A `per_page` of 0
/// is treated as 1.
pub fn paginate(
    nodes: &[NodeMetaEntry],
    per_page: usize,
    template: &str,
    slug_for: impl Fn(usize) -> String,
) -> Vec<DynamicPage> {
    let chunks: Vec<&[NodeMetaEntry]> = nodes.chunks(per_page.max(1)).collect();
    let page_slugs: Vec<String> = (0..chunks.len()).map(|i| dynamic_id(&slug_for(i))).collect();

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let props = object(json!({
                "nodes": chunk,
                "pageNumber": i,
                "numPages": chunks.len(),
                "pageSlugs": page_slugs,
            }));
            DynamicPage::new(&page_slugs[i], template, props)
        })
        .collect()
}

/// Pages grouped under one term.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermEntry {
    pub slug: String,
    pub nodes: Vec<NodeMetaEntry>,
}

/// Term → member pages, built fresh for every derivation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Taxonomy {
    pub terms: BTreeMap<String, TermEntry>,
}

impl Taxonomy {
    pub fn term(&self, name: &str) -> Option<&TermEntry> {
        self.terms.get(name)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Group `nodes` by the terms `get_terms` extracts from each.
///
/// Terms are used as given; normalizing case, or supplying a default term
/// for pages without one, is up to the extractor. A page listing the same
/// term twice is added to it once.
pub fn build_taxonomy(
    nodes: &[NodeMetaEntry],
    get_terms: impl Fn(&NodeMetaEntry) -> Vec<String>,
) -> Taxonomy {
    let mut taxonomy = Taxonomy::default();
    for node in nodes {
        for term in get_terms(node) {
            if !taxonomy.terms.contains_key(&term) {
                let slug = slugify(&term);
                if let Some(other) = taxonomy.terms.iter().find(|(_, e)| e.slug == slug) {
                    warn!(
                        term = %term,
                        other = %other.0,
                        slug = %slug,
                        "taxonomy terms share a page slug"
                    );
                }
            }
            let entry = taxonomy
                .terms
                .entry(term.clone())
                .or_insert_with(|| TermEntry {
                    slug: slugify(&term),
                    nodes: Vec::new(),
                });
            if entry.nodes.last().is_none_or(|last| last.id != node.id) {
                entry.nodes.push(node.clone());
            }
        }
    }
    taxonomy
}

/// Page layout for one taxonomy: term pages at `<base>/<term-slug>` and a
/// home page at `<base>/index`.
#[derive(Debug, Clone)]
pub struct TaxonomyPages {
    /// Taxonomy name passed to templates, e.g. `tags`.
    pub name: String,
    pub base: String,
    pub term_template: String,
    pub home_template: String,
}

impl TaxonomyPages {
    pub fn home_slug(&self) -> String {
        format!("{}/index", self.base)
    }

    /// The home page followed by one page per term.
    pub fn generate(&self, taxonomy: &Taxonomy) -> Vec<DynamicPage> {
        let home = dynamic_id(&self.home_slug());
        let term_slug = |entry: &TermEntry| format!("{}/{}", self.base, entry.slug);

        let summary: Map<String, Value> = taxonomy
            .terms
            .iter()
            .map(|(term, entry)| {
                let summary = json!({
                    "slug": dynamic_id(&term_slug(entry)),
                    "count": entry.nodes.len(),
                    "nodes": entry.nodes,
                });
                (term.clone(), summary)
            })
            .collect();

        let mut pages = vec![DynamicPage::new(
            &home,
            &self.home_template,
            object(json!({ "taxonomy": self.name, "terms": summary })),
        )];
        for (term, entry) in &taxonomy.terms {
            pages.push(DynamicPage::new(
                &term_slug(entry),
                &self.term_template,
                object(json!({
                    "nodes": entry.nodes,
                    "taxonomy": self.name,
                    "term": term,
                    "taxonomyHome": home,
                })),
            ));
        }
        pages
    }
}

/// Newest first by `date`, compared as strings; undated pages last. Stable.
pub fn sort_by_date_desc(mut nodes: Vec<NodeMetaEntry>) -> Vec<NodeMetaEntry> {
    nodes.sort_by_key(|n| Reverse(n.date.clone().unwrap_or_default()));
    nodes
}

/// Pages whose relative path lies under `dir`.
pub fn filter_by_path_prefix(nodes: &[NodeMetaEntry], dir: &str) -> Vec<NodeMetaEntry> {
    let prefix = format!("{}/", dir.trim_matches('/'));
    nodes
        .iter()
        .filter(|n| n.rel_path.starts_with(&prefix))
        .cloned()
        .collect()
}

/// Pages whose front-matter `key` equals `value` or is a list containing it.
pub fn filter_by_frontmatter(
    nodes: &[NodeMetaEntry],
    key: &str,
    value: &Value,
) -> Vec<NodeMetaEntry> {
    nodes
        .iter()
        .filter(|n| match n.frontmatter.get(key) {
            Some(Value::Array(items)) => items.contains(value),
            Some(found) => found == value,
            None => false,
        })
        .cloned()
        .collect()
}

/// Distinct values of front-matter `key` across `nodes`, after `transform`,
/// in first-seen order. List values contribute each element.
pub fn frontmatter_terms(
    nodes: &[NodeMetaEntry],
    key: &str,
    transform: impl Fn(&Value) -> Option<String>,
) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut terms = Vec::new();
    let mut add = |v: &Value| {
        if let Some(term) = transform(v)
            && seen.insert(term.clone())
        {
            terms.push(term);
        }
    };
    for node in nodes {
        match node.frontmatter.get(key) {
            Some(Value::Array(items)) => items.iter().for_each(&mut add),
            Some(value) => add(value),
            None => {}
        }
    }
    terms
}

/// Derives synthetic pages from the metadata of all published pages.
pub trait DynamicPageSource: Send + Sync {
    fn pages(&self, nodes: &NodeMetaMap) -> Vec<DynamicPage>;
}

impl<F> DynamicPageSource for F
where
    F: Fn(&NodeMetaMap) -> Vec<DynamicPage> + Send + Sync,
{
    fn pages(&self, nodes: &NodeMetaMap) -> Vec<DynamicPage> {
        self(nodes)
    }
}

/// Feed, category and tag pages for one content section.
#[derive(Debug, Clone)]
pub struct BlogPages {
    config: DynamicConfig,
}

impl BlogPages {
    pub fn new(config: DynamicConfig) -> Self {
        Self { config }
    }
}

impl DynamicPageSource for BlogPages {
    fn pages(&self, nodes: &NodeMetaMap) -> Vec<DynamicPage> {
        let config = &self.config;
        if !config.enabled {
            return Vec::new();
        }
        let section = config.section.trim_matches('/');
        let all: Vec<NodeMetaEntry> = nodes.values().cloned().collect();
        let posts = sort_by_date_desc(filter_by_path_prefix(&all, section));

        let mut pages = paginate(&posts, config.per_page, &config.feed_template, |i| {
            if i == 0 {
                format!("{section}/index")
            } else {
                format!("{section}/page-{}", i + 1)
            }
        });

        if config.categories {
            let categories = build_taxonomy(&posts, |n| {
                vec![
                    n.category
                        .as_deref()
                        .map(str::to_lowercase)
                        .unwrap_or_else(|| "uncategorized".to_string()),
                ]
            });
            let layout = TaxonomyPages {
                name: "categories".into(),
                base: format!("{section}/categories"),
                term_template: config.term_template.clone(),
                home_template: config.taxonomy_template.clone(),
            };
            pages.extend(layout.generate(&categories));
        }

        if config.tags {
            let tags = build_taxonomy(&posts, |n| n.tags.iter().map(|t| t.to_lowercase()).collect());
            let layout = TaxonomyPages {
                name: "tags".into(),
                base: format!("{section}/tags"),
                term_template: config.term_template.clone(),
                home_template: config.taxonomy_template.clone(),
            };
            pages.extend(layout.generate(&tags));
        }
        pages
    }
}
