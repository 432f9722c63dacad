//! Node model and build diff.
//!
//! [`NodeStore`] owns every [`ContentNode`] across builds. It survives
//! between builds in watch mode, which is what makes rebuilds incremental:
//!
//! - [`reconcile`](NodeStore::reconcile) compares the bundler's entries with
//!   the stored nodes. A node whose `output_file` identifier is unchanged is
//!   kept with its metadata and render state; a changed identifier drops and
//!   recreates the node; entries that vanished are removed with their
//!   artifacts.
//! - [`node_meta`](NodeStore::node_meta) projects the cross-node view
//!   ([`NodeMetaMap`]). The engine compares it with the previous build's map
//!   to decide whether global work (dynamic pages, re-rendering) is needed.
//! - [`should_skip_render`] decides per node whether the renderer must run.
//!
//! Drafts stay in the store so reconciliation keeps them stable, but
//! `node_meta` leaves them out unless drafts are rendered, so they never
//! reach taxonomies, pagination or link resolution.

use crate::bundle::{BundleEntry, BundleOutput};
use crate::content::{NodeMetadata, SourceKind, publishable};
use crate::dynamic::DynamicPage;
use crate::postprocess::PageRef;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The part of a node visible to other nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetaEntry {
    pub id: String,
    pub rel_path: String,
    pub output_path: String,
    pub title: Option<String>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub template: String,
    pub frontmatter: Map<String, Value>,
}

impl NodeMetaEntry {
    fn from_metadata(id: &str, meta: &NodeMetadata) -> Self {
        Self {
            id: id.to_string(),
            rel_path: meta.rel_path.clone(),
            output_path: meta.output_path.clone(),
            title: meta.title.clone(),
            date: meta.date.clone(),
            tags: meta.tags.clone(),
            category: meta.category.clone(),
            template: meta.template.clone(),
            frontmatter: meta.frontmatter.clone(),
        }
    }
}

/// Node id → cross-node metadata, rebuilt every build.
pub type NodeMetaMap = BTreeMap<String, NodeMetaEntry>;

/// Where a node comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeSource {
    File {
        path: PathBuf,
        kind: SourceKind,
        /// Bundler identifier of the compiled source.
        output_file: String,
    },
    Synthetic(DynamicPage),
}

/// One page to be produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    pub id: String,
    pub source: NodeSource,
    /// `None` until the import phase has processed the source.
    pub metadata: Option<NodeMetadata>,
    /// Content HTML from the content pipeline, before templating.
    pub fragment: String,
    /// Whether a rendered file exists for `last_render_props`.
    pub is_rendered: bool,
    pub last_render_props: Option<Value>,
}

impl ContentNode {
    fn from_entry(entry: &BundleEntry, path: PathBuf, kind: SourceKind) -> Self {
        Self {
            id: entry.id.clone(),
            source: NodeSource::File {
                path,
                kind,
                output_file: entry.output_file.clone(),
            },
            metadata: None,
            fragment: String::new(),
            is_rendered: false,
            last_render_props: None,
        }
    }

    /// A node for a generated page. Its metadata is known up front.
    pub fn synthetic(page: DynamicPage) -> Self {
        let metadata = NodeMetadata {
            template: page.template.clone(),
            output_path: page.output_path(),
            file_name: page.slug.rsplit('/').next().unwrap_or_default().to_string(),
            ..NodeMetadata::default()
        };
        Self {
            id: page.id(),
            source: NodeSource::Synthetic(page),
            metadata: Some(metadata),
            fragment: String::new(),
            is_rendered: false,
            last_render_props: None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self.source, NodeSource::Synthetic(_))
    }

    pub fn output_file(&self) -> Option<&str> {
        match &self.source {
            NodeSource::File { output_file, .. } => Some(output_file),
            NodeSource::Synthetic(_) => None,
        }
    }

    pub fn output_path(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.output_path.as_str())
    }

    pub fn page_ref(&self) -> Option<PageRef> {
        let meta = self.metadata.as_ref()?;
        Some(PageRef {
            id: self.id.clone(),
            rel_path: meta.rel_path.clone(),
            output_path: meta.output_path.clone(),
            synthetic: self.is_synthetic(),
        })
    }
}

/// Whether the renderer can be skipped for a node.
///
/// A node that has never been rendered always renders. Otherwise it is
/// skipped when the global metadata is unchanged, or when its freshly
/// computed props equal the props of its last render.
pub fn should_skip_render(node: &ContentNode, new_props: &Value, global_unchanged: bool) -> bool {
    node.is_rendered
        && (global_unchanged || node.last_render_props.as_ref() == Some(new_props))
}

/// Counts from one [`NodeStore::reconcile`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub changed: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// All nodes plus the directories holding their artifacts.
#[derive(Debug)]
pub struct NodeStore {
    nodes: BTreeMap<String, ContentNode>,
    rendered_dir: PathBuf,
    public_dir: PathBuf,
}

/// Join a rooted output path (`/blog/a.html`) under a directory.
pub fn artifact_path(dir: &Path, output_path: &str) -> PathBuf {
    dir.join(output_path.trim_start_matches('/'))
}

impl NodeStore {
    pub fn new(rendered_dir: PathBuf, public_dir: PathBuf) -> Self {
        Self {
            nodes: BTreeMap::new(),
            rendered_dir,
            public_dir,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ContentNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ContentNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ContentNode> {
        self.nodes.values()
    }

    pub fn rendered_dir(&self) -> &Path {
        &self.rendered_dir
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Bring the store in line with the latest bundle.
    pub fn reconcile(&mut self, bundle: &BundleOutput) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let entries: Vec<&BundleEntry> = bundle.entries.iter().filter(|e| e.is_entry).collect();
        let present: BTreeSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();

        let vanished: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !n.is_synthetic() && !present.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
        for id in vanished {
            self.remove(&id);
            report.removed += 1;
        }

        for entry in entries {
            let Some(module) = bundle.module(&entry.id) else {
                warn!(node = %entry.id, "bundle entry has no compiled module");
                continue;
            };
            let existing = self
                .nodes
                .get(&entry.id)
                .and_then(|n| n.output_file().map(str::to_owned));
            match existing.as_deref() {
                Some(existing) if existing == entry.output_file => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => {
                    debug!(node = %entry.id, "source changed");
                    self.remove(&entry.id);
                    report.changed += 1;
                }
                None => report.created += 1,
            }
            self.nodes.insert(
                entry.id.clone(),
                ContentNode::from_entry(entry, module.source.clone(), module.kind),
            );
        }
        report
    }

    /// Remove a node and delete its rendered and published files.
    ///
    /// Artifact deletion is best-effort: failures are logged, never returned.
    pub fn remove(&mut self, id: &str) -> Option<ContentNode> {
        let mut node = self.nodes.remove(id)?;
        node.is_rendered = false;
        if let Some(output_path) = node.output_path() {
            for dir in [&self.rendered_dir, &self.public_dir] {
                let artifact = artifact_path(dir, output_path);
                match std::fs::remove_file(&artifact) {
                    Ok(()) => debug!(file = %artifact.display(), "removed artifact"),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(file = %artifact.display(), error = %e, "cannot remove artifact"),
                }
            }
        }
        Some(node)
    }

    /// Replace every synthetic node with `pages`.
    ///
    /// A page that existed before under the same id keeps its render state,
    /// so an identical page can still skip rendering. Pages that no longer
    /// exist are removed with their artifacts.
    pub fn replace_synthetic(&mut self, pages: Vec<DynamicPage>) {
        let mut previous: BTreeMap<String, ContentNode> = BTreeMap::new();
        let synthetic_ids: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.is_synthetic())
            .map(|n| n.id.clone())
            .collect();
        for id in synthetic_ids {
            if let Some(node) = self.nodes.remove(&id) {
                previous.insert(id, node);
            }
        }

        let mut generated = BTreeSet::new();
        for page in pages {
            let mut node = ContentNode::synthetic(page);
            if !generated.insert(node.id.clone()) {
                warn!(node = %node.id, "two generated pages share an id; keeping the first");
                continue;
            }
            if self.nodes.contains_key(&node.id) {
                warn!(node = %node.id, "generated page id collides with a content file; skipped");
                continue;
            }
            if let Some(old) = previous.remove(&node.id)
                && old.output_path() == node.output_path()
            {
                node.is_rendered = old.is_rendered;
                node.last_render_props = old.last_render_props;
            }
            self.nodes.insert(node.id.clone(), node);
        }

        for (id, node) in previous {
            self.nodes.insert(id.clone(), node);
            self.remove(&id);
        }
    }

    /// Source files still waiting for the import phase.
    pub fn pending_import(&self) -> Vec<(PathBuf, SourceKind)> {
        self.nodes
            .values()
            .filter(|n| n.metadata.is_none())
            .filter_map(|n| match &n.source {
                NodeSource::File { path, kind, .. } => Some((path.clone(), *kind)),
                NodeSource::Synthetic(_) => None,
            })
            .collect()
    }

    /// Ids of imported nodes that belong in the published site, synthetic
    /// nodes included.
    pub fn publishable_ids(&self, render_drafts: bool) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| {
                n.metadata
                    .as_ref()
                    .is_some_and(|m| publishable(m, render_drafts))
            })
            .map(|n| n.id.clone())
            .collect()
    }

    /// Cross-node metadata of every imported, publishable source node.
    pub fn node_meta(&self, render_drafts: bool) -> NodeMetaMap {
        self.nodes
            .values()
            .filter(|n| !n.is_synthetic())
            .filter_map(|n| {
                let meta = n.metadata.as_ref()?;
                publishable(meta, render_drafts)
                    .then(|| (n.id.clone(), NodeMetaEntry::from_metadata(&n.id, meta)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::CompiledModule;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn bundle(entries: &[(&str, &str)]) -> BundleOutput {
        let mut output = BundleOutput::default();
        for (id, file) in entries {
            output.entries.push(BundleEntry {
                id: id.to_string(),
                output_file: file.to_string(),
                is_entry: true,
            });
            output.modules.insert(
                id.to_string(),
                CompiledModule {
                    source: PathBuf::from(id),
                    kind: SourceKind::Markdown,
                },
            );
        }
        output
    }

    fn imported(store: &mut NodeStore, id: &str, output_path: &str, draft: bool) {
        let node = store.get_mut(id).unwrap();
        node.metadata = Some(NodeMetadata {
            rel_path: id.trim_start_matches("/c/").to_string(),
            output_path: output_path.into(),
            title: Some(id.into()),
            draft,
            ..NodeMetadata::default()
        });
    }

    fn store(tmp: &TempDir) -> NodeStore {
        NodeStore::new(tmp.path().join("rendered"), tmp.path().join("public"))
    }

    #[test]
    fn reconcile_creates_keeps_changes_and_removes() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);

        let report = store.reconcile(&bundle(&[("/c/a.md", "a-1"), ("/c/b.md", "b-1")]));
        assert_eq!(report.created, 2);
        imported(&mut store, "/c/a.md", "/a.html", false);
        imported(&mut store, "/c/b.md", "/b.html", false);
        store.get_mut("/c/a.md").unwrap().is_rendered = true;

        let report = store.reconcile(&bundle(&[("/c/a.md", "a-1"), ("/c/b.md", "b-2"), ("/c/c.md", "c-1")]));
        assert_eq!(
            report,
            ReconcileReport {
                created: 1,
                changed: 1,
                removed: 0,
                unchanged: 1
            }
        );
        assert!(store.get("/c/a.md").unwrap().is_rendered);
        assert!(store.get("/c/b.md").unwrap().metadata.is_none());

        let report = store.reconcile(&bundle(&[("/c/c.md", "c-1")]));
        assert_eq!(report.removed, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn removal_deletes_artifacts_best_effort() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.reconcile(&bundle(&[("/c/a.md", "a-1")]));
        imported(&mut store, "/c/a.md", "/blog/a.html", false);

        let rendered = tmp.path().join("rendered/blog/a.html");
        fs::create_dir_all(rendered.parent().unwrap()).unwrap();
        fs::write(&rendered, "x").unwrap();

        let removed = store.remove("/c/a.md").unwrap();
        assert!(!removed.is_rendered);
        assert!(!rendered.exists());
        assert!(store.remove("/c/a.md").is_none());
    }

    #[test]
    fn pending_import_lists_unprocessed_files() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.reconcile(&bundle(&[("/c/a.md", "a-1"), ("/c/b.md", "b-1")]));
        imported(&mut store, "/c/a.md", "/a.html", false);

        let pending = store.pending_import();
        assert_eq!(pending, vec![(PathBuf::from("/c/b.md"), SourceKind::Markdown)]);
    }

    #[test]
    fn node_meta_excludes_drafts_unless_rendering_them() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.reconcile(&bundle(&[("/c/a.md", "a-1"), ("/c/draft.md", "d-1")]));
        imported(&mut store, "/c/a.md", "/a.html", false);
        imported(&mut store, "/c/draft.md", "/draft.html", true);

        let meta = store.node_meta(false);
        assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["/c/a.md"]);
        assert_eq!(store.publishable_ids(false), vec!["/c/a.md"]);

        assert_eq!(store.node_meta(true).len(), 2);
        assert_eq!(store.publishable_ids(true).len(), 2);
    }

    #[test]
    fn node_meta_is_structurally_comparable() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.reconcile(&bundle(&[("/c/a.md", "a-1")]));
        imported(&mut store, "/c/a.md", "/a.html", false);

        let before = store.node_meta(false);
        assert_eq!(before, store.node_meta(false));

        store.get_mut("/c/a.md").unwrap().metadata.as_mut().unwrap().title = Some("New".into());
        assert_ne!(before, store.node_meta(false));
    }

    #[test]
    fn synthetic_nodes_replace_and_keep_render_state() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        let page = |slug: &str| DynamicPage::new(slug, "Feed", Map::new());

        store.replace_synthetic(vec![page("blog/index"), page("blog/page-2")]);
        assert_eq!(store.len(), 2);
        store.get_mut("blog/index.dynamic").unwrap().is_rendered = true;

        store.replace_synthetic(vec![page("blog/index")]);
        assert_eq!(store.len(), 1);
        let kept = store.get("blog/index.dynamic").unwrap();
        assert!(kept.is_synthetic());
        assert!(kept.is_rendered);
        assert_eq!(kept.output_path(), Some("/blog/index.html"));
        assert!(store.node_meta(false).is_empty());
        assert_eq!(store.publishable_ids(false), vec!["blog/index.dynamic"]);
    }

    #[test]
    fn duplicate_generated_ids_keep_the_first_page() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.replace_synthetic(vec![
            DynamicPage::new("blog/tags/c", "Term", Map::from_iter([("term".into(), json!("c#"))])),
            DynamicPage::new("blog/tags/c", "Term", Map::from_iter([("term".into(), json!("c"))])),
        ]);

        assert_eq!(store.len(), 1);
        let NodeSource::Synthetic(page) = &store.get("blog/tags/c.dynamic").unwrap().source else {
            panic!("expected a generated page");
        };
        assert_eq!(page.props["term"], json!("c#"));
    }

    #[test]
    fn reconcile_leaves_synthetic_nodes_alone() {
        let tmp = TempDir::new().unwrap();
        let mut store = store(&tmp);
        store.replace_synthetic(vec![DynamicPage::new("feed", "Feed", Map::new())]);
        let report = store.reconcile(&bundle(&[("/c/a.md", "a-1")]));
        assert_eq!(report.removed, 0);
        assert_eq!(store.len(), 2);
    }

    // =========================================================================
    // should_skip_render
    // =========================================================================

    #[test]
    fn never_rendered_nodes_render() {
        let tmp = TempDir::new().unwrap();
        let mut s = store(&tmp);
        s.replace_synthetic(vec![DynamicPage::new("x", "T", Map::new())]);
        let node = s.get("x.dynamic").unwrap();
        assert!(!should_skip_render(node, &json!({}), true));
    }

    #[test]
    fn skip_when_global_unchanged_or_props_equal() {
        let tmp = TempDir::new().unwrap();
        let mut s = store(&tmp);
        s.replace_synthetic(vec![DynamicPage::new("x", "T", Map::new())]);
        let node = s.get_mut("x.dynamic").unwrap();
        node.is_rendered = true;
        node.last_render_props = Some(json!({"a": 1}));
        let node = s.get("x.dynamic").unwrap();

        assert!(should_skip_render(node, &json!({"a": 2}), true));
        assert!(should_skip_render(node, &json!({"a": 1}), false));
        assert!(!should_skip_render(node, &json!({"a": 2}), false));
    }
}
