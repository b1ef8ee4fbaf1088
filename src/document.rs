//! Canonical document model.
//!
//! Documents arrive already parsed: an external front-end turns whatever source
//! syntax authors write into this JSON shape. The engine never mutates a
//! document after the graph is built; only pre-parse hooks holding the
//! `write:documents` capability can replace one before that point.
//!
//! ```json
//! {
//!   "id": "content/blog/hello",
//!   "kind": "page",
//!   "provenance": { "origin": "content/blog/hello.json", "root": "content" },
//!   "meta": { "title": "Hello", "layout": "base", "tags": ["intro"] },
//!   "body": [
//!     { "kind": "markdown", "source": "# Hello" },
//!     { "kind": "component", "name": "gallery", "props": { "columns": 3 } },
//!     { "kind": "asset", "path": "/images/cat.jpg", "alt": "A cat" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Page,
    Partial,
    Component,
    Layout,
}

/// Where a document came from. `root` is the namespace directory that
/// include paths are sandboxed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub origin: String,
    pub root: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Published,
    Draft,
}

/// A source a document owner declares it needs beyond the site policy,
/// e.g. `{ "directive": "script-src", "source": "https://maps.example.com" }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyException {
    pub directive: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub date: Option<String>,
    pub updated: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub status: Status,
    pub locale: Option<String>,
    pub translation_key: Option<String>,
    pub layout: Option<String>,
    pub aliases: Vec<String>,
    /// Render targets for this page; empty means the site default.
    pub targets: Vec<String>,
    pub robots: Option<String>,
    pub author: Option<String>,
    pub csp: Vec<PolicyException>,
}

impl Metadata {
    /// Look up a scalar field by its JSON name. Used by the required-field
    /// and length rules, which are configured by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => self.title.as_deref(),
            "description" => self.description.as_deref(),
            "slug" => self.slug.as_deref(),
            "date" => self.date.as_deref(),
            "updated" => self.updated.as_deref(),
            "locale" => self.locale.as_deref(),
            "translationKey" => self.translation_key.as_deref(),
            "layout" => self.layout.as_deref(),
            "robots" => self.robots.as_deref(),
            "author" => self.author.as_deref(),
            _ => None,
        }
    }

    /// Array-valued fields count as present when non-empty.
    pub fn has_field(&self, name: &str) -> bool {
        match name {
            "tags" => !self.tags.is_empty(),
            "categories" => !self.categories.is_empty(),
            "aliases" => !self.aliases.is_empty(),
            _ => self.field(name).is_some_and(|v| !v.trim().is_empty()),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == Status::Draft
    }
}

/// Contract a component publishes for its instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentManifest {
    pub required_props: Vec<String>,
    pub behaviors: Vec<String>,
    pub csp: Vec<PolicyException>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Node {
    Element {
        tag: String,
        #[serde(default)]
        attrs: BTreeMap<String, String>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Text {
        value: String,
    },
    Markdown {
        source: String,
    },
    /// Substituted with the value of a component prop at render time.
    Prop {
        name: String,
    },
    Component {
        name: String,
        #[serde(default)]
        props: BTreeMap<String, serde_json::Value>,
        /// Interactive behavior; renders as an island.
        #[serde(default)]
        behavior: Option<String>,
        #[serde(default)]
        children: Vec<Node>,
    },
    Include {
        source: String,
    },
    Asset {
        path: String,
        #[serde(default)]
        alt: String,
    },
    Script {
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        inline: Option<String>,
    },
    Style {
        #[serde(default)]
        href: Option<String>,
        #[serde(default)]
        inline: Option<String>,
    },
    /// Where a layout or component places the content it wraps.
    Slot,
}

impl Node {
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Element { children, .. } | Node::Component { children, .. } => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    /// Assigned from the file location when loaded from disk.
    #[serde(default)]
    pub id: String,
    pub kind: DocumentKind,
    #[serde(default)]
    pub provenance: Provenance,
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub manifest: ComponentManifest,
    #[serde(default)]
    pub body: Vec<Node>,
}

/// What a reference points at. Mirrors the dependency edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Layout,
    Component,
    Include,
    Asset,
}

/// One outgoing reference found in a document, with the structural path of
/// the node that made it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub target: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    Page,
    Partial,
    Component,
    AssetReference,
}

/// An addressable subtree: the document itself, or a node inside it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ContentNode {
    pub id: String,
    pub kind: ContentKind,
}

impl CanonicalDocument {
    /// Depth-first walk over the body, passing each node with its structural
    /// path (`body.0.children.2`).
    pub fn walk<F: FnMut(&str, &Node)>(&self, mut visit: F) {
        let mut stack: Vec<(String, &Node)> = self
            .body
            .iter()
            .enumerate()
            .rev()
            .map(|(i, n)| (format!("body.{i}"), n))
            .collect();
        while let Some((path, node)) = stack.pop() {
            visit(&path, node);
            for (i, child) in node.children().iter().enumerate().rev() {
                stack.push((format!("{path}.children.{i}"), child));
            }
        }
    }

    /// Every outgoing reference, in document order. Only local asset paths
    /// (those starting with `/`) count as asset references.
    pub fn references(&self) -> Vec<Reference> {
        let mut refs = Vec::new();
        if let Some(layout) = &self.meta.layout {
            refs.push(Reference {
                kind: ReferenceKind::Layout,
                target: layout.clone(),
                path: "meta.layout".to_string(),
            });
        }
        self.walk(|path, node| {
            let (kind, target) = match node {
                Node::Component { name, .. } => (ReferenceKind::Component, Some(name)),
                Node::Include { source } => (ReferenceKind::Include, Some(source)),
                Node::Asset { path, .. } => (ReferenceKind::Asset, Some(path)),
                Node::Script { src, .. } => (ReferenceKind::Asset, src.as_ref()),
                Node::Style { href, .. } => (ReferenceKind::Asset, href.as_ref()),
                _ => return,
            };
            let Some(target) = target else { return };
            if kind == ReferenceKind::Asset && !is_local_path(target) {
                return;
            }
            refs.push(Reference {
                kind,
                target: target.clone(),
                path: path.to_string(),
            });
        });
        refs
    }

    /// The document itself plus every asset reference inside it.
    pub fn content_nodes(&self) -> Vec<ContentNode> {
        let kind = match self.kind {
            DocumentKind::Page | DocumentKind::Layout => ContentKind::Page,
            DocumentKind::Partial => ContentKind::Partial,
            DocumentKind::Component => ContentKind::Component,
        };
        let mut nodes = vec![ContentNode {
            id: self.id.clone(),
            kind,
        }];
        for reference in self.references() {
            if reference.kind == ReferenceKind::Asset {
                nodes.push(ContentNode {
                    id: format!("{}#{}", self.id, reference.path),
                    kind: ContentKind::AssetReference,
                });
            }
        }
        nodes
    }

    /// Hex SHA-256 of the canonical JSON encoding. Maps are ordered, so two
    /// equal documents always hash the same.
    pub fn content_hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    /// Directory part of the id, used to resolve relative includes.
    pub fn directory(&self) -> &str {
        match self.id.rfind('/') {
            Some(pos) => &self.id[..pos],
            None => "",
        }
    }
}

pub fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}
