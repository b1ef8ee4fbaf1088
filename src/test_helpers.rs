//! Shared test utilities for the quarry test suite.
//!
//! Builders for canonical documents and body nodes, plus an on-disk project
//! fixture for tests that go through scanning.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let post = with_body(page("content/blog/post", "Post"), vec![
//!     md("# Hello"),
//!     comp("card"),
//!     include("../shared/footer"),
//! ]);
//! let docs = doc_map(vec![post, component("card", &["title"], vec![])]);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use crate::document::{
    CanonicalDocument, ComponentManifest, DocumentKind, Metadata, Node, Provenance,
};

// =========================================================================
// Documents
// =========================================================================

pub fn document(id: &str, kind: DocumentKind) -> CanonicalDocument {
    let root = id.split('/').next().unwrap_or_default().to_string();
    CanonicalDocument {
        id: id.to_string(),
        kind,
        provenance: Provenance {
            origin: format!("{id}.json"),
            root,
        },
        meta: Metadata::default(),
        manifest: ComponentManifest::default(),
        body: Vec::new(),
    }
}

pub fn page(id: &str, title: &str) -> CanonicalDocument {
    let mut doc = document(id, DocumentKind::Page);
    doc.meta.title = Some(title.to_string());
    doc
}

pub fn partial(id: &str, body: Vec<Node>) -> CanonicalDocument {
    with_body(document(id, DocumentKind::Partial), body)
}

pub fn layout(name: &str, body: Vec<Node>) -> CanonicalDocument {
    with_body(document(&format!("layouts/{name}"), DocumentKind::Layout), body)
}

pub fn component(name: &str, required_props: &[&str], body: Vec<Node>) -> CanonicalDocument {
    let mut doc = with_body(
        document(&format!("components/{name}"), DocumentKind::Component),
        body,
    );
    doc.manifest.required_props = required_props.iter().map(|p| p.to_string()).collect();
    doc
}

pub fn with_body(mut doc: CanonicalDocument, body: Vec<Node>) -> CanonicalDocument {
    doc.body = body;
    doc
}

pub fn doc_map(docs: Vec<CanonicalDocument>) -> BTreeMap<String, CanonicalDocument> {
    docs.into_iter().map(|d| (d.id.clone(), d)).collect()
}

// =========================================================================
// Nodes
// =========================================================================

pub fn text(value: &str) -> Node {
    Node::Text {
        value: value.to_string(),
    }
}

pub fn md(source: &str) -> Node {
    Node::Markdown {
        source: source.to_string(),
    }
}

pub fn el(tag: &str, children: Vec<Node>) -> Node {
    el_attrs(tag, &[], children)
}

pub fn el_attrs(tag: &str, attrs: &[(&str, &str)], children: Vec<Node>) -> Node {
    Node::Element {
        tag: tag.to_string(),
        attrs: attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children,
    }
}

pub fn comp(name: &str) -> Node {
    comp_props(name, &[])
}

pub fn comp_props(name: &str, props: &[(&str, serde_json::Value)]) -> Node {
    Node::Component {
        name: name.to_string(),
        props: props
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        behavior: None,
        children: Vec::new(),
    }
}

pub fn island(name: &str, behavior: &str) -> Node {
    Node::Component {
        name: name.to_string(),
        props: BTreeMap::new(),
        behavior: Some(behavior.to_string()),
        children: Vec::new(),
    }
}

pub fn prop(name: &str) -> Node {
    Node::Prop {
        name: name.to_string(),
    }
}

pub fn include(source: &str) -> Node {
    Node::Include {
        source: source.to_string(),
    }
}

pub fn asset(path: &str) -> Node {
    Node::Asset {
        path: path.to_string(),
        alt: String::new(),
    }
}

pub fn script(src: &str) -> Node {
    Node::Script {
        src: Some(src.to_string()),
        inline: None,
    }
}

pub fn inline_script(code: &str) -> Node {
    Node::Script {
        src: None,
        inline: Some(code.to_string()),
    }
}

pub fn style(href: &str) -> Node {
    Node::Style {
        href: Some(href.to_string()),
        inline: None,
    }
}

pub fn slot() -> Node {
    Node::Slot
}

// =========================================================================
// On-disk projects
// =========================================================================

/// Write `documents` as JSON under their namespace directories, plus theme
/// and public files, into a fresh temp directory.
pub fn write_project(
    documents: &[CanonicalDocument],
    theme: &[(&str, &str)],
    public: &[(&str, &[u8])],
) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for doc in documents {
        write_document(tmp.path(), doc);
    }
    for (name, css) in theme {
        write_file(&tmp.path().join("theme").join(name), css.as_bytes());
    }
    for (rel, bytes) in public {
        write_file(&tmp.path().join("public").join(rel), bytes);
    }
    tmp
}

pub fn write_document(root: &Path, doc: &CanonicalDocument) {
    let path = root.join(format!("{}.json", doc.id));
    write_file(&path, &serde_json::to_vec_pretty(doc).unwrap());
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}
