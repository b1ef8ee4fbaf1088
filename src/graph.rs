//! Dependency graph builder.
//!
//! Turns the document set into a [`BuildGraph`]: a petgraph arena of document
//! and asset nodes, with edges pointing from a dependent to what it depends
//! on (`page → layout`, `page → component`, `page → included partial`,
//! `page → /img/cat.jpg`). Alongside the graph it derives the route table
//! and the flattened redirect list.
//!
//! ## What is fatal
//!
//! Two conditions cancel the pass before anything renders: two pages
//! claiming the same route (G001) and any dependency cycle (G002). Everything
//! else is reported per document and blocks only the affected routes:
//!
//! | Code | Condition |
//! |------|-----------|
//! | G003 | route segment reserved or not URL-safe (route dropped) |
//! | G004 | alias collides with a route or another alias (alias dropped) |
//! | G005 | redirect loop (loop dropped) |
//! | G006 | reference to a missing document or asset |
//! | G007 | include escapes its provenance root |
//! | G008 | include chain deeper than [`MAX_INCLUDE_DEPTH`] |
//!
//! ## Ordering
//!
//! Cycle detection is an iterative DFS that reports each back edge with its
//! full chain, rotated so the smallest id leads; the same cycle found from a
//! different entry point yields the same message. The topological order is
//! Kahn's algorithm with a min-heap on node key, so equal-rank nodes come out
//! lexicographically and the order never depends on insertion.

use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location, canonicalize};
use crate::document::{CanonicalDocument, DocumentKind, ReferenceKind};
use crate::naming;
use crate::types::{Alternate, Redirect, Route};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

pub const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphNode {
    Document(String),
    /// Public asset, keyed by its URL path (`/img/cat.jpg`).
    Asset(String),
}

impl GraphNode {
    pub fn key(&self) -> &str {
        match self {
            GraphNode::Document(id) | GraphNode::Asset(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Import,
    Layout,
    Component,
    Asset,
}

#[derive(Debug, Clone)]
pub struct BuildGraph {
    graph: DiGraph<GraphNode, EdgeKind>,
    index: BTreeMap<String, NodeIndex>,
    routes: Vec<Route>,
    redirects: Vec<Redirect>,
    order: Vec<NodeIndex>,
}

/// A graph with no fatal conditions, plus its non-fatal diagnostics.
#[derive(Debug)]
pub struct GraphOutcome {
    pub graph: BuildGraph,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildGraph {
    /// Routes sorted by path.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Redirects sorted by source path, each pointing at its final target.
    pub fn redirects(&self) -> &[Redirect] {
        &self.redirects
    }

    pub fn route(&self, path: &str) -> Option<&Route> {
        self.routes
            .binary_search_by(|r| r.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.routes[i])
    }

    /// Node keys in topological order, dependencies first.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&n| self.graph[n].key()).collect()
    }

    /// Routes in render dispatch order: by topological position of their
    /// source document.
    pub fn routes_in_order(&self) -> Vec<&Route> {
        let position: BTreeMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &n)| (self.graph[n].key(), i))
            .collect();
        let mut routes: Vec<&Route> = self.routes.iter().collect();
        routes.sort_by_key(|r| (position.get(r.source.as_str()).copied(), r.path.clone()));
        routes
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    fn sorted_neighbors(&self, node: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(node, direction).collect();
        neighbors.sort_by(|a, b| self.graph[*a].key().cmp(self.graph[*b].key()));
        neighbors.dedup();
        neighbors
    }

    /// Direct dependencies of a node, sorted by key.
    pub fn dependencies_of(&self, key: &str) -> Vec<&GraphNode> {
        match self.index.get(key) {
            Some(&n) => self
                .sorted_neighbors(n, Direction::Outgoing)
                .into_iter()
                .map(|d| &self.graph[d])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every node reachable from `key` along dependency edges, excluding `key`.
    pub fn transitive_dependencies(&self, key: &str) -> BTreeSet<&GraphNode> {
        self.closure(std::iter::once(key), Direction::Outgoing)
            .into_iter()
            .filter(|n| n.key() != key)
            .collect()
    }

    /// The given keys plus every node that depends on any of them,
    /// transitively. Unknown keys are kept as-is.
    pub fn dependents_closure<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
        let keys: Vec<&str> = keys.into_iter().collect();
        let mut out: BTreeSet<String> = keys.iter().map(|k| k.to_string()).collect();
        out.extend(
            self.closure(keys.iter().copied(), Direction::Incoming)
                .into_iter()
                .map(|n| n.key().to_string()),
        );
        out
    }

    fn closure<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
        direction: Direction,
    ) -> BTreeSet<&GraphNode> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<NodeIndex> = keys
            .into_iter()
            .filter_map(|k| self.index.get(k).copied())
            .collect();
        while let Some(n) = stack.pop() {
            if seen.insert(n) {
                stack.extend(self.graph.neighbors_directed(n, direction));
            }
        }
        seen.into_iter().map(|n| &self.graph[n]).collect()
    }

    /// Route paths whose source document is in the dependents closure of
    /// `changed`.
    pub fn dirty_routes(&self, changed: &BTreeSet<String>) -> BTreeSet<String> {
        let closure = self.dependents_closure(changed.iter().map(String::as_str));
        self.routes
            .iter()
            .filter(|r| closure.contains(&r.source))
            .map(|r| r.path.clone())
            .collect()
    }

    /// Iterative DFS over dependency edges. Each back edge yields the cycle
    /// as a chain of keys rotated so the smallest leads.
    fn find_cycles(&self) -> BTreeSet<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut marks = vec![Mark::Unvisited; self.graph.node_count()];
        let mut cycles = BTreeSet::new();

        for &start in self.index.values() {
            if marks[start.index()] != Mark::Unvisited {
                continue;
            }
            marks[start.index()] = Mark::OnStack;
            let mut stack = vec![(start, self.sorted_neighbors(start, Direction::Outgoing), 0usize)];

            while !stack.is_empty() {
                let next_child = {
                    let Some((_, children, cursor)) = stack.last_mut() else {
                        break;
                    };
                    let child = children.get(*cursor).copied();
                    *cursor += 1;
                    child
                };
                let Some(child) = next_child else {
                    if let Some((done, _, _)) = stack.pop() {
                        marks[done.index()] = Mark::Done;
                    }
                    continue;
                };
                match marks[child.index()] {
                    Mark::Unvisited => {
                        marks[child.index()] = Mark::OnStack;
                        stack.push((child, self.sorted_neighbors(child, Direction::Outgoing), 0));
                    }
                    Mark::OnStack => {
                        if let Some(pos) = stack.iter().position(|(n, _, _)| *n == child) {
                            let mut chain: Vec<String> = stack[pos..]
                                .iter()
                                .map(|(n, _, _)| self.graph[*n].key().to_string())
                                .collect();
                            if let Some(min) = chain
                                .iter()
                                .enumerate()
                                .min_by(|a, b| a.1.cmp(b.1))
                                .map(|(i, _)| i)
                            {
                                chain.rotate_left(min);
                            }
                            cycles.insert(chain);
                        }
                    }
                    Mark::Done => {}
                }
            }
        }
        cycles
    }

    /// Kahn's algorithm, dependencies first, min-heap on key.
    fn topological_order(&self) -> Vec<NodeIndex> {
        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.sorted_neighbors(n, Direction::Outgoing).len())
            .collect();
        let mut ready: BinaryHeap<Reverse<(String, NodeIndex)>> = self
            .graph
            .node_indices()
            .filter(|n| remaining[n.index()] == 0)
            .map(|n| Reverse((self.graph[n].key().to_string(), n)))
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, n))) = ready.pop() {
            order.push(n);
            for dependent in self.sorted_neighbors(n, Direction::Incoming) {
                remaining[dependent.index()] -= 1;
                if remaining[dependent.index()] == 0 {
                    ready.push(Reverse((self.graph[dependent].key().to_string(), dependent)));
                }
            }
        }
        order
    }
}

/// Resolve an include path against the including document's directory,
/// confined to its provenance root. `None` means the path escapes the root.
pub fn resolve_include(doc: &CanonicalDocument, source: &str) -> Option<String> {
    let root = if doc.provenance.root.is_empty() {
        doc.id.split('/').next().unwrap_or_default().to_string()
    } else {
        doc.provenance.root.trim_matches('/').to_string()
    };
    let root_depth = root.split('/').filter(|s| !s.is_empty()).count();

    let mut segments: Vec<&str> = if source.starts_with('/') {
        root.split('/').filter(|s| !s.is_empty()).collect()
    } else {
        doc.directory().split('/').filter(|s| !s.is_empty()).collect()
    };
    if !segments.starts_with(&root.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>()) {
        return None;
    }
    for seg in source.trim_end_matches(".json").split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if segments.len() <= root_depth {
                    return None;
                }
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    if segments.len() <= root_depth {
        return None;
    }
    Some(segments.join("/"))
}

/// Page id below its namespace: `content/blog/hello` → `blog/hello`.
fn relative_id(doc: &CanonicalDocument) -> &str {
    doc.id.split_once('/').map(|(_, rest)| rest).unwrap_or(&doc.id)
}

struct Builder<'a> {
    documents: &'a BTreeMap<String, CanonicalDocument>,
    graph: DiGraph<GraphNode, EdgeKind>,
    index: BTreeMap<String, NodeIndex>,
    edges: BTreeSet<(String, String, EdgeKind)>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Builder<'a> {
    fn node(&mut self, node: GraphNode) -> NodeIndex {
        let key = node.key().to_string();
        if let Some(&n) = self.index.get(&key) {
            return n;
        }
        let n = self.graph.add_node(node);
        self.index.insert(key, n);
        n
    }

    fn edge(&mut self, from: &str, to: GraphNode, kind: EdgeKind) {
        if self.edges.insert((from.to_string(), to.key().to_string(), kind)) {
            let a = self.node(GraphNode::Document(from.to_string()));
            let b = self.node(to);
            self.graph.add_edge(a, b, kind);
        }
    }

    fn unresolved(&mut self, doc: &CanonicalDocument, path: &str, message: String) {
        self.diagnostics.push(Diagnostic::error(
            Code::UnresolvedReference,
            Location::at(&doc.id, path),
            message,
        ));
    }

    fn expect_kind(&mut self, doc: &CanonicalDocument, path: &str, target: &str, kind: DocumentKind) -> bool {
        match self.documents.get(target) {
            Some(found) if found.kind == kind => true,
            Some(found) => {
                self.unresolved(
                    doc,
                    path,
                    format!("'{target}' is a {:?}, expected a {kind:?}", found.kind),
                );
                false
            }
            None => {
                self.unresolved(doc, path, format!("'{target}' does not exist"));
                false
            }
        }
    }

    fn add_references(&mut self, doc: &CanonicalDocument, asset_paths: &BTreeSet<String>) {
        for reference in doc.references() {
            let path = reference.path.as_str();
            match reference.kind {
                ReferenceKind::Layout => {
                    let target = format!("layouts/{}", reference.target);
                    if self.expect_kind(doc, path, &target, DocumentKind::Layout) {
                        self.edge(&doc.id, GraphNode::Document(target), EdgeKind::Layout);
                    }
                }
                ReferenceKind::Component => {
                    let target = format!("components/{}", reference.target);
                    if self.expect_kind(doc, path, &target, DocumentKind::Component) {
                        self.edge(&doc.id, GraphNode::Document(target), EdgeKind::Component);
                    }
                }
                ReferenceKind::Include => match resolve_include(doc, &reference.target) {
                    None => self.diagnostics.push(Diagnostic::error(
                        Code::ImportEscapesRoot,
                        Location::at(&doc.id, path),
                        format!(
                            "include '{}' escapes the document root '{}'",
                            reference.target, doc.provenance.root
                        ),
                    )),
                    Some(target) if self.documents.contains_key(&target) => {
                        self.edge(&doc.id, GraphNode::Document(target), EdgeKind::Import);
                    }
                    Some(target) => {
                        self.unresolved(doc, path, format!("included document '{target}' does not exist"));
                    }
                },
                ReferenceKind::Asset => {
                    let target = reference.target.split(['?', '#']).next().unwrap_or_default();
                    if asset_paths.contains(target) {
                        self.edge(&doc.id, GraphNode::Asset(target.to_string()), EdgeKind::Asset);
                    } else {
                        self.unresolved(doc, path, format!("asset '{target}' does not exist"));
                    }
                }
            }
        }
    }
}

/// Build the dependency graph, route table and redirect list.
///
/// Returns `Err` with every diagnostic found (not only the fatal ones) when
/// a fatal condition is present.
pub fn build_graph(
    documents: &BTreeMap<String, CanonicalDocument>,
    config: &SiteConfig,
    asset_paths: &BTreeSet<String>,
) -> Result<GraphOutcome, Vec<Diagnostic>> {
    let mut builder = Builder {
        documents,
        graph: DiGraph::new(),
        index: BTreeMap::new(),
        edges: BTreeSet::new(),
        diagnostics: Vec::new(),
    };

    for id in documents.keys() {
        builder.node(GraphNode::Document(id.clone()));
    }
    for doc in documents.values() {
        builder.add_references(doc, asset_paths);
    }

    let routes = derive_routes(documents, config, &mut builder.diagnostics);
    let redirects = derive_redirects(documents, config, &routes, &mut builder.diagnostics);

    let Builder {
        graph,
        index,
        mut diagnostics,
        ..
    } = builder;
    let mut built = BuildGraph {
        graph,
        index,
        routes,
        redirects,
        order: Vec::new(),
    };

    let cycles = built.find_cycles();
    for chain in &cycles {
        let mut path = chain.clone();
        path.push(chain[0].clone());
        diagnostics.push(Diagnostic::error(
            Code::ImportCycle,
            Location::source(&chain[0]),
            format!("dependency cycle: {}", path.join(" -> ")),
        ));
    }

    if cycles.is_empty() {
        built.order = built.topological_order();
        check_include_depth(&built, documents, &mut diagnostics);
    }

    canonicalize(&mut diagnostics);
    if diagnostics.iter().any(|d| d.code.is_fatal()) {
        return Err(diagnostics);
    }
    Ok(GraphOutcome {
        graph: built,
        diagnostics,
    })
}

/// Include depth per document, computed dependencies-first over the
/// topological order. Reported on pages only.
fn check_include_depth(
    graph: &BuildGraph,
    documents: &BTreeMap<String, CanonicalDocument>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut depth: Vec<usize> = vec![0; graph.graph.node_count()];
    for &n in &graph.order {
        let deepest = graph
            .graph
            .edges_directed(n, Direction::Outgoing)
            .filter(|e| *e.weight() == EdgeKind::Import)
            .map(|e| depth[e.target().index()] + 1)
            .max()
            .unwrap_or(0);
        depth[n.index()] = deepest;
    }
    for (id, &n) in &graph.index {
        let is_page = documents.get(id).is_some_and(|d| d.kind == DocumentKind::Page);
        if is_page && depth[n.index()] > MAX_INCLUDE_DEPTH {
            diagnostics.push(Diagnostic::error(
                Code::ImportTooDeep,
                Location::source(id),
                format!(
                    "include chain is {} levels deep (limit {MAX_INCLUDE_DEPTH})",
                    depth[n.index()]
                ),
            ));
        }
    }
}

fn derive_routes(
    documents: &BTreeMap<String, CanonicalDocument>,
    config: &SiteConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Route> {
    let default_locale = &config.site.default_locale;
    let mut by_path: BTreeMap<String, Route> = BTreeMap::new();
    let mut translations: BTreeMap<&str, Vec<(String, String)>> = BTreeMap::new();

    for doc in documents.values() {
        if doc.kind != DocumentKind::Page || doc.meta.is_draft() {
            continue;
        }
        let locale = doc.meta.locale.clone().unwrap_or_else(|| default_locale.clone());
        let path = match naming::route_path(
            relative_id(doc),
            doc.meta.slug.as_deref(),
            &locale,
            default_locale,
        ) {
            Ok(path) => path,
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    Code::UnsafeRoute,
                    Location::at(&doc.id, if doc.meta.slug.is_some() { "meta.slug" } else { "id" }),
                    format!("route segment '{}' rejected: {}", e.segment, e.reason),
                ));
                continue;
            }
        };
        if let Some(existing) = by_path.get(&path) {
            diagnostics.push(Diagnostic::error(
                Code::DuplicateRoute,
                Location::source(&doc.id),
                format!("route '{path}' is already produced by '{}'", existing.source),
            ));
            continue;
        }
        if let Some(key) = &doc.meta.translation_key {
            translations
                .entry(key.as_str())
                .or_default()
                .push((locale.clone(), path.clone()));
        }
        let targets = if doc.meta.targets.is_empty() {
            config.render.targets.clone()
        } else {
            doc.meta.targets.clone()
        };
        by_path.insert(
            path.clone(),
            Route {
                path,
                source: doc.id.clone(),
                locale,
                targets,
                alternates: Vec::new(),
            },
        );
    }

    for variants in translations.values() {
        for (locale, path) in variants {
            let mut alternates: Vec<Alternate> = variants
                .iter()
                .filter(|(l, _)| l != locale)
                .map(|(l, p)| Alternate {
                    locale: l.clone(),
                    path: p.clone(),
                })
                .collect();
            alternates.sort();
            if let Some(route) = by_path.get_mut(path) {
                route.alternates = alternates;
            }
        }
    }

    by_path.into_values().collect()
}

fn derive_redirects(
    documents: &BTreeMap<String, CanonicalDocument>,
    config: &SiteConfig,
    routes: &[Route],
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Redirect> {
    let route_paths: BTreeSet<&str> = routes.iter().map(|r| r.path.as_str()).collect();
    let route_of: BTreeMap<&str, &str> = routes
        .iter()
        .map(|r| (r.source.as_str(), r.path.as_str()))
        .collect();

    // alias → (target, declaring source)
    let mut candidates: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for doc in documents.values() {
        let Some(&target) = route_of.get(doc.id.as_str()) else {
            continue;
        };
        for alias in &doc.meta.aliases {
            candidates
                .entry(naming::normalize_url_path(alias))
                .or_default()
                .push((target.to_string(), doc.id.clone()));
        }
    }
    for (from, to) in &config.routes.redirects {
        candidates
            .entry(naming::normalize_url_path(from))
            .or_default()
            .push((naming::normalize_url_path(to), "routes.redirects".to_string()));
    }

    let mut aliases: BTreeMap<String, String> = BTreeMap::new();
    for (from, mut targets) in candidates {
        targets.sort();
        targets.dedup_by(|a, b| a.0 == b.0);
        if route_paths.contains(from.as_str()) {
            for (_, source) in &targets {
                diagnostics.push(Diagnostic::warning(
                    Code::AliasCollision,
                    Location::at(source, "meta.aliases"),
                    format!("alias '{from}' collides with an existing route; dropped"),
                ));
            }
            continue;
        }
        if targets.len() > 1 {
            let names: Vec<&str> = targets.iter().map(|(t, _)| t.as_str()).collect();
            for (_, source) in &targets {
                diagnostics.push(Diagnostic::warning(
                    Code::AliasCollision,
                    Location::at(source, "meta.aliases"),
                    format!("alias '{from}' points at several targets ({}); dropped", names.join(", ")),
                ));
            }
            continue;
        }
        if let Some((to, _)) = targets.into_iter().next() {
            aliases.insert(from, to);
        }
    }

    let mut redirects = Vec::new();
    for (from, to) in &aliases {
        let mut seen = BTreeSet::from([from.as_str()]);
        let mut target = to.as_str();
        let mut looped = false;
        while let Some(next) = aliases.get(target) {
            if !seen.insert(target) {
                looped = true;
                break;
            }
            target = next;
        }
        if looped || target == from {
            diagnostics.push(Diagnostic::warning(
                Code::RedirectLoop,
                Location::at("routes", from),
                format!("redirect '{from}' never reaches a final target; dropped"),
            ));
            continue;
        }
        redirects.push(Redirect {
            from: from.clone(),
            to: target.to_string(),
        });
    }
    redirects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn graph_of(docs: Vec<CanonicalDocument>) -> Result<GraphOutcome, Vec<Diagnostic>> {
        build_graph(&doc_map(docs), &SiteConfig::default(), &BTreeSet::new())
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    // =========================================================================
    // Routes
    // =========================================================================

    #[test]
    fn routes_are_derived_and_sorted() {
        let outcome = graph_of(vec![
            page("content/010-blog/002-hello", "Hello"),
            page("content/index", "Home"),
            page("content/about", "About"),
        ])
        .unwrap();
        let paths: Vec<&str> = outcome.graph.routes().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/about", "/blog/hello"]);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn drafts_and_non_pages_have_no_route() {
        let mut draft = page("content/wip", "WIP");
        draft.meta.status = crate::document::Status::Draft;
        let outcome = graph_of(vec![draft, partial("content/snippet", vec![])]).unwrap();
        assert!(outcome.graph.routes().is_empty());
    }

    #[test]
    fn duplicate_route_is_fatal() {
        let mut b = page("content/b", "B");
        b.meta.slug = Some("about".into());
        let err = graph_of(vec![page("content/about", "A"), b]).unwrap_err();
        assert_eq!(codes(&err), vec!["G001"]);
        assert_eq!(err[0].location.source, "content/b");
        assert!(err[0].message.contains("content/about"));
    }

    #[test]
    fn same_slug_in_other_locale_is_an_alternate() {
        let mut config = SiteConfig::default();
        config.site.locales = vec!["en".into(), "fr".into()];
        let mut en = page("content/about", "About");
        en.meta.translation_key = Some("about".into());
        let mut fr = page("content/fr-about", "À propos");
        fr.meta.slug = Some("about".into());
        fr.meta.locale = Some("fr".into());
        fr.meta.translation_key = Some("about".into());

        let outcome = build_graph(&doc_map(vec![en, fr]), &config, &BTreeSet::new()).unwrap();
        let about = outcome.graph.route("/about").unwrap();
        assert_eq!(about.alternates, vec![Alternate { locale: "fr".into(), path: "/fr/about".into() }]);
        assert_eq!(outcome.graph.route("/fr/about").unwrap().alternates[0].locale, "en");
    }

    #[test]
    fn reserved_segment_drops_route() {
        let outcome = graph_of(vec![page("content/assets", "Assets")]).unwrap();
        assert!(outcome.graph.routes().is_empty());
        assert_eq!(codes(&outcome.diagnostics), vec!["G003"]);
    }

    // =========================================================================
    // References
    // =========================================================================

    #[test]
    fn missing_layout_is_unresolved() {
        let mut p = page("content/about", "About");
        p.meta.layout = Some("nope".into());
        let outcome = graph_of(vec![p]).unwrap();
        assert_eq!(codes(&outcome.diagnostics), vec!["G006"]);
        assert_eq!(outcome.diagnostics[0].location.path.as_deref(), Some("meta.layout"));
    }

    #[test]
    fn include_resolves_relative_to_directory() {
        let p = with_body(page("content/blog/post", "Post"), vec![include("../shared/footer")]);
        let outcome = graph_of(vec![p, partial("content/shared/footer", vec![])]).unwrap();
        let deps = outcome.graph.dependencies_of("content/blog/post");
        assert_eq!(deps, vec![&GraphNode::Document("content/shared/footer".into())]);
    }

    #[test]
    fn include_escaping_root_is_rejected() {
        let p = with_body(page("content/post", "Post"), vec![include("../../etc/passwd")]);
        let outcome = graph_of(vec![p]).unwrap();
        assert_eq!(codes(&outcome.diagnostics), vec!["G007"]);
    }

    #[test]
    fn include_into_other_namespace_is_rejected() {
        let p = with_body(page("content/post", "Post"), vec![include("../layouts/base")]);
        let outcome = graph_of(vec![p, layout("base", vec![slot()])]).unwrap();
        assert_eq!(codes(&outcome.diagnostics), vec!["G007"]);
    }

    #[test]
    fn asset_references_need_a_public_file() {
        let p = with_body(page("content/post", "Post"), vec![asset("/img/cat.jpg"), asset("/img/dog.jpg")]);
        let assets: BTreeSet<String> = ["/img/cat.jpg".to_string()].into();
        let outcome = build_graph(&doc_map(vec![p]), &SiteConfig::default(), &assets).unwrap();
        assert_eq!(codes(&outcome.diagnostics), vec!["G006"]);
        assert!(outcome.graph.contains("/img/cat.jpg"));
    }

    // =========================================================================
    // Cycles and depth
    // =========================================================================

    #[test]
    fn two_document_cycle_names_full_chain() {
        let a = with_body(partial("content/a", vec![]), vec![include("b")]);
        let b = with_body(partial("content/b", vec![]), vec![include("a")]);
        let err = graph_of(vec![b, a]).unwrap_err();
        assert_eq!(codes(&err), vec!["G002"]);
        assert_eq!(err[0].message, "dependency cycle: content/a -> content/b -> content/a");
    }

    #[test]
    fn self_include_is_a_cycle() {
        let a = with_body(partial("content/a", vec![]), vec![include("a")]);
        let err = graph_of(vec![a]).unwrap_err();
        assert_eq!(err[0].message, "dependency cycle: content/a -> content/a");
    }

    #[test]
    fn cycle_and_duplicate_are_both_reported() {
        let a = with_body(partial("content/a", vec![]), vec![include("b")]);
        let b = with_body(partial("content/b", vec![]), vec![include("a")]);
        let mut dup = page("content/x", "X");
        dup.meta.slug = Some("y".into());
        let err = graph_of(vec![a, b, dup, page("content/y", "Y")]).unwrap_err();
        let mut found = codes(&err);
        found.sort();
        assert_eq!(found, vec!["G001", "G002"]);
    }

    #[test]
    fn include_depth_limit() {
        let mut docs = vec![with_body(page("content/p", "P"), vec![include("c0")])];
        for i in 0..MAX_INCLUDE_DEPTH {
            docs.push(with_body(partial(&format!("content/c{i}"), vec![]), vec![include(&format!("c{}", i + 1))]));
        }
        docs.push(partial(&format!("content/c{MAX_INCLUDE_DEPTH}"), vec![]));
        let outcome = graph_of(docs).unwrap();
        assert_eq!(codes(&outcome.diagnostics), vec!["G008"]);
    }

    #[test]
    fn include_depth_at_limit_passes() {
        let mut docs = vec![with_body(page("content/p", "P"), vec![include("c1")])];
        for i in 1..MAX_INCLUDE_DEPTH {
            docs.push(with_body(partial(&format!("content/c{i}"), vec![]), vec![include(&format!("c{}", i + 1))]));
        }
        docs.push(partial(&format!("content/c{MAX_INCLUDE_DEPTH}"), vec![]));
        assert!(graph_of(docs).unwrap().diagnostics.is_empty());
    }

    // =========================================================================
    // Ordering and dirty sets
    // =========================================================================

    #[test]
    fn topological_order_puts_dependencies_first_with_lexicographic_ties() {
        let p = with_body(page("content/p", "P"), vec![comp("card"), include("shared")]);
        let outcome = graph_of(vec![
            p,
            partial("content/shared", vec![]),
            component("card", &[], vec![]),
            page("content/a", "A"),
        ])
        .unwrap();
        assert_eq!(
            outcome.graph.order(),
            vec!["components/card", "content/a", "content/shared", "content/p"]
        );
    }

    #[test]
    fn dirty_routes_follow_reverse_edges() {
        let mut p = with_body(page("content/p", "P"), vec![comp("card")]);
        p.meta.layout = Some("base".into());
        let outcome = graph_of(vec![
            p,
            page("content/q", "Q"),
            component("card", &[], vec![]),
            layout("base", vec![slot()]),
        ])
        .unwrap();
        let changed: BTreeSet<String> = ["components/card".to_string()].into();
        assert_eq!(outcome.graph.dirty_routes(&changed), BTreeSet::from(["/p".to_string()]));
        let changed: BTreeSet<String> = ["content/q".to_string()].into();
        assert_eq!(outcome.graph.dirty_routes(&changed), BTreeSet::from(["/q".to_string()]));
    }

    // =========================================================================
    // Redirects
    // =========================================================================

    #[test]
    fn alias_chains_are_flattened() {
        let mut config = SiteConfig::default();
        config.routes.redirects.insert("/older".into(), "/old".into());
        let mut p = page("content/new", "New");
        p.meta.aliases = vec!["/old".into()];
        let outcome = build_graph(&doc_map(vec![p]), &config, &BTreeSet::new()).unwrap();
        assert_eq!(
            outcome.graph.redirects(),
            &[
                Redirect { from: "/old".into(), to: "/new".into() },
                Redirect { from: "/older".into(), to: "/new".into() },
            ]
        );
    }

    #[test]
    fn alias_colliding_with_route_is_dropped() {
        let mut p = page("content/new", "New");
        p.meta.aliases = vec!["/about".into()];
        let outcome = graph_of(vec![p, page("content/about", "About")]).unwrap();
        assert!(outcome.graph.redirects().is_empty());
        assert_eq!(codes(&outcome.diagnostics), vec!["G004"]);
    }

    #[test]
    fn redirect_loop_is_dropped() {
        let mut config = SiteConfig::default();
        config.routes.redirects.insert("/a".into(), "/b".into());
        config.routes.redirects.insert("/b".into(), "/a".into());
        let outcome = build_graph(&BTreeMap::new(), &config, &BTreeSet::new()).unwrap();
        assert!(outcome.graph.redirects().is_empty());
        assert_eq!(codes(&outcome.diagnostics), vec!["G005", "G005"]);
    }
}
