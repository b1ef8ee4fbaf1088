//! Render dispatch.
//!
//! A route renders once per target. Each target names a renderer (directly,
//! or through a `renderers[]` binding in config) looked up in a
//! [`RendererRegistry`]. Before any renderer runs, the page is *resolved*:
//! includes are inlined, component instances are replaced by their
//! component body with props and slot filled in, and the layout chain wraps
//! the result. Renderers only ever see plain element, text, markdown, asset,
//! script and style nodes.
//!
//! Failures are per artifact: one target failing (R001) or naming an
//! unknown renderer (R002) drops that artifact only.

pub mod html;
pub mod json;

use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::document::{CanonicalDocument, Node, PolicyException};
use crate::graph::resolve_include;
use crate::naming;
use crate::types::{RenderArtifact, Route};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Nesting limit for layouts, components and includes during expansion.
const MAX_EXPANSION_DEPTH: usize = 64;

/// A page with every reference expanded.
#[derive(Debug, Clone)]
pub struct ResolvedPage<'a> {
    pub document: &'a CanonicalDocument,
    pub body: Vec<Node>,
    /// Component names used anywhere on the page, layouts included.
    pub components: BTreeSet<String>,
    /// Interactive behaviors; non-empty means the island runtime is needed.
    pub behaviors: BTreeSet<String>,
    /// Policy exceptions declared by the page and by the components it uses.
    pub declared: BTreeSet<PolicyException>,
}

pub struct RouteContext<'a> {
    pub route: &'a Route,
    pub target: &'a str,
    pub config: &'a SiteConfig,
    /// Whether `/theme.css` exists.
    pub has_theme: bool,
}

impl RouteContext<'_> {
    pub fn canonical_url(&self, path: &str) -> String {
        format!("{}{}", self.config.site.origin(), path)
    }

    pub fn fail(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(
            Code::RenderFailed,
            Location::at(&self.route.source, format!("targets.{}", self.target)),
            message,
        )
    }
}

pub trait Renderer: Send + Sync {
    /// File extension of the artifact, which fixes its path.
    fn extension(&self) -> &str;
    fn content_type(&self) -> &str;
    fn render(
        &self,
        page: &ResolvedPage<'_>,
        ctx: &RouteContext<'_>,
    ) -> Result<RenderArtifact, Vec<Diagnostic>>;
}

/// Named renderers. Targets resolve to a name through
/// [`SiteConfig::renderer_for`].
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: BTreeMap<String, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("html", html::HtmlRenderer);
        registry.register("json", json::JsonRenderer);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, renderer: impl Renderer + 'static) {
        self.renderers.insert(name.into(), Arc::new(renderer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        self.renderers.get(name).cloned()
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn prop_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct Expander<'a> {
    documents: &'a BTreeMap<String, CanonicalDocument>,
    components: BTreeSet<String>,
    behaviors: BTreeSet<String>,
    declared: BTreeSet<PolicyException>,
}

/// What `prop` and `slot` nodes resolve to inside the current scope.
#[derive(Clone, Copy)]
struct Scope<'s> {
    props: Option<&'s BTreeMap<String, Value>>,
    slot: Option<&'s [Node]>,
}

impl<'a> Expander<'a> {
    fn lookup(&self, id: &str) -> Result<&'a CanonicalDocument, String> {
        self.documents
            .get(id)
            .ok_or_else(|| format!("'{id}' is not loaded"))
    }

    fn expand(
        &mut self,
        owner: &CanonicalDocument,
        nodes: &[Node],
        scope: Scope<'_>,
        depth: usize,
    ) -> Result<Vec<Node>, String> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(format!("expansion deeper than {MAX_EXPANSION_DEPTH} levels"));
        }
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                Node::Element {
                    tag,
                    attrs,
                    children,
                } => out.push(Node::Element {
                    tag: tag.clone(),
                    attrs: attrs.clone(),
                    children: self.expand(owner, children, scope, depth)?,
                }),
                Node::Prop { name } => {
                    let value = scope
                        .props
                        .and_then(|p| p.get(name))
                        .map(prop_text)
                        .unwrap_or_default();
                    out.push(Node::Text { value });
                }
                Node::Slot => {
                    if let Some(slot) = scope.slot {
                        out.extend(slot.iter().cloned());
                    }
                }
                Node::Include { source } => {
                    let id = resolve_include(owner, source)
                        .ok_or_else(|| format!("include '{source}' escapes its root"))?;
                    let partial = self.lookup(&id)?;
                    out.extend(self.expand(partial, &partial.body, scope, depth + 1)?);
                }
                Node::Component {
                    name,
                    props,
                    behavior,
                    children,
                } => {
                    let component = self.lookup(&format!("components/{name}"))?;
                    self.components.insert(name.clone());
                    self.declared.extend(component.manifest.csp.iter().cloned());
                    let filled = self.expand(owner, children, scope, depth)?;
                    let inner = Scope {
                        props: Some(props),
                        slot: Some(&filled),
                    };
                    let body = self.expand(component, &component.body, inner, depth + 1)?;
                    match behavior {
                        Some(behavior) => {
                            self.behaviors.insert(behavior.clone());
                            let mut attrs = BTreeMap::new();
                            attrs.insert("data-island".to_string(), behavior.clone());
                            attrs.insert("data-component".to_string(), name.clone());
                            if !props.is_empty() {
                                attrs.insert(
                                    "data-props".to_string(),
                                    serde_json::to_string(props).unwrap_or_default(),
                                );
                            }
                            out.push(Node::Element {
                                tag: "div".to_string(),
                                attrs,
                                children: body,
                            });
                        }
                        None => out.extend(body),
                    }
                }
                other => out.push(other.clone()),
            }
        }
        Ok(out)
    }
}

/// Expand a page: body first, then each layout in its chain wraps the
/// result through its `slot`.
pub fn resolve_page<'a>(
    page: &'a CanonicalDocument,
    documents: &BTreeMap<String, CanonicalDocument>,
) -> Result<ResolvedPage<'a>, String> {
    let mut expander = Expander {
        documents,
        components: BTreeSet::new(),
        behaviors: BTreeSet::new(),
        declared: page.meta.csp.iter().cloned().collect(),
    };
    let empty = Scope {
        props: None,
        slot: None,
    };
    let mut body = expander.expand(page, &page.body, empty, 0)?;

    let mut layout_name = page.meta.layout.clone();
    let mut depth = 0;
    while let Some(name) = layout_name {
        depth += 1;
        if depth > MAX_EXPANSION_DEPTH {
            return Err("layout chain too deep".to_string());
        }
        let layout = expander.lookup(&format!("layouts/{name}"))?;
        let scope = Scope {
            props: None,
            slot: Some(&body),
        };
        body = expander.expand(layout, &layout.body, scope, depth)?;
        layout_name = layout.meta.layout.clone();
    }

    Ok(ResolvedPage {
        document: page,
        body,
        components: expander.components,
        behaviors: expander.behaviors,
        declared: expander.declared,
    })
}

/// The output of rendering one route.
pub struct RenderedRoute<'a> {
    /// `None` when the page could not be resolved; every target then fails.
    pub page: Option<ResolvedPage<'a>>,
    /// In route target order.
    pub artifacts: Vec<RenderArtifact>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Render every target of a route. The artifact path is fixed by the route
/// and the renderer's extension, whatever the renderer returns.
pub fn render_route<'a>(
    route: &Route,
    documents: &'a BTreeMap<String, CanonicalDocument>,
    registry: &RendererRegistry,
    config: &SiteConfig,
    has_theme: bool,
) -> RenderedRoute<'a> {
    let mut rendered = RenderedRoute {
        page: None,
        artifacts: Vec::new(),
        diagnostics: Vec::new(),
    };
    let Some(document) = documents.get(&route.source) else {
        rendered.diagnostics.push(Diagnostic::error(
            Code::RenderFailed,
            Location::source(&route.source),
            "route source is not loaded",
        ));
        return rendered;
    };
    let page = match resolve_page(document, documents) {
        Ok(page) => page,
        Err(message) => {
            rendered.diagnostics.push(Diagnostic::error(
                Code::RenderFailed,
                Location::source(&route.source),
                format!("could not resolve page: {message}"),
            ));
            return rendered;
        }
    };

    let mut produced: BTreeMap<String, String> = BTreeMap::new();
    for target in &route.targets {
        let ctx = RouteContext {
            route,
            target,
            config,
            has_theme,
        };
        let name = config.renderer_for(target);
        let Some(renderer) = registry.get(name) else {
            rendered.diagnostics.push(Diagnostic::error(
                Code::UnknownRenderer,
                Location::at(&route.source, format!("targets.{target}")),
                format!("no renderer named '{name}' for target '{target}'"),
            ));
            continue;
        };
        let path = naming::artifact_path(&route.path, renderer.extension());
        if let Some(earlier) = produced.get(&path) {
            rendered.diagnostics.push(ctx.fail(format!(
                "target '{target}' would overwrite '{path}' from target '{earlier}'"
            )));
            continue;
        }
        match renderer.render(&page, &ctx) {
            Ok(mut artifact) => {
                artifact.path = path.clone();
                artifact.target = target.clone();
                produced.insert(path, target.clone());
                rendered.artifacts.push(artifact);
            }
            Err(diagnostics) => {
                tracing::debug!(route = %route.path, %target, "render failed");
                rendered.diagnostics.extend(diagnostics);
            }
        }
    }
    rendered.page = Some(page);
    rendered
}
