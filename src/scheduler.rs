//! Incremental build scheduler.
//!
//! The [`Engine`] owns everything that outlives one pass: the configuration,
//! a rayon pool, the renderer and hook registries, and the state the next
//! pass diffs against (previous graph, content hashes, caches).
//!
//! ## One pass
//!
//! ```text
//! pre-parse hooks
//!   → graph (fatal: G001/G002 stop here, nothing is dispatched)
//!   → validation over every document (barrier)
//!   → assets
//!   → work set: every route (full) or the dirty ones (incremental)
//!   → per route, in parallel: render → optimize → security
//!   → post-render hooks → merge → emit hooks
//! ```
//!
//! ## Dirty routes
//!
//! A node is changed when its content hash differs from the last completed
//! pass (or it appeared or vanished). Every node that depends on a changed
//! node is dirty, on both the previous and the new graph, and so is every
//! route bound to a dirty document. Clean routes come from the route cache
//! when their fingerprint still matches and every asset they reference still
//! has the same hash; anything else is rendered again. Cached results carry
//! their diagnostics, so an incremental pass reports exactly what a full
//! pass would.
//!
//! ## Cancellation
//!
//! The [`CancelToken`] is checked between stages and before each route. A
//! cancelled pass leaves the route cache and the diff baseline untouched.

use crate::assets::{AssetManifest, process_assets};
use crate::cache::{AssetCache, CacheStats, RouteCache, route_fingerprint};
use crate::config::{ConfigError, SiteConfig, effective_threads};
use crate::diagnostics::Diagnostic;
use crate::document::CanonicalDocument;
use crate::graph::{BuildGraph, build_graph};
use crate::merge::{MergeInput, merge};
use crate::optimize::compress::gzip;
use crate::optimize::{PassContext, Pipeline, RouteUnit};
use crate::plugin::{HookRegistry, PluginHost};
use crate::render::{RendererRegistry, render_route};
use crate::report::{ArtifactEntry, BuildMode, BuildReport, RouteStats, StageTimer};
use crate::scan::{SiteInput, THEME_PATH};
use crate::security::{SecurityOutcome, generate_headers};
use crate::types::{RenderArtifact, Route};
use crate::validate::{ValidationContext, validate_all};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Shared flag a coordinator flips to stop an in-flight pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassMode {
    /// Render every route and drop the route cache.
    Full,
    /// Render the dirty routes. The set names node keys known to have
    /// changed; hash diffing finds the rest.
    Incremental(BTreeSet<String>),
}

/// Everything one route produced.
#[derive(Debug, Clone)]
pub struct RouteResult {
    /// In route target order.
    pub artifacts: Vec<RenderArtifact>,
    pub compressed: BTreeMap<String, Vec<u8>>,
    pub security: SecurityOutcome,
    /// Render and optimization diagnostics. Security diagnostics stay on
    /// `security`.
    pub diagnostics: Vec<Diagnostic>,
    /// Referenced asset source path → content hash at render time.
    pub asset_refs: BTreeMap<String, String>,
}

impl RouteResult {
    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().chain(&self.security.diagnostics)
    }

    /// A route ships only when neither rendering nor security found an error.
    pub fn ships(&self) -> bool {
        !self.all_diagnostics().any(Diagnostic::is_error)
    }
}

/// Output of a completed pass. `files` is the whole output tree.
#[derive(Debug)]
pub struct PassOutput {
    pub files: BTreeMap<String, Vec<u8>>,
    pub report: BuildReport,
}

impl PassOutput {
    pub fn success(&self) -> bool {
        self.report.success
    }
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassOutput),
    Cancelled,
}

/// State carried from one completed pass to the next.
#[derive(Default)]
struct PassState {
    graph: Option<BuildGraph>,
    /// Node key → content hash for every document and asset.
    hashes: BTreeMap<String, String>,
    routes: RouteCache,
    assets: AssetCache,
}

pub struct Engine {
    config: SiteConfig,
    config_fingerprint: String,
    pool: rayon::ThreadPool,
    renderers: RendererRegistry,
    hooks: HookRegistry,
    pipeline: Pipeline,
    state: PassState,
}

impl Engine {
    pub fn new(config: SiteConfig) -> Result<Self, EngineError> {
        let hooks = HookRegistry::with_builtins(&config);
        Self::with_registries(config, RendererRegistry::with_builtins(), hooks)
    }

    pub fn with_registries(
        config: SiteConfig,
        renderers: RendererRegistry,
        hooks: HookRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let threads = effective_threads(&config.processing);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        tracing::debug!(threads, "engine ready");
        Ok(Self {
            config_fingerprint: config.fingerprint(),
            config,
            pool,
            renderers,
            hooks,
            pipeline: Pipeline::standard(),
            state: PassState::default(),
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Graph and validation only. Writes nothing and leaves the engine state
    /// alone.
    pub fn validate(&self, input: &SiteInput) -> BuildReport {
        let mut timer = StageTimer::start();
        let mut documents = input.documents.clone();
        let mut host = PluginHost::new(&self.hooks, &self.config.hooks);
        host.run_pre_parse(&mut documents);
        timer.lap("pre-parse");

        let mut diagnostics = Vec::new();
        let asset_paths: BTreeSet<String> = input.assets.keys().cloned().collect();
        match build_graph(&documents, &self.config, &asset_paths) {
            Ok(outcome) => diagnostics.extend(outcome.diagnostics),
            Err(found) => diagnostics.extend(found),
        }
        timer.lap("graph");

        let sizes = input.asset_sizes();
        let ctx = ValidationContext::new(&self.config, &documents, &sizes);
        diagnostics.extend(self.pool.install(|| validate_all(&documents, &ctx)));
        timer.lap("validate");

        diagnostics.extend(host.into_diagnostics());
        let mut report = BuildReport::new(BuildMode::Validate);
        report.timings = timer.into_timings();
        report.finish(diagnostics)
    }

    /// Run one build pass. Output is returned, never written; committing is
    /// the caller's job.
    pub fn run_pass(
        &mut self,
        input: SiteInput,
        mode: PassMode,
        cancel: &CancelToken,
    ) -> Result<PassOutcome, EngineError> {
        let Engine {
            config,
            config_fingerprint,
            pool,
            renderers,
            hooks,
            pipeline,
            state,
        } = self;
        let mut timer = StageTimer::start();
        let mut report = BuildReport::new(match mode {
            PassMode::Full => BuildMode::Full,
            PassMode::Incremental(_) => BuildMode::Incremental,
        });
        let SiteInput {
            mut documents,
            assets,
            safelist,
        } = input;

        let mut host = PluginHost::new(hooks, &config.hooks);
        host.run_pre_parse(&mut documents);
        timer.lap("pre-parse");

        let hashes = content_hashes(&documents, &assets);
        let changed = match &mode {
            PassMode::Full => hashes.keys().cloned().collect(),
            PassMode::Incremental(hint) => {
                let mut changed = diff_hashes(&state.hashes, &hashes);
                changed.extend(hint.iter().cloned());
                changed
            }
        };
        if cancel.is_cancelled() {
            return Ok(PassOutcome::Cancelled);
        }

        let asset_paths: BTreeSet<String> = assets.keys().cloned().collect();
        let mut diagnostics = Vec::new();
        let graph = match build_graph(&documents, config, &asset_paths) {
            Ok(outcome) => {
                diagnostics.extend(outcome.diagnostics);
                outcome.graph
            }
            Err(found) => {
                tracing::warn!(count = found.len(), "graph has fatal errors; nothing rendered");
                diagnostics.extend(found);
                diagnostics.extend(host.into_diagnostics());
                timer.lap("graph");
                report.timings = timer.into_timings();
                return Ok(PassOutcome::Completed(PassOutput {
                    files: BTreeMap::new(),
                    report: report.finish(diagnostics),
                }));
            }
        };
        timer.lap("graph");
        if cancel.is_cancelled() {
            return Ok(PassOutcome::Cancelled);
        }

        let sizes: BTreeMap<String, u64> = assets
            .iter()
            .map(|(path, asset)| (path.clone(), asset.bytes.len() as u64))
            .collect();
        let ctx = ValidationContext::new(config, &documents, &sizes);
        let validation = pool.install(|| validate_all(&documents, &ctx));
        // Unresolved or escaping references block their dependents the same
        // way validation errors do.
        let failed_sources: BTreeSet<String> = diagnostics
            .iter()
            .chain(validation.iter())
            .filter(|d| d.is_error())
            .map(|d| d.location.source.clone())
            .collect();
        timer.lap("validate");
        if cancel.is_cancelled() {
            return Ok(PassOutcome::Cancelled);
        }

        let mut asset_stats = CacheStats::default();
        let (manifest, asset_diagnostics) = pool.install(|| {
            process_assets(&assets, &config.performance, &mut state.assets, &mut asset_stats)
        });
        diagnostics.extend(validation.iter().cloned());
        diagnostics.extend(asset_diagnostics);
        timer.lap("assets");
        if cancel.is_cancelled() {
            return Ok(PassOutcome::Cancelled);
        }

        // Work set.
        let dirty: BTreeSet<String> = match &mode {
            PassMode::Full => {
                state.routes.clear();
                graph.routes().iter().map(|r| r.path.clone()).collect()
            }
            PassMode::Incremental(_) => {
                let mut dirty = graph.dirty_routes(&changed);
                if let Some(previous) = &state.graph {
                    dirty.extend(previous.dirty_routes(&changed));
                }
                dirty
            }
        };
        let shared_hash = |path: &str| hashes.get(path).map_or("", String::as_str);
        let runtime = config.render.islands.runtime.as_str();
        let entry = config.client.entry.as_deref().unwrap_or("");
        let shared = [
            ("theme", shared_hash(THEME_PATH)),
            ("runtime", shared_hash(runtime)),
            ("entry", shared_hash(entry)),
        ];

        let mut stats = RouteStats::default();
        let mut cached: BTreeMap<String, RouteResult> = BTreeMap::new();
        let mut work: Vec<(&Route, String)> = Vec::new();
        for route in graph.routes_in_order() {
            stats.total += 1;
            let inputs = route_inputs(&graph, route);
            if inputs.iter().any(|key| failed_sources.contains(key.as_str())) {
                stats.blocked += 1;
                continue;
            }
            let deps: Vec<(&str, &str)> = inputs
                .iter()
                .map(|key| (key.as_str(), hashes.get(key).map_or("", String::as_str)))
                .collect();
            let fingerprint =
                route_fingerprint(route, config_fingerprint, &shared, &safelist, &deps);
            let reusable = if dirty.contains(&route.path) {
                None
            } else {
                state
                    .routes
                    .get(&route.path, &fingerprint)
                    .filter(|result| refs_current(result, &manifest))
                    .cloned()
            };
            match reusable {
                Some(result) => {
                    cached.insert(route.path.clone(), result);
                }
                None => work.push((route, fingerprint)),
            }
        }
        stats.cached = cached.len();
        stats.rendered = work.len();
        tracing::info!(
            routes = stats.total,
            rendered = stats.rendered,
            cached = stats.cached,
            blocked = stats.blocked,
            "work set ready"
        );

        let has_theme = manifest.contains_key(THEME_PATH);
        let pass_ctx = PassContext::new(config, &manifest, &safelist);
        let unit = RouteWork {
            documents: &documents,
            renderers,
            pipeline,
            config,
            pass_ctx: &pass_ctx,
            manifest: &manifest,
            has_theme,
        };
        let rendered: Vec<Option<(String, String, RouteResult)>> = pool.install(|| {
            use rayon::prelude::*;
            work.par_iter()
                .map(|(route, fingerprint)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some((route.path.clone(), fingerprint.clone(), unit.build(route)))
                })
                .collect()
        });
        timer.lap("render");
        if cancel.is_cancelled() || rendered.iter().any(Option::is_none) {
            return Ok(PassOutcome::Cancelled);
        }

        let mut results = cached;
        let mut fresh = Vec::new();
        for (path, fingerprint, result) in rendered.into_iter().flatten() {
            fresh.push((path.clone(), fingerprint, result.clone()));
            results.insert(path, result);
        }
        for result in results.values() {
            diagnostics.extend(result.all_diagnostics().cloned());
        }

        let mut shipping: BTreeMap<String, RouteResult> = results
            .iter()
            .filter(|(_, result)| result.ships())
            .map(|(path, result)| (path.clone(), result.clone()))
            .collect();
        apply_post_render(&mut host, &mut shipping);
        timer.lap("post-render");

        let merged = merge(&MergeInput {
            config,
            documents: &documents,
            routes: graph.routes(),
            redirects: graph.redirects(),
            results: &shipping,
            assets: &manifest,
        });
        let mut files = merged.files;
        diagnostics.extend(merged.diagnostics);

        let artifacts: BTreeMap<String, RenderArtifact> = shipping
            .values()
            .flat_map(|r| r.artifacts.iter().map(|a| (a.path.clone(), a.clone())))
            .collect();
        let occupied: BTreeSet<String> = files.keys().cloned().collect();
        files.extend(host.run_emit(&documents, &artifacts, &occupied));
        diagnostics.extend(host.into_diagnostics());
        timer.lap("merge");

        for (path, fingerprint, result) in fresh {
            state.routes.insert(path, fingerprint, result);
        }
        let live: BTreeSet<String> = graph.routes().iter().map(|r| r.path.clone()).collect();
        state.routes.retain(&live);
        state.hashes = hashes;
        state.graph = Some(graph);

        report.routes = stats;
        report.cache.routes = CacheStats {
            hits: stats.cached as u32,
            misses: stats.rendered as u32,
        };
        report.cache.assets = asset_stats;
        report.artifacts = files
            .iter()
            .map(|(path, bytes)| ArtifactEntry {
                path: path.clone(),
                bytes: bytes.len(),
            })
            .collect();
        report.timings = timer.into_timings();
        let report = report.finish(diagnostics);
        tracing::info!(
            files = files.len(),
            errors = report.errors(),
            warnings = report.warnings(),
            "pass complete"
        );
        Ok(PassOutcome::Completed(PassOutput { files, report }))
    }
}

/// Node key → content hash for documents and assets.
fn content_hashes(
    documents: &BTreeMap<String, CanonicalDocument>,
    assets: &BTreeMap<String, crate::assets::SourceAsset>,
) -> BTreeMap<String, String> {
    documents
        .iter()
        .map(|(id, doc)| (id.clone(), doc.content_hash()))
        .chain(assets.iter().map(|(path, a)| (path.clone(), a.hash.clone())))
        .collect()
}

/// Keys whose hash differs, including keys present on only one side.
fn diff_hashes(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let mut changed: BTreeSet<String> = current
        .iter()
        .filter(|(key, hash)| previous.get(*key) != Some(*hash))
        .map(|(key, _)| key.clone())
        .collect();
    changed.extend(previous.keys().filter(|k| !current.contains_key(*k)).cloned());
    changed
}

/// The route's source document and everything it transitively depends on.
fn route_inputs(graph: &BuildGraph, route: &Route) -> BTreeSet<String> {
    let mut keys: BTreeSet<String> = graph
        .transitive_dependencies(&route.source)
        .into_iter()
        .map(|n| n.key().to_string())
        .collect();
    keys.insert(route.source.clone());
    keys
}

fn refs_current(result: &RouteResult, manifest: &AssetManifest) -> bool {
    result
        .asset_refs
        .iter()
        .all(|(source, hash)| manifest.get(source).is_some_and(|a| &a.hash == hash))
}

/// Shared, read-only inputs of per-route work.
struct RouteWork<'a> {
    documents: &'a BTreeMap<String, CanonicalDocument>,
    renderers: &'a RendererRegistry,
    pipeline: &'a Pipeline,
    config: &'a SiteConfig,
    pass_ctx: &'a PassContext<'a>,
    manifest: &'a AssetManifest,
    has_theme: bool,
}

impl RouteWork<'_> {
    /// Render, optimize and secure one route.
    fn build(&self, route: &Route) -> RouteResult {
        tracing::debug!(route = %route.path, "building route");
        let rendered = render_route(route, self.documents, self.renderers, self.config, self.has_theme);
        let mut diagnostics = rendered.diagnostics;
        let mut unit = RouteUnit::new(route.clone(), rendered.artifacts);
        diagnostics.extend(self.pipeline.run(&mut unit, self.pass_ctx));

        let declared = rendered
            .page
            .as_ref()
            .map(|p| p.declared.clone())
            .unwrap_or_default();
        let html: Vec<&str> = unit
            .artifacts
            .iter()
            .filter(|a| a.is_html())
            .filter_map(RenderArtifact::text)
            .collect();
        let security = generate_headers(route, &html, &declared, &unit.engine_styles, self.config);

        let asset_refs = unit
            .asset_refs
            .iter()
            .filter_map(|source| {
                self.manifest
                    .get(source)
                    .map(|a| (source.clone(), a.hash.clone()))
            })
            .collect();
        RouteResult {
            artifacts: unit.artifacts,
            compressed: unit.compressed,
            security,
            diagnostics,
            asset_refs,
        }
    }
}

/// Run post-render hooks over the shipping artifacts and write their edits
/// back, refreshing any precompressed sibling.
fn apply_post_render(host: &mut PluginHost<'_>, shipping: &mut BTreeMap<String, RouteResult>) {
    let mut artifacts: BTreeMap<String, RenderArtifact> = BTreeMap::new();
    let mut owner: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for (route, result) in shipping.iter() {
        for (i, artifact) in result.artifacts.iter().enumerate() {
            artifacts.insert(artifact.path.clone(), artifact.clone());
            owner.insert(artifact.path.clone(), (route.clone(), i));
        }
    }
    host.run_post_render(&mut artifacts);

    for (path, artifact) in artifacts {
        let Some((route, i)) = owner.get(&path) else {
            continue;
        };
        let Some(result) = shipping.get_mut(route) else {
            continue;
        };
        if result.artifacts[*i].bytes == artifact.bytes {
            continue;
        }
        let gz_path = format!("{path}.gz");
        if result.compressed.contains_key(&gz_path) {
            match gzip(&artifact.bytes) {
                Ok(gz) => {
                    result.compressed.insert(gz_path, gz);
                }
                Err(e) => {
                    tracing::warn!(%path, "could not recompress hook output: {e}");
                    result.compressed.remove(&gz_path);
                }
            }
        }
        result.artifacts[*i].bytes = artifact.bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Code;
    use crate::test_helpers::{asset, doc_map, el, include, page, partial, text, with_body};

    fn input(docs: Vec<CanonicalDocument>) -> SiteInput {
        SiteInput {
            documents: doc_map(docs),
            ..Default::default()
        }
    }

    fn site() -> Vec<CanonicalDocument> {
        vec![
            with_body(page("content/index", "Home"), vec![include("footer")]),
            with_body(page("content/about", "About"), vec![el("p", vec![text("hi")])]),
            partial("content/footer", vec![text("footer")]),
        ]
    }

    fn run(engine: &mut Engine, input: SiteInput, mode: PassMode) -> PassOutput {
        match engine.run_pass(input, mode, &CancelToken::new()).unwrap() {
            PassOutcome::Completed(output) => output,
            PassOutcome::Cancelled => panic!("pass was cancelled"),
        }
    }

    // =========================================================================
    // Full passes
    // =========================================================================

    #[test]
    fn full_pass_renders_every_route() {
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let output = run(&mut engine, input(site()), PassMode::Full);
        assert!(output.success(), "{:?}", output.report.diagnostics);
        assert!(output.files.contains_key("index.html"));
        assert!(output.files.contains_key("about/index.html"));
        assert!(output.files.contains_key("sitemap.xml"));
        assert_eq!(output.report.routes.rendered, 2);
    }

    #[test]
    fn fatal_graph_errors_produce_no_files() {
        let docs = vec![
            with_body(page("content/a", "A"), vec![include("b")]),
            with_body(partial("content/b", Vec::new()), vec![include("a")]),
        ];
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let output = run(&mut engine, input(docs), PassMode::Full);
        assert!(!output.success());
        assert!(output.files.is_empty());
        assert!(output.report.diagnostics.iter().any(|d| d.code == Code::ImportCycle));
    }

    #[test]
    fn validation_errors_block_the_route_and_its_dependents() {
        let mut config = SiteConfig::default();
        config.validation.required = vec!["title".into(), "description".into()];
        let mut about = page("content/about", "About");
        about.meta.description = Some("ok".into());
        let docs = vec![about, page("content/index", "Home")];
        let mut engine = Engine::new(config).unwrap();
        let output = run(&mut engine, input(docs), PassMode::Full);
        assert!(!output.success());
        assert_eq!(output.report.routes.blocked, 1);
        assert!(output.files.contains_key("about/index.html"));
        assert!(!output.files.contains_key("index.html"));
    }

    #[test]
    fn unresolved_layout_blocks_the_route() {
        let mut about = page("content/about", "About");
        about.meta.layout = Some("missing".into());
        let docs = vec![about, page("content/index", "Home")];
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let output = run(&mut engine, input(docs), PassMode::Full);
        assert!(!output.success());
        assert_eq!(output.report.routes.blocked, 1);
        assert_eq!(output.report.routes.rendered, 1);
        let codes: Vec<Code> = output.report.diagnostics.iter().map(|d| d.code).collect();
        assert!(codes.contains(&Code::UnresolvedReference));
        assert!(!codes.contains(&Code::RenderFailed));
    }

    #[test]
    fn missing_asset_is_reported_not_fatal() {
        let docs = vec![with_body(page("content/index", "Home"), vec![asset("/img/none.png")])];
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let output = run(&mut engine, input(docs), PassMode::Full);
        assert!(!output.report.diagnostics.is_empty());
    }

    // =========================================================================
    // Incremental passes
    // =========================================================================

    #[test]
    fn unchanged_routes_come_from_cache() {
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let first = run(&mut engine, input(site()), PassMode::Full);

        let mut docs = site();
        docs[2] = partial("content/footer", vec![text("new footer")]);
        let second = run(&mut engine, input(docs.clone()), PassMode::Incremental(BTreeSet::new()));
        assert_eq!(second.report.routes.rendered, 1);
        assert_eq!(second.report.routes.cached, 1);
        assert_eq!(first.files["about/index.html"], second.files["about/index.html"]);

        let mut fresh = Engine::new(SiteConfig::default()).unwrap();
        let full = run(&mut fresh, input(docs), PassMode::Full);
        assert_eq!(full.files, second.files);
    }

    #[test]
    fn diff_hashes_sees_additions_and_removals() {
        let previous: BTreeMap<String, String> =
            [("a".into(), "1".into()), ("b".into(), "2".into())].into();
        let current: BTreeMap<String, String> =
            [("a".into(), "1".into()), ("c".into(), "3".into())].into();
        let changed = diff_hashes(&previous, &current);
        assert_eq!(changed, BTreeSet::from(["b".to_string(), "c".to_string()]));
    }

    // =========================================================================
    // Cancellation and validate-only
    // =========================================================================

    #[test]
    fn cancelled_token_stops_the_pass() {
        let mut engine = Engine::new(SiteConfig::default()).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let outcome = engine.run_pass(input(site()), PassMode::Full, &token).unwrap();
        assert!(matches!(outcome, PassOutcome::Cancelled));
    }

    #[test]
    fn validate_reports_without_rendering() {
        let mut config = SiteConfig::default();
        config.validation.required = vec!["description".into()];
        let engine = Engine::new(config).unwrap();
        let report = engine.validate(&input(site()));
        assert_eq!(report.mode, BuildMode::Validate);
        assert_eq!(report.errors(), 2);
        assert!(report.artifacts.is_empty());
    }
}
