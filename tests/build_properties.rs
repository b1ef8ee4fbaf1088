//! Whole-engine properties: determinism, incremental equivalence, fatal
//! graph conditions, budgets, validation completeness and plugin isolation.

use quarry::assets::SourceAsset;
use quarry::config::{HookDecl, SiteConfig};
use quarry::diagnostics::{Code, Severity};
use quarry::document::CanonicalDocument;
use quarry::plugin::{HookError, HookRegistry, Phase, PhaseIo};
use quarry::render::RendererRegistry;
use quarry::scan::SiteInput;
use quarry::scheduler::{CancelToken, Engine, PassMode, PassOutcome, PassOutput};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};

// =========================================================================
// Fixtures
// =========================================================================

fn doc(id: &str, value: Value) -> CanonicalDocument {
    let mut doc: CanonicalDocument = serde_json::from_value(value).unwrap();
    doc.id = id.to_string();
    doc.provenance.origin = format!("{id}.json");
    doc.provenance.root = id.split('/').next().unwrap().to_string();
    doc
}

fn page(id: &str, title: &str, body: Value) -> CanonicalDocument {
    doc(id, json!({"kind": "page", "meta": {"title": title, "layout": "base"}, "body": body}))
}

fn site_documents() -> Vec<CanonicalDocument> {
    vec![
        doc(
            "layouts/base",
            json!({"kind": "layout", "body": [
                {"kind": "element", "tag": "main", "children": [{"kind": "slot"}]}
            ]}),
        ),
        doc(
            "components/card",
            json!({"kind": "component", "manifest": {"requiredProps": ["title"]}, "body": [
                {"kind": "element", "tag": "section", "attrs": {"class": "card"}, "children": [
                    {"kind": "element", "tag": "h2", "children": [{"kind": "prop", "name": "title"}]},
                    {"kind": "slot"}
                ]}
            ]}),
        ),
        doc(
            "content/footer",
            json!({"kind": "partial", "body": [{"kind": "text", "value": "© Quarry"}]}),
        ),
        page(
            "content/index",
            "Home",
            json!([
                {"kind": "markdown", "source": "# Welcome\n\nSee the [guide](/downloads/guide.pdf)."},
                {"kind": "component", "name": "card", "props": {"title": "Latest"}},
                {"kind": "include", "source": "footer"}
            ]),
        ),
        page(
            "content/about",
            "About",
            json!([{"kind": "element", "tag": "p", "children": [{"kind": "text", "value": "About us"}]}]),
        ),
        doc(
            "content/blog/first-post",
            json!({"kind": "page", "meta": {
                "title": "First post", "layout": "base", "date": "2026-02-01", "tags": ["news"]
            }, "body": [{"kind": "asset", "path": "/downloads/guide.pdf", "alt": "Guide"}]}),
        ),
    ]
}

fn site_assets() -> Vec<SourceAsset> {
    vec![
        SourceAsset::new("/theme.css", b"main{display:block}\n.card{margin:0}\n.unused{color:red}\n".to_vec()),
        SourceAsset::new("/downloads/guide.pdf", b"%PDF-1.4 guide".to_vec()),
    ]
}

fn input(documents: Vec<CanonicalDocument>, assets: Vec<SourceAsset>) -> SiteInput {
    SiteInput {
        documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
        assets: assets.into_iter().map(|a| (a.path.clone(), a)).collect(),
        safelist: Vec::new(),
    }
}

fn site() -> SiteInput {
    input(site_documents(), site_assets())
}

fn config() -> SiteConfig {
    let mut config = SiteConfig::default();
    config.site.canonical = "https://example.com".into();
    config
}

fn run(engine: &mut Engine, input: SiteInput, mode: PassMode) -> PassOutput {
    match engine.run_pass(input, mode, &CancelToken::new()).unwrap() {
        PassOutcome::Completed(output) => output,
        PassOutcome::Cancelled => panic!("pass cancelled"),
    }
}

fn full_build(config: SiteConfig, input: SiteInput) -> PassOutput {
    let mut engine = Engine::new(config).unwrap();
    run(&mut engine, input, PassMode::Full)
}

fn codes(output: &PassOutput) -> Vec<Code> {
    output.report.diagnostics.iter().map(|d| d.code).collect()
}

// =========================================================================
// Idempotence and determinism
// =========================================================================

#[test]
fn same_input_builds_identical_bytes() {
    let first = full_build(config(), site());
    assert!(first.success(), "{:?}", first.report.diagnostics);
    let second = full_build(config(), site());
    assert_eq!(first.files, second.files);

    // And again on the same engine, after its caches are warm.
    let mut engine = Engine::new(config()).unwrap();
    run(&mut engine, site(), PassMode::Full);
    let warm = run(&mut engine, site(), PassMode::Full);
    assert_eq!(first.files, warm.files);
}

#[test]
fn site_has_expected_outputs() {
    let output = full_build(config(), site());
    for path in [
        "index.html",
        "about/index.html",
        "blog/first-post/index.html",
        "sitemap.xml",
        "asset-manifest.json",
        "_headers",
        "_redirects",
        "vercel.json",
        "csp-report.json",
    ] {
        assert!(output.files.contains_key(path), "missing {path}");
    }
    let index = String::from_utf8(output.files["index.html"].clone()).unwrap();
    assert!(index.contains("<h2>Latest</h2>"));
    assert!(index.contains("© Quarry"));
    assert!(
        output
            .files
            .keys()
            .any(|p| p.starts_with("assets/guide.") && p.ends_with(".pdf"))
    );
}

#[test]
fn pool_size_does_not_change_output() {
    let mut one = config();
    one.processing.max_workers = Some(1);
    let mut four = config();
    four.processing.max_workers = Some(4);
    let a = full_build(one, site());
    let b = full_build(four, site());
    assert_eq!(a.files, b.files);
    assert_eq!(a.report.diagnostics, b.report.diagnostics);
}

// =========================================================================
// Incremental equivalence
// =========================================================================

#[test]
fn incremental_pass_matches_full_pass() {
    let mut engine = Engine::new(config()).unwrap();
    run(&mut engine, site(), PassMode::Full);

    let mut documents = site_documents();
    documents.retain(|d| d.id != "content/about");
    for d in documents.iter_mut() {
        if d.id == "content/footer" {
            *d = doc(
                "content/footer",
                json!({"kind": "partial", "body": [{"kind": "text", "value": "© Quarry 2026"}]}),
            );
        }
    }
    documents.push(page(
        "content/contact",
        "Contact",
        json!([{"kind": "text", "value": "Write to us"}]),
    ));
    let mut assets = site_assets();
    assets[0] = SourceAsset::new("/theme.css", b"main{display:grid}\n".to_vec());

    let incremental = run(
        &mut engine,
        input(documents.clone(), assets.clone()),
        PassMode::Incremental(BTreeSet::new()),
    );
    let full = full_build(config(), input(documents, assets));
    assert_eq!(incremental.files, full.files);
    assert_eq!(incremental.report.diagnostics, full.report.diagnostics);
    assert!(!incremental.files.contains_key("about/index.html"));
}

#[test]
fn untouched_routes_are_served_from_cache() {
    let mut engine = Engine::new(config()).unwrap();
    run(&mut engine, site(), PassMode::Full);

    let mut documents = site_documents();
    for d in documents.iter_mut() {
        if d.id == "content/about" {
            *d = page("content/about", "About", json!([{"kind": "text", "value": "Changed"}]));
        }
    }
    let output = run(
        &mut engine,
        input(documents, site_assets()),
        PassMode::Incremental(BTreeSet::new()),
    );
    assert_eq!(output.report.routes.rendered, 1);
    assert_eq!(output.report.routes.cached, 2);
}

// =========================================================================
// Fatal graph conditions
// =========================================================================

#[test]
fn import_cycle_is_fatal_and_renders_nothing() {
    let documents = vec![
        page("content/a", "A", json!([{"kind": "include", "source": "b"}])),
        doc("content/b", json!({"kind": "partial", "body": [{"kind": "include", "source": "a"}]})),
    ];
    let output = full_build(config(), input(documents, Vec::new()));
    assert!(!output.success());
    assert!(output.files.is_empty());
    assert!(codes(&output).contains(&Code::ImportCycle));
    assert_eq!(output.report.routes.total, 0);
}

#[test]
fn duplicate_route_is_fatal() {
    let mut documents = site_documents();
    documents.push(doc(
        "content/team",
        json!({"kind": "page", "meta": {"title": "Team", "slug": "about"}}),
    ));
    let output = full_build(config(), input(documents, site_assets()));
    assert!(!output.success());
    assert!(output.files.is_empty());
    assert!(codes(&output).contains(&Code::DuplicateRoute));
}

// =========================================================================
// Budgets
// =========================================================================

fn budget_site(first: usize, second: usize) -> SiteInput {
    let documents = vec![page(
        "content/index",
        "Home",
        json!([
            {"kind": "style", "href": "/css/a.css"},
            {"kind": "style", "href": "/css/b.css"}
        ]),
    )];
    let assets = vec![
        SourceAsset::new("/css/a.css", vec![b'a'; first]),
        SourceAsset::new("/css/b.css", vec![b'b'; second]),
    ];
    let mut input = input(documents, assets);
    input.documents.insert(
        "layouts/base".into(),
        doc("layouts/base", json!({"kind": "layout", "body": [{"kind": "slot"}]})),
    );
    input
}

#[test]
fn css_budget_of_exactly_fifty_kilobytes_passes() {
    let output = full_build(config(), budget_site(25_600, 25_600));
    assert!(output.success(), "{:?}", output.report.diagnostics);
}

#[test]
fn one_byte_over_css_budget_fails() {
    let output = full_build(config(), budget_site(25_600, 25_601));
    assert!(!output.success());
    let budget = output
        .report
        .diagnostics
        .iter()
        .find(|d| d.code == Code::BudgetExceeded)
        .unwrap();
    assert_eq!(budget.severity, Severity::Error);
    assert!(budget.message.contains("observed 51201 bytes > configured 51200 bytes"));
}

// =========================================================================
// Validation completeness
// =========================================================================

#[test]
fn every_validation_error_is_reported() {
    let mut documents = site_documents();
    documents.push(doc(
        "content/bad",
        json!({"kind": "page", "meta": {"description": "x".repeat(200), "date": "31/12/2026"}}),
    ));
    let output = full_build(config(), input(documents, site_assets()));
    assert!(!output.success());
    let bad: Vec<Code> = output
        .report
        .diagnostics
        .iter()
        .filter(|d| d.location.source == "content/bad")
        .map(|d| d.code)
        .collect();
    assert!(bad.contains(&Code::MissingMetadata));
    assert!(bad.contains(&Code::MetadataTooLong));
    assert!(bad.contains(&Code::MalformedDate));
    // The broken page is blocked; its siblings still render.
    assert_eq!(output.report.routes.blocked, 1);
    assert!(output.files.contains_key("about/index.html"));
}

// =========================================================================
// Plugin isolation
// =========================================================================

struct Panics;

impl quarry::plugin::Hook for Panics {
    fn run(&self, io: &mut PhaseIo<'_>) -> Result<(), HookError> {
        io.replace_artifact("index.html", b"defaced".to_vec())?;
        panic!("plugin bug");
    }
}

struct EmitsWithoutCapability;

impl quarry::plugin::Hook for EmitsWithoutCapability {
    fn run(&self, io: &mut PhaseIo<'_>) -> Result<(), HookError> {
        io.emit("extra/notes.txt", b"sneaky".to_vec())?;
        Ok(())
    }
}

struct Stamp;

impl quarry::plugin::Hook for Stamp {
    fn run(&self, io: &mut PhaseIo<'_>) -> Result<(), HookError> {
        io.emit("meta/stamp.txt", b"built".to_vec())?;
        Ok(())
    }
}

fn decl(name: &str, phase: Phase, capabilities: &[&str]) -> HookDecl {
    HookDecl {
        name: name.into(),
        phase,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        order: 0,
    }
}

#[test]
fn faulty_plugins_are_disabled_without_harming_the_build() {
    let mut config = config();
    config.hooks = vec![
        decl("panics", Phase::PostRender, &["read:artifacts", "write:artifacts"]),
        decl("sneaky", Phase::Emit, &["read:artifacts"]),
        decl("stamp", Phase::Emit, &["emit:meta"]),
        decl("robots", Phase::Emit, &["emit:robots.txt"]),
        decl("missing", Phase::Emit, &[]),
    ];
    let mut hooks = HookRegistry::with_builtins(&config);
    hooks.register("panics", Panics);
    hooks.register("sneaky", EmitsWithoutCapability);
    hooks.register("stamp", Stamp);
    let mut engine = Engine::with_registries(config, RendererRegistry::with_builtins(), hooks).unwrap();
    let output = run(&mut engine, site(), PassMode::Full);

    assert!(output.success(), "{:?}", output.report.diagnostics);
    let found = codes(&output);
    assert!(found.contains(&Code::HookFault));
    assert!(found.contains(&Code::CapabilityViolation));
    assert!(found.contains(&Code::UnknownHook));

    let index = String::from_utf8(output.files["index.html"].clone()).unwrap();
    assert_ne!(index, "defaced");
    assert!(!output.files.contains_key("extra/notes.txt"));
    assert_eq!(output.files["meta/stamp.txt"], b"built");
    assert!(
        String::from_utf8(output.files["robots.txt"].clone())
            .unwrap()
            .contains("Sitemap: https://example.com/sitemap.xml")
    );

    // Same pass without the faulty plugins produces the same site files.
    let clean = full_build(self::config(), site());
    let strip = |files: &BTreeMap<String, Vec<u8>>| -> BTreeMap<String, Vec<u8>> {
        files
            .iter()
            .filter(|(p, _)| !p.starts_with("meta/") && p.as_str() != "robots.txt")
            .map(|(p, b)| (p.clone(), b.clone()))
            .collect()
    };
    assert_eq!(strip(&output.files), strip(&clean.files));
}
