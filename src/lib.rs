//! # Quarry
//!
//! A deterministic build engine for static sites. Quarry takes canonical
//! JSON documents (already parsed by a front-end) and compiles them into a
//! hermetic output tree: pages for every render target, content-addressed
//! assets, redirect rules and per-route security headers.
//!
//! # Architecture: One Pass
//!
//! ```text
//! scan      project/  →  SiteInput          (documents, assets, safelist)
//! graph     SiteInput →  BuildGraph         (routes, redirects, dependency edges)
//! validate  documents →  diagnostics        (barrier before any render)
//! render    route     →  artifacts          (parallel, per target)
//! optimize  artifacts →  hashed, gzipped    (fixed pass order)
//! security  HTML      →  CSP + headers      (declared and granted exceptions)
//! merge     results   →  files              (single writer, sorted)
//! emit      files     →  dist/              (staged, swapped in on success)
//! ```
//!
//! The same inputs always produce the same bytes: every collection that
//! reaches output is a `BTreeMap`/`BTreeSet` or sorted first, diagnostics are
//! canonicalized, and nothing reads the clock or the host. An incremental
//! pass produces exactly what a full pass would.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `quarry.toml` loading over stock defaults, validation |
//! | [`document`] | Canonical document model and node tree |
//! | [`diagnostics`] | Codes, severities, locations, canonical ordering |
//! | [`naming`] | Slugs, route paths, artifact paths, reserved segments |
//! | [`scan`] | Loads documents, theme, public files; classifies watch events |
//! | [`graph`] | Dependency graph, route table, redirects, cycle detection |
//! | [`validate`] | Per-document rules run in parallel |
//! | [`render`] | Renderer registry, layout and component expansion, HTML and JSON |
//! | [`assets`] | Content hashing, derived formats, precompression of public files |
//! | [`optimize`] | Per-route pass pipeline: critical CSS through budgets |
//! | [`security`] | CSP derivation and exception checks |
//! | [`plugin`] | Hook registry and the capability sandbox |
//! | [`cache`] | Asset and route caches carried between passes |
//! | [`scheduler`] | The engine: work sets, parallel dispatch, cancellation |
//! | [`merge`] | Site-wide files and the final file map |
//! | [`emit`] | Hermetic commit and the build report on disk |
//! | [`watch`] | Debounced rebuilds, latest change wins |
//! | [`report`] | Build report model |
//! | [`output`] | CLI output formatting |
//! | [`types`] | Routes, redirects, render artifacts |

pub mod assets;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod emit;
pub mod graph;
pub mod merge;
pub mod naming;
pub mod optimize;
pub mod output;
pub mod plugin;
pub mod render;
pub mod report;
pub mod scan;
pub mod scheduler;
pub mod security;
pub mod types;
pub mod validate;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
