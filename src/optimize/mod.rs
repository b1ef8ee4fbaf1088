//! Per-route optimization pipeline.
//!
//! Runs after rendering, on one route at a time. Passes run in a fixed
//! order because each one depends on what the previous left behind:
//!
//! | # | Pass | Effect |
//! |---|------|--------|
//! | 1 | [`critical_css`] | inline the theme rules the page uses, defer the stylesheet |
//! | 2 | [`hashing`] | rewrite local asset URLs to content-hashed names |
//! | 3 | [`formats`] | wrap images with derived formats in `<picture>` |
//! | 4 | [`compress`] | gzip text artifacts with a fixed header |
//! | 5 | [`budget`] | O001 when a route ships more CSS or JS than configured |
//!
//! Passes never read the clock, the hostname or any unordered collection,
//! so the same unit always comes out byte-identical.

pub mod budget;
pub mod compress;
pub mod critical_css;
pub mod formats;
pub mod hashing;

use crate::assets::{AssetManifest, ProcessedAsset};
use crate::config::SiteConfig;
use crate::diagnostics::Diagnostic;
use crate::types::{RenderArtifact, Route};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// One route's artifacts on their way through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUnit {
    pub route: Route,
    pub artifacts: Vec<RenderArtifact>,
    /// Precompressed siblings, keyed by output path (`about/index.html.gz`).
    pub compressed: BTreeMap<String, Vec<u8>>,
    /// Inline CSS the engine wrote itself; its hashes go into `style-src`.
    pub engine_styles: Vec<String>,
    /// Source paths of the local assets the route's HTML references.
    pub asset_refs: BTreeSet<String>,
}

impl RouteUnit {
    pub fn new(route: Route, artifacts: Vec<RenderArtifact>) -> Self {
        Self {
            route,
            artifacts,
            compressed: BTreeMap::new(),
            engine_styles: Vec::new(),
            asset_refs: BTreeSet::new(),
        }
    }

    pub fn html_artifacts_mut(&mut self) -> impl Iterator<Item = &mut RenderArtifact> {
        self.artifacts.iter_mut().filter(|a| a.is_html())
    }
}

pub struct PassContext<'a> {
    pub config: &'a SiteConfig,
    pub assets: &'a AssetManifest,
    /// Assets by source path and by output URL.
    pub by_url: BTreeMap<String, &'a ProcessedAsset>,
    pub safelist: &'a [String],
}

impl<'a> PassContext<'a> {
    pub fn new(config: &'a SiteConfig, assets: &'a AssetManifest, safelist: &'a [String]) -> Self {
        let mut by_url = BTreeMap::new();
        for asset in assets.values() {
            by_url.insert(asset.source.clone(), asset);
            by_url.insert(asset.url(), asset);
        }
        Self {
            config,
            assets,
            by_url,
            safelist,
        }
    }

    /// The theme stylesheet, if the site has one.
    pub fn theme_css(&self) -> Option<&'a str> {
        self.assets
            .get(crate::scan::THEME_PATH)
            .and_then(|a| std::str::from_utf8(&a.bytes).ok())
    }
}

pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;
    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic>;
}

pub struct Pipeline {
    passes: Vec<Box<dyn Pass>>,
}

impl Pipeline {
    /// The fixed pass order.
    pub fn standard() -> Self {
        Self {
            passes: vec![
                Box::new(critical_css::CriticalCss),
                Box::new(hashing::AssetHashing),
                Box::new(formats::FormatDerivation),
                Box::new(compress::Precompress),
                Box::new(budget::Budget),
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for pass in &self.passes {
            let found = pass.apply(unit, ctx);
            if !found.is_empty() {
                tracing::debug!(route = %unit.route.path, pass = pass.name(), count = found.len(), "pass diagnostics");
            }
            diagnostics.extend(found);
        }
        diagnostics
    }
}

static ATTR_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s(src|href)="([^"]*)""#).expect("invalid url attribute regex"));

/// Every `src`/`href` attribute value in `html`, with its byte range.
pub(crate) fn url_attributes(html: &str) -> Vec<(std::ops::Range<usize>, String)> {
    ATTR_URL
        .captures_iter(html)
        .filter_map(|c| c.get(2).map(|m| (m.range(), m.as_str().to_string())))
        .collect()
}

/// Undo the attribute escaping the HTML renderer applies.
pub(crate) fn unescape_attr(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
