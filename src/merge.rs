//! Single-writer merge.
//!
//! Per-route work runs in parallel; this is where it comes back together.
//! The merge walks route results in route-path order and produces the whole
//! output file map plus the site-wide files:
//!
//! | File | Contents |
//! |------|----------|
//! | `asset-manifest.json` | source path → hashed file, size, variants |
//! | `sitemap.xml` | indexable HTML routes with `hreflang` alternates |
//! | `_redirects` | Netlify redirect rules (`from to 301`) |
//! | `_headers` | Netlify header blocks, one per route |
//! | `vercel.json` | the same redirects and headers for Vercel |
//! | `csp-report.json` | every route's policy and how each need was met |
//! | `listings.json` | dated posts, pagination and taxonomy terms |
//!
//! Nothing here reads worker order, so the result is the same whatever the
//! interleaving was.

use crate::assets::AssetManifest;
use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::document::{CanonicalDocument, DocumentKind};
use crate::scheduler::RouteResult;
use crate::security::ResolvedRequirement;
use crate::types::{Redirect, Route};
use chrono::{DateTime, NaiveDate};
use maud::{PreEscaped, html};
use serde::Serialize;
use std::collections::BTreeMap;

pub const ASSET_MANIFEST: &str = "asset-manifest.json";
pub const SITEMAP: &str = "sitemap.xml";
pub const REDIRECTS: &str = "_redirects";
pub const HEADERS: &str = "_headers";
pub const VERCEL: &str = "vercel.json";
pub const CSP_REPORT: &str = "csp-report.json";
pub const LISTINGS: &str = "listings.json";

/// Everything a site build writes, keyed by output-relative path.
#[derive(Debug, Default)]
pub struct Merged {
    pub files: BTreeMap<String, Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Merged {
    /// Add a file unless the path is already taken.
    fn put(&mut self, path: String, bytes: Vec<u8>, owner: &str) {
        if self.files.contains_key(&path) {
            self.diagnostics.push(Diagnostic::error(
                Code::RenderFailed,
                Location::at(owner, &path),
                format!("output path '{path}' is produced twice"),
            ));
            return;
        }
        self.files.insert(path, bytes);
    }
}

pub struct MergeInput<'a> {
    pub config: &'a SiteConfig,
    pub documents: &'a BTreeMap<String, CanonicalDocument>,
    /// All routes of the graph, sorted by path.
    pub routes: &'a [Route],
    pub redirects: &'a [Redirect],
    /// Results of the routes that ship, keyed by route path.
    pub results: &'a BTreeMap<String, RouteResult>,
    pub assets: &'a AssetManifest,
}

pub fn merge(input: &MergeInput<'_>) -> Merged {
    let mut merged = Merged::default();
    let shipped: Vec<(&Route, &RouteResult)> = input
        .routes
        .iter()
        .filter_map(|r| input.results.get(&r.path).map(|res| (r, res)))
        .collect();

    for (route, result) in &shipped {
        for artifact in &result.artifacts {
            merged.put(artifact.path.clone(), artifact.bytes.clone(), &route.source);
        }
        for (path, bytes) in &result.compressed {
            merged.put(path.clone(), bytes.clone(), &route.source);
        }
    }
    for asset in input.assets.values() {
        for (path, bytes) in asset.files() {
            merged.put(path, bytes, &asset.source);
        }
    }

    let generated = [
        (ASSET_MANIFEST, json_bytes(&asset_manifest(input.assets))),
        (SITEMAP, sitemap(input.config, input.documents, &shipped).into_bytes()),
        (REDIRECTS, netlify_redirects(input.redirects).into_bytes()),
        (HEADERS, netlify_headers(&shipped).into_bytes()),
        (VERCEL, json_bytes(&vercel(input.redirects, &shipped))),
        (CSP_REPORT, json_bytes(&csp_report(&shipped))),
    ];
    for (path, bytes) in generated {
        merged.put(path.to_string(), bytes, "merge");
    }
    if input.config.blog.listings {
        let listings = listings(input.config, input.documents, &shipped);
        merged.put(LISTINGS.to_string(), json_bytes(&listings), "merge");
    }

    tracing::debug!(files = merged.files.len(), routes = shipped.len(), "merged output");
    merged
}

fn json_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    let mut bytes = serde_json::to_vec_pretty(value).unwrap_or_default();
    bytes.push(b'\n');
    bytes
}

// ============================================================================
// Asset manifest
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry<'a> {
    file: &'a str,
    hash: &'a str,
    size: u64,
    content_type: &'a str,
    variants: BTreeMap<&'a str, String>,
}

fn asset_manifest(assets: &AssetManifest) -> BTreeMap<&str, ManifestEntry<'_>> {
    assets
        .iter()
        .map(|(source, asset)| {
            (
                source.as_str(),
                ManifestEntry {
                    file: &asset.file,
                    hash: &asset.hash,
                    size: asset.size,
                    content_type: asset.content_type,
                    variants: asset
                        .variants
                        .iter()
                        .map(|v| (v.format.as_str(), v.url()))
                        .collect(),
                },
            )
        })
        .collect()
}

// ============================================================================
// Sitemap
// ============================================================================

/// `YYYY-MM-DD` from a date or RFC 3339 timestamp.
pub fn lastmod(value: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn is_noindex(doc: Option<&CanonicalDocument>) -> bool {
    doc.and_then(|d| d.meta.robots.as_deref())
        .is_some_and(|r| r.to_ascii_lowercase().contains("noindex"))
}

fn sitemap(
    config: &SiteConfig,
    documents: &BTreeMap<String, CanonicalDocument>,
    shipped: &[(&Route, &RouteResult)],
) -> String {
    let origin = config.site.origin();
    let entries: Vec<(&Route, Option<String>)> = shipped
        .iter()
        .filter(|(_, result)| result.artifacts.iter().any(|a| a.is_html()))
        .filter(|(route, _)| !is_noindex(documents.get(&route.source)))
        .map(|(route, _)| {
            let modified = documents.get(&route.source).and_then(|d| {
                d.meta
                    .updated
                    .as_deref()
                    .or(d.meta.date.as_deref())
                    .and_then(lastmod)
            });
            (*route, modified)
        })
        .collect();

    let markup = html! {
        (PreEscaped("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"))
        urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9" xmlns:xhtml="http://www.w3.org/1999/xhtml" {
            @for (route, modified) in &entries {
                url {
                    loc { (origin) (route.path) }
                    @if let Some(date) = modified {
                        lastmod { (date) }
                    }
                    @for alt in &route.alternates {
                        (PreEscaped(alternate_link(&alt.locale, &format!("{origin}{}", alt.path))))
                    }
                }
            }
        }
    };
    let mut xml = markup.into_string();
    xml.push('\n');
    xml
}

/// `<xhtml:link>` must self-close, which maud's void syntax does not do.
fn alternate_link(locale: &str, href: &str) -> String {
    let locale = html! { (locale) }.into_string();
    let href = html! { (href) }.into_string();
    format!("<xhtml:link rel=\"alternate\" hreflang=\"{locale}\" href=\"{href}\"/>")
}

// ============================================================================
// Redirects and headers
// ============================================================================

fn netlify_redirects(redirects: &[Redirect]) -> String {
    redirects
        .iter()
        .map(|r| format!("{} {} 301\n", r.from, r.to))
        .collect()
}

fn netlify_headers(shipped: &[(&Route, &RouteResult)]) -> String {
    let mut out = String::new();
    for (route, result) in shipped {
        out.push_str(&route.path);
        out.push('\n');
        for (name, value) in &result.security.headers {
            out.push_str(&format!("  {name}: {value}\n"));
        }
    }
    out
}

#[derive(Serialize)]
struct VercelConfig<'a> {
    redirects: Vec<VercelRedirect<'a>>,
    headers: Vec<VercelHeaders<'a>>,
}

#[derive(Serialize)]
struct VercelRedirect<'a> {
    source: &'a str,
    destination: &'a str,
    permanent: bool,
}

#[derive(Serialize)]
struct VercelHeaders<'a> {
    source: &'a str,
    headers: Vec<VercelHeader<'a>>,
}

#[derive(Serialize)]
struct VercelHeader<'a> {
    key: &'a str,
    value: &'a str,
}

fn vercel<'a>(redirects: &'a [Redirect], shipped: &[(&'a Route, &'a RouteResult)]) -> VercelConfig<'a> {
    VercelConfig {
        redirects: redirects
            .iter()
            .map(|r| VercelRedirect {
                source: &r.from,
                destination: &r.to,
                permanent: true,
            })
            .collect(),
        headers: shipped
            .iter()
            .map(|(route, result)| VercelHeaders {
                source: &route.path,
                headers: result
                    .security
                    .headers
                    .iter()
                    .map(|(key, value)| VercelHeader { key, value })
                    .collect(),
            })
            .collect(),
    }
}

#[derive(Serialize)]
struct CspEntry<'a> {
    policy: &'a str,
    requirements: &'a [ResolvedRequirement],
}

fn csp_report<'a>(shipped: &[(&'a Route, &'a RouteResult)]) -> BTreeMap<&'a str, CspEntry<'a>> {
    shipped
        .iter()
        .map(|(route, result)| {
            (
                route.path.as_str(),
                CspEntry {
                    policy: &result.security.csp,
                    requirements: &result.security.requirements,
                },
            )
        })
        .collect()
}

// ============================================================================
// Listings
// ============================================================================

#[derive(Debug, Serialize, PartialEq)]
pub struct Post {
    pub path: String,
    pub title: Option<String>,
    pub date: String,
    pub locale: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ListingPage {
    pub page: usize,
    pub posts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Listings {
    pub posts: Vec<Post>,
    pub pages: Vec<ListingPage>,
    /// taxonomy → term → post paths.
    pub taxonomies: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

/// Dated pages, newest first (ties by path).
fn listings(
    config: &SiteConfig,
    documents: &BTreeMap<String, CanonicalDocument>,
    shipped: &[(&Route, &RouteResult)],
) -> Listings {
    let mut posts: Vec<Post> = shipped
        .iter()
        .filter_map(|(route, _)| {
            let doc = documents.get(&route.source)?;
            if doc.kind != DocumentKind::Page || doc.meta.is_draft() {
                return None;
            }
            let date = lastmod(doc.meta.date.as_deref()?)?;
            Some(Post {
                path: route.path.clone(),
                title: doc.meta.title.clone(),
                date,
                locale: route.locale.clone(),
                tags: doc.meta.tags.clone(),
                categories: doc.meta.categories.clone(),
            })
        })
        .collect();
    posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.path.cmp(&b.path)));

    let per_page = config.blog.pagination.max(1);
    let pages = posts
        .chunks(per_page)
        .enumerate()
        .map(|(i, chunk)| ListingPage {
            page: i + 1,
            posts: chunk.iter().map(|p| p.path.clone()).collect(),
        })
        .collect();

    let mut taxonomies: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for taxonomy in &config.blog.taxonomies {
        let terms = taxonomies.entry(taxonomy.clone()).or_default();
        for post in &posts {
            let values = match taxonomy.as_str() {
                "tags" => &post.tags,
                "categories" => &post.categories,
                _ => continue,
            };
            for term in values {
                terms.entry(term.clone()).or_default().push(post.path.clone());
            }
        }
    }

    Listings {
        posts,
        pages,
        taxonomies,
    }
}
