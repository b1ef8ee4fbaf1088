//! In-memory caches for incremental passes.
//!
//! The engine keeps two caches across passes (watch mode runs many passes on
//! one engine):
//!
//! - [`AssetCache`]: expensive asset encodings (image variants, gzip),
//!   **content-addressed** by `source_hash` and `params_hash` so renaming a
//!   public file never re-encodes it.
//! - [`RouteCache`]: the finished per-route result, keyed by route path and
//!   guarded by an input fingerprint. A stale fingerprint is a miss.
//!
//! ## Cache keys
//!
//! - **`source_hash`**: SHA-256 of the source bytes.
//! - **`params_hash`**: SHA-256 of the settings that change encoded output
//!   (derived formats, precompression). Changing either re-encodes.
//! - **route fingerprint**: SHA-256 over the route, the config fingerprint,
//!   the theme and safelist, and the content hash of every transitive
//!   dependency. See [`route_fingerprint`].
//!
//! Both caches are pruned to the live key set after each pass so memory
//! follows the site, not its history.

use crate::config::PerformanceConfig;
use crate::scheduler::RouteResult;
use crate::types::Route;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Output of encoding one asset's content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoded {
    /// `(format, bytes)` in configured format order.
    pub variants: Vec<(String, Vec<u8>)>,
    pub gzip: Option<Vec<u8>>,
    /// Messages for encodings that failed; surfaced as O002 warnings.
    pub failures: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AssetCache {
    /// `"{source_hash}:{params_hash}"` → encoding.
    entries: BTreeMap<String, Encoded>,
}

fn content_key(source_hash: &str, params_hash: &str) -> String {
    format!("{}:{}", source_hash, params_hash)
}

impl AssetCache {
    pub fn find(&self, source_hash: &str, params_hash: &str) -> Option<&Encoded> {
        self.entries.get(&content_key(source_hash, params_hash))
    }

    pub fn insert(&mut self, source_hash: &str, params_hash: &str, encoded: Encoded) {
        self.entries
            .insert(content_key(source_hash, params_hash), encoded);
    }

    /// Drop entries whose source is gone or whose params are stale.
    pub fn retain<'a>(&mut self, live: impl IntoIterator<Item = &'a str>, params_hash: &str) {
        let keep: BTreeSet<String> = live
            .into_iter()
            .map(|h| content_key(h, params_hash))
            .collect();
        self.entries.retain(|k, _| keep.contains(k));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of the performance settings that affect encoded asset bytes.
pub fn hash_asset_params(config: &PerformanceConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"asset\0");
    for format in &config.image_pipeline.formats {
        hasher.update(format.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\x01");
    for method in &config.precompress {
        hasher.update(method.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
struct RouteEntry {
    fingerprint: String,
    result: RouteResult,
}

#[derive(Debug, Default)]
pub struct RouteCache {
    entries: BTreeMap<String, RouteEntry>,
}

impl RouteCache {
    /// The cached result for `route`, if its fingerprint still matches.
    pub fn get(&self, route: &str, fingerprint: &str) -> Option<&RouteResult> {
        self.entries
            .get(route)
            .filter(|e| e.fingerprint == fingerprint)
            .map(|e| &e.result)
    }

    pub fn insert(&mut self, route: String, fingerprint: String, result: RouteResult) {
        self.entries.insert(route, RouteEntry { fingerprint, result });
    }

    pub fn retain(&mut self, live: &BTreeSet<String>) {
        self.entries.retain(|route, _| live.contains(route));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything that decides a route's output, folded into one hash.
///
/// `dependencies` must be `(key, content_hash)` pairs; they are sorted here
/// so callers can pass them in any order.
pub fn route_fingerprint(
    route: &Route,
    config_fingerprint: &str,
    shared: &[(&str, &str)],
    safelist: &[String],
    dependencies: &[(&str, &str)],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(route).unwrap_or_default());
    hasher.update(b"\0config\0");
    hasher.update(config_fingerprint.as_bytes());
    hasher.update(b"\0shared\0");
    let mut shared = shared.to_vec();
    shared.sort();
    for (key, hash) in shared {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(hash.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\0safelist\0");
    for selector in safelist {
        hasher.update(selector.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\0deps\0");
    let mut deps = dependencies.to_vec();
    deps.sort();
    for (key, hash) in deps {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(hash.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// Hit/miss counts for one cache over one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} built ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} built", self.misses)
        }
    }
}
