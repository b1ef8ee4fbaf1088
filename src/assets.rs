//! Public asset processing.
//!
//! Every file under `public/` (plus the concatenated theme) becomes a
//! [`ProcessedAsset`]:
//!
//! - **Content-addressed name**: `assets/{stem}.{hash12}.{ext}` when
//!   `performance.assetHashing` is on, the original path otherwise.
//! - **Derived formats**: raster images (`jpg`, `jpeg`, `png`) get one
//!   variant per `performance.imagePipeline.formats` entry, each hashed and
//!   named separately.
//! - **Precompression**: text-like assets get a `.gz` sibling when
//!   `performance.precompress` contains `gzip`.
//!
//! Encoding is the expensive part and is keyed by content in
//! [`AssetCache`](crate::cache::AssetCache); names are recomputed every pass
//! because they depend on the source path.

use crate::cache::{AssetCache, CacheStats, Encoded, hash_asset_params};
use crate::config::PerformanceConfig;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::naming;
use crate::optimize::compress::gzip;
use image::ImageFormat;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Cursor;

/// Hex characters of the content hash kept in output file names.
pub const HASH_PREFIX_LEN: usize = 12;

/// A source file, keyed by its URL path.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAsset {
    pub path: String,
    pub bytes: Vec<u8>,
    pub hash: String,
}

impl SourceAsset {
    pub fn new(path: impl Into<String>, bytes: Vec<u8>) -> Self {
        let hash = format!("{:x}", Sha256::digest(&bytes));
        Self {
            path: path.into(),
            bytes,
            hash,
        }
    }

    pub fn extension(&self) -> &str {
        extension_of(&self.path)
    }
}

/// An alternate image format derived from a raster source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
    pub format: String,
    /// Output path relative to the site root.
    pub file: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Variant {
    pub fn url(&self) -> String {
        format!("/{}", self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedAsset {
    pub source: String,
    pub hash: String,
    /// Output path relative to the site root.
    pub file: String,
    pub content_type: &'static str,
    pub size: u64,
    pub variants: Vec<Variant>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    #[serde(skip)]
    pub gzip: Option<Vec<u8>>,
}

impl ProcessedAsset {
    pub fn url(&self) -> String {
        format!("/{}", self.file)
    }

    /// Every file this asset contributes to the output tree.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        let mut files = vec![(self.file.clone(), self.bytes.clone())];
        if let Some(gz) = &self.gzip {
            files.push((format!("{}.gz", self.file), gz.clone()));
        }
        for variant in &self.variants {
            files.push((variant.file.clone(), variant.bytes.clone()));
        }
        files
    }
}

/// Processed assets keyed by source URL path.
pub type AssetManifest = BTreeMap<String, ProcessedAsset>;

pub fn extension_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(pos) if pos > 0 => &name[pos + 1..],
        _ => "",
    }
}

pub fn content_type_for(path: &str) -> &'static str {
    match extension_of(path).to_ascii_lowercase().as_str() {
        "html" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Text formats that benefit from precompression.
pub fn is_compressible(path: &str) -> bool {
    matches!(
        extension_of(path).to_ascii_lowercase().as_str(),
        "html" | "css" | "js" | "mjs" | "json" | "xml" | "txt" | "svg"
    )
}

fn image_format(ext: &str) -> Option<ImageFormat> {
    match ext {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

fn is_raster_source(ext: &str) -> bool {
    matches!(ext, "jpg" | "jpeg" | "png")
}

/// `assets/{stem}.{hash12}.{ext}`. The stem is slugified so names stay
/// URL-safe.
pub fn hashed_name(source_path: &str, hash: &str, ext: &str) -> String {
    let name = source_path.rsplit('/').next().unwrap_or(source_path);
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    let stem = match naming::slugify(stem) {
        s if s.is_empty() => "asset".to_string(),
        s => s,
    };
    let short = &hash[..HASH_PREFIX_LEN.min(hash.len())];
    if ext.is_empty() {
        format!("assets/{stem}.{short}")
    } else {
        format!("assets/{stem}.{short}.{ext}")
    }
}

/// The content-only work for one asset: variant encoding and gzip.
fn encode(asset: &SourceAsset, config: &PerformanceConfig) -> Encoded {
    let mut encoded = Encoded::default();
    let ext = asset.extension().to_ascii_lowercase();

    if is_raster_source(&ext) && !config.image_pipeline.formats.is_empty() {
        match image::load_from_memory(&asset.bytes) {
            Ok(img) => {
                for format in &config.image_pipeline.formats {
                    if *format == ext {
                        continue;
                    }
                    let Some(target) = image_format(format) else {
                        continue;
                    };
                    let mut buf = Vec::new();
                    match img.write_to(&mut Cursor::new(&mut buf), target) {
                        Ok(()) => encoded.variants.push((format.clone(), buf)),
                        Err(e) => encoded
                            .failures
                            .push(format!("could not encode {format} variant: {e}")),
                    }
                }
            }
            Err(e) => encoded.failures.push(format!("could not decode image: {e}")),
        }
    }

    if config.precompress.iter().any(|p| p == "gzip") && is_compressible(&asset.path) {
        match gzip(&asset.bytes) {
            Ok(gz) => encoded.gzip = Some(gz),
            Err(e) => encoded.failures.push(format!("gzip failed: {e}")),
        }
    }
    encoded
}

/// Name the outputs of an encoded asset.
fn assemble(
    asset: &SourceAsset,
    encoded: &Encoded,
    config: &PerformanceConfig,
) -> (ProcessedAsset, Vec<Diagnostic>) {
    let ext = asset.extension().to_ascii_lowercase();
    let file = if config.asset_hashing {
        hashed_name(&asset.path, &asset.hash, &ext)
    } else {
        asset.path.trim_start_matches('/').to_string()
    };

    let variants = encoded
        .variants
        .iter()
        .map(|(format, bytes)| {
            let hash = format!("{:x}", Sha256::digest(bytes));
            let file = if config.asset_hashing {
                hashed_name(&asset.path, &hash, format)
            } else {
                let base = file.rsplit_once('.').map_or(file.as_str(), |(b, _)| b);
                format!("{base}.{format}")
            };
            Variant {
                format: format.clone(),
                file,
                bytes: bytes.clone(),
            }
        })
        .collect();

    let diagnostics = encoded
        .failures
        .iter()
        .map(|msg| Diagnostic::warning(Code::OptimizationFailed, Location::source(&asset.path), msg))
        .collect();

    (
        ProcessedAsset {
            source: asset.path.clone(),
            hash: asset.hash.clone(),
            file,
            content_type: content_type_for(&asset.path),
            size: asset.bytes.len() as u64,
            variants,
            bytes: asset.bytes.clone(),
            gzip: encoded.gzip.clone(),
        },
        diagnostics,
    )
}

/// Process every asset, reusing cached encodings. Runs on the current rayon
/// pool; the returned manifest and diagnostics are ordered by source path.
pub fn process_assets(
    assets: &BTreeMap<String, SourceAsset>,
    config: &PerformanceConfig,
    cache: &mut AssetCache,
    stats: &mut CacheStats,
) -> (AssetManifest, Vec<Diagnostic>) {
    let params = hash_asset_params(config);

    let misses: Vec<&SourceAsset> = assets
        .values()
        .filter(|a| cache.find(&a.hash, &params).is_none())
        .collect();
    stats.hits += (assets.len() - misses.len()) as u32;
    stats.misses += misses.len() as u32;

    let fresh: Vec<(String, Encoded)> = misses
        .par_iter()
        .map(|asset| (asset.hash.clone(), encode(asset, config)))
        .collect();
    for (hash, encoded) in fresh {
        cache.insert(&hash, &params, encoded);
    }
    cache.retain(assets.values().map(|a| a.hash.as_str()), &params);

    let mut manifest = AssetManifest::new();
    let mut diagnostics = Vec::new();
    for asset in assets.values() {
        let Some(encoded) = cache.find(&asset.hash, &params) else {
            continue;
        };
        let (processed, diags) = assemble(asset, encoded, config);
        diagnostics.extend(diags);
        manifest.insert(asset.path.clone(), processed);
    }
    tracing::debug!(assets = manifest.len(), %stats, "processed assets");
    (manifest, diagnostics)
}
