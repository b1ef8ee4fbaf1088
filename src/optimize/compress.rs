//! Precompression. Output is deterministic: the gzip header carries no file
//! name, a zero mtime and a fixed OS byte.

use super::{Pass, PassContext, RouteUnit};
use crate::assets::is_compressible;
use crate::diagnostics::{Code, Diagnostic, Location};
use flate2::{Compression, GzBuilder};
use std::io::{self, Write};

/// OS byte for "unknown", so archives do not depend on the build host.
const GZIP_OS_UNKNOWN: u8 = 255;

pub fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .operating_system(GZIP_OS_UNKNOWN)
        .write(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub struct Precompress;

impl Pass for Precompress {
    fn name(&self) -> &'static str {
        "precompress"
    }

    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        if !ctx.config.performance.precompress.iter().any(|p| p == "gzip") {
            return Vec::new();
        }
        let mut diagnostics = Vec::new();
        for artifact in &unit.artifacts {
            if !is_compressible(&artifact.path) {
                continue;
            }
            match gzip(&artifact.bytes) {
                Ok(gz) => {
                    unit.compressed.insert(format!("{}.gz", artifact.path), gz);
                }
                Err(e) => diagnostics.push(Diagnostic::warning(
                    Code::OptimizationFailed,
                    Location::at(&unit.route.source, &artifact.path),
                    format!("gzip failed: {e}"),
                )),
            }
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetManifest;
    use crate::config::SiteConfig;
    use crate::types::{RenderArtifact, Route};
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn gzip_is_deterministic_and_round_trips() {
        let a = gzip(b"hello hello hello").unwrap();
        let b = gzip(b"hello hello hello").unwrap();
        assert_eq!(a, b);
        // mtime bytes 4..8 are zero
        assert_eq!(&a[4..8], &[0, 0, 0, 0]);
        let mut out = String::new();
        GzDecoder::new(&a[..]).read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello hello hello");
    }

    #[test]
    fn compresses_text_artifacts_only_when_enabled() {
        let route = Route {
            path: "/".into(),
            source: "content/index".into(),
            locale: "en".into(),
            targets: vec!["html".into()],
            alternates: Vec::new(),
        };
        let artifacts = vec![RenderArtifact::new(
            "index.html",
            "html",
            "text/html; charset=utf-8",
            b"<p>x</p>".to_vec(),
        )];
        let assets = AssetManifest::new();

        let config = SiteConfig::default();
        let mut unit = RouteUnit::new(route.clone(), artifacts.clone());
        Precompress.apply(&mut unit, &PassContext::new(&config, &assets, &[]));
        assert!(unit.compressed.contains_key("index.html.gz"));

        let mut off = SiteConfig::default();
        off.performance.precompress.clear();
        let mut unit = RouteUnit::new(route, artifacts);
        Precompress.apply(&mut unit, &PassContext::new(&off, &assets, &[]));
        assert!(unit.compressed.is_empty());
    }
}
