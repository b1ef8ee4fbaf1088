//! Asset hashing: every `src`/`href` in HTML that names a local asset is
//! rewritten to the asset's content-hashed URL, and the route records which
//! assets it references. The site-wide `asset-manifest.json` is written by
//! the merge step from the same [`AssetManifest`](crate::assets::AssetManifest).

use super::{Pass, PassContext, RouteUnit, unescape_attr, url_attributes};
use crate::diagnostics::Diagnostic;

pub struct AssetHashing;

impl Pass for AssetHashing {
    fn name(&self) -> &'static str {
        "asset-hashing"
    }

    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        let mut refs = Vec::new();
        for artifact in unit.html_artifacts_mut() {
            let Some(html) = artifact.text() else {
                continue;
            };
            let mut out = String::with_capacity(html.len());
            let mut last = 0;
            for (range, value) in url_attributes(html) {
                let Some(asset) = ctx.assets.get(&unescape_attr(&value)) else {
                    continue;
                };
                refs.push(asset.source.clone());
                out.push_str(&html[last..range.start]);
                out.push_str(&asset.url());
                last = range.end;
            }
            out.push_str(&html[last..]);
            artifact.bytes = out.into_bytes();
        }
        unit.asset_refs.extend(refs);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{SourceAsset, process_assets};
    use crate::cache::{AssetCache, CacheStats};
    use crate::config::{PerformanceConfig, SiteConfig};
    use crate::types::{RenderArtifact, Route};

    fn run(html: &str, hashing: bool) -> RouteUnit {
        let performance = PerformanceConfig {
            asset_hashing: hashing,
            ..Default::default()
        };
        let assets = [SourceAsset::new("/js/app.js", b"go()".to_vec())]
            .into_iter()
            .map(|a| (a.path.clone(), a))
            .collect();
        let (manifest, _) = process_assets(
            &assets,
            &performance,
            &mut AssetCache::default(),
            &mut CacheStats::default(),
        );
        let mut config = SiteConfig::default();
        config.performance = performance;
        let ctx = PassContext::new(&config, &manifest, &[]);
        let mut unit = RouteUnit::new(
            Route {
                path: "/".into(),
                source: "content/index".into(),
                locale: "en".into(),
                targets: vec!["html".into()],
                alternates: Vec::new(),
            },
            vec![RenderArtifact::new("index.html", "html", "text/html; charset=utf-8", html.as_bytes().to_vec())],
        );
        AssetHashing.apply(&mut unit, &ctx);
        unit
    }

    #[test]
    fn rewrites_local_asset_urls() {
        let unit = run(r#"<script src="/js/app.js"></script><a href="/about">a</a>"#, true);
        let html = unit.artifacts[0].text().unwrap();
        assert!(html.starts_with("<script src=\"/assets/app."));
        assert!(html.contains(".js\"></script><a href=\"/about\">"));
        assert!(unit.asset_refs.contains("/js/app.js"));
    }

    #[test]
    fn records_refs_without_rewriting_when_disabled() {
        let source = r#"<script src="/js/app.js"></script>"#;
        let unit = run(source, false);
        assert_eq!(unit.artifacts[0].text().unwrap(), source);
        assert_eq!(unit.asset_refs.len(), 1);
    }
}
