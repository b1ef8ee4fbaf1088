//! Budget enforcement.
//!
//! Observed bytes per route:
//!
//! - **CSS**: every distinct linked stylesheet asset plus inline `<style>`
//!   blocks. Critical CSS (`data-critical`) is a subset of the linked theme
//!   and is not counted twice.
//! - **JS**: every distinct script asset plus inline `<script>` blocks.
//!
//! Sizes are uncompressed. A route exactly at its budget passes.

use super::{Pass, PassContext, RouteUnit};
use crate::diagnostics::{Code, Diagnostic, Location};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static STYLESHEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link\b[^>]*\brel="stylesheet"[^>]*\bhref="([^"]*)"[^>]*>"#)
        .expect("invalid stylesheet regex")
});
static SCRIPT_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script\b[^>]*\bsrc="([^"]*)"[^>]*>"#).expect("invalid script regex")
});
static INLINE_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style(\s[^>]*)?>(.*?)</style>").expect("invalid inline style regex")
});
static INLINE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script(\s[^>]*)?>(.*?)</script>").expect("invalid inline script regex")
});

pub struct Budget;

/// Bytes of CSS and JS a page ships.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Observed {
    pub css: u64,
    pub js: u64,
}

pub fn observe(html: &str, ctx: &PassContext<'_>) -> Observed {
    let linked_size = |re: &Regex| -> u64 {
        let urls: BTreeSet<&str> = re
            .captures_iter(html)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        urls.iter()
            .filter_map(|u| ctx.by_url.get(*u))
            .map(|a| a.size)
            .sum()
    };
    let inline_size = |re: &Regex, skip_attr: &str| -> u64 {
        re.captures_iter(html)
            .filter(|c| {
                let attrs = c.get(1).map_or("", |m| m.as_str());
                !attrs.contains(" src=") && (skip_attr.is_empty() || !attrs.contains(skip_attr))
            })
            .filter_map(|c| c.get(2))
            .map(|m| m.as_str().len() as u64)
            .sum()
    };
    Observed {
        css: linked_size(&STYLESHEET) + inline_size(&INLINE_STYLE, "data-critical"),
        js: linked_size(&SCRIPT_SRC) + inline_size(&INLINE_SCRIPT, ""),
    }
}

impl Pass for Budget {
    fn name(&self) -> &'static str {
        "budget"
    }

    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        let budget = &ctx.config.performance.budget;
        let mut diagnostics = Vec::new();
        for artifact in &unit.artifacts {
            if !artifact.is_html() {
                continue;
            }
            let Some(html) = artifact.text() else {
                continue;
            };
            let observed = observe(html, ctx);
            for (kind, seen, limit) in [("css", observed.css, budget.css), ("js", observed.js, budget.js)] {
                if seen > limit {
                    diagnostics.push(Diagnostic::new(
                        Code::BudgetExceeded,
                        budget.severity,
                        Location::at(&unit.route.source, format!("performance.budget.{kind}")),
                        format!(
                            "route {} ships {kind}: observed {seen} bytes > configured {limit} bytes",
                            unit.route.path
                        ),
                    ));
                }
            }
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{SourceAsset, process_assets};
    use crate::cache::{AssetCache, CacheStats};
    use crate::config::SiteConfig;
    use crate::diagnostics::Severity;
    use crate::types::{RenderArtifact, Route};

    fn run(css_bytes: usize, config: &SiteConfig) -> Vec<Diagnostic> {
        let assets = [SourceAsset::new("/site.css", vec![b'a'; css_bytes])]
            .into_iter()
            .map(|a| (a.path.clone(), a))
            .collect();
        let (manifest, _) = process_assets(
            &assets,
            &config.performance,
            &mut AssetCache::default(),
            &mut CacheStats::default(),
        );
        let ctx = PassContext::new(config, &manifest, &[]);
        let html = format!(
            "<html><head><link rel=\"stylesheet\" href=\"{}\"><style data-critical>a{{}}</style></head><body><script>x()</script></body></html>",
            manifest["/site.css"].url()
        );
        let mut unit = RouteUnit::new(
            Route {
                path: "/".into(),
                source: "content/index".into(),
                locale: "en".into(),
                targets: vec!["html".into()],
                alternates: Vec::new(),
            },
            vec![RenderArtifact::new("index.html", "html", "text/html; charset=utf-8", html.into_bytes())],
        );
        Budget.apply(&mut unit, &ctx)
    }

    #[test]
    fn exactly_at_limit_passes() {
        assert!(run(51_200, &SiteConfig::default()).is_empty());
    }

    #[test]
    fn one_byte_over_fails_with_observed_and_configured() {
        let diags = run(51_201, &SiteConfig::default());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, Code::BudgetExceeded);
        assert_eq!(diags[0].severity, Severity::Error);
        assert!(diags[0].message.contains("observed 51201 bytes > configured 51200 bytes"));
    }

    #[test]
    fn severity_follows_config() {
        let mut config = SiteConfig::default();
        config.performance.budget.severity = Severity::Warning;
        let diags = run(60_000, &config);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn inline_scripts_count_toward_js() {
        let mut config = SiteConfig::default();
        config.performance.budget.js = 2;
        let diags = run(10, &config);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("js: observed 3 bytes"));
    }
}
