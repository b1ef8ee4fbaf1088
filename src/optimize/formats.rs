//! Format derivation: an `<img>` whose asset has derived variants is wrapped
//! in `<picture>` with one `<source>` per variant, in configured format
//! order. Images already inside a `<picture>` are left alone.

use super::{Pass, PassContext, RouteUnit};
use crate::assets::content_type_for;
use crate::diagnostics::Diagnostic;
use regex::Regex;
use std::sync::LazyLock;

static PICTURE_OR_IMG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<picture\b[^>]*>|</picture>|<img\b[^>]*>").expect("invalid picture regex")
});
static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\ssrc="([^"]*)""#).expect("invalid img src regex"));

pub struct FormatDerivation;

impl Pass for FormatDerivation {
    fn name(&self) -> &'static str {
        "format-derivation"
    }

    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        for artifact in unit.html_artifacts_mut() {
            let Some(html) = artifact.text() else {
                continue;
            };
            let mut out = String::with_capacity(html.len());
            let mut last = 0;
            let mut inside_picture = 0usize;
            for m in PICTURE_OR_IMG.find_iter(html) {
                let tag = m.as_str();
                let lower = tag.to_ascii_lowercase();
                if lower.starts_with("<picture") {
                    inside_picture += 1;
                    continue;
                }
                if lower.starts_with("</picture") {
                    inside_picture = inside_picture.saturating_sub(1);
                    continue;
                }
                if inside_picture > 0 {
                    continue;
                }
                let Some(src) = IMG_SRC.captures(tag).map(|c| c[1].to_string()) else {
                    continue;
                };
                let Some(asset) = ctx.by_url.get(&src) else {
                    continue;
                };
                if asset.variants.is_empty() {
                    continue;
                }
                out.push_str(&html[last..m.start()]);
                out.push_str("<picture>");
                for variant in &asset.variants {
                    out.push_str(&format!(
                        "<source srcset=\"{}\" type=\"{}\">",
                        variant.url(),
                        content_type_for(&variant.file)
                    ));
                }
                out.push_str(tag);
                out.push_str("</picture>");
                last = m.end();
            }
            out.push_str(&html[last..]);
            artifact.bytes = out.into_bytes();
        }
        Vec::new()
    }
}
