//! Critical CSS.
//!
//! With the default `external` strategy, the theme rules whose selectors
//! match something on the page (or appear in the safelist) are inlined in
//! `<style data-critical>` at the end of `<head>`, and the full stylesheet
//! link moves to the end of `<body>` so it no longer blocks first paint.
//! With the `inline` strategy the whole theme replaces the link as
//! `<style data-theme>`.
//!
//! Matching is deliberately coarse: a selector matches when every tag,
//! class and id it names occurs somewhere in the page. Pseudo-classes and
//! attribute selectors are ignored, so the result can only over-include.
//! `@media` and `@supports` blocks are filtered recursively; other at-rules
//! (`@font-face`, `@keyframes`, `@import`) stay in the deferred stylesheet.

use super::{Pass, PassContext, RouteUnit};
use crate::config::CssStrategy;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::scan::THEME_PATH;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("invalid css comment regex"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)").expect("invalid tag regex"));
static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sclass="([^"]*)""#).expect("invalid class regex"));
static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sid="([^"]*)""#).expect("invalid id regex"));
static IGNORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"::?[a-zA-Z-]+(\([^)]*\))?|\[[^\]]*\]").expect("invalid pseudo regex")
});
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([.#]?)(-?[_a-zA-Z][_a-zA-Z0-9-]*)").expect("invalid selector token regex")
});

pub struct CriticalCss;

/// Tags, classes and ids present in a page.
#[derive(Debug, Default)]
pub struct PageFeatures {
    tags: BTreeSet<String>,
    classes: BTreeSet<String>,
    ids: BTreeSet<String>,
}

impl PageFeatures {
    pub fn from_html(html: &str) -> Self {
        let mut features = Self::default();
        for c in TAG.captures_iter(html) {
            features.tags.insert(c[1].to_ascii_lowercase());
        }
        for c in CLASS_ATTR.captures_iter(html) {
            features
                .classes
                .extend(c[1].split_whitespace().map(String::from));
        }
        for c in ID_ATTR.captures_iter(html) {
            features.ids.insert(c[1].trim().to_string());
        }
        features
    }

    fn matches_one(&self, selector: &str, safelist: &[String]) -> bool {
        let selector = selector.trim();
        if safelist.iter().any(|s| s == selector) {
            return true;
        }
        let stripped = IGNORED.replace_all(selector, "");
        let mut all_present = true;
        for token in TOKEN.captures_iter(&stripped) {
            let (prefix, name) = (&token[1], &token[2]);
            let safelisted = !prefix.is_empty() && safelist.iter().any(|s| *s == format!("{prefix}{name}"));
            if safelisted {
                return true;
            }
            let present = match prefix {
                "." => self.classes.contains(name),
                "#" => self.ids.contains(name),
                _ => self.tags.contains(&name.to_ascii_lowercase()),
            };
            all_present &= present;
        }
        all_present
    }

    /// A selector list matches when any of its selectors does.
    pub fn matches(&self, selectors: &str, safelist: &[String]) -> bool {
        selectors.split(',').any(|s| self.matches_one(s, safelist))
    }
}

/// Index of the `}` closing the block that starts after `open`.
fn closing_brace(css: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, ch) in css[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Keep the rules `keep` accepts, recursing into conditional group rules.
pub fn filter_css(css: &str, keep: &dyn Fn(&str) -> bool) -> String {
    let css = COMMENT.replace_all(css, "");
    filter_block(&css, keep)
}

fn filter_block(css: &str, keep: &dyn Fn(&str) -> bool) -> String {
    let mut out = String::new();
    let mut rest = css;
    loop {
        let Some(open) = rest.find(['{', ';']) else {
            break;
        };
        let prelude = rest[..open].trim();
        if rest[open..].starts_with(';') {
            // Statement at-rule (`@import`, `@charset`).
            rest = &rest[open + 1..];
            continue;
        }
        let Some(close) = closing_brace(rest, open) else {
            break;
        };
        let body = &rest[open + 1..close];
        if prelude.starts_with("@media") || prelude.starts_with("@supports") {
            let inner = filter_block(body, keep);
            if !inner.is_empty() {
                out.push_str(&format!("{prelude}{{{inner}}}"));
            }
        } else if !prelude.starts_with('@') && !prelude.is_empty() && keep(prelude) {
            out.push_str(&format!("{prelude}{{{}}}", body.trim()));
        }
        rest = &rest[close + 1..];
    }
    out
}

fn theme_link() -> String {
    format!("<link rel=\"stylesheet\" href=\"{THEME_PATH}\">")
}

impl Pass for CriticalCss {
    fn name(&self) -> &'static str {
        "critical-css"
    }

    fn apply(&self, unit: &mut RouteUnit, ctx: &PassContext<'_>) -> Vec<Diagnostic> {
        let strategy = ctx.config.css.strategy;
        if strategy == CssStrategy::External && !ctx.config.performance.critical_css {
            return Vec::new();
        }
        let Some(theme) = ctx.theme_css() else {
            return Vec::new();
        };
        if theme.to_ascii_lowercase().contains("</style") {
            return vec![Diagnostic::warning(
                Code::OptimizationFailed,
                Location::source(THEME_PATH),
                "theme contains '</style' and cannot be inlined",
            )];
        }

        let link = theme_link();
        let mut styles = Vec::new();
        for artifact in unit.html_artifacts_mut() {
            let Some(html) = artifact.text() else {
                continue;
            };
            if !html.contains(&link) {
                continue;
            }
            let rewritten = match strategy {
                CssStrategy::Inline => {
                    styles.push(theme.to_string());
                    html.replacen(&link, &format!("<style data-theme>{theme}</style>"), 1)
                }
                CssStrategy::External => {
                    let features = PageFeatures::from_html(html);
                    let critical = filter_css(theme, &|sel| features.matches(sel, ctx.safelist));
                    let mut html = html.replacen(&link, "", 1);
                    if !critical.is_empty() {
                        if let Some(pos) = html.find("</head>") {
                            html.insert_str(pos, &format!("<style data-critical>{critical}</style>"));
                        }
                        styles.push(critical);
                    }
                    match html.rfind("</body>") {
                        Some(pos) => html.insert_str(pos, &link),
                        None => html.push_str(&link),
                    }
                    html
                }
            };
            artifact.bytes = rewritten.into_bytes();
        }
        unit.engine_styles.extend(styles);
        Vec::new()
    }
}
