//! Document validation.
//!
//! Every rule is a pure function of one document and a read-only
//! [`ValidationContext`]. Rules never stop at the first problem: a page
//! missing both its title and description gets two diagnostics. Validation
//! runs as a parallel map over documents followed by a canonical sort, so
//! the result does not depend on which worker finished first.
//!
//! | Code | Rule |
//! |------|------|
//! | V001 | required metadata field missing (pages) |
//! | V002 | title or description longer than configured |
//! | V003 | `date` / `updated` not `YYYY-MM-DD` or RFC 3339 |
//! | V004 | component instance missing a required prop |
//! | V005 | unregistered interactive behavior |
//! | V006 | template interpolation inside an attribute value |
//! | V007 | inline event handler or `javascript:` URL |
//! | V008 | referenced stylesheet or script over budget |
//! | V009 | locale not listed in `site.locales` |

use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location, canonicalize};
use crate::document::{CanonicalDocument, ComponentManifest, DocumentKind, Node};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Read-only inputs shared by every rule.
pub struct ValidationContext<'a> {
    pub config: &'a SiteConfig,
    /// Component name → manifest.
    pub components: BTreeMap<String, &'a ComponentManifest>,
    /// Public asset path → size in bytes.
    pub asset_sizes: &'a BTreeMap<String, u64>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(
        config: &'a SiteConfig,
        documents: &'a BTreeMap<String, CanonicalDocument>,
        asset_sizes: &'a BTreeMap<String, u64>,
    ) -> Self {
        let components = documents
            .values()
            .filter(|d| d.kind == DocumentKind::Component)
            .filter_map(|d| {
                d.id.strip_prefix("components/")
                    .map(|name| (name.to_string(), &d.manifest))
            })
            .collect();
        Self {
            config,
            components,
            asset_sizes,
        }
    }
}

type Rule = fn(&CanonicalDocument, &ValidationContext, &mut Vec<Diagnostic>);

const RULES: &[Rule] = &[
    required_fields,
    field_lengths,
    dates,
    component_props,
    behaviors,
    attribute_interpolation,
    inline_handlers,
    asset_budgets,
    locale_listed,
];

/// All diagnostics for one document, canonically ordered.
pub fn validate_document(doc: &CanonicalDocument, ctx: &ValidationContext) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for rule in RULES {
        rule(doc, ctx, &mut diagnostics);
    }
    canonicalize(&mut diagnostics);
    diagnostics
}

/// Validate every document in parallel. Draft pages are skipped; they never
/// produce output.
pub fn validate_all(
    documents: &BTreeMap<String, CanonicalDocument>,
    ctx: &ValidationContext,
) -> Vec<Diagnostic> {
    let docs: Vec<&CanonicalDocument> = documents
        .values()
        .filter(|d| !(d.kind == DocumentKind::Page && d.meta.is_draft()))
        .collect();
    let mut diagnostics: Vec<Diagnostic> = docs
        .par_iter()
        .flat_map_iter(|doc| validate_document(doc, ctx))
        .collect();
    canonicalize(&mut diagnostics);
    diagnostics
}

// =============================================================================
// Rules
// =============================================================================

fn required_fields(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    if doc.kind != DocumentKind::Page {
        return;
    }
    for field in &ctx.config.validation.required {
        if !doc.meta.has_field(field) {
            out.push(Diagnostic::error(
                Code::MissingMetadata,
                Location::at(&doc.id, format!("meta.{field}")),
                format!("required field '{field}' is missing"),
            ));
        }
    }
}

fn field_lengths(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    let limits = [
        ("title", ctx.config.validation.title_max_length),
        ("description", ctx.config.validation.description_max_length),
    ];
    for (field, max) in limits {
        if let Some(value) = doc.meta.field(field) {
            let len = value.chars().count();
            if len > max {
                out.push(Diagnostic::error(
                    Code::MetadataTooLong,
                    Location::at(&doc.id, format!("meta.{field}")),
                    format!("'{field}' is {len} characters (max {max})"),
                ));
            }
        }
    }
}

/// `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn is_valid_date(value: &str) -> bool {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
        || chrono::DateTime::parse_from_rfc3339(value).is_ok()
}

fn dates(doc: &CanonicalDocument, _ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    for field in ["date", "updated"] {
        if let Some(value) = doc.meta.field(field)
            && !is_valid_date(value)
        {
            out.push(Diagnostic::error(
                Code::MalformedDate,
                Location::at(&doc.id, format!("meta.{field}")),
                format!("'{value}' is not YYYY-MM-DD or RFC 3339"),
            ));
        }
    }
}

fn component_props(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    doc.walk(|path, node| {
        let Node::Component { name, props, .. } = node else {
            return;
        };
        let Some(manifest) = ctx.components.get(name) else {
            return;
        };
        for required in &manifest.required_props {
            if !props.contains_key(required) {
                out.push(Diagnostic::error(
                    Code::MissingComponentProp,
                    Location::at(&doc.id, path),
                    format!("component '{name}' requires prop '{required}'"),
                ));
            }
        }
    });
}

fn behaviors(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    let registered = &ctx.config.render.islands.behaviors;
    let mut check = |behavior: &str, path: &str| {
        if !registered.iter().any(|b| b == behavior) {
            out.push(Diagnostic::error(
                Code::UnregisteredBehavior,
                Location::at(&doc.id, path),
                format!("behavior '{behavior}' is not registered in render.islands.behaviors"),
            ));
        }
    };
    for (i, behavior) in doc.manifest.behaviors.iter().enumerate() {
        check(behavior, &format!("manifest.behaviors.{i}"));
    }
    doc.walk(|path, node| {
        if let Node::Component {
            behavior: Some(behavior),
            ..
        } = node
        {
            check(behavior, path);
        }
    });
}

const INTERPOLATION_MARKERS: &[&str] = &["{{", "{%", "${"];

fn attribute_interpolation(doc: &CanonicalDocument, _ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    doc.walk(|path, node| {
        let Node::Element { attrs, .. } = node else {
            return;
        };
        for (name, value) in attrs {
            if let Some(marker) = INTERPOLATION_MARKERS.iter().find(|m| value.contains(**m)) {
                out.push(Diagnostic::error(
                    Code::AttributeInterpolation,
                    Location::at(&doc.id, format!("{path}.attrs.{name}")),
                    format!("attribute '{name}' contains template interpolation '{marker}'"),
                ));
            }
        }
    });
}

const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "xlink:href"];

/// True for `javascript:` URLs, ignoring case and embedded whitespace.
pub fn is_javascript_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.starts_with("javascript:")
}

fn inline_handlers(doc: &CanonicalDocument, _ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    doc.walk(|path, node| {
        let mut flag = |attr: &str, message: String| {
            out.push(Diagnostic::error(
                Code::InlineCspViolation,
                Location::at(&doc.id, format!("{path}.{attr}")),
                message,
            ));
        };
        match node {
            Node::Element { attrs, .. } => {
                for (name, value) in attrs {
                    let lower = name.to_ascii_lowercase();
                    if lower.starts_with("on") && lower.len() > 2 {
                        flag(
                            &format!("attrs.{name}"),
                            format!("inline event handler '{name}' violates the content security policy"),
                        );
                    } else if URL_ATTRIBUTES.contains(&lower.as_str()) && is_javascript_url(value) {
                        flag(
                            &format!("attrs.{name}"),
                            format!("'{name}' uses a javascript: URL"),
                        );
                    }
                }
            }
            Node::Asset { path: url, .. } if is_javascript_url(url) => {
                flag("path", "asset path uses a javascript: URL".to_string());
            }
            _ => {}
        }
    });
}

fn asset_budgets(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    let budget = &ctx.config.performance.budget;
    doc.walk(|path, node| {
        let (url, limit, what) = match node {
            Node::Style { href: Some(href), .. } => (href, budget.css, "stylesheet"),
            Node::Script { src: Some(src), .. } => (src, budget.js, "script"),
            _ => return,
        };
        if let Some(&size) = ctx.asset_sizes.get(url.as_str())
            && size > limit
        {
            out.push(Diagnostic::new(
                Code::AssetOverBudget,
                budget.severity,
                Location::at(&doc.id, path),
                format!("{what} '{url}' is {size} bytes, budget is {limit} bytes"),
            ));
        }
    });
}

fn locale_listed(doc: &CanonicalDocument, ctx: &ValidationContext, out: &mut Vec<Diagnostic>) {
    if let Some(locale) = &doc.meta.locale
        && !ctx.config.site.locales.contains(locale)
    {
        out.push(Diagnostic::error(
            Code::UnknownLocale,
            Location::at(&doc.id, "meta.locale"),
            format!("locale '{locale}' is not listed in site.locales"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::test_helpers::*;
    use serde_json::json;

    fn check(doc: &CanonicalDocument) -> Vec<Diagnostic> {
        check_with(doc, &SiteConfig::default(), vec![], &BTreeMap::new())
    }

    fn check_with(
        doc: &CanonicalDocument,
        config: &SiteConfig,
        others: Vec<CanonicalDocument>,
        sizes: &BTreeMap<String, u64>,
    ) -> Vec<Diagnostic> {
        let docs = doc_map(others);
        let ctx = ValidationContext::new(config, &docs, sizes);
        validate_document(doc, &ctx)
    }

    fn codes(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.code.as_str()).collect()
    }

    // =========================================================================
    // Metadata rules
    // =========================================================================

    #[test]
    fn clean_page_has_no_diagnostics() {
        assert!(check(&page("content/about", "About")).is_empty());
    }

    #[test]
    fn missing_title_and_description_are_both_reported() {
        let mut config = SiteConfig::default();
        config.validation.required = vec!["title".into(), "description".into()];
        let doc = document("content/about", DocumentKind::Page);
        let diags = check_with(&doc, &config, vec![], &BTreeMap::new());
        assert_eq!(codes(&diags), vec!["V001", "V001"]);
        assert_eq!(diags[0].location.path.as_deref(), Some("meta.description"));
        assert_eq!(diags[1].location.path.as_deref(), Some("meta.title"));
    }

    #[test]
    fn required_fields_only_apply_to_pages() {
        let doc = partial("content/snippet", vec![]);
        assert!(check(&doc).is_empty());
    }

    #[test]
    fn title_length_limit() {
        let at_limit = page("content/a", &"x".repeat(70));
        assert!(check(&at_limit).is_empty());
        let over = page("content/a", &"x".repeat(71));
        assert_eq!(codes(&check(&over)), vec!["V002"]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let doc = page("content/a", &"é".repeat(70));
        assert!(check(&doc).is_empty());
    }

    #[test]
    fn date_formats() {
        assert!(is_valid_date("2024-02-29"));
        assert!(is_valid_date("2024-03-01T10:00:00+02:00"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("March 3rd"));

        let mut doc = page("content/a", "A");
        doc.meta.date = Some("2024-13-01".into());
        doc.meta.updated = Some("yesterday".into());
        assert_eq!(codes(&check(&doc)), vec!["V003", "V003"]);
    }

    #[test]
    fn unknown_locale() {
        let mut doc = page("content/a", "A");
        doc.meta.locale = Some("de".into());
        assert_eq!(codes(&check(&doc)), vec!["V009"]);
    }

    // =========================================================================
    // Body rules
    // =========================================================================

    #[test]
    fn component_missing_required_prop() {
        let card = component("card", &["title", "href"], vec![]);
        let doc = with_body(
            page("content/a", "A"),
            vec![comp_props("card", &[("title", json!("Hi"))])],
        );
        let diags = check_with(&doc, &SiteConfig::default(), vec![card], &BTreeMap::new());
        assert_eq!(codes(&diags), vec!["V004"]);
        assert!(diags[0].message.contains("'href'"));
    }

    #[test]
    fn unregistered_behavior() {
        let doc = with_body(page("content/a", "A"), vec![island("map", "leaflet")]);
        assert_eq!(codes(&check(&doc)), vec!["V005"]);

        let mut config = SiteConfig::default();
        config.render.islands.behaviors = vec!["leaflet".into()];
        assert!(check_with(&doc, &config, vec![], &BTreeMap::new()).is_empty());
    }

    #[test]
    fn interpolation_in_attribute() {
        let doc = with_body(
            page("content/a", "A"),
            vec![el_attrs("a", &[("href", "/x/{{ slug }}")], vec![])],
        );
        let diags = check(&doc);
        assert_eq!(codes(&diags), vec!["V006"]);
        assert_eq!(diags[0].location.path.as_deref(), Some("body.0.attrs.href"));
    }

    #[test]
    fn inline_handlers_and_javascript_urls() {
        let doc = with_body(
            page("content/a", "A"),
            vec![
                el_attrs("button", &[("onclick", "go()")], vec![]),
                el_attrs("a", &[("href", " JavaScript:alert(1)")], vec![]),
                el_attrs("a", &[("href", "/ok")], vec![]),
            ],
        );
        assert_eq!(codes(&check(&doc)), vec!["V007", "V007"]);
    }

    #[test]
    fn stylesheet_budget_uses_configured_severity() {
        let sizes: BTreeMap<String, u64> = [
            ("/big.css".to_string(), 51_201),
            ("/ok.css".to_string(), 51_200),
        ]
        .into();
        let doc = with_body(page("content/a", "A"), vec![style("/big.css"), style("/ok.css")]);
        let diags = check_with(&doc, &SiteConfig::default(), vec![], &sizes);
        assert_eq!(codes(&diags), vec!["V008"]);
        assert_eq!(diags[0].severity, Severity::Error);

        let mut config = SiteConfig::default();
        config.performance.budget.severity = Severity::Warning;
        let diags = check_with(&doc, &config, vec![], &sizes);
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn every_violation_is_reported() {
        let mut doc = with_body(
            document("content/a", DocumentKind::Page),
            vec![
                el_attrs("div", &[("onload", "x()"), ("title", "${x}")], vec![]),
                island("m", "nope"),
            ],
        );
        doc.meta.date = Some("bad".into());
        let diags = check(&doc);
        let mut found = codes(&diags);
        found.sort();
        assert_eq!(found, vec!["V001", "V003", "V005", "V006", "V007"]);
    }

    // =========================================================================
    // validate_all
    // =========================================================================

    #[test]
    fn validate_all_is_sorted_and_skips_drafts() {
        let mut draft = document("content/draft", DocumentKind::Page);
        draft.meta.status = crate::document::Status::Draft;
        let docs = doc_map(vec![
            document("content/z", DocumentKind::Page),
            document("content/b", DocumentKind::Page),
            draft,
        ]);
        let config = SiteConfig::default();
        let sizes = BTreeMap::new();
        let ctx = ValidationContext::new(&config, &docs, &sizes);
        let diags = validate_all(&docs, &ctx);
        let sources: Vec<&str> = diags.iter().map(|d| d.location.source.as_str()).collect();
        assert_eq!(sources, vec!["content/b", "content/z"]);
    }
}
