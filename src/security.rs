//! Security header generation.
//!
//! Each route gets a Content-Security-Policy derived from the site template
//! (`security.cspTemplate`) plus whatever the rendered page actually needs:
//!
//! | Found in HTML | Requirement |
//! |---------------|-------------|
//! | inline `<script>` | `script-src 'sha256-…'` |
//! | inline `<style>` | `style-src 'sha256-…'` |
//! | `style="…"` attribute | `style-src 'unsafe-inline'` |
//! | remote `<script src>` | `script-src <origin>` |
//! | remote `<link rel="stylesheet">` | `style-src <origin>` |
//! | remote `<img>` / `<source srcset>` | `img-src <origin>` |
//! | remote `<video src>` | `media-src <origin>` |
//!
//! A requirement the template already covers needs nothing. Inline styles
//! the engine wrote itself (critical CSS) are added automatically. Anything
//! else must be **declared** by the page or a component it uses (S001
//! otherwise) and **granted** for the route in `security.overrides` (S002
//! otherwise). Both are errors: an unapproved source never ships.

use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::document::PolicyException;
use crate::types::Route;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

pub const CSP_HEADER: &str = "Content-Security-Policy";

static INLINE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script(\s[^>]*)?>(.*?)</script>").expect("invalid inline script regex")
});
static INLINE_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style(\s[^>]*)?>(.*?)</style>").expect("invalid inline style regex")
});
static STYLE_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<[a-zA-Z][^>]*\sstyle=""#).expect("invalid style attribute regex"));
static FETCHING_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(script|img|link|source|video)\b[^>]*>").expect("invalid fetching tag regex")
});
static URL_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s(src|href|srcset|rel)="([^"]*)""#).expect("invalid url attribute regex"));

/// A parsed policy. Directive order follows the template; directives added
/// later are appended in name order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    directives: Vec<(String, Vec<String>)>,
}

impl Policy {
    pub fn parse(template: &str) -> Self {
        let mut directives: Vec<(String, Vec<String>)> = Vec::new();
        for part in template.split(';') {
            let mut words = part.split_whitespace();
            let Some(name) = words.next() else {
                continue;
            };
            let name = name.to_ascii_lowercase();
            if directives.iter().any(|(n, _)| *n == name) {
                continue;
            }
            directives.push((name, words.map(String::from).collect()));
        }
        Self { directives }
    }

    fn get(&self, directive: &str) -> Option<&Vec<String>> {
        self.directives
            .iter()
            .find(|(n, _)| n == directive)
            .map(|(_, s)| s)
    }

    /// Sources in force for `directive`, falling back to `default-src`.
    pub fn effective(&self, directive: &str) -> &[String] {
        self.get(directive)
            .or_else(|| self.get("default-src"))
            .map_or(&[], |s| s.as_slice())
    }

    pub fn allows(&self, directive: &str, source: &str) -> bool {
        let sources = self.effective(directive);
        if sources.iter().any(|s| s == source || s == "*") {
            return true;
        }
        if source.starts_with("'sha256-") {
            return sources.iter().any(|s| s == "'unsafe-inline'");
        }
        match source.split_once("://") {
            Some((scheme, host)) => sources.iter().any(|s| {
                *s == format!("{scheme}:")
                    || s.strip_prefix("*.").is_some_and(|suffix| {
                        host.ends_with(&format!(".{suffix}"))
                    })
                    || s.strip_prefix(&format!("{scheme}://*.")).is_some_and(|suffix| {
                        host.ends_with(&format!(".{suffix}"))
                    })
            }),
            None => false,
        }
    }

    /// Add a source, creating the directive from `default-src` when the
    /// template does not name it.
    pub fn add(&mut self, directive: &str, source: &str) {
        if self.get(directive).is_none() {
            let inherited = self.effective(directive).to_vec();
            self.directives.push((directive.to_string(), inherited));
        }
        if let Some((_, sources)) = self.directives.iter_mut().find(|(n, _)| n == directive)
            && !sources.iter().any(|s| s == source)
        {
            sources.retain(|s| s != "'none'");
            sources.push(source.to_string());
        }
    }

    pub fn render(&self) -> String {
        self.directives
            .iter()
            .map(|(name, sources)| {
                if sources.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {}", sources.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// One thing the page needs from the policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Requirement {
    pub directive: String,
    pub source: String,
    /// Inline CSS the engine wrote; always allowed.
    #[serde(skip)]
    pub engine_owned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Resolution {
    /// Already allowed by the template.
    Template,
    Engine,
    Granted,
    Undeclared,
    NotGranted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRequirement {
    pub directive: String,
    pub source: String,
    pub resolution: Resolution,
}

/// Headers and the audit trail for one route.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityOutcome {
    pub csp: String,
    pub headers: BTreeMap<String, String>,
    pub requirements: Vec<ResolvedRequirement>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn csp_hash(content: &str) -> String {
    format!("'sha256-{}'", STANDARD.encode(Sha256::digest(content.as_bytes())))
}

/// `scheme://host[:port]` of a remote URL; `None` for local or relative ones.
pub fn origin_of(url: &str) -> Option<String> {
    let url = url.trim();
    let (scheme, rest) = if let Some(rest) = url.strip_prefix("//") {
        ("https", rest)
    } else {
        let (scheme, rest) = url.split_once("://")?;
        (scheme, rest)
    };
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = rest.split(['/', '?', '#']).next()?.to_ascii_lowercase();
    (!host.is_empty()).then(|| format!("{scheme}://{host}"))
}

/// Everything the page needs, sorted and deduplicated.
pub fn detect_requirements(html: &str, engine_styles: &[String]) -> BTreeSet<Requirement> {
    let mut found = BTreeSet::new();
    let mut push = |directive: &str, source: String, engine_owned: bool| {
        found.insert(Requirement {
            directive: directive.to_string(),
            source,
            engine_owned,
        });
    };

    for c in INLINE_SCRIPT.captures_iter(html) {
        let attrs = c.get(1).map_or("", |m| m.as_str());
        let body = c.get(2).map_or("", |m| m.as_str());
        if !attrs.contains(" src=") && !body.is_empty() {
            push("script-src", csp_hash(body), false);
        }
    }
    for c in INLINE_STYLE.captures_iter(html) {
        let body = c.get(2).map_or("", |m| m.as_str());
        if !body.is_empty() {
            let engine = engine_styles.iter().any(|s| s == body);
            push("style-src", csp_hash(body), engine);
        }
    }
    if STYLE_ATTR.is_match(html) {
        push("style-src", "'unsafe-inline'".to_string(), false);
    }

    for tag in FETCHING_TAG.captures_iter(html) {
        let name = tag[1].to_ascii_lowercase();
        let mut rel = "";
        let mut urls = Vec::new();
        for attr in URL_ATTR.captures_iter(&tag[0]) {
            match &attr[1] {
                "rel" => rel = attr.get(2).map_or("", |m| m.as_str()),
                "srcset" => urls.extend(
                    attr[2]
                        .split(',')
                        .filter_map(|candidate| candidate.split_whitespace().next())
                        .map(String::from),
                ),
                _ => urls.push(attr[2].to_string()),
            }
        }
        let directive = match name.as_str() {
            "script" => "script-src",
            "link" if rel.eq_ignore_ascii_case("stylesheet") => "style-src",
            "img" | "source" => "img-src",
            "video" => "media-src",
            _ => continue,
        };
        for url in urls {
            if let Some(origin) = origin_of(&url) {
                push(directive, origin, false);
            }
        }
    }
    found
}

/// Build the headers for one route from its rendered HTML.
///
/// `declared` holds the exceptions declared by the page and the components
/// it uses; `engine_styles` the inline CSS the pipeline wrote.
pub fn generate_headers(
    route: &Route,
    html: &[&str],
    declared: &BTreeSet<PolicyException>,
    engine_styles: &[String],
    config: &SiteConfig,
) -> SecurityOutcome {
    let mut policy = Policy::parse(&config.security.csp_template);
    let grants = config.security.overrides.get(&route.path);
    let mut requirements: BTreeSet<Requirement> = BTreeSet::new();
    for page in html {
        requirements.extend(detect_requirements(page, engine_styles));
    }

    let mut outcome = SecurityOutcome::default();
    for req in requirements {
        let resolution = if policy.allows(&req.directive, &req.source) {
            Resolution::Template
        } else if req.engine_owned {
            policy.add(&req.directive, &req.source);
            Resolution::Engine
        } else {
            // An inline hash may be declared as 'unsafe-inline' for the
            // directive; the policy still only gets the hash.
            let declaration = declared.iter().find(|d| {
                d.directive == req.directive
                    && (d.source == req.source
                        || (req.source.starts_with("'sha256-") && d.source == "'unsafe-inline'"))
            });
            match declaration {
                None => {
                    outcome.diagnostics.push(Diagnostic::error(
                        Code::UndeclaredPolicyException,
                        Location::at(&route.source, format!("csp.{}", req.directive)),
                        format!(
                            "route {} needs {} {} but no page or component declares it",
                            route.path, req.directive, req.source
                        ),
                    ));
                    Resolution::Undeclared
                }
                Some(declaration) => {
                    let granted = grants
                        .and_then(|g| g.get(&req.directive))
                        .is_some_and(|sources| sources.contains(&declaration.source));
                    if granted {
                        policy.add(&req.directive, &req.source);
                        Resolution::Granted
                    } else {
                        outcome.diagnostics.push(Diagnostic::error(
                            Code::PolicyExceptionNotGranted,
                            Location::at(&route.source, format!("csp.{}", req.directive)),
                            format!(
                                "{} {} is declared but not granted in security.overrides[\"{}\"]",
                                req.directive, declaration.source, route.path
                            ),
                        ));
                        Resolution::NotGranted
                    }
                }
            }
        };
        outcome.requirements.push(ResolvedRequirement {
            directive: req.directive,
            source: req.source,
            resolution,
        });
    }

    outcome.csp = policy.render();
    outcome.headers = config.security.headers.clone();
    outcome
        .headers
        .insert(CSP_HEADER.to_string(), outcome.csp.clone());
    outcome
}
