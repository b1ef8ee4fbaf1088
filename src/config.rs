//! Site configuration module.
//!
//! Handles loading, validating, and merging `quarry.toml`. The user file is
//! sparse: it is merged on top of the stock defaults, so it only needs the
//! keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [site]
//! canonical = "http://localhost"
//! defaultLocale = "en"
//! locales = ["en"]
//! timezone = "UTC"
//!
//! [paths]
//! content = "content"
//! layouts = "layouts"
//! components = "components"
//! theme = "theme"
//! public = "public"
//! output = "dist"
//!
//! [performance.budget]
//! css = 51200
//! js = 102400
//! severity = "error"
//!
//! [[hooks]]
//! name = "robots"
//! phase = "emit"
//! capabilities = ["emit:robots.txt"]
//! ```
//!
//! Unknown keys are rejected to catch typos early (C001). Values that parse
//! but make no sense together are rejected by [`SiteConfig::validate`] (C002).

use crate::diagnostics::{Code, Diagnostic, Location, Severity};
use crate::plugin::{Capability, Phase};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default config file name, looked up in the project root.
pub const CONFIG_FILENAME: &str = "quarry.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn code(&self) -> Code {
        match self {
            ConfigError::Validation(_) => Code::ConfigRejected,
            _ => Code::ConfigInvalid,
        }
    }

    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        Diagnostic::error(self.code(), Location::source(source), self.to_string())
    }
}

/// Site configuration loaded from `quarry.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub site: SiteSection,
    pub paths: PathsConfig,
    pub blog: BlogConfig,
    pub performance: PerformanceConfig,
    pub security: SecurityConfig,
    pub render: RenderConfig,
    pub css: CssConfig,
    pub client: ClientConfig,
    /// Binds render targets to named renderers. A target with no binding
    /// uses the renderer of the same name.
    pub renderers: Vec<RendererBinding>,
    pub hooks: Vec<HookDecl>,
    pub routes: RoutesConfig,
    pub validation: ValidationConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct SiteSection {
    /// Absolute origin used for sitemap and canonical links.
    pub canonical: String,
    pub default_locale: String,
    pub locales: Vec<String>,
    pub timezone: String,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            canonical: "http://localhost".to_string(),
            default_locale: "en".to_string(),
            locales: vec!["en".to_string()],
            timezone: "UTC".to_string(),
        }
    }
}

impl SiteSection {
    /// Canonical origin without a trailing slash.
    pub fn origin(&self) -> &str {
        self.canonical.trim_end_matches('/')
    }
}

/// Input and output directories, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub content: String,
    pub layouts: String,
    pub components: String,
    pub theme: String,
    pub public: String,
    pub output: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            content: "content".to_string(),
            layouts: "layouts".to_string(),
            components: "components".to_string(),
            theme: "theme".to_string(),
            public: "public".to_string(),
            output: "dist".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlogConfig {
    /// Emit `listings.json` with dated pages, pages and taxonomy terms.
    pub listings: bool,
    /// Entries per listing page.
    pub pagination: usize,
    /// Metadata fields grouped into terms (`tags`, `categories`).
    pub taxonomies: Vec<String>,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            listings: false,
            pagination: 10,
            taxonomies: vec!["tags".to_string(), "categories".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct PerformanceConfig {
    /// Rewrite asset references to content-hashed names.
    pub asset_hashing: bool,
    /// Pre-compressed variants to emit. Only `gzip` is supported.
    pub precompress: Vec<String>,
    pub critical_css: bool,
    pub image_pipeline: ImagePipelineConfig,
    pub budget: BudgetConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            asset_hashing: true,
            precompress: vec!["gzip".to_string()],
            critical_css: true,
            image_pipeline: ImagePipelineConfig::default(),
            budget: BudgetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagePipelineConfig {
    /// Alternate formats derived for raster images (`webp`, `png`).
    pub formats: Vec<String>,
}

impl Default for ImagePipelineConfig {
    fn default() -> Self {
        Self {
            formats: vec!["webp".to_string()],
        }
    }
}

/// Per-route byte budgets for stylesheets and scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    pub css: u64,
    pub js: u64,
    pub severity: Severity,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            css: 50 * 1024,
            js: 100 * 1024,
            severity: Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Base Content-Security-Policy applied to every route.
    pub csp_template: String,
    /// Extra response headers applied to every route.
    pub headers: BTreeMap<String, String>,
    /// Per-route grants: route path → directive → sources.
    pub overrides: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

pub const DEFAULT_CSP: &str = "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; object-src 'none'; base-uri 'self'";

impl Default for SecurityConfig {
    fn default() -> Self {
        let headers = [
            ("Referrer-Policy", "strict-origin-when-cross-origin"),
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            csp_template: DEFAULT_CSP.to_string(),
            headers,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Default targets for pages that don't name their own.
    pub targets: Vec<String>,
    pub islands: IslandsConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            targets: vec!["html".to_string()],
            islands: IslandsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IslandsConfig {
    /// Public path of the script that hydrates `data-island` elements.
    pub runtime: String,
    /// Registered interactive behaviors.
    pub behaviors: Vec<String>,
}

impl Default for IslandsConfig {
    fn default() -> Self {
        Self {
            runtime: "/islands.js".to_string(),
            behaviors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CssStrategy {
    /// Critical rules inlined, full stylesheet linked at the end of body.
    #[default]
    External,
    /// Whole stylesheet inlined.
    Inline,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct CssConfig {
    pub strategy: CssStrategy,
    /// File of selectors (one per line) always kept in critical CSS.
    pub safelist_source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Public path of the client entry script.
    pub entry: Option<String>,
    /// Inject the entry into every HTML page.
    pub inject: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererBinding {
    pub target: String,
    pub renderer: String,
}

/// A plugin hook declaration. Hooks run only with the capabilities listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookDecl {
    pub name: String,
    pub phase: Phase,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub order: i64,
}

impl HookDecl {
    /// Parsed capabilities. Invalid strings are rejected by `validate`, so
    /// this silently skips them.
    pub fn granted(&self) -> BTreeSet<Capability> {
        self.capabilities
            .iter()
            .filter_map(|c| Capability::parse(c).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutesConfig {
    /// Alias path → target path.
    pub redirects: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Metadata fields every page must carry.
    pub required: Vec<String>,
    pub title_max_length: usize,
    pub description_max_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            required: vec!["title".to_string()],
            title_max_length: 70,
            description_max_length: 160,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

const SUPPORTED_PRECOMPRESS: &[&str] = &["gzip"];
const SUPPORTED_FORMATS: &[&str] = &["webp", "png"];

impl SiteConfig {
    /// Validate values that parse but are unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::Validation(msg));

        if !self.site.locales.contains(&self.site.default_locale) {
            return fail(format!(
                "site.defaultLocale '{}' must be listed in site.locales",
                self.site.default_locale
            ));
        }
        if !(self.site.canonical.starts_with("http://") || self.site.canonical.starts_with("https://")) {
            return fail("site.canonical must be an absolute http(s) URL".into());
        }
        if self.render.targets.is_empty() {
            return fail("render.targets must not be empty".into());
        }
        if self.blog.pagination == 0 {
            return fail("blog.pagination must be at least 1".into());
        }
        if self.processing.max_workers == Some(0) {
            return fail("processing.maxWorkers must be at least 1".into());
        }
        if self.security.csp_template.trim().is_empty() {
            return fail("security.cspTemplate must not be empty".into());
        }
        for method in &self.performance.precompress {
            if !SUPPORTED_PRECOMPRESS.contains(&method.as_str()) {
                return fail(format!("performance.precompress: unsupported method '{method}'"));
            }
        }
        for format in &self.performance.image_pipeline.formats {
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return fail(format!(
                    "performance.imagePipeline.formats: unsupported format '{format}'"
                ));
            }
        }
        let mut hook_names = BTreeSet::new();
        for hook in &self.hooks {
            if !hook_names.insert(hook.name.as_str()) {
                return fail(format!("hooks: '{}' is declared twice", hook.name));
            }
            for cap in &hook.capabilities {
                if let Err(e) = Capability::parse(cap) {
                    return fail(format!("hooks.{}: {e}", hook.name));
                }
            }
        }
        for (from, to) in &self.routes.redirects {
            if !from.starts_with('/') || !to.starts_with('/') {
                return fail(format!(
                    "routes.redirects: '{from}' -> '{to}' must both be absolute paths"
                ));
            }
        }
        Ok(())
    }

    /// Renderer name for a target, honoring `renderers[]` bindings.
    pub fn renderer_for<'a>(&'a self, target: &'a str) -> &'a str {
        self.renderers
            .iter()
            .find(|b| b.target == target)
            .map(|b| b.renderer.as_str())
            .unwrap_or(target)
    }

    /// SHA-256 over the serialized config. Any change invalidates every
    /// cached route.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(SiteConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_raw_config(config_path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config_path`, merged on top of stock defaults.
pub fn load_config(config_path: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(config_path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `quarry.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Quarry Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Site identity
# ---------------------------------------------------------------------------
[site]
# Absolute origin used in sitemap.xml and canonical links.
canonical = "http://localhost"
# Pages in other locales are served under /{locale}/...
defaultLocale = "en"
locales = ["en"]
timezone = "UTC"

# ---------------------------------------------------------------------------
# Directories (relative to the project root)
# ---------------------------------------------------------------------------
[paths]
content = "content"
layouts = "layouts"
components = "components"
theme = "theme"
public = "public"
output = "dist"

# ---------------------------------------------------------------------------
# Blog listings
# ---------------------------------------------------------------------------
[blog]
# Emit listings.json with dated pages and taxonomy terms.
listings = false
pagination = 10
taxonomies = ["tags", "categories"]

# ---------------------------------------------------------------------------
# Performance
# ---------------------------------------------------------------------------
[performance]
assetHashing = true
precompress = ["gzip"]
criticalCss = true

[performance.imagePipeline]
# Alternate formats served through <picture>: "webp", "png".
formats = ["webp"]

[performance.budget]
# Bytes of CSS and JS a single route may reference.
css = 51200
js = 102400
# "error" blocks the build, "warning" only reports.
severity = "error"

# ---------------------------------------------------------------------------
# Security headers
# ---------------------------------------------------------------------------
[security]
cspTemplate = "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; object-src 'none'; base-uri 'self'"

[security.headers]
Referrer-Policy = "strict-origin-when-cross-origin"
X-Content-Type-Options = "nosniff"
X-Frame-Options = "DENY"

# Per-route grants for sources a page or component declares it needs:
# [security.overrides."/contact"]
# script-src = ["https://maps.example.com"]
[security.overrides]

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[render]
targets = ["html"]

[render.islands]
runtime = "/islands.js"
behaviors = []

[css]
# "external": critical rules inlined, stylesheet deferred.
# "inline": whole stylesheet inlined.
strategy = "external"
# safelistSource = "safelist.txt"

[client]
# entry = "/app.js"
inject = false

# Bind a target to a different renderer:
# [[renderers]]
# target = "html"
# renderer = "html"

# Plugin hooks:
# [[hooks]]
# name = "robots"
# phase = "emit"
# capabilities = ["emit:robots.txt"]
# order = 0

# ---------------------------------------------------------------------------
# Routes
# ---------------------------------------------------------------------------
[routes.redirects]
# "/old-path" = "/new-path"

# ---------------------------------------------------------------------------
# Validation
# ---------------------------------------------------------------------------
[validation]
required = ["title"]
titleMaxLength = 70
descriptionMaxLength = 160

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# maxWorkers = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_site_defaults() {
        let config = SiteConfig::default();
        assert_eq!(config.site.default_locale, "en");
        assert_eq!(config.paths.output, "dist");
        assert_eq!(config.render.targets, vec!["html"]);
    }

    #[test]
    fn default_budget_is_fifty_kib_css() {
        let config = SiteConfig::default();
        assert_eq!(config.performance.budget.css, 51200);
        assert_eq!(config.performance.budget.js, 102400);
        assert_eq!(config.performance.budget.severity, Severity::Error);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[site]
canonical = "https://example.com"
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.site.canonical, "https://example.com");
        assert_eq!(config.site.default_locale, "en");
        assert_eq!(config.validation.title_max_length, 70);
    }

    #[test]
    fn parse_camel_case_keys() {
        let toml = r#"
[validation]
titleMaxLength = 50

[processing]
maxWorkers = 2
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.validation.title_max_length, 50);
        assert_eq!(config.processing.max_workers, Some(2));
    }

    #[test]
    fn parse_hooks_and_renderers() {
        let toml = r#"
[[renderers]]
target = "feed"
renderer = "json"

[[hooks]]
name = "robots"
phase = "emit"
capabilities = ["emit:robots.txt"]
order = -1
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.renderer_for("feed"), "json");
        assert_eq!(config.renderer_for("html"), "html");
        assert_eq!(config.hooks[0].phase, Phase::Emit);
        assert_eq!(config.hooks[0].order, -1);
        assert_eq!(config.hooks[0].granted().len(), 1);
    }

    #[test]
    fn parse_security_overrides() {
        let toml = r#"
[security.overrides."/contact"]
script-src = ["https://maps.example.com"]
"#;
        let config: SiteConfig = toml::from_str(toml).unwrap();
        let grants = &config.security.overrides["/contact"]["script-src"];
        assert_eq!(grants, &vec!["https://maps.example.com".to_string()]);
    }

    // =========================================================================
    // load_config tests
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.site.canonical, "http://localhost");
        assert_eq!(config.security.headers.len(), 3);
    }

    #[test]
    fn load_config_merges_headers_over_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(
            &path,
            r#"
[security.headers]
X-Frame-Options = "SAMEORIGIN"
Permissions-Policy = "camera=()"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.security.headers["X-Frame-Options"], "SAMEORIGIN");
        assert_eq!(config.security.headers["X-Content-Type-Options"], "nosniff");
        assert_eq!(config.security.headers.len(), 4);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "this is not valid toml [[[").unwrap();

        let result = load_config(&path);
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[budget]
css = 100
js = 200
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[budget]
css = 50
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let budget = merged.get("budget").unwrap();
        assert_eq!(budget.get("css").unwrap().as_integer(), Some(50));
        assert_eq!(budget.get("js").unwrap().as_integer(), Some(200));
    }

    #[test]
    fn merge_toml_arrays_replace() {
        let base: toml::Value = toml::from_str(r#"targets = ["html", "json"]"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"targets = ["json"]"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("targets").unwrap().as_array().unwrap().len(), 1);
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected_and_named() {
        let toml_str = r#"
[performance]
assetHashng = true
"#;
        let result: Result<SiteConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
        assert!(err.contains("assetHashng"));
    }

    #[test]
    fn unknown_section_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILENAME);
        fs::write(&path, "[themez]\nx = 1\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert_eq!(err.code(), Code::ConfigInvalid);
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(SiteConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_default_locale_must_be_listed() {
        let mut config = SiteConfig::default();
        config.site.default_locale = "de".into();
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), Code::ConfigRejected);
        assert!(err.to_string().contains("defaultLocale"));
    }

    #[test]
    fn validate_rejects_bad_capability() {
        let mut config = SiteConfig::default();
        config.hooks.push(HookDecl {
            name: "x".into(),
            phase: Phase::Emit,
            capabilities: vec!["launch:missiles".into()],
            order: 0,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_hook_names() {
        let mut config = SiteConfig::default();
        let hook = HookDecl {
            name: "robots".into(),
            phase: Phase::Emit,
            capabilities: vec![],
            order: 0,
        };
        config.hooks = vec![hook.clone(), hook];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_precompress() {
        let mut config = SiteConfig::default();
        config.performance.precompress = vec!["brotli".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_zero_workers() {
        let mut config = SiteConfig::default();
        config.processing.max_workers = Some(0);
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // effective_threads tests
    // =========================================================================

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_workers: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_workers: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // stock_config_toml / stock_defaults_value tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: SiteConfig = toml::from_str(stock_config_toml()).unwrap();
        let defaults = SiteConfig::default();
        assert_eq!(config.fingerprint(), defaults.fingerprint());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        for section in ["site", "paths", "performance", "security", "render", "validation"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let a = SiteConfig::default();
        let mut b = SiteConfig::default();
        b.site.canonical = "https://example.com".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
