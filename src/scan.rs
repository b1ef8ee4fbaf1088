//! Project loading.
//!
//! Reads a project directory into a [`SiteInput`]: canonical documents,
//! public assets, the concatenated theme stylesheet and the CSS safelist.
//!
//! ## Directory Structure
//!
//! ```text
//! site/
//! ├── quarry.toml                  # Site configuration (optional)
//! ├── content/                     # Pages and partials
//! │   ├── 010-about.json           # → content/010-about, route /about
//! │   └── blog/
//! │       ├── index.json           # → content/blog/index, route /blog
//! │       └── hello.json
//! ├── layouts/
//! │   └── base.json                # → layouts/base
//! ├── components/
//! │   └── card.json                # → components/card
//! ├── theme/                       # *.css, concatenated by name → /theme.css
//! │   ├── 00-reset.css
//! │   └── 10-site.css
//! └── public/                      # Copied as assets, keyed by URL path
//!     └── img/cat.jpg              # → /img/cat.jpg
//! ```
//!
//! Document ids come from the file location, not from the JSON: the
//! namespace (`content`, `layouts`, `components`) followed by the relative
//! path without `.json`. Provenance records the origin file and the
//! namespace, which is the sandbox root for includes.
//!
//! Hidden files and directories (leading `.`) are skipped everywhere. All
//! walks are sorted by file name so two scans of the same tree produce the
//! same input.

use crate::assets::SourceAsset;
use crate::config::SiteConfig;
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::document::{CanonicalDocument, Provenance};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// URL path of the concatenated theme stylesheet.
pub const THEME_PATH: &str = "/theme.css";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to walk {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid document {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ScanError {
    /// Report against the offending file when known, otherwise `root`.
    pub fn to_diagnostic(&self, root: &Path) -> Diagnostic {
        let source = match self {
            ScanError::Json { path, .. } => path.strip_prefix(root).unwrap_or(path).display().to_string(),
            _ => root.display().to_string(),
        };
        Diagnostic::error(Code::InputUnreadable, Location::source(source), self.to_string())
    }
}

/// Everything a pass consumes.
#[derive(Debug, Clone, Default)]
pub struct SiteInput {
    pub documents: BTreeMap<String, CanonicalDocument>,
    /// Keyed by URL path (`/img/cat.jpg`).
    pub assets: BTreeMap<String, SourceAsset>,
    /// Selectors always kept by critical CSS extraction.
    pub safelist: Vec<String>,
}

impl SiteInput {
    pub fn asset_sizes(&self) -> BTreeMap<String, u64> {
        self.assets
            .iter()
            .map(|(path, asset)| (path.clone(), asset.bytes.len() as u64))
            .collect()
    }
}

/// What a changed filesystem path means for the next pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// A document id or asset URL path.
    Node(String),
    /// Something every route depends on (config, theme, safelist).
    Everything,
}

fn namespaces(config: &SiteConfig) -> [(&'static str, &str); 3] {
    [
        ("content", config.paths.content.as_str()),
        ("layouts", config.paths.layouts.as_str()),
        ("components", config.paths.components.as_str()),
    ]
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Sorted, non-hidden files under `dir`. A missing directory yields nothing.
fn files_under(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
    {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Forward-slash relative path, so ids are the same on every platform.
fn relative_slash_path(path: &Path, base: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<&str> = rel.components().filter_map(|c| c.as_os_str().to_str()).collect();
    Some(parts.join("/"))
}

pub fn scan(root: &Path, config: &SiteConfig) -> Result<SiteInput, ScanError> {
    let mut input = SiteInput::default();

    for (namespace, dir) in namespaces(config) {
        let base = root.join(dir);
        for path in files_under(&base)? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(rel) = relative_slash_path(&path, &base) else {
                continue;
            };
            let doc = load_document(&path, namespace, &rel)?;
            input.documents.insert(doc.id.clone(), doc);
        }
    }

    let public = root.join(&config.paths.public);
    for path in files_under(&public)? {
        let Some(rel) = relative_slash_path(&path, &public) else {
            continue;
        };
        let url = format!("/{rel}");
        let bytes = fs::read(&path)?;
        input.assets.insert(url.clone(), SourceAsset::new(url, bytes));
    }

    if let Some(theme) = load_theme(&root.join(&config.paths.theme))? {
        if input.assets.contains_key(THEME_PATH) {
            tracing::warn!("public/theme.css is shadowed by the theme directory");
        }
        input
            .assets
            .insert(THEME_PATH.to_string(), SourceAsset::new(THEME_PATH, theme));
    }

    if let Some(source) = &config.css.safelist_source {
        input.safelist = load_safelist(&root.join(source))?;
    }

    tracing::info!(
        documents = input.documents.len(),
        assets = input.assets.len(),
        "scanned project"
    );
    Ok(input)
}

fn load_document(path: &Path, namespace: &str, rel: &str) -> Result<CanonicalDocument, ScanError> {
    let bytes = fs::read(path)?;
    let mut doc: CanonicalDocument =
        serde_json::from_slice(&bytes).map_err(|source| ScanError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let stem = rel.strip_suffix(".json").unwrap_or(rel);
    doc.id = format!("{namespace}/{stem}");
    doc.provenance = Provenance {
        origin: format!("{namespace}/{rel}"),
        root: namespace.to_string(),
    };
    Ok(doc)
}

/// Theme stylesheets joined in file-name order, or `None` when there are none.
fn load_theme(dir: &Path) -> Result<Option<Vec<u8>>, ScanError> {
    let mut css = Vec::new();
    let mut any = false;
    for path in files_under(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("css") {
            continue;
        }
        if any {
            css.push(b'\n');
        }
        css.extend(fs::read(&path)?);
        any = true;
    }
    Ok(any.then_some(css))
}

/// One selector per line; blank lines and `#` comments are ignored.
fn load_safelist(path: &Path) -> Result<Vec<String>, ScanError> {
    let text = fs::read_to_string(path)?;
    let mut selectors: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();
    selectors.sort();
    selectors.dedup();
    Ok(selectors)
}

/// Map a changed file to the graph key it affects. `None` means the path is
/// irrelevant (output directory, editor droppings, unrelated files).
pub fn classify_change(root: &Path, config: &SiteConfig, path: &Path) -> Option<Change> {
    let output = root.join(&config.paths.output);
    if path.starts_with(&output) || path.starts_with(root.join(".quarry")) {
        return None;
    }
    if path.file_name().and_then(|n| n.to_str()) == Some(crate::config::CONFIG_FILENAME) {
        return Some(Change::Everything);
    }
    if let Some(source) = &config.css.safelist_source
        && path == root.join(source)
    {
        return Some(Change::Everything);
    }
    if path.starts_with(root.join(&config.paths.theme)) {
        return Some(Change::Node(THEME_PATH.to_string()));
    }
    for (namespace, dir) in namespaces(config) {
        let base = root.join(dir);
        if let Some(rel) = relative_slash_path(path, &base)
            && let Some(stem) = rel.strip_suffix(".json")
        {
            return Some(Change::Node(format!("{namespace}/{stem}")));
        }
    }
    let public = root.join(&config.paths.public);
    relative_slash_path(path, &public).map(|rel| Change::Node(format!("/{rel}")))
}
