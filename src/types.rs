//! Shared types passed between pipeline stages.
//!
//! Routes and redirects come out of the graph builder; artifacts come out of
//! the renderers and flow through optimization, security and merge unchanged
//! in shape.

use serde::{Deserialize, Serialize};

/// A URL path served by the site, bound to the page document that produces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Always starts with `/`; no trailing slash except for the root.
    pub path: String,
    /// Id of the page document.
    pub source: String,
    pub locale: String,
    /// Render targets in output order.
    pub targets: Vec<String>,
    /// Other-locale variants sharing a translation key, sorted by locale.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<Alternate>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Alternate {
    pub locale: String,
    pub path: String,
}

/// A permanent redirect. `to` is always a final target, never another alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

/// One output file, addressed by its path relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderArtifact {
    pub path: String,
    pub target: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl RenderArtifact {
    pub fn new(
        path: impl Into<String>,
        target: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            path: path.into(),
            target: target.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type.starts_with("text/html")
    }

    /// Body as UTF-8; `None` for binary artifacts.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}
