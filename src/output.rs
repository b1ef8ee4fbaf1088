//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Diagnostics are grouped by the document (or config section) they are
//! about, because that is what a user opens to fix them. The code and the
//! field path inside the document are secondary context on the same line.
//!
//! # Output Format
//!
//! ## Diagnostics
//!
//! ```text
//! content/about
//!     error   G001 meta.slug: route '/about' is claimed by content/about, content/team
//!     warning G006 body.0: link to '/missing' does not resolve
//! hooks
//!     warning P003 sitemap-ping: hook 'sitemap-ping' is declared but not registered
//! ```
//!
//! ## Build
//!
//! ```text
//! Routes: 12 (10 rendered, 2 cached, 0 blocked)
//! Assets: 3 cached, 1 built (4 total)
//! Stages: pre-parse 0ms, graph 2ms, validate 1ms, assets 40ms, render 12ms
//! 001 about/index.html (2.1 KB)
//! 002 assets/theme.3f2a9c0e1b4d.css (8.0 KB)
//! Wrote 42 files, 1 warning
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::diagnostics::{Diagnostic, Severity};
use crate::report::{BuildMode, BuildReport};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte size: bytes below 1 KB, then KB / MB with one decimal.
fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

fn diagnostic_line(d: &Diagnostic) -> String {
    let severity = match d.severity {
        Severity::Error => "error  ",
        Severity::Warning => "warning",
    };
    match &d.location.path {
        Some(path) => format!("{} {} {}: {}", severity, d.code, path, d.message),
        None => format!("{} {} {}", severity, d.code, d.message),
    }
}

/// Group diagnostics under their source, keeping the given (canonical) order.
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<&str> = None;
    for d in diagnostics {
        if current != Some(d.location.source.as_str()) {
            lines.push(d.location.source.clone());
            current = Some(&d.location.source);
        }
        lines.push(format!("{}{}", indent(1), diagnostic_line(d)));
    }
    lines
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for line in format_diagnostics(diagnostics) {
        println!("{}", line);
    }
}

fn totals_line(report: &BuildReport) -> String {
    match (report.errors(), report.warnings()) {
        (0, 0) => "no problems".to_string(),
        (0, w) => plural(w, "warning"),
        (e, 0) => plural(e, "error"),
        (e, w) => format!("{}, {}", plural(e, "error"), plural(w, "warning")),
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format a pass report. `verbose` adds one line per output file.
pub fn format_build_output(report: &BuildReport, verbose: bool) -> Vec<String> {
    let mut lines = format_diagnostics(&report.diagnostics);
    if report.mode == BuildMode::Validate {
        lines.push(format!("Validated: {}", totals_line(report)));
        return lines;
    }

    let routes = &report.routes;
    lines.push(format!(
        "Routes: {} ({} rendered, {} cached, {} blocked)",
        routes.total, routes.rendered, routes.cached, routes.blocked
    ));
    lines.push(format!("Assets: {}", report.cache.assets));
    if !report.timings.is_empty() {
        let stages: Vec<String> = report
            .timings
            .iter()
            .map(|t| format!("{} {}ms", t.stage, t.millis))
            .collect();
        lines.push(format!("Stages: {}", stages.join(", ")));
    }
    if verbose {
        for (i, artifact) in report.artifacts.iter().enumerate() {
            lines.push(format!(
                "{} {} ({})",
                format_index(i + 1),
                artifact.path,
                format_size(artifact.bytes)
            ));
        }
    }
    if report.success {
        lines.push(format!(
            "Wrote {}, {}",
            plural(report.artifacts.len(), "file"),
            totals_line(report)
        ));
    } else {
        lines.push(format!("Build failed: {}; output left untouched", totals_line(report)));
    }
    lines
}

pub fn print_build_output(report: &BuildReport, verbose: bool) {
    for line in format_build_output(report, verbose) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
