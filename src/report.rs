//! The build report: what one pass did, how long each stage took and every
//! diagnostic it produced.
//!
//! The report is the only build output that holds wall-clock data, so it is
//! written next to the output tree (`.quarry/build-report.json`), never into
//! it.

use crate::cache::CacheStats;
use crate::diagnostics::{self, Diagnostic, Severity};
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Incremental,
    Validate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub millis: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub bytes: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    pub total: usize,
    pub rendered: usize,
    pub cached: usize,
    /// Routes that did not ship because of an error on the route or one of
    /// its dependencies.
    pub blocked: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub routes: CacheStats,
    pub assets: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub success: bool,
    pub mode: BuildMode,
    pub diagnostics: Vec<Diagnostic>,
    pub timings: Vec<StageTiming>,
    pub artifacts: Vec<ArtifactEntry>,
    pub routes: RouteStats,
    pub cache: CacheReport,
}

impl BuildReport {
    pub fn new(mode: BuildMode) -> Self {
        Self {
            success: false,
            mode,
            diagnostics: Vec::new(),
            timings: Vec::new(),
            artifacts: Vec::new(),
            routes: RouteStats::default(),
            cache: CacheReport::default(),
        }
    }

    /// Canonicalize the diagnostics and settle `success`.
    pub fn finish(mut self, mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics::canonicalize(&mut diagnostics);
        self.success = !diagnostics::has_errors(&diagnostics);
        self.diagnostics = diagnostics;
        self
    }

    pub fn errors(&self) -> usize {
        diagnostics::count(&self.diagnostics, Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        diagnostics::count(&self.diagnostics, Severity::Warning)
    }
}

/// Records how long each stage of a pass takes.
pub struct StageTimer {
    started: Instant,
    timings: Vec<StageTiming>,
}

impl StageTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            timings: Vec::new(),
        }
    }

    /// Close the current stage and start the next one.
    pub fn lap(&mut self, stage: &'static str) {
        let millis = self.started.elapsed().as_millis();
        tracing::info!(stage, millis, "stage complete");
        self.timings.push(StageTiming { stage, millis });
        self.started = Instant::now();
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
