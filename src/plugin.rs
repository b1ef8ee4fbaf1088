//! Capability-scoped plugin hooks.
//!
//! A hook is a named value implementing [`Hook`]. It is declared in
//! `quarry.toml` with a phase, an ordering key and the capabilities it may
//! use. At run time a hook sees the build only through a [`PhaseIo`] handle,
//! and every access through that handle is checked at the attempt:
//!
//! | Capability | Phase | Grants |
//! |------------|-------|--------|
//! | `read:documents` | pre-parse, emit | read canonical documents |
//! | `write:documents` | pre-parse | replace or add documents |
//! | `read:artifacts` | post-render, emit | read rendered artifacts |
//! | `write:artifacts` | post-render | replace an artifact's bytes |
//! | `emit:<scope>` | emit | write new files under `<scope>` |
//!
//! Changes are staged. A hook that violates its grant (P001) or fails (P002)
//! has its staged changes discarded and is disabled for the rest of the pass;
//! every other hook and route proceeds. Within a phase, hooks run by
//! `(order, name)`.

use crate::config::{HookDecl, SiteConfig};
use crate::diagnostics::{Code, Diagnostic, Location};
use crate::document::CanonicalDocument;
use crate::types::RenderArtifact;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    PreParse,
    PostRender,
    Emit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::PreParse => "pre-parse",
            Phase::PostRender => "post-render",
            Phase::Emit => "emit",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    ReadDocuments,
    WriteDocuments,
    ReadArtifacts,
    WriteArtifacts,
    /// Write new files under a relative output path prefix.
    Emit(String),
}

impl Capability {
    pub fn parse(s: &str) -> Result<Self, CapabilityError> {
        match s {
            "read:documents" => Ok(Capability::ReadDocuments),
            "write:documents" => Ok(Capability::WriteDocuments),
            "read:artifacts" => Ok(Capability::ReadArtifacts),
            "write:artifacts" => Ok(Capability::WriteArtifacts),
            _ => match s.strip_prefix("emit:") {
                Some(scope) if is_safe_relative(scope.trim_end_matches('/')) => {
                    Ok(Capability::Emit(scope.trim_end_matches('/').to_string()))
                }
                _ => Err(CapabilityError::Unknown(s.to_string())),
            },
        }
    }

    /// Phases in which this capability can be exercised.
    fn available_in(&self, phase: Phase) -> bool {
        match self {
            Capability::ReadDocuments => matches!(phase, Phase::PreParse | Phase::Emit),
            Capability::WriteDocuments => phase == Phase::PreParse,
            Capability::ReadArtifacts => matches!(phase, Phase::PostRender | Phase::Emit),
            Capability::WriteArtifacts => phase == Phase::PostRender,
            Capability::Emit(_) => phase == Phase::Emit,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::ReadDocuments => f.write_str("read:documents"),
            Capability::WriteDocuments => f.write_str("write:documents"),
            Capability::ReadArtifacts => f.write_str("read:artifacts"),
            Capability::WriteArtifacts => f.write_str("write:artifacts"),
            Capability::Emit(scope) => write!(f, "emit:{scope}"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("unknown capability '{0}'")]
    Unknown(String),
    #[error("'{0}' was not granted")]
    NotGranted(Capability),
    #[error("'{capability}' cannot be used in the {phase} phase")]
    WrongPhase { capability: Capability, phase: Phase },
    #[error("emit path '{0}' is not a safe relative path")]
    UnsafePath(String),
    #[error("emit path '{0}' is outside every granted emit scope")]
    OutOfScope(String),
    #[error("emit path '{0}' would overwrite an existing output")]
    Overwrite(String),
}

#[derive(Error, Debug)]
pub enum HookError {
    #[error("capability violation: {0}")]
    Capability(#[from] CapabilityError),
    #[error("{0}")]
    Failed(String),
}

/// Plugin code run at a declared phase.
pub trait Hook: Send + Sync {
    fn run(&self, io: &mut PhaseIo<'_>) -> Result<(), HookError>;
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
}

fn in_scope(path: &str, scope: &str) -> bool {
    path == scope
        || path
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Changes a hook made, applied only if the hook completed cleanly.
#[derive(Debug, Default)]
struct Staged {
    documents: BTreeMap<String, CanonicalDocument>,
    artifacts: BTreeMap<String, Vec<u8>>,
    emits: BTreeMap<String, Vec<u8>>,
}

/// The only view of the build a hook gets.
pub struct PhaseIo<'a> {
    phase: Phase,
    granted: &'a BTreeSet<Capability>,
    documents: &'a BTreeMap<String, CanonicalDocument>,
    artifacts: &'a BTreeMap<String, RenderArtifact>,
    occupied: &'a BTreeSet<String>,
    staged: Staged,
    violation: Option<CapabilityError>,
}

impl<'a> PhaseIo<'a> {
    fn new(
        phase: Phase,
        granted: &'a BTreeSet<Capability>,
        documents: &'a BTreeMap<String, CanonicalDocument>,
        artifacts: &'a BTreeMap<String, RenderArtifact>,
        occupied: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            phase,
            granted,
            documents,
            artifacts,
            occupied,
            staged: Staged::default(),
            violation: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record the first violation; it sticks even if the hook swallows the
    /// returned error.
    fn deny(&mut self, err: CapabilityError) -> CapabilityError {
        if self.violation.is_none() {
            self.violation = Some(err.clone());
        }
        err
    }

    fn require(&mut self, capability: Capability) -> Result<(), CapabilityError> {
        if !capability.available_in(self.phase) {
            let phase = self.phase;
            return Err(self.deny(CapabilityError::WrongPhase { capability, phase }));
        }
        if !self.granted.contains(&capability) {
            return Err(self.deny(CapabilityError::NotGranted(capability)));
        }
        Ok(())
    }

    /// Ids of all documents, sorted.
    pub fn document_ids(&mut self) -> Result<Vec<String>, CapabilityError> {
        self.require(Capability::ReadDocuments)?;
        let mut ids: BTreeSet<String> = self.documents.keys().cloned().collect();
        ids.extend(self.staged.documents.keys().cloned());
        Ok(ids.into_iter().collect())
    }

    pub fn document(&mut self, id: &str) -> Result<Option<CanonicalDocument>, CapabilityError> {
        self.require(Capability::ReadDocuments)?;
        Ok(self
            .staged
            .documents
            .get(id)
            .or_else(|| self.documents.get(id))
            .cloned())
    }

    pub fn replace_document(&mut self, document: CanonicalDocument) -> Result<(), CapabilityError> {
        self.require(Capability::WriteDocuments)?;
        self.staged.documents.insert(document.id.clone(), document);
        Ok(())
    }

    /// Paths of all rendered artifacts, sorted.
    pub fn artifact_paths(&mut self) -> Result<Vec<String>, CapabilityError> {
        self.require(Capability::ReadArtifacts)?;
        Ok(self.artifacts.keys().cloned().collect())
    }

    pub fn artifact(&mut self, path: &str) -> Result<Option<Vec<u8>>, CapabilityError> {
        self.require(Capability::ReadArtifacts)?;
        Ok(self
            .staged
            .artifacts
            .get(path)
            .cloned()
            .or_else(|| self.artifacts.get(path).map(|a| a.bytes.clone())))
    }

    /// Replace the bytes of an existing artifact. New paths go through `emit`.
    pub fn replace_artifact(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), HookError> {
        self.require(Capability::WriteArtifacts)?;
        if !self.artifacts.contains_key(path) {
            return Err(HookError::Failed(format!("no artifact at '{path}'")));
        }
        self.staged.artifacts.insert(path.to_string(), bytes);
        Ok(())
    }

    /// Write a new file. The path must be relative, inside a granted
    /// `emit:` scope, and not already produced by the build.
    pub fn emit(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), CapabilityError> {
        if self.phase != Phase::Emit {
            let phase = self.phase;
            return Err(self.deny(CapabilityError::WrongPhase {
                capability: Capability::Emit(path.to_string()),
                phase,
            }));
        }
        if !is_safe_relative(path) {
            return Err(self.deny(CapabilityError::UnsafePath(path.to_string())));
        }
        let allowed = self.granted.iter().any(|cap| match cap {
            Capability::Emit(scope) => in_scope(path, scope),
            _ => false,
        });
        if !allowed {
            return Err(self.deny(CapabilityError::OutOfScope(path.to_string())));
        }
        if self.occupied.contains(path) || self.staged.emits.contains_key(path) {
            return Err(self.deny(CapabilityError::Overwrite(path.to_string())));
        }
        self.staged.emits.insert(path.to_string(), bytes);
        Ok(())
    }

    fn finish(self) -> (Staged, Option<CapabilityError>) {
        (self.staged, self.violation)
    }
}

/// Named registry of hook implementations.
#[derive(Default, Clone)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in hooks.
    pub fn with_builtins(config: &SiteConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            "robots",
            RobotsHook {
                sitemap_url: format!("{}/sitemap.xml", config.site.origin()),
            },
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, hook: impl Hook + 'static) {
        self.hooks.insert(name.into(), Arc::new(hook));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Hook>> {
        self.hooks.get(name).cloned()
    }
}

/// Runs declared hooks for one pass and tracks which plugins are disabled.
pub struct PluginHost<'a> {
    registry: &'a HookRegistry,
    plan: Vec<(&'a HookDecl, BTreeSet<Capability>)>,
    disabled: BTreeSet<String>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> PluginHost<'a> {
    pub fn new(registry: &'a HookRegistry, decls: &'a [HookDecl]) -> Self {
        let mut diagnostics = Vec::new();
        let mut plan = Vec::new();
        for decl in decls {
            if registry.get(&decl.name).is_none() {
                diagnostics.push(Diagnostic::warning(
                    Code::UnknownHook,
                    Location::at("hooks", &decl.name),
                    format!("hook '{}' is declared but not registered", decl.name),
                ));
                continue;
            }
            plan.push((decl, decl.granted()));
        }
        plan.sort_by(|(a, _), (b, _)| (a.order, &a.name).cmp(&(b.order, &b.name)));
        Self {
            registry,
            plan,
            disabled: BTreeSet::new(),
            diagnostics,
        }
    }

    pub fn disabled(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Run one phase. Each hook sees the state left by the hooks before it.
    fn run_phase(
        &mut self,
        phase: Phase,
        documents: &mut BTreeMap<String, CanonicalDocument>,
        artifacts: &mut BTreeMap<String, RenderArtifact>,
        occupied: &BTreeSet<String>,
    ) -> BTreeMap<String, Vec<u8>> {
        let mut emitted = BTreeMap::new();
        for i in 0..self.plan.len() {
            let (decl, granted) = &self.plan[i];
            if decl.phase != phase || self.disabled.contains(&decl.name) {
                continue;
            }
            let Some(hook) = self.registry.get(&decl.name) else {
                continue;
            };
            let name = decl.name.clone();
            let mut taken: BTreeSet<String> = occupied.clone();
            taken.extend(emitted.keys().cloned());

            let mut io = PhaseIo::new(phase, granted, documents, artifacts, &taken);
            let outcome = catch_unwind(AssertUnwindSafe(|| hook.run(&mut io)));
            let (staged, violation) = io.finish();

            let failure = match (violation, outcome) {
                (Some(v), _) | (None, Ok(Err(HookError::Capability(v)))) => Some((
                    Code::CapabilityViolation,
                    format!("capability violation: {v}; plugin disabled for this pass"),
                )),
                (None, Ok(Err(HookError::Failed(msg)))) => Some((
                    Code::HookFault,
                    format!("hook failed: {msg}; plugin disabled for this pass"),
                )),
                (None, Err(_)) => Some((
                    Code::HookFault,
                    "hook panicked; plugin disabled for this pass".to_string(),
                )),
                (None, Ok(Ok(()))) => None,
            };

            if let Some((code, message)) = failure {
                tracing::warn!(hook = %name, %phase, "{message}");
                self.diagnostics.push(Diagnostic::warning(
                    code,
                    Location::at("hooks", &name),
                    message,
                ));
                self.disabled.insert(name);
                continue;
            }

            tracing::debug!(hook = %name, %phase, "hook completed");
            documents.extend(staged.documents);
            for (path, bytes) in staged.artifacts {
                if let Some(artifact) = artifacts.get_mut(&path) {
                    artifact.bytes = bytes;
                }
            }
            emitted.extend(staged.emits);
        }
        emitted
    }

    pub fn run_pre_parse(&mut self, documents: &mut BTreeMap<String, CanonicalDocument>) {
        self.run_phase(Phase::PreParse, documents, &mut BTreeMap::new(), &BTreeSet::new());
    }

    /// `artifacts` is keyed by output path.
    pub fn run_post_render(&mut self, artifacts: &mut BTreeMap<String, RenderArtifact>) {
        self.run_phase(Phase::PostRender, &mut BTreeMap::new(), artifacts, &BTreeSet::new());
    }

    /// Returns the files emitted by hooks. `occupied` holds every path the
    /// build already produces.
    pub fn run_emit(
        &mut self,
        documents: &BTreeMap<String, CanonicalDocument>,
        artifacts: &BTreeMap<String, RenderArtifact>,
        occupied: &BTreeSet<String>,
    ) -> BTreeMap<String, Vec<u8>> {
        // Emit hooks cannot write documents or artifacts, so the copies are
        // never mutated.
        let mut documents = documents.clone();
        let mut artifacts = artifacts.clone();
        self.run_phase(Phase::Emit, &mut documents, &mut artifacts, occupied)
    }
}

/// Built-in: writes `robots.txt` pointing at the sitemap.
pub struct RobotsHook {
    pub sitemap_url: String,
}

impl Hook for RobotsHook {
    fn run(&self, io: &mut PhaseIo<'_>) -> Result<(), HookError> {
        let body = format!("User-agent: *\nAllow: /\n\nSitemap: {}\n", self.sitemap_url);
        io.emit("robots.txt", body.into_bytes())?;
        Ok(())
    }
}
