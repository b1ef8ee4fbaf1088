//! Coded, located reports produced by every stage of a pass.
//!
//! Diagnostic codes are a public contract: external automation matches on the
//! string form (`G002`, `V001`, ...), so a code is never renumbered or reused.
//! The leading letter names the stage family:
//!
//! | Prefix | Stage |
//! |--------|-------|
//! | `C` | configuration |
//! | `I` | reading the project tree |
//! | `G` | dependency graph |
//! | `V` | validation |
//! | `R` | rendering |
//! | `O` | optimization |
//! | `S` | security headers |
//! | `P` | plugins / hooks |
//!
//! Stages append diagnostics in whatever order they discover them. Before a
//! list is reported it goes through [`canonicalize`], which sorts by location
//! so output is independent of worker interleaving.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// Stable machine codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Code {
    ConfigInvalid,
    ConfigRejected,
    InputUnreadable,
    DuplicateRoute,
    ImportCycle,
    UnsafeRoute,
    AliasCollision,
    RedirectLoop,
    UnresolvedReference,
    ImportEscapesRoot,
    ImportTooDeep,
    MissingMetadata,
    MetadataTooLong,
    MalformedDate,
    MissingComponentProp,
    UnregisteredBehavior,
    AttributeInterpolation,
    InlineCspViolation,
    AssetOverBudget,
    UnknownLocale,
    RenderFailed,
    UnknownRenderer,
    BudgetExceeded,
    OptimizationFailed,
    UndeclaredPolicyException,
    PolicyExceptionNotGranted,
    CapabilityViolation,
    HookFault,
    UnknownHook,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::ConfigInvalid => "C001",
            Code::ConfigRejected => "C002",
            Code::InputUnreadable => "I001",
            Code::DuplicateRoute => "G001",
            Code::ImportCycle => "G002",
            Code::UnsafeRoute => "G003",
            Code::AliasCollision => "G004",
            Code::RedirectLoop => "G005",
            Code::UnresolvedReference => "G006",
            Code::ImportEscapesRoot => "G007",
            Code::ImportTooDeep => "G008",
            Code::MissingMetadata => "V001",
            Code::MetadataTooLong => "V002",
            Code::MalformedDate => "V003",
            Code::MissingComponentProp => "V004",
            Code::UnregisteredBehavior => "V005",
            Code::AttributeInterpolation => "V006",
            Code::InlineCspViolation => "V007",
            Code::AssetOverBudget => "V008",
            Code::UnknownLocale => "V009",
            Code::RenderFailed => "R001",
            Code::UnknownRenderer => "R002",
            Code::BudgetExceeded => "O001",
            Code::OptimizationFailed => "O002",
            Code::UndeclaredPolicyException => "S001",
            Code::PolicyExceptionNotGranted => "S002",
            Code::CapabilityViolation => "P001",
            Code::HookFault => "P002",
            Code::UnknownHook => "P003",
        }
    }

    /// Conditions that cancel the whole pass before any worker is dispatched.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Code::ConfigInvalid
                | Code::ConfigRejected
                | Code::InputUnreadable
                | Code::DuplicateRoute
                | Code::ImportCycle
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Code {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Where a diagnostic points: a source identifier plus an optional structural
/// path inside it (`body.0.children.2`, `meta.title`, a route path, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Location {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Location {
    pub fn source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: None,
        }
    }

    pub fn at(source: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            path: Some(path.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}#{}", self.source, path),
            None => f.write_str(&self.source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: Code,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: Code, severity: Severity, location: Location, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            location,
            message: message.into(),
        }
    }

    pub fn error(code: Code, location: Location, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, location, message)
    }

    pub fn warning(code: Code, location: Location, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warning, location, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn sort_key(&self) -> (&Location, Code, Severity, &str) {
        (&self.location, self.code, self.severity, &self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.location, self.message
        )
    }
}

/// Sort by location (then code, severity, message) and drop exact duplicates.
pub fn canonicalize(diagnostics: &mut Vec<Diagnostic>) {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    diagnostics.dedup();
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

pub fn count(diagnostics: &[Diagnostic], severity: Severity) -> usize {
    diagnostics.iter().filter(|d| d.severity == severity).count()
}
