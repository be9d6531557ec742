//! Error taxonomy for cross-referencing and schema closure

use std::fmt;
use thiserror::Error;

/// Result alias used throughout protoscope-core
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which kind of schema member a lookup was about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKind {
    Domain,
    Command,
    Event,
    Type,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookupKind::Domain => "domain",
            LookupKind::Command => "command",
            LookupKind::Event => "event",
            LookupKind::Type => "type",
        })
    }
}

/// A remote snapshot could not be fetched.
///
/// Cloneable so one failed in-flight fetch can be reported to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to fetch {what}: {reason}")]
pub struct FetchError {
    /// What was being fetched (a commit, a directory, a file)
    pub what: String,
    /// Underlying cause, rendered
    pub reason: String,
}

impl FetchError {
    pub fn new(what: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors produced by protoscope-core
#[derive(Debug, Error)]
pub enum Error {
    /// An enforcing lookup found nothing; the seed or reference is inconsistent
    #[error("no {kind} named {name}")]
    NotFound { kind: LookupKind, name: String },

    /// The remote source snapshot is unavailable
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The schema uses a construct the closure cannot traverse
    #[error("schema error: {0}")]
    Schema(String),

    /// A reference that had to be qualified (`Domain.name`) was not
    #[error("expected qualified ref, got {0}")]
    InvalidRef(String),

    /// A schema document could not be parsed
    #[error("invalid protocol JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A convention contained a bad glob or needle pattern
    #[error("invalid pattern: {0}")]
    Pattern(String),

    /// The background reference scan panicked or was cancelled
    #[error("reference scan did not finish: {0}")]
    Scan(String),
}

impl Error {
    pub(crate) fn not_found(kind: LookupKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }
}

impl From<globset::Error> for Error {
    fn from(err: globset::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}
