//! Error and warning types for entity indexing
//!
//! Fatal conditions are `IndexError` values returned through `Result`.
//! Per-file and per-id problems are `IndexWarning` values collected next to a
//! best-effort index instead of aborting the build.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which source adapter produced a record or a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Filesystem,
    GraphApi,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Filesystem => f.write_str("filesystem"),
            SourceKind::GraphApi => f.write_str("graphapi"),
        }
    }
}

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    /// Opening `---` without a matching closing line
    #[error("Malformed frontmatter{}: missing closing delimiter", display_path(.path))]
    MalformedFrontmatter { path: Option<PathBuf> },

    /// YAML inside a well-delimited block did not parse into the requested shape
    #[error("YAML parse error{}: {source}", display_path(.path))]
    YamlParse {
        path: Option<PathBuf>,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two records from one source derived the same identifier
    #[error("Duplicate id '{id}': kept {kept}, dropped {duplicate}")]
    DuplicateId {
        id: String,
        kept: String,
        duplicate: String,
    },

    /// A source could not be reached or answered with a failure
    #[error("Source {source_kind} unavailable: {reason}")]
    SourceUnavailable {
        source_kind: SourceKind,
        reason: String,
    },

    /// Source mode and supplied settings do not agree
    #[error("Configuration error: {0}")]
    ConfigInconsistency(String),

    /// No entity with this identifier or alias
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Reading a file from disk failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

/// Result type alias for indexing operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Non-fatal condition reported alongside a best-effort index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWarning {
    /// A single document or record was skipped
    Parse { location: String, message: String },
    /// A later record with an already-seen id was dropped
    DuplicateId {
        id: String,
        kept: String,
        duplicate: String,
    },
    /// One source of a hybrid build failed; the index covers the other only
    PartialAvailability {
        source_kind: SourceKind,
        reason: String,
    },
}

impl IndexWarning {
    /// Build a warning from a per-item error that must not abort the build
    pub fn from_error(location: impl Into<String>, error: &IndexError) -> Self {
        match error {
            IndexError::DuplicateId { id, kept, duplicate } => IndexWarning::DuplicateId {
                id: id.clone(),
                kept: kept.clone(),
                duplicate: duplicate.clone(),
            },
            IndexError::SourceUnavailable {
                source_kind,
                reason,
            } => IndexWarning::PartialAvailability {
                source_kind: *source_kind,
                reason: reason.clone(),
            },
            other => IndexWarning::Parse {
                location: location.into(),
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for IndexWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexWarning::Parse { location, message } => {
                write!(f, "skipped {}: {}", location, message)
            }
            IndexWarning::DuplicateId { id, kept, duplicate } => {
                write!(f, "duplicate id '{}': kept {}, dropped {}", id, kept, duplicate)
            }
            IndexWarning::PartialAvailability {
                source_kind,
                reason,
            } => {
                write!(f, "{} source unavailable, index is partial: {}", source_kind, reason)
            }
        }
    }
}
