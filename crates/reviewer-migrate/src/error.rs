//! Error types for the migration library.

use std::fmt;

use thiserror::Error;

/// Phase of a copy run, carried by [`MigrateError::Copy`] so a failure can be
/// traced back to the step that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPhase {
    /// Copying primary records.
    Records,
    /// Copying one of the geometry tables.
    Geometry,
    /// Copying batch run rows.
    BatchRuns,
    /// Copying check run rows.
    CheckRuns,
    /// Deleting copied rows from the source.
    Delete,
}

impl fmt::Display for CopyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CopyPhase::Records => "records",
            CopyPhase::Geometry => "geometry",
            CopyPhase::BatchRuns => "batch runs",
            CopyPhase::CheckRuns => "check runs",
            CopyPhase::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing parameters, bad filter, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required table could not be located in a workspace.
    #[error("Cannot find table {table} in workspace {workspace}. Please ensure workspace is a valid Reviewer workspace.")]
    TableNotFound { table: String, workspace: String },

    /// Source and destination schema versions cannot be combined.
    #[error("Incompatible workspaces: {0}")]
    Incompatible(String),

    /// The combined selection predicate is longer than the store accepts.
    #[error("The where clause is too long ({length} characters, limit {limit}). There are either too many sessions selected or the expression is too long.")]
    PredicateTooLong { length: usize, limit: usize },

    /// An export output already exists.
    #[error("Output already exists: {0}")]
    OutputExists(String),

    /// Store-level failure (cursor, edit session, persistence).
    #[error("Store error: {0}")]
    Store(String),

    /// Row copy failed, with the phase, table and offending identifier.
    #[error("Copy failed during {phase} on {table}{}: {message}", identifier.as_ref().map(|id| format!(" at {}", id)).unwrap_or_default())]
    Copy {
        phase: CopyPhase,
        table: String,
        identifier: Option<String>,
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MigrateError {
    /// Create a Store error.
    pub fn store(message: impl Into<String>) -> Self {
        MigrateError::Store(message.into())
    }

    /// Create a Copy error without an offending identifier.
    pub fn copy(phase: CopyPhase, table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Copy {
            phase,
            table: table.into(),
            identifier: None,
            message: message.into(),
        }
    }

    /// Wrap any error raised while handling a row into a Copy error.
    ///
    /// Errors that already carry copy context are returned unchanged.
    pub fn in_phase(self, phase: CopyPhase, table: &str, identifier: Option<String>) -> Self {
        match self {
            MigrateError::Copy { .. } => self,
            other => MigrateError::Copy {
                phase,
                table: table.to_string(),
                identifier,
                message: other.to_string(),
            },
        }
    }

    /// Whether the error was raised before any write was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MigrateError::Config(_)
                | MigrateError::TableNotFound { .. }
                | MigrateError::Incompatible(_)
                | MigrateError::PredicateTooLong { .. }
                | MigrateError::OutputExists(_)
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_precondition() {
            2
        } else {
            1
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Partial-consistency warnings raised during a run.
///
/// Each warning is logged when pushed and kept for the run report.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Warnings(Vec<String>);

impl Warnings {
    /// Log and record a warning.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.0.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// Whether any warning contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|w| w.contains(needle))
    }
}
