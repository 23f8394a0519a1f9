//! Configuration type definitions.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::predicate::MAX_PREDICATE_LEN;
use crate::selection::SelectionOptions;

/// Copy (or move) session records between two workspaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Source workspace document.
    #[serde(default)]
    pub source: PathBuf,

    /// Semicolon-delimited session names to copy.
    #[serde(default)]
    pub sessions: String,

    /// Optional filter expression applied to REVTABLEMAIN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// Destination workspace document.
    #[serde(default)]
    pub destination: PathBuf,

    /// Existing destination session receiving the records.
    #[serde(default)]
    pub destination_session: String,

    /// Delete the copied records from the source afterwards.
    #[serde(default)]
    pub delete: bool,

    /// Write a run log file.
    #[serde(default)]
    pub create_log: bool,

    /// Run behavior.
    #[serde(default)]
    pub options: CopyOptions,
}

/// Copy behavior switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyOptions {
    /// Fail when a session name has no match (default: warn).
    #[serde(default)]
    pub strict_sessions: bool,

    /// Fail when a check run references a batch run that was not copied
    /// (default: warn and keep the old BATCHRUNID).
    #[serde(default)]
    pub strict_batch_runs: bool,

    /// Ceiling on the rendered selection predicate (default: 1000).
    #[serde(default = "default_max_predicate_len")]
    pub max_predicate_len: usize,

    /// Directory for the run log (default: the destination's folder).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            strict_sessions: false,
            strict_batch_runs: false,
            max_predicate_len: MAX_PREDICATE_LEN,
            log_dir: None,
        }
    }
}

impl CopyOptions {
    pub fn selection(&self) -> SelectionOptions {
        SelectionOptions {
            max_predicate_len: self.max_predicate_len,
            strict_sessions: self.strict_sessions,
        }
    }
}

/// Export session records to point features and a flat table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Workspace document to export from.
    #[serde(default)]
    pub workspace: PathBuf,

    /// Semicolon-delimited session names to export.
    #[serde(default)]
    pub sessions: String,

    /// Semicolon-delimited REVTABLEMAIN fields to keep (all when empty).
    #[serde(default)]
    pub fields: String,

    /// Folder receiving the outputs.
    #[serde(default)]
    pub output_dir: PathBuf,

    /// Base name of the outputs; a `.shp` suffix is dropped.
    #[serde(default)]
    pub output_name: String,

    /// Fail when a session name has no match (default: warn).
    #[serde(default)]
    pub strict_sessions: bool,

    /// Ceiling on the rendered selection predicate (default: 1000).
    #[serde(default = "default_max_predicate_len")]
    pub max_predicate_len: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::new(),
            sessions: String::new(),
            fields: String::new(),
            output_dir: PathBuf::new(),
            output_name: String::new(),
            strict_sessions: false,
            max_predicate_len: MAX_PREDICATE_LEN,
        }
    }
}

impl ExportConfig {
    pub fn selection(&self) -> SelectionOptions {
        SelectionOptions {
            max_predicate_len: self.max_predicate_len,
            strict_sessions: self.strict_sessions,
        }
    }
}

fn default_max_predicate_len() -> usize {
    MAX_PREDICATE_LEN
}
