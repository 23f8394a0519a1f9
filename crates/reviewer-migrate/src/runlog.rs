//! Plain-text log of a copy run.
//!
//! Lists both workspaces, the input and output sessions, every old - new
//! identifier pair per table, and the per-table totals.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::error::Result;
use crate::selection::SessionRef;
use crate::transfer::IdentifierMap;

/// File name prefix of run logs.
pub const LOG_FILE_PREFIX: &str = "CopyDataReviewerRecordsLog_";

/// `CopyDataReviewerRecordsLog_<YYYYMMDDThhmmss>.txt`
pub fn log_file_name(at: NaiveDateTime) -> String {
    format!("{}{}.txt", LOG_FILE_PREFIX, at.format("%Y%m%dT%H%M%S"))
}

/// `(table, distinct identifiers copied)` per map, in map order.
pub fn totals(maps: &[&IdentifierMap]) -> Vec<(String, usize)> {
    maps.iter().map(|m| (m.table.clone(), m.len())).collect()
}

/// Log the per-table totals.
pub fn log_totals(maps: &[&IdentifierMap]) {
    for (table, count) in totals(maps) {
        info!("Total Records from {}: {}", table, count);
    }
}

/// Content of a run log.
#[derive(Debug, Clone)]
pub struct RunLog<'a> {
    pub source: &'a str,
    pub destination: &'a str,
    pub input_sessions: &'a [SessionRef],
    pub output_session: &'a SessionRef,
    pub maps: Vec<&'a IdentifierMap>,
}

impl fmt::Display for RunLog<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source Workspace: {}", self.source)?;
        writeln!(f, "Input Session(s): ")?;
        for session in self.input_sessions {
            writeln!(f, "    {}: {}", session.id, session.name)?;
        }
        writeln!(f, "\nTarget Workspace: {}", self.destination)?;
        writeln!(f, "Output Session: ")?;
        writeln!(f, "    {}: {}", self.output_session.id, self.output_session.name)?;

        for map in self.maps.iter().filter(|m| !m.is_empty()) {
            writeln!(f, "\n{}...", map.table)?;
            writeln!(f, "   {} - {} ", map.in_field, map.out_field)?;
            for (old, new) in map.iter() {
                writeln!(f, "    {} - {}", old, new)?;
            }
        }

        writeln!(f)?;
        for (table, count) in totals(&self.maps) {
            writeln!(f, "Total Records from {}: {}", table, count)?;
        }
        Ok(())
    }
}

impl RunLog<'_> {
    /// Render the log text.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Write the log into `dir`, or the system temp directory when `dir`
    /// cannot be written. Returns the path written.
    pub async fn write(&self, dir: &Path, at: NaiveDateTime) -> Result<PathBuf> {
        let name = log_file_name(at);
        let content = self.render();

        let path = dir.join(&name);
        match tokio::fs::write(&path, &content).await {
            Ok(()) => {
                info!("Logfile created at: {}", path.display());
                Ok(path)
            }
            Err(e) => {
                warn!("Cannot write logfile to {}: {}", dir.display(), e);
                let fallback = std::env::temp_dir().join(&name);
                tokio::fs::write(&fallback, &content).await?;
                info!("Logfile created at: {}", fallback.display());
                Ok(fallback)
            }
        }
    }
}

/// Directory a run log goes to: `log_dir` when set, else the folder holding
/// the destination workspace.
pub fn log_dir(log_dir: Option<&Path>, destination: &Path) -> PathBuf {
    match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}
