//! Configuration validation.

use super::{CopyConfig, ExportConfig};
use crate::error::{MigrateError, Result};
use crate::selection::parse_session_list;

/// Validate a copy configuration.
pub fn validate_copy(config: &CopyConfig) -> Result<()> {
    if config.source.as_os_str().is_empty() {
        return Err(MigrateError::Config("source workspace is required".into()));
    }
    if config.destination.as_os_str().is_empty() {
        return Err(MigrateError::Config("destination workspace is required".into()));
    }
    if parse_session_list(&config.sessions).is_empty() {
        return Err(MigrateError::Config("at least one session is required".into()));
    }
    if config.destination_session.trim().is_empty() {
        return Err(MigrateError::Config("destination_session is required".into()));
    }
    if config.options.max_predicate_len == 0 {
        return Err(MigrateError::Config(
            "options.max_predicate_len must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Validate an export configuration.
pub fn validate_export(config: &ExportConfig) -> Result<()> {
    if config.workspace.as_os_str().is_empty() {
        return Err(MigrateError::Config("workspace is required".into()));
    }
    if parse_session_list(&config.sessions).is_empty() {
        return Err(MigrateError::Config("at least one session is required".into()));
    }
    if config.output_dir.as_os_str().is_empty() {
        return Err(MigrateError::Config("output_dir is required".into()));
    }
    if config.output_name.trim().is_empty() {
        return Err(MigrateError::Config("output_name is required".into()));
    }
    if config.max_predicate_len == 0 {
        return Err(MigrateError::Config(
            "max_predicate_len must be at least 1".into(),
        ));
    }
    Ok(())
}
