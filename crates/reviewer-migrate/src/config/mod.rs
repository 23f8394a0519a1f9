//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use crate::selection::parse_session_list;
use std::path::Path;

impl CopyConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string. Not validated, so positional
    /// parameters can still fill in missing values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_copy(self)
    }

    /// Requested session names.
    pub fn session_names(&self) -> Vec<String> {
        parse_session_list(&self.sessions)
    }
}

impl ExportConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string. Not validated.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_export(self)
    }

    /// Requested session names.
    pub fn session_names(&self) -> Vec<String> {
        parse_session_list(&self.sessions)
    }

    /// Requested field names, upper-cased. Empty means all fields.
    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .split(';')
            .map(|f| f.trim().trim_matches('\'').to_uppercase())
            .filter(|f| !f.is_empty())
            .collect()
    }
}
