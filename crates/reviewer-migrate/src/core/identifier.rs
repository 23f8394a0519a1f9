//! GUID formatting and field-name handling.
//!
//! Reviewer workspaces store GUIDs in the braced, upper-case registry form
//! (`{DDC860BD-4C40-302F-B5BE-3D0EDA623B6B}`). Every GUID this crate writes or
//! logs uses that form; parsing accepts it with or without braces.
//!
//! Field names reach rendered predicates through [`quote_field`], which
//! validates them first: null bytes and over-long names are rejected rather
//! than quoted.

use uuid::Uuid;

use crate::error::{MigrateError, Result};

/// Maximum field-name length accepted in a predicate.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Format a GUID as `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
pub fn format_guid(guid: &Uuid) -> String {
    format!("{{{}}}", guid.hyphenated().to_string().to_uppercase())
}

/// Parse a GUID in braced or bare form. Returns `None` for anything else.
pub fn parse_guid(text: &str) -> Option<Uuid> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);
    // Hyphenated form only.
    if inner.len() != 36 {
        return None;
    }
    Uuid::parse_str(inner).ok()
}

/// Validate a field name before it is rendered.
///
/// # Errors
///
/// Returns `MigrateError::Config` for empty names, names containing null bytes
/// and names longer than the maximum identifier length.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Field delimiter style of a workspace.
///
/// File-based workspaces take bare field names; enterprise workspaces on SQL
/// Server and PostgreSQL need brackets or double quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDelimiter {
    /// `FIELD`
    #[default]
    None,
    /// `[FIELD]`
    Brackets,
    /// `"FIELD"`
    DoubleQuotes,
}

/// Quote a field name for the given delimiter style.
///
/// Escapes the closing delimiter by doubling it.
pub fn quote_field(name: &str, delimiter: FieldDelimiter) -> Result<String> {
    validate_identifier(name)?;
    Ok(match delimiter {
        FieldDelimiter::None => name.to_string(),
        FieldDelimiter::Brackets => format!("[{}]", name.replace(']', "]]")),
        FieldDelimiter::DoubleQuotes => format!("\"{}\"", name.replace('"', "\"\"")),
    })
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_guid_is_braced_upper() {
        let g = Uuid::parse_str("ddc860bd-4c40-302f-b5be-3d0eda623b6b").unwrap();
        assert_eq!(format_guid(&g), "{DDC860BD-4C40-302F-B5BE-3D0EDA623B6B}");
    }

    #[test]
    fn test_parse_guid_forms() {
        let g = Uuid::parse_str("ddc860bd-4c40-302f-b5be-3d0eda623b6b").unwrap();
        assert_eq!(parse_guid("{DDC860BD-4C40-302F-B5BE-3D0EDA623B6B}"), Some(g));
        assert_eq!(parse_guid("ddc860bd-4c40-302f-b5be-3d0eda623b6b"), Some(g));
        assert_eq!(parse_guid("ddc860bd4c40302fb5be3d0eda623b6b"), None);
        assert_eq!(parse_guid("Session 1"), None);
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("SESSIONID", FieldDelimiter::None).unwrap(), "SESSIONID");
        assert_eq!(
            quote_field("SESSIONID", FieldDelimiter::Brackets).unwrap(),
            "[SESSIONID]"
        );
        assert_eq!(
            quote_field("odd]name", FieldDelimiter::Brackets).unwrap(),
            "[odd]]name]"
        );
        assert_eq!(
            quote_field("odd\"name", FieldDelimiter::DoubleQuotes).unwrap(),
            "\"odd\"\"name\""
        );
    }

    #[test]
    fn test_validate_identifier_rejects_bad_names() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a\0b").is_err());
        assert!(validate_identifier(&"x".repeat(MAX_IDENTIFIER_LENGTH + 1)).is_err());
        assert!(validate_identifier(&"x".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
