//! Reviewer Workspace schema generations and the copy compatibility policy.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::core::schema::{tables, FieldRole};
use crate::core::traits::Store;
use crate::error::{MigrateError, Result, Warnings};

/// Schema hash recorded by 10.6 workspaces.
pub const SCHEMA_HASH_10_6: &str = "{DDC860BD-4C40-302F-B5BE-3D0EDA623B6B}";

/// Detected schema generation of a workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchemaVersion {
    #[serde(rename = "pre-10.3")]
    Pre10_3,
    #[serde(rename = "pre-10.6")]
    Pre10_6,
    #[serde(rename = "10.6")]
    V10_6,
    #[serde(rename = "unsupported")]
    Unsupported,
}

impl SchemaVersion {
    /// Identifier field of REVTABLEMAIN for this generation.
    pub fn record_id_field(&self) -> &'static str {
        match self {
            SchemaVersion::V10_6 => "ID",
            _ => "RECORDID",
        }
    }

    /// Whether records are keyed by GUID.
    pub fn uses_guid_ids(&self) -> bool {
        matches!(self, SchemaVersion::V10_6)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaVersion::Pre10_3 => "pre-10.3",
            SchemaVersion::Pre10_6 => "pre-10.6",
            SchemaVersion::V10_6 => "10.6",
            SchemaVersion::Unsupported => "unsupported",
        })
    }
}

/// Detect the schema generation of a workspace.
///
/// With a REVWORKSPACEVERSION table the schema hash decides (10.6 or
/// unsupported). Without one, REVTABLEMAIN having a LIFECYCLEPHASE field
/// means pre-10.6, otherwise pre-10.3.
///
/// # Errors
///
/// `MigrateError::TableNotFound` when neither table can be located.
pub async fn detect_version(store: &dyn Store, warnings: &mut Warnings) -> Result<SchemaVersion> {
    if let Some(version_table) = store.resolve_table(tables::VERSION).await? {
        let schema = store.describe(&version_table).await?;
        let field = schema.require_role(FieldRole::SchemaHash)?.name.clone();
        let hashes: BTreeSet<String> = store
            .search(&version_table, &[field], None)
            .await?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .map(|v| v.to_string().to_uppercase())
            .collect();

        if hashes.len() != 1 {
            warnings.push(format!(
                "Reviewer version of {} is inconsistent ({} schema hashes)",
                store.workspace(),
                hashes.len()
            ));
        }

        let version = if hashes.contains(SCHEMA_HASH_10_6) {
            SchemaVersion::V10_6
        } else {
            SchemaVersion::Unsupported
        };
        debug!("Workspace {} is version {}", store.workspace(), version);
        return Ok(version);
    }

    let main = store.require_table(tables::MAIN).await?;
    let schema = store.describe(&main).await?;
    let version = if schema.role(FieldRole::LifecyclePhase).is_some() {
        SchemaVersion::Pre10_6
    } else {
        SchemaVersion::Pre10_3
    };
    debug!("Workspace {} is version {}", store.workspace(), version);
    Ok(version)
}

/// How records move between two schema generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// Integer identifiers end to end.
    OldToOld,
    /// Pre-10.6 source into a 10.6 destination; identifiers become GUIDs.
    OldToNew,
    /// GUIDs end to end.
    NewToNew,
}

impl Compatibility {
    /// Whether the destination keys records by GUIDs minted by the copier.
    pub fn mints_record_guids(&self) -> bool {
        !matches!(self, Compatibility::OldToOld)
    }
}

/// Decide whether `source` can be copied into `destination`.
///
/// # Errors
///
/// `MigrateError::Incompatible` for any pre-10.3 or unsupported workspace and
/// for a 10.6 source with a pre-10.6 destination.
pub fn compatibility(source: SchemaVersion, destination: SchemaVersion) -> Result<Compatibility> {
    use SchemaVersion::*;

    let reason = match (source, destination) {
        (Pre10_3, _) => "Input workspace is out of date. Please upgrade it to version 10.3 or higher",
        (_, Pre10_3) => "Output workspace is out of date. Please upgrade it to version 10.3 or higher",
        (Unsupported, _) => "The version of the input workspace is not supported",
        (_, Unsupported) => "The version of the output workspace is not supported",
        (V10_6, Pre10_6) => {
            "Input workspace is newer than the output workspace. Please upgrade the output workspace or select a different one"
        }
        (Pre10_6, Pre10_6) => return Ok(Compatibility::OldToOld),
        (Pre10_6, V10_6) => return Ok(Compatibility::OldToNew),
        (V10_6, V10_6) => return Ok(Compatibility::NewToNew),
    };
    Err(MigrateError::Incompatible(format!(
        "{} (input {}, output {})",
        reason, source, destination
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType, TableSchema};
    use crate::core::value::Value;
    use crate::store::JsonWorkspace;

    fn main_table(fields: &[&str]) -> TableSchema {
        TableSchema::new(
            "REVTABLEMAIN",
            fields.iter().map(|f| Field::new(*f, FieldType::String)).collect(),
        )
    }

    fn version_table(hashes: &[&str]) -> (TableSchema, Vec<Vec<Value>>) {
        (
            TableSchema::new("GDB_REVWORKSPACEVERSION", vec![Field::new("SCHEMAHASH", FieldType::String)]),
            hashes.iter().map(|h| vec![Value::from(*h)]).collect(),
        )
    }

    #[tokio::test]
    async fn test_detect_pre_10_3_and_pre_10_6() {
        let mut w = Warnings::default();
        let old = JsonWorkspace::new("old").with_table(main_table(&["RECORDID"]), Vec::new());
        assert_eq!(detect_version(&old, &mut w).await.unwrap(), SchemaVersion::Pre10_3);

        let mid = JsonWorkspace::new("mid")
            .with_table(main_table(&["RECORDID", "LifecyclePhase"]), Vec::new());
        assert_eq!(detect_version(&mid, &mut w).await.unwrap(), SchemaVersion::Pre10_6);
        assert!(w.is_empty());
    }

    #[tokio::test]
    async fn test_detect_10_6_by_hash() {
        let mut w = Warnings::default();
        let lower = SCHEMA_HASH_10_6.to_lowercase();
        let (schema, rows) = version_table(&[lower.as_str()]);
        let ws = JsonWorkspace::new("new").with_table(schema, rows);
        assert_eq!(detect_version(&ws, &mut w).await.unwrap(), SchemaVersion::V10_6);
        assert!(w.is_empty());
    }

    #[tokio::test]
    async fn test_detect_inconsistent_and_unknown_hashes() {
        let mut w = Warnings::default();
        let (schema, rows) = version_table(&[SCHEMA_HASH_10_6, "{00000000-0000-0000-0000-000000000001}"]);
        let ws = JsonWorkspace::new("mixed").with_table(schema, rows);
        assert_eq!(detect_version(&ws, &mut w).await.unwrap(), SchemaVersion::V10_6);
        assert!(w.contains("inconsistent"));

        let (schema, rows) = version_table(&["{00000000-0000-0000-0000-000000000001}"]);
        let ws = JsonWorkspace::new("future").with_table(schema, rows);
        assert_eq!(detect_version(&ws, &mut w).await.unwrap(), SchemaVersion::Unsupported);
    }

    #[tokio::test]
    async fn test_detect_is_idempotent() {
        let mut w = Warnings::default();
        let ws = JsonWorkspace::new("mid").with_table(main_table(&["LIFECYCLEPHASE"]), Vec::new());
        let first = detect_version(&ws, &mut w).await.unwrap();
        let second = detect_version(&ws, &mut w).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_detect_missing_main_table_is_fatal() {
        let mut w = Warnings::default();
        let ws = JsonWorkspace::new("empty");
        assert!(matches!(
            detect_version(&ws, &mut w).await,
            Err(MigrateError::TableNotFound { .. })
        ));
    }

    #[test]
    fn test_compatibility_is_not_symmetric() {
        use SchemaVersion::*;
        assert_eq!(compatibility(Pre10_6, V10_6).unwrap(), Compatibility::OldToNew);
        assert!(matches!(
            compatibility(V10_6, Pre10_6),
            Err(MigrateError::Incompatible(_))
        ));
    }

    #[test]
    fn test_compatibility_table() {
        use SchemaVersion::*;
        assert_eq!(compatibility(Pre10_6, Pre10_6).unwrap(), Compatibility::OldToOld);
        assert_eq!(compatibility(V10_6, V10_6).unwrap(), Compatibility::NewToNew);
        for v in [Pre10_3, Pre10_6, V10_6, Unsupported] {
            assert!(compatibility(Pre10_3, v).is_err());
            assert!(compatibility(v, Pre10_3).is_err());
            assert!(compatibility(Unsupported, v).is_err());
            assert!(compatibility(v, Unsupported).is_err());
        }
        assert!(!Compatibility::OldToOld.mints_record_guids());
        assert!(Compatibility::OldToNew.mints_record_guids());
    }
}
