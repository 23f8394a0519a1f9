//! Removal of copied rows from the source workspace.
//!
//! Runs after the destination edit session has been committed, once per
//! identifier map. Each table gets its own edit session on the source, so a
//! failure on one table rolls back that table only and the run goes on.

use serde::Serialize;
use tracing::{error, info};

use crate::core::traits::Store;
use crate::edit::EditSession;
use crate::error::{CopyPhase, MigrateError, Result, Warnings};
use crate::predicate::Predicate;
use crate::transfer::IdentifierMap;

/// Result of deleting one table's copied rows.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub table: String,
    /// Identifiers in the map.
    pub mapped: usize,
    /// Identifiers for which at least one row was deleted.
    pub deleted: usize,
    /// Error that caused the deletes to be rolled back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Delete every source row whose `map.in_field` value is a key of `map`.
///
/// Never fails: an error rolls back this table's deletes and is reported in
/// the outcome. A count that differs from the number of mapped identifiers
/// is a warning.
pub async fn delete_mapped(source: &dyn Store, map: &IdentifierMap, warnings: &mut Warnings) -> DeleteOutcome {
    let mut outcome = DeleteOutcome {
        table: map.table.clone(),
        mapped: map.len(),
        deleted: 0,
        error: None,
    };
    if map.is_empty() {
        return outcome;
    }

    if let Err(e) = delete_in_session(source, map, &mut outcome.deleted).await {
        error!("Deleting records from {} failed: {}", map.table, e);
        outcome.deleted = 0;
        outcome.error = Some(e.to_string());
    }

    if outcome.deleted != outcome.mapped {
        warnings.push(format!(
            "Copied {} records from {} but deleted {} records",
            outcome.mapped, map.table, outcome.deleted
        ));
    }
    outcome
}

async fn delete_in_session(source: &dyn Store, map: &IdentifierMap, deleted: &mut usize) -> Result<()> {
    let table = source.require_table(&map.table).await?;
    let schema = source.describe(&table).await?;
    let field = schema
        .field(&map.in_field)
        .ok_or_else(|| {
            MigrateError::copy(
                CopyPhase::Delete,
                table.as_str(),
                format!("field {} not found", map.in_field),
            )
        })?
        .name
        .clone();

    info!("Deleting records from {}", table);
    let edit = EditSession::begin(source, schema.versioned).await?;
    let mut count = 0;
    let result: Result<()> = async {
        for key in map.keys() {
            let removed = source
                .delete(&table, &Predicate::eq(field.as_str(), key.to_value()))
                .await
                .map_err(|e| e.in_phase(CopyPhase::Delete, &table, Some(key.to_string())))?;
            if removed > 0 {
                count += 1;
            }
        }
        Ok(())
    }
    .await;
    edit.finish(result).await?;
    *deleted = count;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::tables;
    use crate::core::value::{Identifier, Value};
    use crate::store::FailingStore;
    use crate::testing::{fields, Fixture};
    use crate::version::SchemaVersion;

    fn source() -> crate::store::JsonWorkspace {
        Fixture::new("src", SchemaVersion::Pre10_6)
            .session(1, "A")
            .record(1, 1, None, "Open")
            .record(2, 1, None, "Open")
            .record(3, 1, None, "Open")
            .point(1, 1, 0.0, 0.0)
            .point(1, 1, 1.0, 1.0)
            .point(2, 1, 2.0, 2.0)
            .versioned()
            .build()
    }

    fn map(table: &str, field: &str, keys: &[i64]) -> IdentifierMap {
        let mut map = IdentifierMap::new(table, field, field);
        for k in keys {
            map.record(Identifier::Int(*k), Identifier::Int(k + 100));
        }
        map
    }

    #[tokio::test]
    async fn test_deletes_mapped_rows_only() {
        let ws = source();
        let mut warnings = Warnings::default();
        let outcome = delete_mapped(&ws, &map(tables::MAIN, "RECORDID", &[1, 3]), &mut warnings).await;
        assert_eq!((outcome.mapped, outcome.deleted), (2, 2));
        assert!(warnings.is_empty());
        let left = ws.search(tables::MAIN, &fields(&["RECORDID"]), None).await.unwrap();
        assert_eq!(left, vec![vec![Value::Int(2)]]);
        assert!(!ws.is_editing());
    }

    #[tokio::test]
    async fn test_all_parts_of_a_link_are_deleted() {
        let ws = source();
        let mut warnings = Warnings::default();
        let outcome = delete_mapped(&ws, &map(tables::POINT, "LINKID", &[1]), &mut warnings).await;
        assert_eq!(outcome.deleted, 1);
        assert_eq!(ws.count(tables::POINT, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_mismatch_warns() {
        let ws = source();
        let mut warnings = Warnings::default();
        let outcome = delete_mapped(&ws, &map(tables::MAIN, "RECORDID", &[2, 42]), &mut warnings).await;
        assert_eq!(outcome.deleted, 1);
        assert!(warnings.contains("Copied 2 records from REVTABLEMAIN but deleted 1 records"));
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_is_reported() {
        let ws = source();
        ws.begin_edit(false).await.unwrap();
        let mut warnings = Warnings::default();
        let outcome = delete_mapped(&ws, &map(tables::MAIN, "RECORDID", &[1]), &mut warnings).await;
        assert!(outcome.error.is_some());
        assert_eq!(outcome.deleted, 0);
        assert!(warnings.contains("deleted 0 records"));
        ws.rollback_edit().await.unwrap();

        let outcome = delete_mapped(&ws, &map("NOSUCHTABLE", "RECORDID", &[1]), &mut warnings).await;
        assert!(outcome.error.unwrap().contains("NOSUCHTABLE"));

        // A failure part way through keeps every row.
        let failing = FailingStore::new(&ws, tables::MAIN, 2);
        let outcome = delete_mapped(&failing, &map(tables::MAIN, "RECORDID", &[1, 2, 3]), &mut warnings).await;
        assert!(outcome.error.unwrap().contains("injected failure"));
        assert_eq!(ws.count(tables::MAIN, None).await.unwrap(), 3);
        assert!(!ws.is_editing());
    }
}
