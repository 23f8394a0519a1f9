//! The store abstraction every pipeline runs against.
//!
//! A [`Store`] is one Reviewer Workspace. Pipelines only read, insert and
//! delete rows through it, and only write inside an edit session (see
//! [`crate::edit::EditSession`]).

use async_trait::async_trait;

use crate::error::{MigrateError, Result};
use crate::predicate::Predicate;

use super::identifier::FieldDelimiter;
use super::schema::TableSchema;
use super::value::{Row, Value};

/// Read and write access to a Reviewer Workspace.
///
/// Implementations must be usable as `Arc<dyn Store>`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Workspace path or name, for messages and logs.
    fn workspace(&self) -> &str;

    /// Field delimiter used when rendering predicates for this store.
    fn field_delimiter(&self) -> FieldDelimiter {
        FieldDelimiter::None
    }

    /// Physical names of all tables in the workspace.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Resolve a logical table name to its physical name.
    ///
    /// Matches case-insensitively on suffix, so qualified names such as
    /// `DBO.REVTABLEMAIN` resolve for `REVTABLEMAIN`.
    async fn resolve_table(&self, logical: &str) -> Result<Option<String>> {
        let wanted = logical.to_uppercase();
        Ok(self
            .list_tables()
            .await?
            .into_iter()
            .find(|t| t.to_uppercase().ends_with(&wanted)))
    }

    /// Resolve a table that must exist.
    ///
    /// # Errors
    ///
    /// Returns `MigrateError::TableNotFound` when the table is missing.
    async fn require_table(&self, logical: &str) -> Result<String> {
        self.resolve_table(logical)
            .await?
            .ok_or_else(|| MigrateError::TableNotFound {
                table: logical.to_string(),
                workspace: self.workspace().to_string(),
            })
    }

    /// Describe a table's fields, versioning and spatial reference.
    async fn describe(&self, table: &str) -> Result<TableSchema>;

    /// Read `fields` from every row matching `predicate` (all rows for `None`).
    ///
    /// Rows come back in storage order with values ordered like `fields`.
    async fn search(
        &self,
        table: &str,
        fields: &[String],
        predicate: Option<&Predicate>,
    ) -> Result<Vec<Row>>;

    /// Number of rows matching `predicate`.
    async fn count(&self, table: &str, predicate: Option<&Predicate>) -> Result<usize>;

    /// Insert one row. Returns the object id the store assigned, or
    /// `Value::Null` if the table has no object id field.
    ///
    /// Store-generated fields (object id, GlobalID) are assigned by the
    /// store; values supplied for them are ignored.
    async fn insert(&self, table: &str, fields: &[String], row: Row) -> Result<Value>;

    /// Delete every row matching `predicate`. Returns the number deleted.
    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<usize>;

    /// Open an edit session. Versioned sessions need [`Store::begin_operation`]
    /// before the first write.
    async fn begin_edit(&self, versioned: bool) -> Result<()>;

    /// Open the edit operation inside a versioned edit session.
    async fn begin_operation(&self) -> Result<()>;

    /// Commit and close the open edit session.
    async fn commit_edit(&self) -> Result<()>;

    /// Discard all changes since [`Store::begin_edit`] and close the session.
    async fn rollback_edit(&self) -> Result<()>;

    /// Whether an edit session is open.
    fn is_editing(&self) -> bool;
}
