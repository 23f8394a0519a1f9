//! Store implementations.

pub mod json;

pub use json::{JsonWorkspace, TableData, WorkspaceDocument};

#[cfg(test)]
pub(crate) use failing::FailingStore;

#[cfg(test)]
mod failing {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::core::identifier::FieldDelimiter;
    use crate::core::schema::TableSchema;
    use crate::core::traits::Store;
    use crate::core::value::{Row, Value};
    use crate::error::{MigrateError, Result};
    use crate::predicate::Predicate;

    /// Delegating store that fails the n-th write (insert or delete) to one
    /// table.
    pub(crate) struct FailingStore<'a> {
        inner: &'a dyn Store,
        table: String,
        fail_on: usize,
        writes: AtomicUsize,
    }

    impl<'a> FailingStore<'a> {
        /// Fail the `fail_on`-th (1-based) write to `table`.
        pub(crate) fn new(inner: &'a dyn Store, table: &str, fail_on: usize) -> Self {
            Self {
                inner,
                table: table.to_string(),
                fail_on,
                writes: AtomicUsize::new(0),
            }
        }

        fn check(&self, table: &str) -> Result<()> {
            if table.to_uppercase().ends_with(&self.table.to_uppercase()) {
                let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
                if n == self.fail_on {
                    return Err(MigrateError::store(format!("injected failure on write {}", n)));
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Store for FailingStore<'_> {
        fn workspace(&self) -> &str {
            self.inner.workspace()
        }

        fn field_delimiter(&self) -> FieldDelimiter {
            self.inner.field_delimiter()
        }

        async fn list_tables(&self) -> Result<Vec<String>> {
            self.inner.list_tables().await
        }

        async fn describe(&self, table: &str) -> Result<TableSchema> {
            self.inner.describe(table).await
        }

        async fn search(
            &self,
            table: &str,
            fields: &[String],
            predicate: Option<&Predicate>,
        ) -> Result<Vec<Row>> {
            self.inner.search(table, fields, predicate).await
        }

        async fn count(&self, table: &str, predicate: Option<&Predicate>) -> Result<usize> {
            self.inner.count(table, predicate).await
        }

        async fn insert(&self, table: &str, fields: &[String], row: Row) -> Result<Value> {
            self.check(table)?;
            self.inner.insert(table, fields, row).await
        }

        async fn delete(&self, table: &str, predicate: &Predicate) -> Result<usize> {
            self.check(table)?;
            self.inner.delete(table, predicate).await
        }

        async fn begin_edit(&self, versioned: bool) -> Result<()> {
            self.inner.begin_edit(versioned).await
        }

        async fn begin_operation(&self) -> Result<()> {
            self.inner.begin_operation().await
        }

        async fn commit_edit(&self) -> Result<()> {
            self.inner.commit_edit().await
        }

        async fn rollback_edit(&self) -> Result<()> {
            self.inner.rollback_edit().await
        }

        fn is_editing(&self) -> bool {
            self.inner.is_editing()
        }
    }
}
