//! In-memory workspace with optional JSON persistence.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::core::identifier::{format_guid, parse_guid, FieldDelimiter};
use crate::core::schema::{FieldType, TableSchema};
use crate::core::traits::Store;
use crate::core::value::{Row, Value};
use crate::error::{MigrateError, Result};
use crate::predicate::Predicate;

/// One table: its schema and rows, values ordered like `schema.fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub schema: TableSchema,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Next object id to assign. Zero until the first insert.
    #[serde(default)]
    pub next_object_id: i64,
}

impl TableData {
    /// Claim the next object id. Ids are never reused after a delete.
    fn claim_object_id(&mut self, field_idx: usize) -> i64 {
        if self.next_object_id <= 0 {
            self.next_object_id = self
                .rows
                .iter()
                .filter_map(|r| r.get(field_idx))
                .filter_map(Value::as_i64)
                .max()
                .unwrap_or(0)
                + 1;
        }
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }
}

/// Serialized workspace document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    #[serde(default)]
    pub delimiter: FieldDelimiter,
    #[serde(default)]
    pub tables: Vec<TableData>,
}

#[derive(Debug)]
struct EditState {
    versioned: bool,
    operation_open: bool,
    snapshot: Vec<TableData>,
}

#[derive(Debug)]
struct Inner {
    doc: WorkspaceDocument,
    edit: Option<EditState>,
}

/// A Reviewer Workspace held in memory.
///
/// Loaded from and committed to a JSON document when opened from a path.
/// Writes are only accepted inside an edit session; rolling back restores
/// the snapshot taken by `begin_edit`.
#[derive(Debug)]
pub struct JsonWorkspace {
    name: String,
    path: Option<PathBuf>,
    delimiter: FieldDelimiter,
    inner: Mutex<Inner>,
}

impl JsonWorkspace {
    /// Create an empty, memory-only workspace.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_document(name, None, WorkspaceDocument::default())
    }

    fn from_document(name: impl Into<String>, path: Option<PathBuf>, doc: WorkspaceDocument) -> Self {
        Self {
            name: name.into(),
            path,
            delimiter: doc.delimiter,
            inner: Mutex::new(Inner { doc, edit: None }),
        }
    }

    /// Open a workspace document. Commits are written back to `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::Config(format!("Cannot open workspace {}: {}", path.display(), e))
        })?;
        let doc: WorkspaceDocument = serde_json::from_str(&content)?;
        debug!("Opened workspace {} ({} tables)", path.display(), doc.tables.len());
        Ok(Self::from_document(
            path.display().to_string(),
            Some(path.to_path_buf()),
            doc,
        ))
    }

    /// Add a table with initial rows, outside any edit session.
    pub fn with_table(self, schema: TableSchema, rows: Vec<Row>) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            inner.doc.tables.push(TableData {
                schema,
                rows,
                next_object_id: 0,
            });
        }
        self
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> Result<WorkspaceDocument> {
        Ok(self.lock()?.doc.clone())
    }

    /// Write the document to `path` (temp file, then rename).
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let doc = self.document()?;
        write_document(path.as_ref(), &doc)
    }

    /// Path the workspace commits to, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| MigrateError::store("workspace lock poisoned"))
    }
}

fn write_document(path: &Path, doc: &WorkspaceDocument) -> Result<()> {
    let content = serde_json::to_string_pretty(doc)?;
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

impl Inner {
    fn table(&self, name: &str) -> Result<&TableData> {
        self.doc
            .tables
            .iter()
            .find(|t| t.schema.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::store(format!("no such table: {}", name)))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut TableData> {
        self.doc
            .tables
            .iter_mut()
            .find(|t| t.schema.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| MigrateError::store(format!("no such table: {}", name)))
    }

    /// Check that a write to `table` is allowed right now.
    fn check_writable(&self, table: &TableSchema) -> Result<()> {
        let edit = self.edit.as_ref().ok_or_else(|| {
            MigrateError::store(format!("cannot write to {} outside an edit session", table.name))
        })?;
        if table.versioned {
            if !edit.versioned {
                return Err(MigrateError::store(format!(
                    "{} is versioned; the edit session must be versioned",
                    table.name
                )));
            }
            if !edit.operation_open {
                return Err(MigrateError::store(format!(
                    "no edit operation open for versioned table {}",
                    table.name
                )));
            }
        }
        Ok(())
    }
}

fn matching_rows<'t>(
    data: &'t TableData,
    predicate: Option<&Predicate>,
) -> Result<Vec<(usize, &'t Row)>> {
    let mut out = Vec::new();
    for (i, row) in data.rows.iter().enumerate() {
        let selected = match predicate {
            None => true,
            Some(p) => p.matches(&|name: &str| data.schema.index_of(name).and_then(|idx| row.get(idx)))?,
        };
        if selected {
            out.push((i, row));
        }
    }
    Ok(out)
}

/// Normalize a value for storage in a field of the given type.
fn coerce(field_type: FieldType, value: Value) -> Value {
    match (field_type, value) {
        (FieldType::Guid | FieldType::GlobalId, Value::Text(s)) => match parse_guid(&s) {
            Some(g) => Value::Guid(g),
            None => Value::Text(s),
        },
        (FieldType::SmallInteger | FieldType::Integer | FieldType::ObjectId, Value::Double(d))
            if d.fract() == 0.0 =>
        {
            Value::Int(d as i64)
        }
        (FieldType::Single | FieldType::Double, Value::Int(i)) => Value::Double(i as f64),
        (FieldType::String, Value::Guid(g)) => Value::Text(format_guid(&g)),
        (_, v) => v,
    }
}

#[async_trait]
impl Store for JsonWorkspace {
    fn workspace(&self) -> &str {
        &self.name
    }

    fn field_delimiter(&self) -> FieldDelimiter {
        self.delimiter
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .doc
            .tables
            .iter()
            .map(|t| t.schema.name.clone())
            .collect())
    }

    async fn describe(&self, table: &str) -> Result<TableSchema> {
        Ok(self.lock()?.table(table)?.schema.clone())
    }

    async fn search(
        &self,
        table: &str,
        fields: &[String],
        predicate: Option<&Predicate>,
    ) -> Result<Vec<Row>> {
        let inner = self.lock()?;
        let data = inner.table(table)?;
        let indexes = fields
            .iter()
            .map(|f| {
                data.schema.index_of(f).ok_or_else(|| {
                    MigrateError::store(format!("no field {} in {}", f, data.schema.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(matching_rows(data, predicate)?
            .into_iter()
            .map(|(_, row)| {
                indexes
                    .iter()
                    .map(|i| row.get(*i).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect())
    }

    async fn count(&self, table: &str, predicate: Option<&Predicate>) -> Result<usize> {
        let inner = self.lock()?;
        Ok(matching_rows(inner.table(table)?, predicate)?.len())
    }

    async fn insert(&self, table: &str, fields: &[String], row: Row) -> Result<Value> {
        if fields.len() != row.len() {
            return Err(MigrateError::store(format!(
                "insert into {}: {} fields but {} values",
                table,
                fields.len(),
                row.len()
            )));
        }

        let mut inner = self.lock()?;
        let schema = inner.table(table)?.schema.clone();
        inner.check_writable(&schema)?;

        let mut supplied: Vec<Option<Value>> = vec![None; schema.fields.len()];
        for (name, value) in fields.iter().zip(row) {
            let idx = schema.index_of(name).ok_or_else(|| {
                MigrateError::store(format!("no field {} in {}", name, schema.name))
            })?;
            supplied[idx] = Some(value);
        }

        let data = inner.table_mut(table)?;
        let mut object_id = Value::Null;
        let mut new_row = Vec::with_capacity(schema.fields.len());
        for (idx, (field, value)) in schema.fields.iter().zip(supplied).enumerate() {
            let value = match field.field_type {
                FieldType::ObjectId => {
                    object_id = Value::Int(data.claim_object_id(idx));
                    object_id.clone()
                }
                FieldType::GlobalId => Value::Guid(Uuid::new_v4()),
                t => coerce(t, value.unwrap_or(Value::Null)),
            };
            if value.is_null() && !field.nullable {
                return Err(MigrateError::store(format!(
                    "field {} in {} does not accept NULL",
                    field.name, schema.name
                )));
            }
            new_row.push(value);
        }
        data.rows.push(new_row);
        Ok(object_id)
    }

    async fn delete(&self, table: &str, predicate: &Predicate) -> Result<usize> {
        let mut inner = self.lock()?;
        let schema = inner.table(table)?.schema.clone();
        inner.check_writable(&schema)?;

        let data = inner.table_mut(table)?;
        let doomed: Vec<usize> = matching_rows(data, Some(predicate))?
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        for i in doomed.iter().rev() {
            data.rows.remove(*i);
        }
        Ok(doomed.len())
    }

    async fn begin_edit(&self, versioned: bool) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.edit.is_some() {
            return Err(MigrateError::store(format!(
                "an edit session is already open on {}",
                self.name
            )));
        }
        let snapshot = inner.doc.tables.clone();
        inner.edit = Some(EditState {
            versioned,
            operation_open: false,
            snapshot,
        });
        Ok(())
    }

    async fn begin_operation(&self) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.edit.as_mut() {
            Some(edit) => {
                edit.operation_open = true;
                Ok(())
            }
            None => Err(MigrateError::store("no edit session open")),
        }
    }

    async fn commit_edit(&self) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.edit.is_none() {
            return Err(MigrateError::store("no edit session open"));
        }
        // The edit stays open until the document is on disk.
        if let Some(path) = &self.path {
            write_document(path, &inner.doc)?;
            debug!("Saved workspace {}", path.display());
        }
        inner.edit = None;
        Ok(())
    }

    async fn rollback_edit(&self) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.edit.take() {
            Some(edit) => {
                inner.doc.tables = edit.snapshot;
                Ok(())
            }
            None => Err(MigrateError::store("no edit session open")),
        }
    }

    fn is_editing(&self) -> bool {
        self.inner.lock().map(|i| i.edit.is_some()).unwrap_or(false)
    }
}
