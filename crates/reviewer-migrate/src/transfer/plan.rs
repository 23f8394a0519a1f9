//! Table resolution and field layouts for a copy.
//!
//! Everything here runs before the destination edit session opens, so a
//! missing table or field fails the run before any write.

use crate::core::schema::{tables, FieldRole, GeometryTable, TableSchema};
use crate::core::traits::Store;
use crate::error::{MigrateError, Result, Warnings};
use crate::version::SchemaVersion;

/// One logical table as described by both workspaces.
#[derive(Debug, Clone)]
pub struct TablePair {
    pub logical: &'static str,
    pub source: TableSchema,
    pub destination: TableSchema,
}

impl TablePair {
    /// Describe `logical` in both stores, or `None` if either lacks it.
    pub async fn resolve(
        source: &dyn Store,
        destination: &dyn Store,
        logical: &'static str,
    ) -> Result<Option<TablePair>> {
        let (Some(src), Some(dst)) = (
            source.resolve_table(logical).await?,
            destination.resolve_table(logical).await?,
        ) else {
            return Ok(None);
        };
        Ok(Some(TablePair {
            logical,
            source: source.describe(&src).await?,
            destination: destination.describe(&dst).await?,
        }))
    }

    /// Like [`TablePair::resolve`], failing with `TableNotFound`.
    pub async fn require(
        source: &dyn Store,
        destination: &dyn Store,
        logical: &'static str,
    ) -> Result<TablePair> {
        let src = source.require_table(logical).await?;
        let dst = destination.require_table(logical).await?;
        Ok(TablePair {
            logical,
            source: source.describe(&src).await?,
            destination: destination.describe(&dst).await?,
        })
    }

    /// Fields present in both tables, sorted, as the source spells them.
    pub fn shared_fields(&self) -> Vec<String> {
        self.source.shared_fields(&self.destination)
    }

    /// Destination spelling of a source field name.
    fn destination_name(&self, name: &str) -> String {
        self.destination
            .field(name)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| name.to_string())
    }

    fn missing(&self, what: &str) -> MigrateError {
        MigrateError::Config(format!(
            "{} field {} is not present in both workspaces",
            self.logical, what
        ))
    }
}

fn position(fields: &[String], name: &str) -> Option<usize> {
    fields.iter().position(|f| f.eq_ignore_ascii_case(name))
}

/// Field layout for REVTABLEMAIN.
#[derive(Debug, Clone)]
pub struct RecordLayout {
    /// Fields read from the source, sorted.
    pub read: Vec<String>,
    /// Fields written to the destination, parallel to `read`.
    pub write: Vec<String>,
    /// Source identifier field.
    pub in_id_field: String,
    /// Destination identifier field.
    pub out_id_field: String,
    pub id_idx: usize,
    pub out_id_idx: usize,
    pub session_idx: usize,
    pub check_run_idx: usize,
}

impl RecordLayout {
    /// Shared fields of the two main tables, with the identifier column
    /// switched to `ID` when a pre-10.6 source feeds a 10.6 destination.
    pub fn new(
        pair: &TablePair,
        source_version: SchemaVersion,
        destination_version: SchemaVersion,
    ) -> Result<RecordLayout> {
        let read = pair.shared_fields();
        let mut write: Vec<String> = read.iter().map(|f| pair.destination_name(f)).collect();

        let role_idx = |role: FieldRole| -> Result<usize> {
            let name = pair.source.require_role(role)?.name.clone();
            position(&read, &name).ok_or_else(|| pair.missing(&name))
        };
        let session_idx = role_idx(FieldRole::SessionId)?;
        let check_run_idx = role_idx(FieldRole::CheckRunId)?;

        let in_id = source_version.record_id_field();
        let id_idx = position(&read, in_id).ok_or_else(|| pair.missing(in_id))?;

        let guid_field = FieldRole::Guid.candidates()[0];
        let (out_id_idx, out_id_field) = if destination_version.uses_guid_ids() {
            match position(&read, guid_field) {
                Some(i) => (i, write[i].clone()),
                None => {
                    let field = pair
                        .destination
                        .role(FieldRole::Guid)
                        .ok_or_else(|| pair.missing(guid_field))?;
                    write[id_idx] = field.name.clone();
                    (id_idx, field.name.clone())
                }
            }
        } else {
            (id_idx, write[id_idx].clone())
        };

        let in_id_field = read[id_idx].clone();
        Ok(RecordLayout {
            read,
            write,
            in_id_field,
            out_id_field,
            id_idx,
            out_id_idx,
            session_idx,
            check_run_idx,
        })
    }
}

/// Field layout for one geometry table.
#[derive(Debug, Clone)]
pub struct GeometryLayout {
    pub kind: GeometryTable,
    pub pair: TablePair,
    /// `[link, shape]` in the source.
    pub read: Vec<String>,
    /// `[link, session, shape]` in the destination.
    pub write: Vec<String>,
}

impl GeometryLayout {
    pub fn new(kind: GeometryTable, pair: TablePair) -> Result<GeometryLayout> {
        let read = vec![
            pair.source.require_role(FieldRole::LinkId)?.name.clone(),
            pair.source.require_role(FieldRole::Shape)?.name.clone(),
        ];
        let write = vec![
            pair.destination.require_role(FieldRole::LinkId)?.name.clone(),
            pair.destination.require_role(FieldRole::SessionId)?.name.clone(),
            pair.destination.require_role(FieldRole::Shape)?.name.clone(),
        ];
        Ok(GeometryLayout {
            kind,
            pair,
            read,
            write,
        })
    }
}

/// Field layout for REVCHECKRUNTABLE.
#[derive(Debug, Clone)]
pub struct CheckRunLayout {
    pub pair: TablePair,
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub record_idx: usize,
    pub check_run_idx: usize,
    pub session_idx: usize,
    pub batch_run_idx: usize,
    pub properties_idx: Option<usize>,
}

impl CheckRunLayout {
    pub fn new(pair: TablePair) -> Result<CheckRunLayout> {
        let read = pair.shared_fields();
        let write = read.iter().map(|f| pair.destination_name(f)).collect();
        let role_idx = |role: FieldRole| -> Result<usize> {
            let name = pair.source.require_role(role)?.name.clone();
            position(&read, &name).ok_or_else(|| pair.missing(&name))
        };
        let record_idx = role_idx(FieldRole::RecordId)?;
        let check_run_idx = role_idx(FieldRole::CheckRunId)?;
        let session_idx = role_idx(FieldRole::SessionId)?;
        let batch_run_idx = role_idx(FieldRole::BatchRunId)?;
        let properties_idx = role_idx(FieldRole::CheckRunProperties).ok();
        Ok(CheckRunLayout {
            pair,
            read,
            write,
            record_idx,
            check_run_idx,
            session_idx,
            batch_run_idx,
            properties_idx,
        })
    }
}

/// Field layout for REVBATCHRUNTABLE.
#[derive(Debug, Clone)]
pub struct BatchRunLayout {
    pub pair: TablePair,
    pub read: Vec<String>,
    pub write: Vec<String>,
    /// Unique GUID field in the source (`GLOBALID` or `ID`).
    pub in_uid_field: String,
    /// Unique GUID field in the destination.
    pub out_uid_field: String,
    /// Destination RECORDID, used to recover store-generated GUIDs.
    pub out_record_field: String,
    pub uid_idx: usize,
    pub record_idx: usize,
    /// The destination assigns the GUID on insert.
    pub out_uid_generated: bool,
}

impl BatchRunLayout {
    pub fn new(pair: TablePair) -> Result<BatchRunLayout> {
        let in_uid = pair.source.require_role(FieldRole::GlobalId)?.name.clone();
        let out_uid = pair.destination.require_role(FieldRole::GlobalId)?.clone();
        let in_record = pair.source.require_role(FieldRole::RecordId)?.name.clone();
        let out_record = pair.destination.require_role(FieldRole::RecordId)?.name.clone();

        let mut read: Vec<String> = pair
            .shared_fields()
            .into_iter()
            .filter(|f| f.eq_ignore_ascii_case(&in_uid) || !f.eq_ignore_ascii_case(&out_uid.name))
            .collect();
        if position(&read, &in_uid).is_none() {
            read.push(in_uid.clone());
            read.sort_by_key(|n| n.to_uppercase());
        }
        let write = read
            .iter()
            .map(|f| {
                if f.eq_ignore_ascii_case(&in_uid) {
                    out_uid.name.clone()
                } else {
                    pair.destination_name(f)
                }
            })
            .collect();

        let uid_idx = position(&read, &in_uid).ok_or_else(|| pair.missing(&in_uid))?;
        let record_idx = position(&read, &in_record).ok_or_else(|| pair.missing(&in_record))?;

        Ok(BatchRunLayout {
            in_uid_field: in_uid,
            out_uid_field: out_uid.name.clone(),
            out_record_field: out_record,
            uid_idx,
            record_idx,
            out_uid_generated: out_uid.field_type.is_store_generated(),
            pair,
            read,
            write,
        })
    }
}

/// Both run tables.
#[derive(Debug, Clone)]
pub struct RunTablesLayout {
    pub check_runs: CheckRunLayout,
    pub batch_runs: BatchRunLayout,
}

/// Everything the copier needs to know about both workspaces.
#[derive(Debug, Clone)]
pub struct CopyPlan {
    pub main: TablePair,
    pub records: RecordLayout,
    pub geometry: Vec<GeometryLayout>,
    pub run_tables: Option<RunTablesLayout>,
}

impl CopyPlan {
    /// Resolve all tables and layouts.
    ///
    /// REVTABLEMAIN must exist in both workspaces. Missing geometry or run
    /// tables are skipped with a warning.
    pub async fn resolve(
        source: &dyn Store,
        destination: &dyn Store,
        source_version: SchemaVersion,
        destination_version: SchemaVersion,
        warnings: &mut Warnings,
    ) -> Result<CopyPlan> {
        let main = TablePair::require(source, destination, tables::MAIN).await?;
        let records = RecordLayout::new(&main, source_version, destination_version)?;

        let mut geometry = Vec::new();
        for kind in GeometryTable::ALL {
            match TablePair::resolve(source, destination, kind.table_name()).await? {
                Some(pair) => geometry.push(GeometryLayout::new(kind, pair)?),
                None => warnings.push(format!(
                    "Unable to identify {} in both workspaces. No features from this table will be copied.",
                    kind.table_name()
                )),
            }
        }

        let check = TablePair::resolve(source, destination, tables::CHECK_RUN).await?;
        let batch = TablePair::resolve(source, destination, tables::BATCH_RUN).await?;
        let run_tables = match (check, batch) {
            (Some(check), Some(batch)) => Some(RunTablesLayout {
                check_runs: CheckRunLayout::new(check)?,
                batch_runs: BatchRunLayout::new(batch)?,
            }),
            _ => {
                warnings.push(format!(
                    "Unable to identify {} or {} in both workspaces. No records from these tables will be copied.",
                    tables::CHECK_RUN,
                    tables::BATCH_RUN
                ));
                None
            }
        };

        Ok(CopyPlan {
            main,
            records,
            geometry,
            run_tables,
        })
    }

    /// Whether `column` exists in the source REVTABLEMAIN.
    pub fn has_source_field(&self, column: &str) -> bool {
        self.main.source.has_field(column)
    }
}
