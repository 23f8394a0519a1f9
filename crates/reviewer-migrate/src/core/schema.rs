//! Schema descriptors for Reviewer Workspace tables.
//!
//! A [`TableSchema`] is resolved once per table at the start of a run. Code
//! that needs "the link field" or "the session field" asks for a
//! [`FieldRole`] instead of matching column names at every use.

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Logical table names inside a Reviewer Workspace.
///
/// Physical names may carry a qualifier prefix (`DBO.REVTABLEMAIN`,
/// `GDB_REVTABLEMAIN`); stores resolve them by suffix.
pub mod tables {
    pub const MAIN: &str = "REVTABLEMAIN";
    pub const SESSION: &str = "REVSESSIONTABLE";
    pub const POINT: &str = "REVTABLEPOINT";
    pub const LINE: &str = "REVTABLELINE";
    pub const POLY: &str = "REVTABLEPOLY";
    pub const LOCATION: &str = "REVTABLELOCATION";
    pub const CHECK_RUN: &str = "REVCHECKRUNTABLE";
    pub const BATCH_RUN: &str = "REVBATCHRUNTABLE";
    pub const VERSION: &str = "REVWORKSPACEVERSION";
}

/// The four Reviewer geometry tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryTable {
    Point,
    Line,
    Polygon,
    Location,
}

impl GeometryTable {
    /// All geometry tables in copy order.
    pub const ALL: [GeometryTable; 4] = [
        GeometryTable::Point,
        GeometryTable::Line,
        GeometryTable::Polygon,
        GeometryTable::Location,
    ];

    /// Logical table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            GeometryTable::Point => tables::POINT,
            GeometryTable::Line => tables::LINE,
            GeometryTable::Polygon => tables::POLY,
            GeometryTable::Location => tables::LOCATION,
        }
    }
}

/// Declared field type, following the vendor's field type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Store-assigned object id.
    ObjectId,
    SmallInteger,
    Integer,
    Single,
    Double,
    String,
    Date,
    /// User-assigned GUID.
    Guid,
    /// Store-generated GUID.
    GlobalId,
    Blob,
    Geometry,
    Raster,
}

impl FieldType {
    /// Numeric types render unquoted in predicates.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::ObjectId
                | FieldType::SmallInteger
                | FieldType::Integer
                | FieldType::Single
                | FieldType::Double
        )
    }

    /// Types whose literals are single-quoted in predicates.
    pub fn is_quoted(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Date | FieldType::Guid | FieldType::GlobalId
        )
    }

    /// Values of this type are assigned by the store on insert.
    pub fn is_store_generated(&self) -> bool {
        matches!(self, FieldType::ObjectId | FieldType::GlobalId)
    }
}

/// Field metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name as the store reports it.
    pub name: String,

    /// Declared type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether the field accepts NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,
}

fn default_true() -> bool {
    true
}

impl Field {
    /// Nullable field of the given type.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }

    /// Field that rejects NULL.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }
}

/// Logical role a field plays across schema generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    /// Integer RECORDID (object id before 10.6, secondary key afterwards).
    RecordId,
    /// GUID `ID` column (10.6 primary key).
    Guid,
    SessionId,
    SessionName,
    CheckRunId,
    BatchRunId,
    GeometryType,
    /// Link from a geometry row to its record.
    LinkId,
    /// Geometry or bitmap payload of a geometry row.
    Shape,
    /// Unique GUID of a batch run (GLOBALID before 10.6, ID afterwards).
    GlobalId,
    CheckRunProperties,
    SchemaHash,
    LifecyclePhase,
}

impl FieldRole {
    /// Candidate field names, in preference order.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            FieldRole::RecordId => &["RECORDID"],
            FieldRole::Guid => &["ID"],
            FieldRole::SessionId => &["SESSIONID"],
            FieldRole::SessionName => &["SESSIONNAME"],
            FieldRole::CheckRunId => &["CHECKRUNID"],
            FieldRole::BatchRunId => &["BATCHRUNID"],
            FieldRole::GeometryType => &["GEOMETRYTYPE"],
            FieldRole::LinkId => &["LINKID", "LINKGUID"],
            FieldRole::Shape => &["SHAPE", "BITMAP"],
            FieldRole::GlobalId => &["GLOBALID", "ID"],
            FieldRole::CheckRunProperties => &["CHECKRUNPROPERTIES"],
            FieldRole::SchemaHash => &["SCHEMAHASH"],
            FieldRole::LifecyclePhase => &["LIFECYCLEPHASE"],
        }
    }
}

/// Table metadata as described by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Physical table name.
    pub name: String,

    /// Field definitions in table order.
    pub fields: Vec<Field>,

    /// Whether the table is registered as versioned.
    #[serde(default)]
    pub versioned: bool,

    /// Spatial reference name, for feature classes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<String>,
}

impl TableSchema {
    /// Create a non-versioned table schema.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
            versioned: false,
            spatial_reference: None,
        }
    }

    /// Look up a field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Position of a field (case-insensitive).
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Check whether the table has a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Field names in table order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Resolve the field playing a role, trying candidates in order.
    pub fn role(&self, role: FieldRole) -> Option<&Field> {
        role.candidates().iter().find_map(|c| self.field(c))
    }

    /// Resolve a role or fail with a configuration error.
    pub fn require_role(&self, role: FieldRole) -> Result<&Field> {
        self.role(role).ok_or_else(|| {
            MigrateError::Config(format!(
                "Table {} has no {:?} field (expected one of {})",
                self.name,
                role,
                role.candidates().join(", ")
            ))
        })
    }

    /// The store-assigned object id field, if any.
    pub fn object_id_field(&self) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.field_type == FieldType::ObjectId)
    }

    /// Names present in both tables, sorted. Names are compared
    /// case-insensitively and reported as this table spells them.
    pub fn shared_fields(&self, other: &TableSchema) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .iter()
            .filter(|f| other.has_field(&f.name))
            .map(|f| f.name.clone())
            .collect();
        names.sort_by_key(|n| n.to_uppercase());
        names
    }
}
