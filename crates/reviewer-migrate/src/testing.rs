//! Workspace fixtures for unit and scenario tests.

use uuid::Uuid;

use crate::core::schema::{tables, Field, FieldType, TableSchema};
use crate::core::value::{Identifier, Row, Value};
use crate::geometry::{Geometry, Point};
use crate::store::JsonWorkspace;
use crate::version::{SchemaVersion, SCHEMA_HASH_10_6};

/// Deterministic GUID for fixture key `n`.
pub(crate) fn guid(n: u128) -> Uuid {
    Uuid::from_u128(0x5EED_0000_0000_0000_0000_0000_0000_0000 + n)
}

fn main_schema(version: SchemaVersion) -> TableSchema {
    let mut fields = vec![Field::required("RECORDID", FieldType::ObjectId)];
    if version == SchemaVersion::V10_6 {
        fields.push(Field::required("ID", FieldType::Guid));
    }
    fields.extend([
        Field::new("SESSIONID", FieldType::Integer),
        Field::new("CHECKRUNID", FieldType::Guid),
        Field::new("GEOMETRYTYPE", FieldType::SmallInteger),
        Field::new("ORIGINTABLE", FieldType::String),
        Field::new("REVIEWSTATUS", FieldType::String),
        Field::new("SEVERITY", FieldType::SmallInteger),
    ]);
    if version != SchemaVersion::Pre10_3 {
        fields.push(Field::new("LIFECYCLEPHASE", FieldType::SmallInteger));
    }
    TableSchema::new(tables::MAIN, fields)
}

fn geometry_schema(table: &str, version: SchemaVersion) -> TableSchema {
    let link = if version == SchemaVersion::V10_6 {
        Field::new("LINKGUID", FieldType::Guid)
    } else {
        Field::new("LINKID", FieldType::Integer)
    };
    let shape = if table == tables::LOCATION {
        Field::new("BITMAP", FieldType::Blob)
    } else {
        Field::new("SHAPE", FieldType::Geometry)
    };
    let mut schema = TableSchema::new(
        table,
        vec![
            Field::required("OBJECTID", FieldType::ObjectId),
            link,
            Field::new("SESSIONID", FieldType::Integer),
            shape,
        ],
    );
    if table != tables::LOCATION {
        schema.spatial_reference = Some("WGS_1984".to_string());
    }
    schema
}

fn check_run_schema() -> TableSchema {
    TableSchema::new(
        tables::CHECK_RUN,
        vec![
            Field::required("RECORDID", FieldType::ObjectId),
            Field::new("CHECKRUNID", FieldType::Guid),
            Field::new("BATCHRUNID", FieldType::Guid),
            Field::new("SESSIONID", FieldType::Integer),
            Field::new("CHECKRUNNAME", FieldType::String),
            Field::required("CHECKRUNPROPERTIES", FieldType::Blob),
        ],
    )
}

fn batch_run_schema(version: SchemaVersion) -> TableSchema {
    let uid = if version == SchemaVersion::V10_6 {
        Field::required("ID", FieldType::Guid)
    } else {
        Field::new("GLOBALID", FieldType::GlobalId)
    };
    TableSchema::new(
        tables::BATCH_RUN,
        vec![
            Field::required("RECORDID", FieldType::ObjectId),
            uid,
            Field::new("BATCHJOBFILE", FieldType::String),
        ],
    )
}

fn session_schema() -> TableSchema {
    TableSchema::new(
        tables::SESSION,
        vec![
            Field::required("OBJECTID", FieldType::ObjectId),
            Field::new("SESSIONID", FieldType::Integer),
            Field::new("SESSIONNAME", FieldType::String),
        ],
    )
}

/// Build a row in schema order from `(field, value)` pairs. Unnamed fields
/// are NULL.
pub(crate) fn row_for(schema: &TableSchema, values: &[(&str, Value)]) -> Row {
    schema
        .fields
        .iter()
        .map(|f| {
            values
                .iter()
                .find(|(name, _)| f.name.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null)
        })
        .collect()
}

/// Builder for a Reviewer Workspace of a given schema generation.
///
/// Records are addressed by an integer key: the key is the RECORDID, and at
/// 10.6 the record's `ID` is `guid(key)`.
pub(crate) struct Fixture {
    name: String,
    version: SchemaVersion,
    prefix: String,
    versioned: bool,
    with_run_tables: bool,
    sessions: Vec<Row>,
    records: Vec<Row>,
    geometry: Vec<(&'static str, Vec<Row>)>,
    check_runs: Vec<Row>,
    batch_runs: Vec<Row>,
}

impl Fixture {
    pub(crate) fn new(name: &str, version: SchemaVersion) -> Self {
        Self {
            name: name.to_string(),
            version,
            prefix: String::new(),
            versioned: false,
            with_run_tables: true,
            sessions: Vec::new(),
            records: Vec::new(),
            geometry: [tables::POINT, tables::LINE, tables::POLY, tables::LOCATION]
                .into_iter()
                .map(|t| (t, Vec::new()))
                .collect(),
            check_runs: Vec::new(),
            batch_runs: Vec::new(),
        }
    }

    /// Qualify every physical table name, e.g. `DBO.`.
    pub(crate) fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Register every table as versioned.
    pub(crate) fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    /// Leave out REVCHECKRUNTABLE and REVBATCHRUNTABLE.
    pub(crate) fn without_run_tables(mut self) -> Self {
        self.with_run_tables = false;
        self
    }

    pub(crate) fn session(mut self, id: i64, name: &str) -> Self {
        self.sessions.push(row_for(
            &session_schema(),
            &[("SESSIONID", Value::Int(id)), ("SESSIONNAME", Value::from(name))],
        ));
        self
    }

    /// Identifier a record with this key carries in this workspace.
    pub(crate) fn record_id(&self, key: i64) -> Identifier {
        record_id(self.version, key)
    }

    pub(crate) fn record(
        mut self,
        key: i64,
        session: i64,
        check_run: Option<Uuid>,
        status: &str,
    ) -> Self {
        let mut values = vec![
            ("RECORDID", Value::Int(key)),
            ("SESSIONID", Value::Int(session)),
            ("CHECKRUNID", Value::from(check_run)),
            ("GEOMETRYTYPE", Value::Int(1)),
            ("ORIGINTABLE", Value::from("Roads")),
            ("REVIEWSTATUS", Value::from(status)),
            ("SEVERITY", Value::Int(key % 5 + 1)),
            ("LIFECYCLEPHASE", Value::Int(1)),
        ];
        if self.version == SchemaVersion::V10_6 {
            values.push(("ID", Value::Guid(guid(key as u128))));
        }
        self.records.push(row_for(&main_schema(self.version), &values));
        self
    }

    /// A record with no geometry (GEOMETRYTYPE NULL).
    pub(crate) fn table_record(mut self, key: i64, session: i64, status: &str) -> Self {
        self = self.record(key, session, None, status);
        let schema = main_schema(self.version);
        if let (Some(idx), Some(row)) = (schema.index_of("GEOMETRYTYPE"), self.records.last_mut()) {
            row[idx] = Value::Null;
        }
        self
    }

    fn feature(mut self, table: &'static str, link: Value, session: i64, shape: Value) -> Self {
        let schema = geometry_schema(table, self.version);
        let link_field = schema.fields[1].name.clone();
        let shape_field = schema.fields[3].name.clone();
        let row = row_for(
            &schema,
            &[
                (link_field.as_str(), link),
                ("SESSIONID", Value::Int(session)),
                (shape_field.as_str(), shape),
            ],
        );
        if let Some((_, rows)) = self.geometry.iter_mut().find(|(t, _)| *t == table) {
            rows.push(row);
        }
        self
    }

    pub(crate) fn point(self, link: i64, session: i64, x: f64, y: f64) -> Self {
        let id = self.record_id(link).to_value();
        self.feature(tables::POINT, id, session, Geometry::Point(Point::new(x, y)).into())
    }

    pub(crate) fn line(self, link: i64, session: i64, paths: Vec<Vec<[f64; 2]>>) -> Self {
        let id = self.record_id(link).to_value();
        let paths = paths
            .into_iter()
            .map(|p| p.into_iter().map(Point::from).collect())
            .collect();
        self.feature(tables::LINE, id, session, Geometry::Polyline(paths).into())
    }

    pub(crate) fn polygon(self, link: i64, session: i64, rings: Vec<Vec<[f64; 2]>>) -> Self {
        let id = self.record_id(link).to_value();
        let rings = rings
            .into_iter()
            .map(|r| r.into_iter().map(Point::from).collect())
            .collect();
        self.feature(tables::POLY, id, session, Geometry::Polygon(rings).into())
    }

    pub(crate) fn location(self, link: i64, session: i64, bitmap: &[u8]) -> Self {
        let id = self.record_id(link).to_value();
        self.feature(tables::LOCATION, id, session, Value::Blob(bitmap.to_vec()))
    }

    pub(crate) fn check_run(
        mut self,
        check_run: Uuid,
        batch_run: Option<Uuid>,
        session: i64,
        properties: Option<&[u8]>,
    ) -> Self {
        let key = self.check_runs.len() as i64 + 1;
        self.check_runs.push(row_for(
            &check_run_schema(),
            &[
                ("RECORDID", Value::Int(key)),
                ("CHECKRUNID", Value::Guid(check_run)),
                ("BATCHRUNID", Value::from(batch_run)),
                ("SESSIONID", Value::Int(session)),
                ("CHECKRUNNAME", Value::from(format!("Run {}", key))),
                (
                    "CHECKRUNPROPERTIES",
                    properties.map(|p| Value::Blob(p.to_vec())).unwrap_or(Value::Null),
                ),
            ],
        ));
        self
    }

    pub(crate) fn batch_run(mut self, uid: Uuid, job: &str) -> Self {
        let key = self.batch_runs.len() as i64 + 1;
        let uid_field = if self.version == SchemaVersion::V10_6 { "ID" } else { "GLOBALID" };
        self.batch_runs.push(row_for(
            &batch_run_schema(self.version),
            &[
                ("RECORDID", Value::Int(key)),
                (uid_field, Value::Guid(uid)),
                ("BATCHJOBFILE", Value::from(job)),
            ],
        ));
        self
    }

    pub(crate) fn build(self) -> JsonWorkspace {
        let prefix = self.prefix.clone();
        let versioned = self.versioned;
        let table = |mut schema: TableSchema| {
            schema.name = format!("{}{}", prefix, schema.name);
            schema.versioned = versioned;
            schema
        };

        let mut ws = JsonWorkspace::new(self.name.as_str())
            .with_table(table(session_schema()), self.sessions)
            .with_table(table(main_schema(self.version)), self.records);
        for (name, rows) in self.geometry {
            ws = ws.with_table(table(geometry_schema(name, self.version)), rows);
        }
        if self.with_run_tables {
            ws = ws
                .with_table(table(check_run_schema()), self.check_runs)
                .with_table(table(batch_run_schema(self.version)), self.batch_runs);
        }
        if self.version == SchemaVersion::V10_6 {
            ws = ws.with_table(
                table(TableSchema::new(
                    tables::VERSION,
                    vec![Field::new("SCHEMAHASH", FieldType::String)],
                )),
                vec![vec![Value::from(SCHEMA_HASH_10_6)]],
            );
        }
        ws
    }
}

/// Identifier of the record with `key` in a workspace of `version`.
pub(crate) fn record_id(version: SchemaVersion, key: i64) -> Identifier {
    if version == SchemaVersion::V10_6 {
        Identifier::Guid(guid(key as u128))
    } else {
        Identifier::Int(key)
    }
}

/// Field names as owned strings.
pub(crate) fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
