//! Export session records to point features plus a table of records that
//! have no geometry.
//!
//! Point findings are exported as they are. Line and polygon findings are
//! exploded into single parts, repaired, reduced to an interior point per
//! part, and dissolved back into one (multi)point per record. Every feature
//! is inner-joined to REVTABLEMAIN on its link id.

mod output;

pub use output::{output_column, Feature, OutputPaths, StagedOutputs, RENAMES};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::core::schema::{tables, FieldRole, FieldType, GeometryTable, TableSchema};
use crate::core::traits::Store;
use crate::core::value::{Identifier, Row, Value};
use crate::error::{MigrateError, Result, Warnings};
use crate::geometry::{aggregate_by_link, Geometry};
use crate::predicate::Predicate;
use crate::selection::{build_selection, SessionRef};
use crate::store::JsonWorkspace;
use crate::version::{detect_version, SchemaVersion};

/// Export job.
pub struct ExportRun {
    config: ExportConfig,
    workspace: Arc<dyn Store>,
}

/// Result of an export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the export started.
    pub started_at: DateTime<Utc>,

    /// When the export completed.
    pub completed_at: DateTime<Utc>,

    pub workspace: String,
    pub version: SchemaVersion,

    /// Sessions exported.
    pub sessions: Vec<SessionRef>,

    /// Selection predicate (empty when every session is exported).
    pub predicate: String,

    /// Source features read per geometry table.
    pub points: usize,
    pub lines: usize,
    pub polygons: usize,

    /// Point features written.
    pub features: usize,

    /// Features dropped because their record was not found.
    pub unmatched: usize,

    /// Records without geometry written to the table.
    pub table_records: usize,

    /// Errors exported (source features plus table records).
    pub total: usize,

    pub feature_file: PathBuf,

    /// Written only when there are records without geometry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_file: Option<PathBuf>,

    /// Partial-consistency warnings raised during the export.
    pub warnings: Warnings,
}

impl ExportReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Features read from one geometry table.
struct TableFeatures {
    read: usize,
    features: Vec<(Identifier, Geometry)>,
}

/// The REVTABLEMAIN columns going to the outputs.
struct Columns {
    /// Field names in REVTABLEMAIN.
    source: Vec<String>,
    /// Names in the outputs.
    output: Vec<String>,
}

impl ExportRun {
    /// Open the workspace document named by the configuration.
    pub fn open(config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let workspace: Arc<dyn Store> = Arc::new(JsonWorkspace::open(&config.workspace)?);
        Ok(Self { config, workspace })
    }

    /// Export from an already opened store.
    pub fn with_store(config: ExportConfig, workspace: Arc<dyn Store>) -> Self {
        Self { config, workspace }
    }

    /// Run the export.
    ///
    /// Fails before reading anything when an output already exists. A
    /// failure while producing outputs removes whatever was written.
    pub async fn run(self) -> Result<ExportReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let config = &self.config;
        let store = self.workspace.as_ref();
        let mut warnings = Warnings::default();

        config.validate()?;
        info!("Starting export: {}", run_id);

        tokio::fs::create_dir_all(&config.output_dir).await?;
        let paths = OutputPaths::new(&config.output_dir, &config.output_name);
        paths.ensure_free()?;

        let version = detect_version(store, &mut warnings).await?;
        if version == SchemaVersion::Unsupported {
            return Err(MigrateError::Incompatible(format!(
                "{} is not a supported Reviewer workspace version",
                store.workspace()
            )));
        }

        let session_table = store.require_table(tables::SESSION).await?;
        let selection = build_selection(
            store,
            &session_table,
            &config.session_names(),
            None,
            &config.selection(),
            &mut warnings,
        )
        .await?;

        let main = store.require_table(tables::MAIN).await?;
        let main_schema = store.describe(&main).await?;
        let columns = select_columns(&main_schema, &config.field_names(), &mut warnings);
        let record_field = main_schema
            .field(version.record_id_field())
            .ok_or_else(|| {
                MigrateError::Config(format!(
                    "Table {} has no {} field",
                    main_schema.name,
                    version.record_id_field()
                ))
            })?
            .name
            .clone();

        // Records keyed by record id, carrying the output columns.
        let mut read_fields = vec![record_field.clone()];
        read_fields.extend(columns.source.iter().cloned());
        let mut records: HashMap<Identifier, Row> = HashMap::new();
        for row in store.search(&main, &read_fields, selection.predicate.as_ref()).await? {
            let mut values = row.into_iter();
            let Some(id) = values.next().and_then(|v| v.to_identifier()) else {
                continue;
            };
            records.insert(id, values.collect());
        }
        debug!("{} records selected from {}", records.len(), main);

        // Point-like features
        info!("Processing Point Errors...");
        let points = read_features(store, GeometryTable::Point, selection.predicate.as_ref()).await?;
        info!("Processing Line Errors...");
        let lines = read_features(store, GeometryTable::Line, selection.predicate.as_ref()).await?;
        info!("Processing Polygon Errors...");
        let polygons = read_features(store, GeometryTable::Polygon, selection.predicate.as_ref()).await?;

        let spatial_reference = match store.resolve_table(tables::POINT).await? {
            Some(table) => store.describe(&table).await?.spatial_reference,
            None => None,
        };

        let mut features = Vec::new();
        let mut unmatched = 0;
        info!("Joining to {} for error information", main);
        for (link, geometry) in points
            .features
            .iter()
            .chain(&lines.features)
            .chain(&polygons.features)
        {
            let Some(values) = records.get(link) else {
                debug!("No record {} for feature, dropped", link);
                unmatched += 1;
                continue;
            };
            features.push(Feature {
                geometry: geometry.clone(),
                properties: columns.output.iter().cloned().zip(values.iter().cloned()).collect(),
            });
        }

        // Records without geometry
        info!("Processing errors with no geometry...");
        let geometry_type = main_schema.require_role(FieldRole::GeometryType)?.name.clone();
        let no_geometry = Predicate::and_opt(
            selection.predicate.clone(),
            Some(Predicate::is_null(geometry_type)),
        );
        let table_rows = store
            .search(&main, &columns.source, no_geometry.as_ref())
            .await?;

        // Outputs
        let mut staged = StagedOutputs::default();
        let written: Result<()> = async {
            let geojson = output::render_geojson(&features, spatial_reference.as_deref())?;
            staged.write(&paths.features, geojson.as_bytes()).await?;
            if !table_rows.is_empty() {
                info!(
                    "{} errors exist with no geometry and will be exported to a table",
                    table_rows.len()
                );
                let csv = output::render_csv(&columns.output, &table_rows)?;
                staged.write(&paths.table, &csv).await?;
            } else {
                info!("No errors exist with no geometry in selected session. No table will be created.");
            }
            Ok(())
        }
        .await;
        if let Err(e) = written {
            staged.discard().await;
            return Err(e);
        }
        staged.keep();

        let total = points.read + lines.read + polygons.read + table_rows.len();
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let report = ExportReport {
            run_id,
            status: "completed".to_string(),
            duration_seconds,
            started_at,
            completed_at,
            workspace: store.workspace().to_string(),
            version,
            sessions: selection.sessions,
            predicate: selection.rendered,
            points: points.read,
            lines: lines.read,
            polygons: polygons.read,
            features: features.len(),
            unmatched,
            table_records: table_rows.len(),
            total,
            feature_file: paths.features.clone(),
            table_file: (!table_rows.is_empty()).then(|| paths.table.clone()),
            warnings,
        };

        info!("Total Errors Exported: {}", report.total);
        info!("Output point file path {}", report.feature_file.display());
        if let Some(table) = &report.table_file {
            info!("Output Table path {}", table.display());
        }
        Ok(report)
    }
}

/// Pick the REVTABLEMAIN columns to export: the requested ones, or every
/// column that a flat table can hold when none are requested.
fn select_columns(schema: &TableSchema, requested: &[String], warnings: &mut Warnings) -> Columns {
    let exportable = |t: FieldType| !matches!(t, FieldType::Blob | FieldType::Geometry | FieldType::Raster);

    let source: Vec<String> = if requested.is_empty() {
        schema
            .fields
            .iter()
            .filter(|f| exportable(f.field_type))
            .map(|f| f.name.clone())
            .collect()
    } else {
        let mut names = Vec::new();
        for name in requested {
            match schema.field(name) {
                Some(f) if exportable(f.field_type) => names.push(f.name.clone()),
                Some(f) => warnings.push(format!(
                    "Field {} of type {:?} cannot be exported and is skipped",
                    f.name, f.field_type
                )),
                None => warnings.push(format!("Field {} not found in {}", name, schema.name)),
            }
        }
        names
    };
    let output = source.iter().map(|n| output_column(n)).collect();
    Columns { source, output }
}

/// Read one geometry table as `(link id, point-like geometry)` pairs.
///
/// Points pass through. Lines and polygons become one interior point per
/// part, dissolved per link id. A missing table reads as empty.
async fn read_features(
    store: &dyn Store,
    kind: GeometryTable,
    predicate: Option<&Predicate>,
) -> Result<TableFeatures> {
    let Some(table) = store.resolve_table(kind.table_name()).await? else {
        debug!("{} not found, skipped", kind.table_name());
        return Ok(TableFeatures {
            read: 0,
            features: Vec::new(),
        });
    };
    let schema = store.describe(&table).await?;
    let fields = vec![
        schema.require_role(FieldRole::LinkId)?.name.clone(),
        schema.require_role(FieldRole::Shape)?.name.clone(),
    ];
    let rows = store.search(&table, &fields, predicate).await?;
    let read = rows.len();

    let mut features = Vec::new();
    let mut parts = Vec::new();
    for row in rows {
        let mut values = row.into_iter();
        let Some(link) = values.next().and_then(|v| v.to_identifier()) else {
            continue;
        };
        let Some(Value::Geometry(geometry)) = values.next() else {
            continue;
        };
        if kind == GeometryTable::Point {
            features.push((link, geometry));
            continue;
        }
        for part in geometry.explode() {
            if let Some(point) = part.repair().and_then(|g| g.interior_point()) {
                parts.push((link.clone(), point));
            }
        }
    }
    if kind != GeometryTable::Point {
        features = aggregate_by_link(parts);
    }

    if read > 0 {
        info!("  .. {} {} features processed", read, kind.table_name());
    } else {
        info!("  .. No {} errors exist in selected session", kind.table_name());
    }
    Ok(TableFeatures { read, features })
}
