//! Copy orchestrator - wires detection, selection, copy, delete and logging.

use crate::config::CopyConfig;
use crate::core::schema::{tables, GeometryTable};
use crate::core::traits::Store;
use crate::delete::{delete_mapped, DeleteOutcome};
use crate::edit::EditSession;
use crate::error::{MigrateError, Result, Warnings};
use crate::predicate::{parse, Predicate};
use crate::runlog::{self, RunLog};
use crate::selection::{build_selection, resolve_session, SessionRef};
use crate::store::JsonWorkspace;
use crate::transfer::{CopyOutcome, CopyPlan, RecordCopier};
use crate::version::{compatibility, detect_version, Compatibility, SchemaVersion};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Copy orchestrator.
pub struct CopyRun {
    config: CopyConfig,
    source: Arc<dyn Store>,
    destination: Arc<dyn Store>,
}

/// Copied identifiers for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub in_field: String,
    pub out_field: String,
    /// Distinct source identifiers copied.
    pub records: usize,
    /// Rows inserted into the destination.
    pub rows: usize,
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    pub source: String,
    pub destination: String,
    pub source_version: SchemaVersion,
    pub destination_version: SchemaVersion,
    pub compatibility: Compatibility,

    /// Sessions copied.
    pub input_sessions: Vec<SessionRef>,

    /// Session receiving the records.
    pub output_session: SessionRef,

    /// Selection predicate as sent to the source (empty when none).
    pub predicate: String,

    /// Per-table copy totals, in copy order.
    pub tables: Vec<TableSummary>,

    /// Per-table delete results, when the records were moved.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted: Vec<DeleteOutcome>,

    /// Run log written, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Partial-consistency warnings raised during the run.
    pub warnings: Warnings,

    /// Identifier maps built by the copy.
    #[serde(skip)]
    pub outcome: CopyOutcome,
}

impl CopyRun {
    /// Open the source and destination workspace documents.
    ///
    /// The same document named twice is opened once and shared.
    pub fn open(config: CopyConfig) -> Result<Self> {
        config.validate()?;
        let source: Arc<dyn Store> = Arc::new(JsonWorkspace::open(&config.source)?);
        let same = match (config.source.canonicalize(), config.destination.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        let destination: Arc<dyn Store> = if same {
            debug!("Source and destination are the same workspace");
            Arc::clone(&source)
        } else {
            Arc::new(JsonWorkspace::open(&config.destination)?)
        };
        Ok(Self {
            config,
            source,
            destination,
        })
    }

    /// Run against already opened stores.
    pub fn with_stores(config: CopyConfig, source: Arc<dyn Store>, destination: Arc<dyn Store>) -> Self {
        Self {
            config,
            source,
            destination,
        }
    }

    /// Run the copy.
    ///
    /// Everything up to the copy itself is checked before the destination
    /// edit session opens; a failure during the copy rolls the destination
    /// back. Delete failures are reported per table and do not fail the run.
    pub async fn run(self) -> Result<CopyReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let config = &self.config;
        let source = self.source.as_ref();
        let destination = self.destination.as_ref();
        let mut warnings = Warnings::default();

        config.validate()?;
        info!("Starting copy run: {}", run_id);

        // Phase 1: versions and tables
        let source_version = detect_version(source, &mut warnings).await?;
        let destination_version = detect_version(destination, &mut warnings).await?;
        info!(
            "Input workspace is version {}, output workspace is version {}",
            source_version, destination_version
        );
        let compatibility = compatibility(source_version, destination_version)?;
        let plan = CopyPlan::resolve(source, destination, source_version, destination_version, &mut warnings).await?;

        // Phase 2: selection
        let filter = parse_filter(config.filter.as_deref(), &plan)?;
        let session_table = source.require_table(tables::SESSION).await?;
        let selection = build_selection(
            source,
            &session_table,
            &config.session_names(),
            filter.as_ref(),
            &config.options.selection(),
            &mut warnings,
        )
        .await?;
        if !selection.rendered.is_empty() {
            debug!("Selection: {}", selection.rendered);
        }

        let out_session_table = destination.require_table(tables::SESSION).await?;
        let output_session = resolve_session(destination, &out_session_table, &config.destination_session).await?;
        info!("Output Reviewer Session id is {}", output_session.id);

        compare_spatial_references(&plan, &mut warnings);

        // Phase 3: copy
        let copier = RecordCopier {
            source,
            destination,
            plan: &plan,
            compatibility,
            session_predicate: selection.session_predicate.as_ref(),
            predicate: selection.predicate.as_ref(),
            destination_session: output_session.id.to_value(),
            strict_batch_runs: config.options.strict_batch_runs,
        };
        let edit = EditSession::begin(destination, plan.main.destination.versioned).await?;
        let result = copier.run(&mut warnings).await;
        let outcome = edit.finish(result).await?;

        let maps = outcome.table_maps();
        runlog::log_totals(&maps);

        // Phase 4: delete
        let mut deleted = Vec::new();
        if config.delete {
            info!("Deleting copied records from {}", source.workspace());
            for map in &maps {
                deleted.push(delete_mapped(source, map, &mut warnings).await);
            }
        }

        // Phase 5: log
        let log_file = if config.create_log {
            let log = RunLog {
                source: source.workspace(),
                destination: destination.workspace(),
                input_sessions: &selection.sessions,
                output_session: &output_session,
                maps: maps.clone(),
            };
            let dir = runlog::log_dir(config.options.log_dir.as_deref(), &config.destination);
            Some(log.write(&dir, Local::now().naive_local()).await?)
        } else {
            None
        };

        let tables = maps
            .iter()
            .map(|m| TableSummary {
                table: m.table.clone(),
                in_field: m.in_field.clone(),
                out_field: m.out_field.clone(),
                records: m.len(),
                rows: m.rows,
            })
            .collect();

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let report = CopyReport {
            run_id,
            status: "completed".to_string(),
            duration_seconds,
            started_at,
            completed_at,
            source: source.workspace().to_string(),
            destination: destination.workspace().to_string(),
            source_version,
            destination_version,
            compatibility,
            input_sessions: selection.sessions.clone(),
            output_session,
            predicate: selection.rendered.clone(),
            tables,
            deleted,
            log_file,
            warnings,
            outcome,
        };

        info!(
            "Copy {}: {} records in {:.1}s ({} warnings)",
            report.status,
            report.outcome.records.len(),
            report.duration_seconds,
            report.warnings.len()
        );
        Ok(report)
    }
}

/// Parse the user filter and check its columns exist in the source
/// REVTABLEMAIN.
fn parse_filter(filter: Option<&str>, plan: &CopyPlan) -> Result<Option<Predicate>> {
    let Some(predicate) = filter.map(parse).transpose()?.flatten() else {
        return Ok(None);
    };
    if let Some(column) = predicate.columns().into_iter().find(|c| !plan.has_source_field(c)) {
        return Err(MigrateError::Config(format!(
            "Filter field {} does not exist in {}",
            column, plan.main.source.name
        )));
    }
    Ok(Some(predicate))
}

fn compare_spatial_references(plan: &CopyPlan, warnings: &mut Warnings) {
    let Some(points) = plan.geometry.iter().find(|g| g.kind == GeometryTable::Point) else {
        return;
    };
    let input = &points.pair.source.spatial_reference;
    let output = &points.pair.destination.spatial_reference;
    if input != output {
        warnings.push(format!(
            "Spatial reference of input and output Reviewer workspaces do not match. Reviewer geometries will be projected. Input Spatial Reference: {}. Output Spatial Reference: {}",
            input.as_deref().unwrap_or("Unknown"),
            output.as_deref().unwrap_or("Unknown")
        ));
    }
}

impl CopyReport {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;
    use crate::testing::{fields, guid, Fixture};

    fn config() -> CopyConfig {
        CopyConfig {
            source: "in.json".into(),
            sessions: "A".to_string(),
            destination: "out.json".into(),
            destination_session: "Target".to_string(),
            ..Default::default()
        }
    }

    fn stores(source: JsonWorkspace, destination: JsonWorkspace) -> (Arc<JsonWorkspace>, Arc<JsonWorkspace>) {
        (Arc::new(source), Arc::new(destination))
    }

    fn source() -> JsonWorkspace {
        Fixture::new("in.json", SchemaVersion::Pre10_6)
            .session(1, "A")
            .session(2, "B")
            .record(1, 1, Some(guid(1)), "Open")
            .record(2, 1, Some(guid(1)), "Closed")
            .record(3, 2, None, "Open")
            .point(1, 1, 1.0, 2.0)
            .point(2, 1, 3.0, 4.0)
            .point(3, 2, 5.0, 6.0)
            .check_run(guid(1), Some(guid(50)), 1, Some(b"p"))
            .batch_run(guid(50), "job.rbj")
            .build()
    }

    fn destination() -> JsonWorkspace {
        Fixture::new("out.json", SchemaVersion::Pre10_6)
            .session(7, "Target")
            .build()
    }

    #[tokio::test]
    async fn test_copy_then_delete_leaves_no_mapped_rows() {
        let (src, dst) = stores(source(), destination());
        let mut config = config();
        config.delete = true;

        let report = CopyRun::with_stores(config, src.clone(), dst.clone()).run().await.unwrap();
        assert_eq!(report.outcome.records.len(), 2);
        assert_eq!(report.deleted.len(), report.tables.len());
        assert!(report.deleted.iter().all(|d| d.error.is_none()));

        for map in report.outcome.table_maps() {
            let table = src.require_table(&map.table).await.unwrap();
            for key in map.keys() {
                let left = src
                    .count(&table, Some(&Predicate::eq(map.in_field.as_str(), key.to_value())))
                    .await
                    .unwrap();
                assert_eq!(left, 0, "{} {} still in {}", map.in_field, key, map.table);
            }
        }
        assert_eq!(src.count(tables::MAIN, None).await.unwrap(), 1);
        assert_eq!(dst.count(tables::MAIN, None).await.unwrap(), 2);
        assert_eq!(dst.count(tables::BATCH_RUN, None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filter_and_report() {
        let (src, dst) = stores(source(), destination());
        let mut config = config();
        config.filter = Some("REVIEWSTATUS = 'Open'".to_string());

        let report = CopyRun::with_stores(config, src.clone(), dst.clone()).run().await.unwrap();
        assert_eq!(report.predicate, "SESSIONID IN (1) AND REVIEWSTATUS = 'Open'");
        assert_eq!(report.compatibility, Compatibility::OldToOld);
        assert_eq!(report.output_session.name, "Target");
        assert_eq!(report.tables[0].records, 1);
        assert!(report.deleted.is_empty());
        assert_eq!(src.count(tables::MAIN, None).await.unwrap(), 3);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"compatibility\": \"old_to_old\""));
        assert!(json.contains("\"source_version\": \"pre-10.6\""));

        let statuses = dst
            .search(tables::MAIN, &fields(&["REVIEWSTATUS"]), None)
            .await
            .unwrap();
        assert_eq!(statuses, vec![vec![Value::from("Open")]]);
    }

    #[tokio::test]
    async fn test_unknown_filter_field_fails_before_writing() {
        let (src, dst) = stores(source(), destination());
        let mut config = config();
        config.filter = Some("NOSUCHFIELD = 1".to_string());
        let err = CopyRun::with_stores(config, src, dst.clone()).run().await.unwrap_err();
        assert!(err.to_string().contains("NOSUCHFIELD"));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(dst.count(tables::MAIN, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_destination_session_is_fatal() {
        let (src, dst) = stores(source(), destination());
        let mut config = config();
        config.destination_session = "Nope".to_string();
        let err = CopyRun::with_stores(config, src, dst).run().await.unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[tokio::test]
    async fn test_spatial_reference_mismatch_warns() {
        let mut doc = destination().document().unwrap();
        for t in doc.tables.iter_mut() {
            if t.schema.name == tables::POINT {
                t.schema.spatial_reference = Some("NAD_1983".to_string());
            }
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();
        let dst = Arc::new(JsonWorkspace::open(&path).unwrap());

        let mut config = config();
        config.create_log = true;
        config.destination = path.clone();
        let report = CopyRun::with_stores(config, Arc::new(source()), dst).run().await.unwrap();
        assert!(report.warnings.contains("Output Spatial Reference: NAD_1983"));

        let log = report.log_file.unwrap();
        assert_eq!(log.parent(), Some(dir.path()));
        let text = std::fs::read_to_string(log).unwrap();
        assert!(text.contains("Total Records from REVTABLEMAIN: 2"));

        // Committed to the destination document.
        let reopened = JsonWorkspace::open(&path).unwrap();
        assert_eq!(reopened.count(tables::MAIN, None).await.unwrap(), 2);
    }
}
