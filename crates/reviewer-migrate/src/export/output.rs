//! Export artifacts: naming, column renames, GeoJSON and CSV rendering, and
//! staged writes.

use std::path::{Path, PathBuf};

use serde_json::{json, Map};
use tracing::{debug, warn};

use crate::core::identifier::format_guid;
use crate::core::value::Value;
use crate::error::{MigrateError, Result};
use crate::geometry::Geometry;

/// Output columns longer than ten characters, or reserved, and their
/// replacements.
pub const RENAMES: [(&str, &str); 14] = [
    ("ORIGINTABLE", "ORIG_TABLE"),
    ("ORIGINCHECK", "ORIG_CHECK"),
    ("REVIEWSTATUS", "ERROR_DESC"),
    ("CORRECTIONSTATUS", "COR_STATUS"),
    ("VERIFICATIONSTATUS", "VER_STATUS"),
    ("REVIEWTECHNICIAN", "REV_TECH"),
    ("REVIEWDATE", "REV_DATE"),
    ("CORRECTIONTECHNICIAN", "COR_TECH"),
    ("CORRECTIONDATE", "COR_DATE"),
    ("VERIFICATIONTECHNICIAN", "VER_TECH"),
    ("VERIFICATIONDATE", "VER_DATE"),
    ("LIFECYCLESTATUS", "STATUS"),
    ("LIFECYCLEPHASE", "PHASE"),
    ("OBJECTID", "FeatureOID"),
];

/// Name a REVTABLEMAIN column takes in the outputs.
pub fn output_column(name: &str) -> String {
    RENAMES
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(name))
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Paths of the two export artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Point features, `<base>.geojson`.
    pub features: PathBuf,
    /// Records without geometry, `<base>_Table.csv`.
    pub table: PathBuf,
}

impl OutputPaths {
    /// Derive the output paths from a base name. A trailing `.shp` (any case)
    /// is dropped.
    pub fn new(dir: &Path, name: &str) -> Self {
        let name = name.trim();
        let base = match name.len().checked_sub(4) {
            Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".shp") => {
                &name[..cut]
            }
            _ => name,
        };
        Self {
            features: dir.join(format!("{}.geojson", base)),
            table: dir.join(format!("{}_Table.csv", base)),
        }
    }

    /// Outputs already on disk.
    pub fn existing(&self) -> Vec<&Path> {
        [self.features.as_path(), self.table.as_path()]
            .into_iter()
            .filter(|p| p.exists())
            .collect()
    }

    /// Fail when either output exists.
    ///
    /// # Errors
    ///
    /// `MigrateError::OutputExists` naming every existing output.
    pub fn ensure_free(&self) -> Result<()> {
        let existing = self.existing();
        if existing.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = existing.iter().map(|p| p.display().to_string()).collect();
        Err(MigrateError::OutputExists(format!(
            "{}. Please choose new output directory or delete existing files",
            names.join(", ")
        )))
    }
}

/// A point feature ready for output.
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry,
    /// `(output column, value)` pairs.
    pub properties: Vec<(String, Value)>,
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Blob(_) | Value::Geometry(_) => serde_json::Value::Null,
        Value::Int(v) => json!(v),
        Value::Double(v) => serde_json::Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(v) => json!(v),
        Value::Guid(v) => json!(format_guid(v)),
        Value::Date(v) => json!(v.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

/// Render features as a GeoJSON FeatureCollection.
pub fn render_geojson(features: &[Feature], spatial_reference: Option<&str>) -> Result<String> {
    let mut items = Vec::with_capacity(features.len());
    for feature in features {
        let properties: Map<String, serde_json::Value> = feature
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), json_value(value)))
            .collect();
        items.push(json!({
            "type": "Feature",
            "geometry": serde_json::to_value(&feature.geometry)?,
            "properties": properties,
        }));
    }

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": items,
    });
    if let (Some(sr), Some(obj)) = (spatial_reference, collection.as_object_mut()) {
        obj.insert(
            "crs".to_string(),
            json!({ "type": "name", "properties": { "name": sr } }),
        );
    }
    Ok(serde_json::to_string_pretty(&collection)?)
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null | Value::Blob(_) | Value::Geometry(_) => String::new(),
        other => other.to_string(),
    }
}

/// Render rows as CSV with a header line.
pub fn render_csv(columns: &[String], rows: &[Vec<Value>]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(csv_field))?;
    }
    writer
        .into_inner()
        .map_err(|e| MigrateError::Io(e.into_error()))
}

/// Files written into place by one export.
///
/// Each output goes to `<path>.tmp` first and is renamed when complete.
/// Unless [`StagedOutputs::keep`] is called, [`StagedOutputs::discard`]
/// removes everything written so far.
#[derive(Debug, Default)]
pub struct StagedOutputs {
    written: Vec<PathBuf>,
}

impl StagedOutputs {
    /// Write `content` to `path` through a temp file.
    pub async fn write(&mut self, path: &Path, content: &[u8]) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        self.written.push(temp_path.clone());
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        self.written.push(path.to_path_buf());
        debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Keep the outputs. Returns their paths.
    pub fn keep(self) -> Vec<PathBuf> {
        self.written
            .into_iter()
            .filter(|p| p.extension().map_or(true, |e| e != "tmp"))
            .collect()
    }

    /// Remove every output and temp file written so far.
    pub async fn discard(self) {
        for path in self.written.iter().rev() {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
    }
}
