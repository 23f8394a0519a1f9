//! Record copier.
//!
//! Copies selected REVTABLEMAIN rows and their dependent rows from one
//! workspace to another, minting new identifiers and keeping an
//! [`IdentifierMap`] per table so dependent rows point at the copies:
//!
//! 1. REVTABLEMAIN, over the fields both tables share. CHECKRUNIDs get one
//!    new GUID each, shared by every record that referenced them.
//! 2. The four geometry tables. A feature is copied only when its link id
//!    is a key of the record map.
//! 3. REVBATCHRUNTABLE and REVCHECKRUNTABLE (see [`run_tables`]).
//!
//! The copier only writes; the caller owns the destination edit session and
//! rolls it back when [`RecordCopier::run`] fails.

mod map;
pub mod plan;
mod run_tables;

pub use map::IdentifierMap;
pub use plan::{CopyPlan, TablePair};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::traits::Store;
use crate::core::value::{Identifier, Value};
use crate::error::{CopyPhase, MigrateError, Result, Warnings};
use crate::predicate::Predicate;
use crate::version::Compatibility;

use plan::GeometryLayout;

/// Identifier maps produced by a copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyOutcome {
    /// REVTABLEMAIN record ids.
    pub records: IdentifierMap,
    /// One map per geometry table copied, keyed by link id.
    pub geometry: Vec<IdentifierMap>,
    /// REVBATCHRUNTABLE RECORDIDs.
    pub batch_runs: Option<IdentifierMap>,
    /// REVCHECKRUNTABLE RECORDIDs.
    pub check_runs: Option<IdentifierMap>,
    /// CHECKRUNID GUIDs.
    pub check_run_ids: IdentifierMap,
    /// Batch run unique GUIDs.
    pub batch_run_ids: IdentifierMap,
}

impl CopyOutcome {
    /// Per-table maps in copy order; these drive deletion and the run log.
    pub fn table_maps(&self) -> Vec<&IdentifierMap> {
        let mut maps = vec![&self.records];
        maps.extend(self.geometry.iter());
        maps.extend(self.batch_runs.iter());
        maps.extend(self.check_runs.iter());
        maps
    }
}

/// Copies one selection into one destination session.
pub struct RecordCopier<'a> {
    pub source: &'a dyn Store,
    pub destination: &'a dyn Store,
    pub plan: &'a CopyPlan,
    pub compatibility: Compatibility,
    /// Session-only predicate, used for dependent tables.
    pub session_predicate: Option<&'a Predicate>,
    /// Session predicate AND user filter, used for REVTABLEMAIN.
    pub predicate: Option<&'a Predicate>,
    /// Destination session id written to every copied row.
    pub destination_session: Value,
    /// Fail instead of warn on a BATCHRUNID with no copied batch run.
    pub strict_batch_runs: bool,
}

impl<'a> RecordCopier<'a> {
    /// Run all copy steps in dependency order.
    pub async fn run(&self, warnings: &mut Warnings) -> Result<CopyOutcome> {
        let mut outcome = CopyOutcome {
            check_run_ids: IdentifierMap::new(
                self.plan.main.logical,
                "CHECKRUNID",
                "CHECKRUNID",
            ),
            ..Default::default()
        };

        info!("Copying {} records", self.plan.main.logical);
        outcome.records = self.copy_records(&mut outcome.check_run_ids).await?;
        info!("Copied {} records", outcome.records.len());

        for layout in &self.plan.geometry {
            info!("Copying {} features", layout.pair.logical);
            let map = self.copy_geometry(layout, &outcome.records).await?;
            debug!("Copied {} features from {}", map.rows, layout.pair.logical);
            outcome.geometry.push(map);
        }

        if let Some(layout) = &self.plan.run_tables {
            info!("Copying check run and batch run records");
            run_tables::copy(self, layout, &mut outcome, warnings).await?;
        }

        Ok(outcome)
    }

    async fn copy_records(&self, check_run_ids: &mut IdentifierMap) -> Result<IdentifierMap> {
        let layout = &self.plan.records;
        let source_table = &self.plan.main.source.name;
        let destination_table = &self.plan.main.destination.name;
        let mints = self.compatibility.mints_record_guids();

        let mut map = IdentifierMap::new(
            self.plan.main.logical,
            layout.in_id_field.clone(),
            layout.out_id_field.clone(),
        );

        let rows = self
            .source
            .search(source_table, &layout.read, self.predicate)
            .await
            .map_err(|e| e.in_phase(CopyPhase::Records, source_table, None))?;

        for mut row in rows {
            let old_id = row[layout.id_idx].to_identifier().ok_or_else(|| {
                MigrateError::copy(CopyPhase::Records, source_table.as_str(), "record has no identifier")
            })?;

            if let Some(check_run) = row[layout.check_run_idx].to_identifier() {
                let new = check_run_ids.get_or_mint(&check_run, Identifier::new_guid);
                row[layout.check_run_idx] = new.to_value();
            }

            row[layout.session_idx] = self.destination_session.clone();

            let minted = if mints {
                let guid = Identifier::new_guid();
                row[layout.out_id_idx] = guid.to_value();
                Some(guid)
            } else {
                None
            };

            let object_id = self
                .destination
                .insert(destination_table, &layout.write, row)
                .await
                .map_err(|e| {
                    e.in_phase(CopyPhase::Records, destination_table, Some(old_id.to_string()))
                })?;

            let new_id = match minted {
                Some(guid) => guid,
                None => object_id.to_identifier().ok_or_else(|| MigrateError::Copy {
                    phase: CopyPhase::Records,
                    table: destination_table.clone(),
                    identifier: Some(old_id.to_string()),
                    message: "destination did not return an object id".to_string(),
                })?,
            };
            map.record(old_id, new_id);
        }

        Ok(map)
    }

    async fn copy_geometry(&self, layout: &GeometryLayout, records: &IdentifierMap) -> Result<IdentifierMap> {
        let source_table = &layout.pair.source.name;
        let destination_table = &layout.pair.destination.name;
        let mut map = IdentifierMap::new(layout.pair.logical, layout.read[0].clone(), layout.write[0].clone());

        let rows = self
            .source
            .search(source_table, &layout.read, self.session_predicate)
            .await
            .map_err(|e| e.in_phase(CopyPhase::Geometry, source_table, None))?;

        for row in rows {
            let mut values = row.into_iter();
            let link = values.next().and_then(|v| v.to_identifier());
            let shape = values.next().unwrap_or(Value::Null);
            let Some(link) = link else {
                continue;
            };
            let Some(new_link) = records.get(&link) else {
                continue;
            };

            let new_row = vec![new_link.to_value(), self.destination_session.clone(), shape];
            self.destination
                .insert(destination_table, &layout.write, new_row)
                .await
                .map_err(|e| e.in_phase(CopyPhase::Geometry, destination_table, Some(link.to_string())))?;
            map.record(link, new_link.clone());
        }

        Ok(map)
    }
}
