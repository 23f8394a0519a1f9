//! Check run and batch run copy.
//!
//! Check runs are selected by session. Every CHECKRUNID in the selection gets
//! a new GUID (records already minted most of them). Batch runs referenced by
//! those check runs are copied first so check runs can point at the new batch
//! run GUIDs.
//!
//! When the destination generates the batch run GUID itself (`GLOBALID`),
//! the new value is read back by RECORDID after the inserts.

use std::collections::HashMap;

use tracing::debug;

use super::plan::{BatchRunLayout, CheckRunLayout, RunTablesLayout};
use super::{CopyOutcome, IdentifierMap, RecordCopier};
use crate::core::value::{Identifier, Value};
use crate::error::{CopyPhase, MigrateError, Result, Warnings};
use crate::predicate::make_in_clause;
use crate::selection::describe_skip;

pub(super) async fn copy(
    copier: &RecordCopier<'_>,
    layout: &RunTablesLayout,
    outcome: &mut CopyOutcome,
    warnings: &mut Warnings,
) -> Result<()> {
    let check = &layout.check_runs;
    let source_table = &check.pair.source.name;
    let check_field = check.read[check.check_run_idx].clone();
    let batch_field = check.read[check.batch_run_idx].clone();

    let rows = copier
        .source
        .search(
            source_table,
            &[check_field, batch_field],
            copier.session_predicate,
        )
        .await
        .map_err(|e| e.in_phase(CopyPhase::CheckRuns, source_table, None))?;

    // Check runs in the selected sessions that no copied record referenced.
    for row in &rows {
        if let Some(id) = row[0].to_identifier() {
            outcome.check_run_ids.get_or_mint(&id, Identifier::new_guid);
        }
    }

    let mut batch_ids: Vec<Value> = Vec::new();
    let mut seen: Vec<Identifier> = Vec::new();
    for row in &rows {
        let in_map = row[0]
            .to_identifier()
            .is_some_and(|id| outcome.check_run_ids.contains(&id));
        if let (true, Some(batch)) = (in_map, row[1].to_identifier()) {
            if !seen.contains(&batch) {
                seen.push(batch);
                batch_ids.push(row[1].clone());
            }
        }
    }

    outcome.batch_run_ids = IdentifierMap::new(
        layout.batch_runs.pair.logical,
        layout.batch_runs.in_uid_field.clone(),
        layout.batch_runs.out_uid_field.clone(),
    );
    if !batch_ids.is_empty() {
        let map = copy_batch_runs(copier, &layout.batch_runs, &batch_ids, &mut outcome.batch_run_ids, warnings).await?;
        outcome.batch_runs = Some(map);
    }

    if !outcome.check_run_ids.is_empty() {
        let map = copy_check_runs(copier, check, outcome, warnings).await?;
        outcome.check_runs = Some(map);
    }
    Ok(())
}

async fn copy_batch_runs(
    copier: &RecordCopier<'_>,
    layout: &BatchRunLayout,
    batch_ids: &[Value],
    uid_map: &mut IdentifierMap,
    warnings: &mut Warnings,
) -> Result<IdentifierMap> {
    let source_table = &layout.pair.source.name;
    let destination_table = &layout.pair.destination.name;
    let mut map = IdentifierMap::new(layout.pair.logical, "RECORDID", layout.out_record_field.clone());

    let selection = match make_in_clause(&layout.pair.source, &layout.in_uid_field, batch_ids) {
        Ok(p) => p,
        Err(skip) => {
            warnings.push(describe_skip(&layout.in_uid_field, &skip));
            return Ok(map);
        }
    };

    let rows = copier
        .source
        .search(source_table, &layout.read, Some(&selection))
        .await
        .map_err(|e| e.in_phase(CopyPhase::BatchRuns, source_table, None))?;

    // New RECORDID -> original GUID, for store-generated GUIDs.
    let mut pending: HashMap<Identifier, Identifier> = HashMap::new();

    for mut row in rows {
        let old_record = row[layout.record_idx].to_identifier().ok_or_else(|| {
            MigrateError::copy(CopyPhase::BatchRuns, source_table.as_str(), "batch run has no RECORDID")
        })?;
        let old_uid = row[layout.uid_idx].to_identifier();

        if !layout.out_uid_generated {
            let new_uid = Identifier::new_guid();
            row[layout.uid_idx] = new_uid.to_value();
            if let Some(old_uid) = &old_uid {
                uid_map.record(old_uid.clone(), new_uid);
            }
        }

        let object_id = copier
            .destination
            .insert(destination_table, &layout.write, row)
            .await
            .map_err(|e| e.in_phase(CopyPhase::BatchRuns, destination_table, Some(old_record.to_string())))?;
        let new_record = object_id.to_identifier().ok_or_else(|| MigrateError::Copy {
            phase: CopyPhase::BatchRuns,
            table: destination_table.clone(),
            identifier: Some(old_record.to_string()),
            message: "destination did not return an object id".to_string(),
        })?;

        if layout.out_uid_generated {
            if let Some(old_uid) = old_uid {
                pending.insert(new_record.clone(), old_uid);
            }
        }
        map.record(old_record, new_record);
    }

    if !pending.is_empty() {
        recover_generated_uids(copier, layout, &pending, uid_map, warnings).await?;
    }
    debug!("Copied {} batch runs", map.len());
    Ok(map)
}

async fn recover_generated_uids(
    copier: &RecordCopier<'_>,
    layout: &BatchRunLayout,
    pending: &HashMap<Identifier, Identifier>,
    uid_map: &mut IdentifierMap,
    warnings: &mut Warnings,
) -> Result<()> {
    let destination_table = &layout.pair.destination.name;
    let new_records: Vec<Value> = pending.keys().map(Identifier::to_value).collect();
    let selection = match make_in_clause(&layout.pair.destination, &layout.out_record_field, &new_records) {
        Ok(p) => p,
        Err(skip) => {
            warnings.push(describe_skip(&layout.out_record_field, &skip));
            return Ok(());
        }
    };

    let fields = [layout.out_record_field.clone(), layout.out_uid_field.clone()];
    let rows = copier
        .destination
        .search(destination_table, &fields, Some(&selection))
        .await
        .map_err(|e| e.in_phase(CopyPhase::BatchRuns, destination_table, None))?;

    for row in rows {
        let (Some(record), Some(new_uid)) = (row[0].to_identifier(), row[1].to_identifier()) else {
            continue;
        };
        match pending.get(&record) {
            Some(old_uid) => uid_map.record(old_uid.clone(), new_uid),
            None => warnings.push(format!(
                "Unable to find original {} for RECORDID {}",
                layout.in_uid_field, record
            )),
        }
    }
    Ok(())
}

async fn copy_check_runs(
    copier: &RecordCopier<'_>,
    layout: &CheckRunLayout,
    outcome: &CopyOutcome,
    warnings: &mut Warnings,
) -> Result<IdentifierMap> {
    let source_table = &layout.pair.source.name;
    let destination_table = &layout.pair.destination.name;
    let record_field = layout.read[layout.record_idx].clone();
    let mut map = IdentifierMap::new(layout.pair.logical, record_field.clone(), layout.write[layout.record_idx].clone());

    let rows = copier
        .source
        .search(source_table, &layout.read, copier.session_predicate)
        .await
        .map_err(|e| e.in_phase(CopyPhase::CheckRuns, source_table, None))?;

    for mut row in rows {
        let Some(new_check_run) = row[layout.check_run_idx]
            .to_identifier()
            .and_then(|id| outcome.check_run_ids.get(&id).cloned())
        else {
            continue;
        };
        let old_record = row[layout.record_idx].to_identifier().ok_or_else(|| {
            MigrateError::copy(CopyPhase::CheckRuns, source_table.as_str(), "check run has no RECORDID")
        })?;
        row[layout.check_run_idx] = new_check_run.to_value();

        if let Some(batch) = row[layout.batch_run_idx].to_identifier() {
            match outcome.batch_run_ids.get(&batch) {
                Some(new_batch) => row[layout.batch_run_idx] = new_batch.to_value(),
                None if copier.strict_batch_runs => {
                    return Err(MigrateError::Copy {
                        phase: CopyPhase::CheckRuns,
                        table: source_table.clone(),
                        identifier: Some(old_record.to_string()),
                        message: format!("BATCHRUNID {} was not copied", batch),
                    })
                }
                None => warnings.push(format!(
                    "BATCHRUNID {} of check run {} was not copied; left unchanged",
                    batch, old_record
                )),
            }
        }

        row[layout.session_idx] = copier.destination_session.clone();

        if let Some(idx) = layout.properties_idx {
            if row[idx].is_null() {
                row[idx] = Value::Blob(Vec::new());
            }
        }

        let object_id = copier
            .destination
            .insert(destination_table, &layout.write, row)
            .await
            .map_err(|e| e.in_phase(CopyPhase::CheckRuns, destination_table, Some(old_record.to_string())))?;
        let new_record = object_id.to_identifier().ok_or_else(|| MigrateError::Copy {
            phase: CopyPhase::CheckRuns,
            table: destination_table.clone(),
            identifier: Some(old_record.to_string()),
            message: "destination did not return an object id".to_string(),
        })?;
        map.record(old_record, new_record);
    }

    debug!("Copied {} check runs", map.len());
    Ok(map)
}
