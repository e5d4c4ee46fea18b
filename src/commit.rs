//! The commit/merge engine: the full-file pass that actually writes.
//!
//! A commit re-streams the original file under a validated mapping (never
//! the bounded preview samples) and processes rows in file order on a
//! single logical worker, so last-write-wins within one file is
//! deterministic. Rows are applied in fixed-size batches; the commit as a
//! whole is not all-or-nothing. Store unavailability aborts the current and
//! remaining batches but keeps the counts of work already applied, because
//! the merge is idempotent per identity key and re-running the file is safe
//! while silently losing applied work is not.
//!
//! Lifecycle of one import: Uploaded → Previewed → (MappingEdited)* →
//! Validated → Committing → Completed | PartiallyFailed. Only Committing
//! mutates the dataset, and there is no automatic rollback once a batch has
//! written.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::{
    decode::TabularReader,
    error::ImportError,
    mapping::{self, FieldMapping, MappingTarget},
    record::{self, VisitorRecord},
    store::DatasetStore,
};

pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    Completed,
    PartiallyFailed,
}

/// One non-fatal row failure, reported with the 1-based data-row index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

/// Aggregate outcome of one commit call. Returned, logged, never persisted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub row_errors: Vec<RowError>,
    pub status: ImportStatus,
    /// Populated when the commit stopped early (store failure or
    /// cancellation); batches applied before the stop are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl ImportResult {
    fn new() -> Self {
        Self {
            inserted: 0,
            updated: 0,
            skipped: 0,
            row_errors: Vec::new(),
            status: ImportStatus::Completed,
            abort_reason: None,
        }
    }
}

pub struct CommitOptions {
    pub owner_id: String,
    pub batch_size: usize,
    /// Checked between batches, not between rows, so cancellation always
    /// lands on a batch boundary.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl CommitOptions {
    pub fn new(owner_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: None,
        }
    }
}

/// A transformed row waiting for its batch to be applied.
struct PendingRow {
    fields: BTreeMap<String, String>,
    custom_fields: BTreeMap<String, String>,
}

/// Streams every row of `reader` through `mapping` and merges the results
/// into `store` under `options.owner_id`. The mapping is re-validated here
/// regardless of what the caller did with the preview.
pub fn execute_commit(
    reader: &mut TabularReader,
    mapping: &FieldMapping,
    store: &mut dyn DatasetStore,
    options: &CommitOptions,
) -> Result<ImportResult> {
    mapping::validate_mapping(mapping)?;

    let headers = reader.headers().to_vec();
    let mut result = ImportResult::new();
    let mut batch: Vec<PendingRow> = Vec::with_capacity(options.batch_size.max(1));
    let mut row_number = 0usize;

    info!(
        "Committing import for owner '{}' in batches of {}",
        options.owner_id, options.batch_size
    );

    loop {
        let next = reader.next_row();
        let done = next.is_none();
        if let Some(row) = next {
            row_number += 1;
            match row {
                Ok(cells) => {
                    let (fields, custom_fields) = transform_row(&headers, &cells, mapping);
                    if record::identity_key(&fields).is_none() {
                        // Trailing blank rows are routine in spreadsheet
                        // exports; skipping them is not an error.
                        result.skipped += 1;
                    } else {
                        batch.push(PendingRow {
                            fields,
                            custom_fields,
                        });
                    }
                }
                Err(err) => {
                    // One bad row never aborts the batch.
                    let failure = ImportError::RowTransform {
                        row: row_number,
                        reason: err.to_string(),
                    };
                    warn!("{failure}");
                    result.row_errors.push(RowError {
                        row: row_number,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if batch.len() >= options.batch_size.max(1) || (done && !batch.is_empty()) {
            if let Err(err) = apply_batch(&mut batch, store, options, &mut result) {
                warn!("Aborting remaining batches: {err}");
                result.status = ImportStatus::PartiallyFailed;
                result.abort_reason = Some(err.to_string());
                break;
            }
            if !done && is_cancelled(options) {
                info!("Commit cancelled between batches");
                result.status = ImportStatus::PartiallyFailed;
                result.abort_reason = Some("cancelled".to_string());
                break;
            }
        }
        if done {
            break;
        }
    }

    info!(
        "Commit finished: {} inserted, {} updated, {} skipped, {} row error(s), status {:?}",
        result.inserted,
        result.updated,
        result.skipped,
        result.row_errors.len(),
        result.status
    );
    Ok(result)
}

fn is_cancelled(options: &CommitOptions) -> bool {
    options
        .cancel
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Applies one batch in row order. Rows with the same identity key within a
/// batch still resolve last-write-wins because each upsert goes through the
/// store individually.
fn apply_batch(
    batch: &mut Vec<PendingRow>,
    store: &mut dyn DatasetStore,
    options: &CommitOptions,
    result: &mut ImportResult,
) -> Result<(), ImportError> {
    for pending in batch.drain(..) {
        let key = match record::identity_key(&pending.fields) {
            Some(key) => key,
            None => {
                result.skipped += 1;
                continue;
            }
        };
        match store.find_by_identity(&options.owner_id, &key)? {
            Some(mut existing) => {
                existing.merge_from(&pending.fields, &pending.custom_fields);
                store.update(&key, existing)?;
                result.updated += 1;
            }
            None => {
                let fresh = VisitorRecord::new(
                    &options.owner_id,
                    pending.fields,
                    pending.custom_fields,
                );
                store.insert(&key, fresh)?;
                result.inserted += 1;
            }
        }
    }
    Ok(())
}

/// Splits one row into canonical values and custom fields. Mapped headers
/// feed the canonical field (trimmed); every other header keeps its cell
/// verbatim under `customFields`, keyed by the original header text.
pub fn transform_row(
    headers: &[String],
    cells: &[String],
    mapping: &FieldMapping,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut fields = BTreeMap::new();
    let mut custom_fields = BTreeMap::new();
    for (idx, header) in headers.iter().enumerate() {
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        match mapping.get(header).and_then(MappingTarget::field_key) {
            Some(key) => {
                fields.insert(key.to_string(), cell.trim().to_string());
            }
            None => {
                custom_fields.insert(header.clone(), cell.to_string());
            }
        }
    }
    (fields, custom_fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_routes_unmapped_headers_to_custom_fields() {
        let headers = vec!["Name".to_string(), "E-mail".to_string(), "Office".to_string()];
        let cells = vec![
            "Jane Doe".to_string(),
            " jane@x.com ".to_string(),
            "NY".to_string(),
        ];
        let mapping = mapping::suggest_mapping(&headers);

        let (fields, custom) = transform_row(&headers, &cells, &mapping);
        assert_eq!(fields.get("fullName").map(String::as_str), Some("Jane Doe"));
        assert_eq!(fields.get("email").map(String::as_str), Some("jane@x.com"));
        assert_eq!(custom.get("Office").map(String::as_str), Some("NY"));
        assert!(!fields.contains_key("Office"));
    }
}
