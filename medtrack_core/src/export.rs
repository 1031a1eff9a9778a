//! CSV export of dose histories.
//!
//! Writes one row per scheduled dose so the history can be opened in a
//! spreadsheet or handed to a clinician.

use crate::{Medication, Result};
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    medication_id: &'a str,
    medication: &'a str,
    dose: &'a str,
    dose_number: usize,
    scheduled_at: String,
    status: String,
}

/// Write every dose of every medication to `path`, replacing the file
///
/// Doses are listed per medication in chronological order. Returns the
/// number of rows written.
pub fn write_history_csv(medications: &[Medication], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;

    for medication in medications {
        for dose in medication.history_by_time() {
            writer.serialize(CsvRow {
                medication_id: &medication.id,
                medication: &medication.name,
                dose: &medication.dose,
                dose_number: dose.index + 1,
                scheduled_at: dose.scheduled_at.to_rfc3339(),
                status: dose.status.to_string(),
            })?;
            rows += 1;
        }
    }

    writer.flush()?;
    tracing::info!("Exported {} doses to {:?}", rows, path);
    Ok(rows)
}
