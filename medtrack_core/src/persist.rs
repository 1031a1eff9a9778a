//! Persisted form of the medication collection.
//!
//! The whole collection is stored as one JSON array under [`STORE_KEY`].
//! Timestamps are written as UTC RFC 3339 with millisecond precision and read
//! back into local time. Decoding goes through explicit record types and is
//! validated before anything reaches the engine.

use crate::store::KeyValueStore;
use crate::{DoseEvent, DoseStatus, Error, Medication, Result};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Versioned store key. A change to the record shape needs a new key.
pub const STORE_KEY: &str = "medicamentosData_v2";

/// One medication as persisted
#[derive(Debug, Serialize, Deserialize)]
struct MedicationRecord {
    id: String,
    #[serde(rename = "nombre")]
    name: String,
    #[serde(rename = "dosis")]
    dose: String,
    #[serde(rename = "presentacion", default)]
    presentation: Option<String>,
    #[serde(rename = "viaAdministracion", default)]
    route: Option<String>,
    #[serde(rename = "dosisIniciales")]
    initial_dose_count: i64,
    #[serde(rename = "frecuenciaHoras")]
    frequency_hours: i64,
    #[serde(rename = "fechaHoraPrimeraDosis", default)]
    first_dose_at: Option<String>,
    #[serde(rename = "historial", default)]
    history: Vec<DoseRecord>,
}

/// One scheduled dose as persisted
#[derive(Debug, Serialize, Deserialize)]
struct DoseRecord {
    #[serde(rename = "indice")]
    index: usize,
    #[serde(rename = "fechaHoraProgramada")]
    scheduled_at: String,
    #[serde(rename = "estado")]
    status: DoseStatus,
}

/// Result of loading the collection
#[derive(Debug, Default)]
pub struct Loaded {
    pub medications: Vec<Medication>,
    /// Problems recovered from while loading, for the user to see
    pub warnings: Vec<String>,
}

fn encode_timestamp(at: &DateTime<Local>) -> String {
    at.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_timestamp(value: &str, field: &str) -> Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Local))
        .map_err(|e| Error::Decode(format!("Invalid {} {:?}: {}", field, value, e)))
}

fn positive_u32(value: i64, field: &str, id: &str) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| Error::Decode(format!("{} of {} must be positive, got {}", field, id, value)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

impl From<&Medication> for MedicationRecord {
    fn from(med: &Medication) -> Self {
        MedicationRecord {
            id: med.id.clone(),
            name: med.name.clone(),
            dose: med.dose.clone(),
            presentation: Some(med.presentation.clone().unwrap_or_default()),
            route: Some(med.route.clone().unwrap_or_default()),
            initial_dose_count: i64::from(med.initial_dose_count),
            frequency_hours: i64::from(med.frequency_hours),
            first_dose_at: med.first_dose_at.as_ref().map(encode_timestamp),
            history: med
                .history
                .iter()
                .map(|dose| DoseRecord {
                    index: dose.index,
                    scheduled_at: encode_timestamp(&dose.scheduled_at),
                    status: dose.status,
                })
                .collect(),
        }
    }
}

impl TryFrom<MedicationRecord> for Medication {
    type Error = Error;

    fn try_from(record: MedicationRecord) -> Result<Self> {
        let initial_dose_count =
            positive_u32(record.initial_dose_count, "dosisIniciales", &record.id)?;
        let frequency_hours = positive_u32(record.frequency_hours, "frecuenciaHoras", &record.id)?;

        let first_dose_at = record
            .first_dose_at
            .as_deref()
            .map(|s| decode_timestamp(s, "fechaHoraPrimeraDosis"))
            .transpose()?;

        let mut seen = HashSet::new();
        let history = record
            .history
            .into_iter()
            .map(|dose| {
                if !seen.insert(dose.index) {
                    return Err(Error::Decode(format!(
                        "Duplicate dose index {} in {}",
                        dose.index, record.id
                    )));
                }
                Ok(DoseEvent {
                    index: dose.index,
                    scheduled_at: decode_timestamp(&dose.scheduled_at, "fechaHoraProgramada")?,
                    status: dose.status,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Medication {
            id: record.id,
            name: record.name,
            dose: record.dose,
            presentation: non_empty(record.presentation),
            route: non_empty(record.route),
            initial_dose_count,
            frequency_hours,
            first_dose_at,
            history,
        })
    }
}

/// Serialize the collection to its persisted JSON text
pub fn encode(medications: &[Medication]) -> Result<String> {
    let records: Vec<MedicationRecord> = medications.iter().map(MedicationRecord::from).collect();
    Ok(serde_json::to_string(&records)?)
}

/// Parse and validate persisted JSON text
pub fn decode(blob: &str) -> Result<Vec<Medication>> {
    let records: Vec<MedicationRecord> =
        serde_json::from_str(blob).map_err(|e| Error::Decode(e.to_string()))?;

    let mut ids = HashSet::new();
    records
        .into_iter()
        .map(|record| {
            if !ids.insert(record.id.clone()) {
                return Err(Error::Decode(format!("Duplicate medication id {}", record.id)));
            }
            Medication::try_from(record)
        })
        .collect()
}

/// Write the whole collection to the store
///
/// On failure the previously stored blob is left as it was.
pub fn save<S: KeyValueStore + ?Sized>(store: &mut S, medications: &[Medication]) -> Result<()> {
    let result = encode(medications).and_then(|blob| store.set(STORE_KEY, &blob));

    match result {
        Ok(()) => {
            tracing::debug!("Saved {} medications", medications.len());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to save medications: {}", e);
            Err(match e {
                Error::Persistence(msg) => Error::Persistence(msg),
                other => Error::Persistence(other.to_string()),
            })
        }
    }
}

/// Read the collection from the store
///
/// A missing blob is an empty collection. A corrupt blob is removed and also
/// yields an empty collection, with a warning in [`Loaded::warnings`].
pub fn load<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<Loaded> {
    let decoded = match store.get(STORE_KEY) {
        Ok(Some(blob)) => decode(&blob),
        Ok(None) => {
            tracing::info!("No saved medications, starting empty");
            return Ok(Loaded::default());
        }
        Err(e @ Error::Decode(_)) => Err(e),
        Err(e) => {
            tracing::error!("Failed to read saved medications: {}", e);
            return Err(Error::Persistence(e.to_string()));
        }
    };

    match decoded {
        Ok(medications) => {
            tracing::info!("Loaded {} medications", medications.len());
            Ok(Loaded {
                medications,
                warnings: Vec::new(),
            })
        }
        Err(e) => {
            tracing::error!("Discarding unreadable saved data: {}", e);
            let mut warnings = vec![format!(
                "Saved data could not be read and was discarded ({}). Starting with an empty list.",
                e
            )];
            if let Err(remove_err) = store.remove(STORE_KEY) {
                tracing::warn!("Failed to remove corrupt data: {}", remove_err);
                warnings.push(format!("Corrupt data could not be removed: {}", remove_err));
            }
            Ok(Loaded {
                medications: Vec::new(),
                warnings,
            })
        }
    }
}
