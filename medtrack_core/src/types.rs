//! Core domain types for medtrack.
//!
//! - Medications and their dosing parameters
//! - Scheduled dose events and their status
//! - Drafts used to create and edit medications

use crate::{Error, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Dose Status
// ============================================================================

/// State of a single scheduled dose
///
/// The serde names are the literals used by the persisted format.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DoseStatus {
    #[serde(rename = "Pendiente")]
    Pending,
    #[serde(rename = "Tomada")]
    Taken,
    #[serde(rename = "Omitida")]
    Skipped,
}

impl fmt::Display for DoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseStatus::Pending => write!(f, "Pending"),
            DoseStatus::Taken => write!(f, "Taken"),
            DoseStatus::Skipped => write!(f, "Skipped"),
        }
    }
}

impl FromStr for DoseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" | "pendiente" => Ok(DoseStatus::Pending),
            "taken" | "tomada" => Ok(DoseStatus::Taken),
            "skipped" | "omitida" => Ok(DoseStatus::Skipped),
            other => Err(Error::Validation(format!("Unknown dose status: {}", other))),
        }
    }
}

// ============================================================================
// Dose Events and Medications
// ============================================================================

/// One scheduled administration of a medication
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DoseEvent {
    /// Zero-based position in the schedule; stable identity within a medication
    pub index: usize,
    pub scheduled_at: DateTime<Local>,
    pub status: DoseStatus,
}

/// A tracked medication with a fixed dosing schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dose: String,
    pub presentation: Option<String>,
    pub route: Option<String>,
    pub initial_dose_count: u32,
    pub frequency_hours: u32,
    /// Schedule anchor. Only absent in legacy data.
    pub first_dose_at: Option<DateTime<Local>>,
    pub history: Vec<DoseEvent>,
}

impl Medication {
    /// Build a medication from a validated draft with a fresh id and no history
    pub(crate) fn from_draft(draft: MedicationDraft) -> Self {
        Self {
            id: new_medication_id(),
            name: draft.name,
            dose: draft.dose,
            presentation: draft.presentation,
            route: draft.route,
            initial_dose_count: draft.initial_dose_count,
            frequency_hours: draft.frequency_hours,
            first_dose_at: Some(draft.first_dose_at),
            history: Vec::new(),
        }
    }

    /// Overwrite every editable field with the draft's values
    pub(crate) fn apply(&mut self, draft: MedicationDraft) {
        self.name = draft.name;
        self.dose = draft.dose;
        self.presentation = draft.presentation;
        self.route = draft.route;
        self.initial_dose_count = draft.initial_dose_count;
        self.frequency_hours = draft.frequency_hours;
        self.first_dose_at = Some(draft.first_dose_at);
    }

    /// Find a dose by its schedule index
    pub fn dose(&self, index: usize) -> Option<&DoseEvent> {
        self.history.iter().find(|d| d.index == index)
    }
}

/// Upper bound on the doses a single schedule may hold
pub const MAX_DOSE_COUNT: u32 = 10_000;

/// Generate an opaque medication id
pub fn new_medication_id() -> String {
    format!("med-{}", Uuid::new_v4().simple())
}

// ============================================================================
// Drafts
// ============================================================================

/// User-supplied fields for creating or editing a medication
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedicationDraft {
    pub name: String,
    pub dose: String,
    pub presentation: Option<String>,
    pub route: Option<String>,
    pub initial_dose_count: u32,
    pub frequency_hours: u32,
    pub first_dose_at: DateTime<Local>,
}

impl MedicationDraft {
    /// Start a draft pre-filled from an existing medication (the edit form)
    ///
    /// Returns `None` for legacy medications that have no first dose time.
    pub fn from_medication(medication: &Medication) -> Option<Self> {
        Some(Self {
            name: medication.name.clone(),
            dose: medication.dose.clone(),
            presentation: medication.presentation.clone(),
            route: medication.route.clone(),
            initial_dose_count: medication.initial_dose_count,
            frequency_hours: medication.frequency_hours,
            first_dose_at: medication.first_dose_at?,
        })
    }

    /// Trim text fields, drop empty optionals, and check required values
    pub fn normalized(self) -> Result<Self> {
        let name = self.name.trim().to_string();
        let dose = self.dose.trim().to_string();

        if name.is_empty() {
            return Err(Error::Validation("Medication name is required".into()));
        }
        if dose.is_empty() {
            return Err(Error::Validation("Dose description is required".into()));
        }
        if self.initial_dose_count == 0 {
            return Err(Error::Validation(
                "Number of doses must be a positive integer".into(),
            ));
        }
        if self.initial_dose_count > MAX_DOSE_COUNT {
            return Err(Error::Validation(format!(
                "Number of doses cannot exceed {}",
                MAX_DOSE_COUNT
            )));
        }
        if self.frequency_hours == 0 {
            return Err(Error::Validation(
                "Frequency must be a positive number of hours".into(),
            ));
        }

        Ok(Self {
            name,
            dose,
            presentation: non_empty(self.presentation),
            route: non_empty(self.route),
            ..self
        })
    }

    /// Whether applying this draft would move the medication's schedule
    pub fn changes_schedule_of(&self, medication: &Medication) -> bool {
        medication.initial_dose_count != self.initial_dose_count
            || medication.frequency_hours != self.frequency_hours
            || medication.first_dose_at != Some(self.first_dose_at)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft() -> MedicationDraft {
        MedicationDraft {
            name: "  Amoxicillin ".into(),
            dose: "500 mg".into(),
            presentation: Some("   ".into()),
            route: Some(" oral ".into()),
            initial_dose_count: 21,
            frequency_hours: 8,
            first_dose_at: Local.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_status_parsing_accepts_both_vocabularies() {
        assert_eq!("taken".parse::<DoseStatus>().unwrap(), DoseStatus::Taken);
        assert_eq!("Omitida".parse::<DoseStatus>().unwrap(), DoseStatus::Skipped);
        assert_eq!(" PENDING ".parse::<DoseStatus>().unwrap(), DoseStatus::Pending);
        assert!(matches!(
            "maybe".parse::<DoseStatus>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_status_serializes_to_persisted_literals() {
        let cases = [
            (DoseStatus::Pending, "\"Pendiente\""),
            (DoseStatus::Taken, "\"Tomada\""),
            (DoseStatus::Skipped, "\"Omitida\""),
        ];
        for (status, literal) in cases {
            assert_eq!(serde_json::to_string(&status).unwrap(), literal);
        }
    }

    #[test]
    fn test_normalized_trims_and_drops_blank_optionals() {
        let draft = draft().normalized().unwrap();
        assert_eq!(draft.name, "Amoxicillin");
        assert_eq!(draft.presentation, None);
        assert_eq!(draft.route.as_deref(), Some("oral"));
    }

    #[test]
    fn test_normalized_rejects_missing_required_fields() {
        let mut no_name = draft();
        no_name.name = " ".into();
        assert!(matches!(no_name.normalized(), Err(Error::Validation(_))));

        let mut no_count = draft();
        no_count.initial_dose_count = 0;
        assert!(matches!(no_count.normalized(), Err(Error::Validation(_))));

        let mut no_frequency = draft();
        no_frequency.frequency_hours = 0;
        assert!(matches!(no_frequency.normalized(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_normalized_caps_dose_count() {
        let mut at_limit = draft();
        at_limit.initial_dose_count = MAX_DOSE_COUNT;
        assert!(at_limit.normalized().is_ok());

        let mut huge = draft();
        huge.initial_dose_count = 4_000_000_000;
        assert!(matches!(huge.normalized(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_changes_schedule_only_for_schedule_fields() {
        let medication = Medication::from_draft(draft().normalized().unwrap());

        let mut descriptive = MedicationDraft::from_medication(&medication).unwrap();
        descriptive.dose = "875 mg".into();
        descriptive.route = None;
        assert!(!descriptive.changes_schedule_of(&medication));

        let mut frequency = MedicationDraft::from_medication(&medication).unwrap();
        frequency.frequency_hours = 12;
        assert!(frequency.changes_schedule_of(&medication));

        let mut start = MedicationDraft::from_medication(&medication).unwrap();
        start.first_dose_at = start.first_dose_at + chrono::Duration::minutes(30);
        assert!(start.changes_schedule_of(&medication));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = new_medication_id();
        let b = new_medication_id();
        assert!(a.starts_with("med-"));
        assert_ne!(a, b);
    }
}
