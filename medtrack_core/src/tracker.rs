//! The medication tracker engine.
//!
//! `Tracker` owns the medication collection and the store it persists to.
//! Every mutating call validates first, mutates, then saves the whole
//! collection before returning.

use crate::persist::{self, Loaded};
use crate::schedule;
use crate::store::KeyValueStore;
use crate::{DoseStatus, Error, Medication, MedicationDraft, Result};

/// Outcome of editing a medication
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Fields saved; the schedule was not affected
    Updated,
    /// Fields saved, but the schedule changed and the history is now stale.
    /// Call [`Tracker::regenerate_history`] once the user confirms.
    RegenerationRequired,
}

pub struct Tracker<S: KeyValueStore> {
    store: S,
    medications: Vec<Medication>,
    warnings: Vec<String>,
}

impl<S: KeyValueStore> Tracker<S> {
    /// Load the collection from `store`
    ///
    /// Corrupt saved data is discarded and reported through [`Tracker::warnings`].
    pub fn open(mut store: S) -> Result<Self> {
        let Loaded {
            medications,
            warnings,
        } = persist::load(&mut store)?;

        Ok(Self {
            store,
            medications,
            warnings,
        })
    }

    /// Problems recovered from while loading
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// All medications in insertion order
    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    pub fn medication(&self, id: &str) -> Result<&Medication> {
        self.medications
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::MedicationNotFound(id.to_string()))
    }

    /// Find a medication by exact id or by a prefix matching exactly one id
    pub fn resolve(&self, id_or_prefix: &str) -> Result<&Medication> {
        if let Ok(medication) = self.medication(id_or_prefix) {
            return Ok(medication);
        }

        let mut matches = self
            .medications
            .iter()
            .filter(|m| !id_or_prefix.is_empty() && m.id.starts_with(id_or_prefix));

        match (matches.next(), matches.next()) {
            (Some(medication), None) => Ok(medication),
            (Some(_), Some(_)) => Err(Error::Validation(format!(
                "Id prefix {:?} matches more than one medication",
                id_or_prefix
            ))),
            (None, _) => Err(Error::MedicationNotFound(id_or_prefix.to_string())),
        }
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.medications
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| {
                tracing::error!("Unknown medication {}", id);
                Error::MedicationNotFound(id.to_string())
            })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Persist the current collection
    pub fn save(&mut self) -> Result<()> {
        persist::save(&mut self.store, &self.medications)
    }

    /// Add a medication with a freshly generated schedule
    ///
    /// Returns the new medication's id. If saving fails the medication stays
    /// in memory and the persistence error is returned.
    pub fn create(&mut self, draft: MedicationDraft) -> Result<String> {
        let draft = draft.normalized()?;
        let mut medication = Medication::from_draft(draft);
        while self.medications.iter().any(|m| m.id == medication.id) {
            medication.id = crate::new_medication_id();
        }

        medication.history = schedule::plan(&medication)?;
        let id = medication.id.clone();

        tracing::info!(
            "Added {} ({}) with {} doses",
            medication.name,
            id,
            medication.history.len()
        );
        self.medications.push(medication);
        self.save()?;
        Ok(id)
    }

    /// Replace a medication's editable fields
    ///
    /// Descriptive edits never touch the history. When a schedule field
    /// changes the history is left as it was and
    /// [`UpdateOutcome::RegenerationRequired`] is returned.
    pub fn update(&mut self, id: &str, draft: MedicationDraft) -> Result<UpdateOutcome> {
        let pos = self.position(id)?;
        let draft = draft.normalized()?;

        let medication = &mut self.medications[pos];
        let outcome = if draft.changes_schedule_of(medication) {
            UpdateOutcome::RegenerationRequired
        } else {
            UpdateOutcome::Updated
        };
        medication.apply(draft);

        tracing::info!("Updated {} ({}): {:?}", medication.name, id, outcome);
        self.save()?;
        Ok(outcome)
    }

    /// Edit and, if the schedule changed and `regenerate` is set, rebuild the history
    pub fn update_and_confirm(
        &mut self,
        id: &str,
        draft: MedicationDraft,
        regenerate: bool,
    ) -> Result<UpdateOutcome> {
        let pos = self.position(id)?;
        let draft = draft.normalized()?;
        if !regenerate || !draft.changes_schedule_of(&self.medications[pos]) {
            return self.update(id, draft);
        }

        // Planned on a copy; nothing changes if planning fails
        let mut edited = self.medications[pos].clone();
        edited.apply(draft);
        edited.history = schedule::plan(&edited).map_err(|e| {
            tracing::error!("Cannot regenerate history for {}: {}", edited.name, e);
            e
        })?;

        tracing::info!(
            "Updated {} ({}) and regenerated {} doses",
            edited.name,
            id,
            edited.history.len()
        );
        self.medications[pos] = edited;
        self.save()?;
        Ok(UpdateOutcome::Updated)
    }

    /// Discard the history and rebuild it from the current schedule fields
    ///
    /// All Taken/Skipped marks are lost. Nothing changes if the schedule
    /// fields are invalid.
    pub fn regenerate_history(&mut self, id: &str) -> Result<()> {
        let pos = self.position(id)?;
        let medication = &mut self.medications[pos];

        let history = schedule::plan(medication).map_err(|e| {
            tracing::error!("Cannot regenerate history for {}: {}", medication.name, e);
            e
        })?;
        medication.history = history;

        tracing::info!(
            "Regenerated {} doses for {}",
            medication.history.len(),
            medication.name
        );
        self.save()
    }

    /// Remove a medication and its history
    pub fn delete(&mut self, id: &str) -> Result<Medication> {
        let pos = self.position(id)?;
        let removed = self.medications.remove(pos);

        tracing::info!("Deleted {} ({})", removed.name, removed.id);
        self.save()?;
        Ok(removed)
    }

    /// Change the status of one dose
    ///
    /// This is the only way dose status changes. Asking for the status a
    /// dose already has returns [`Error::NoChange`] without saving.
    pub fn set_dose_status(&mut self, id: &str, index: usize, status: DoseStatus) -> Result<()> {
        let pos = self.position(id)?;
        let medication = &mut self.medications[pos];

        let dose = medication
            .history
            .iter_mut()
            .find(|d| d.index == index)
            .ok_or_else(|| {
                tracing::error!("No dose {} for medication {}", index, id);
                Error::DoseNotFound {
                    medication_id: id.to_string(),
                    index,
                }
            })?;

        if dose.status == status {
            tracing::debug!("Dose {} of {} already {}", index, id, status);
            return Err(Error::NoChange { index, status });
        }

        tracing::info!(
            "Dose {} of {}: {} -> {}",
            index + 1,
            medication.name,
            dose.status,
            status
        );
        dose.status = status;
        self.save()
    }

    /// Mark the next pending dose as taken, returning its index
    pub fn take_next(&mut self, id: &str) -> Result<usize> {
        let index = self
            .medication(id)?
            .next_pending_dose()
            .map(|d| d.index)
            .ok_or_else(|| Error::NoPendingDose(id.to_string()))?;

        self.set_dose_status(id, index, DoseStatus::Taken)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::STORE_KEY;
    use crate::store::{FileStore, MemoryStore};
    use chrono::{Local, TimeZone};

    fn draft() -> MedicationDraft {
        MedicationDraft {
            name: "Amoxicillin".into(),
            dose: "500 mg".into(),
            presentation: Some("capsule".into()),
            route: Some("oral".into()),
            initial_dose_count: 3,
            frequency_hours: 8,
            first_dose_at: Local.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        }
    }

    fn tracker() -> Tracker<MemoryStore> {
        crate::logging::init_test();
        Tracker::open(MemoryStore::new()).unwrap()
    }

    fn reopen(tracker: Tracker<MemoryStore>) -> Vec<Medication> {
        let Tracker { mut store, .. } = tracker;
        persist::load(&mut store).unwrap().medications
    }

    #[test]
    fn test_create_take_first_dose_scenario() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();

        let med = tracker.medication(&id).unwrap();
        let times: Vec<String> = med
            .history
            .iter()
            .map(|d| d.scheduled_at.format("%Y-%m-%dT%H:%M").to_string())
            .collect();
        assert_eq!(
            times,
            vec!["2024-01-01T08:00", "2024-01-01T16:00", "2024-01-02T00:00"]
        );
        assert!(med.history.iter().all(|d| d.status == DoseStatus::Pending));

        tracker.set_dose_status(&id, 0, DoseStatus::Taken).unwrap();

        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.count_by_status(DoseStatus::Taken), 1);
        assert_eq!(med.next_pending_dose().map(|d| d.index), Some(1));
    }

    #[test]
    fn test_create_rejects_invalid_draft_without_side_effects() {
        let mut tracker = tracker();
        let mut bad = draft();
        bad.dose = "  ".into();

        assert!(matches!(tracker.create(bad), Err(Error::Validation(_))));
        assert!(tracker.medications().is_empty());
        assert_eq!(tracker.store().get(STORE_KEY).unwrap(), None);
    }

    #[test]
    fn test_create_persists() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();

        let stored = reopen(tracker);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].history.len(), 3);
    }

    #[test]
    fn test_same_status_is_no_change() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 1, DoseStatus::Skipped).unwrap();

        let err = tracker
            .set_dose_status(&id, 1, DoseStatus::Skipped)
            .unwrap_err();
        assert!(err.is_no_change());
        assert_eq!(
            tracker.medication(&id).unwrap().history[1].status,
            DoseStatus::Skipped
        );

        // Back to pending is a real change
        tracker.set_dose_status(&id, 1, DoseStatus::Pending).unwrap();
    }

    #[test]
    fn test_unknown_medication_or_dose_leaves_state_alone() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        let blob_before = tracker.store().get(STORE_KEY).unwrap();
        let meds_before = tracker.medications().to_vec();

        assert!(matches!(
            tracker.set_dose_status("med-missing", 0, DoseStatus::Taken),
            Err(Error::MedicationNotFound(_))
        ));
        assert!(matches!(
            tracker.set_dose_status(&id, 3, DoseStatus::Taken),
            Err(Error::DoseNotFound { index: 3, .. })
        ));

        assert_eq!(tracker.medications(), meds_before.as_slice());
        assert_eq!(tracker.store().get(STORE_KEY).unwrap(), blob_before);
    }

    #[test]
    fn test_descriptive_edit_keeps_history() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 0, DoseStatus::Taken).unwrap();
        let history_before = tracker.medication(&id).unwrap().history.clone();

        let mut edit = draft();
        edit.dose = "875 mg".into();
        edit.presentation = None;
        let outcome = tracker.update(&id, edit).unwrap();

        assert_eq!(outcome, UpdateOutcome::Updated);
        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.dose, "875 mg");
        assert_eq!(med.presentation, None);
        assert_eq!(med.history, history_before);
    }

    #[test]
    fn test_schedule_edit_requires_confirmation() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 0, DoseStatus::Taken).unwrap();
        let history_before = tracker.medication(&id).unwrap().history.clone();

        let mut edit = draft();
        edit.frequency_hours = 12;
        edit.initial_dose_count = 5;
        let outcome = tracker.update(&id, edit).unwrap();

        // Stale until confirmed
        assert_eq!(outcome, UpdateOutcome::RegenerationRequired);
        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.frequency_hours, 12);
        assert_eq!(med.history, history_before);

        tracker.regenerate_history(&id).unwrap();
        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.history.len(), 5);
        assert!(med.history.iter().all(|d| d.status == DoseStatus::Pending));
        assert_eq!(
            med.history[1].scheduled_at.format("%Y-%m-%d %H:%M").to_string(),
            "2024-01-01 20:00"
        );
    }

    #[test]
    fn test_update_and_confirm_regenerates() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 2, DoseStatus::Skipped).unwrap();

        let mut edit = draft();
        edit.frequency_hours = 6;
        let outcome = tracker.update_and_confirm(&id, edit, true).unwrap();
        assert_eq!(outcome, UpdateOutcome::Updated);

        let stored = reopen(tracker);
        assert_eq!(stored[0].history.len(), 3);
        assert_eq!(stored[0].frequency_hours, 6);
        assert!(stored[0].history.iter().all(|d| d.status == DoseStatus::Pending));
    }

    #[test]
    fn test_failed_regeneration_keeps_previous_medication() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 0, DoseStatus::Taken).unwrap();
        let before = tracker.medication(&id).unwrap().clone();

        // The second dose lands far past the last representable date
        let mut edit = draft();
        edit.frequency_hours = u32::MAX;
        let result = tracker.update_and_confirm(&id, edit, true);
        assert!(matches!(result, Err(Error::Validation(_))));

        assert_eq!(tracker.medication(&id).unwrap(), &before);
        assert_eq!(reopen(tracker)[0], before);
    }

    #[test]
    fn test_update_and_decline_keeps_stale_history() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();

        let mut edit = draft();
        edit.initial_dose_count = 10;
        let outcome = tracker.update_and_confirm(&id, edit, false).unwrap();
        assert_eq!(outcome, UpdateOutcome::RegenerationRequired);

        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.initial_dose_count, 10);
        assert_eq!(med.history.len(), 3);
    }

    #[test]
    fn test_regenerate_legacy_without_anchor_fails_cleanly() {
        let mut store = MemoryStore::new();
        store
            .set(
                STORE_KEY,
                r#"[{"id":"med-old","nombre":"x","dosis":"y","dosisIniciales":2,"frecuenciaHoras":4,
                    "fechaHoraPrimeraDosis":null,
                    "historial":[{"indice":0,"fechaHoraProgramada":"2024-01-01T00:00:00Z","estado":"Tomada"}]}]"#,
            )
            .unwrap();
        let mut tracker = Tracker::open(store).unwrap();

        assert!(matches!(
            tracker.regenerate_history("med-old"),
            Err(Error::Validation(_))
        ));
        assert_eq!(tracker.medication("med-old").unwrap().history.len(), 1);
    }

    #[test]
    fn test_delete_removes_from_store() {
        let mut tracker = tracker();
        let keep = tracker.create(draft()).unwrap();
        let mut other = draft();
        other.name = "Ibuprofen".into();
        let gone = tracker.create(other).unwrap();

        let removed = tracker.delete(&gone).unwrap();
        assert_eq!(removed.name, "Ibuprofen");
        assert!(matches!(
            tracker.delete(&gone),
            Err(Error::MedicationNotFound(_))
        ));

        let stored = reopen(tracker);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, keep);
    }

    #[test]
    fn test_take_next_walks_the_schedule() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.set_dose_status(&id, 0, DoseStatus::Skipped).unwrap();

        assert_eq!(tracker.take_next(&id).unwrap(), 1);
        assert_eq!(tracker.take_next(&id).unwrap(), 2);
        assert!(matches!(
            tracker.take_next(&id),
            Err(Error::NoPendingDose(_))
        ));
    }

    #[test]
    fn test_failed_save_keeps_memory_and_reports() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();
        tracker.store_mut().set_read_only(true);

        let result = tracker.set_dose_status(&id, 0, DoseStatus::Taken);
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(
            tracker.medication(&id).unwrap().history[0].status,
            DoseStatus::Taken
        );

        tracker.store_mut().set_read_only(false);
        tracker.save().unwrap();
        assert_eq!(reopen(tracker)[0].history[0].status, DoseStatus::Taken);
    }

    #[test]
    fn test_resolve_by_prefix() {
        let mut tracker = tracker();
        let id = tracker.create(draft()).unwrap();

        assert_eq!(tracker.resolve(&id).unwrap().id, id);
        assert_eq!(tracker.resolve(&id[..10]).unwrap().id, id);
        assert!(matches!(
            tracker.resolve("nope"),
            Err(Error::MedicationNotFound(_))
        ));

        tracker.create(draft()).unwrap();
        assert!(matches!(tracker.resolve("med-"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_open_reports_discarded_data() {
        let mut store = MemoryStore::new();
        store.set(STORE_KEY, "[{\"id\": 7}]").unwrap();

        let tracker = Tracker::open(store).unwrap();
        assert!(tracker.medications().is_empty());
        assert_eq!(tracker.warnings().len(), 1);
    }

    #[test]
    fn test_file_backed_tracker_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();

        let id = {
            let mut tracker = Tracker::open(FileStore::new(temp_dir.path())).unwrap();
            let id = tracker.create(draft()).unwrap();
            tracker.set_dose_status(&id, 0, DoseStatus::Taken).unwrap();
            id
        };

        let tracker = Tracker::open(FileStore::new(temp_dir.path())).unwrap();
        let med = tracker.medication(&id).unwrap();
        assert_eq!(med.history[0].status, DoseStatus::Taken);
        assert_eq!(med.first_dose_at, Some(draft().first_dose_at));
    }
}
