//! Dose schedule generation.
//!
//! A medication's history is derived entirely from its first dose time,
//! frequency, and dose count. Hours are added on the wall clock of the
//! anchor's timezone, so a 24h frequency keeps the same clock time across
//! DST changes.

use crate::{DoseEvent, DoseStatus, Error, Medication, Result, MAX_DOSE_COUNT};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};

/// Map a wall-clock time onto an instant in `tz`
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// DST gap are pushed forward by an hour, the way calendar arithmetic on a
/// local clock behaves.
pub fn resolve_wall_clock<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::None => {
            earliest(tz.from_local_datetime(&naive.checked_add_signed(Duration::hours(1))?))
        }
        result => earliest(result),
    }
}

// chrono does not promise which of the two ambiguous instants comes first
fn earliest<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Tz>> {
    match result {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(a, b) => Some(a.min(b)),
        LocalResult::None => None,
    }
}

/// Compute the `count` dose times starting at `first`, `frequency_hours` apart
pub fn scheduled_times<Tz: TimeZone>(
    first: &DateTime<Tz>,
    count: u32,
    frequency_hours: u32,
) -> Result<Vec<DateTime<Tz>>> {
    let tz = first.timezone();
    let start = first.naive_local();

    (0..count)
        .map(|i| {
            i64::from(i)
                .checked_mul(i64::from(frequency_hours))
                .and_then(Duration::try_hours)
                .and_then(|offset| start.checked_add_signed(offset))
                .and_then(|naive| resolve_wall_clock(&tz, naive))
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "Dose {} falls outside the supported calendar range",
                        i + 1
                    ))
                })
        })
        .collect()
}

/// Build a fresh all-pending history for `medication` without touching it
pub fn plan(medication: &Medication) -> Result<Vec<DoseEvent>> {
    let first = medication.first_dose_at.as_ref().ok_or_else(|| {
        Error::Validation(format!(
            "Invalid first dose time for {}",
            medication.name
        ))
    })?;

    if medication.initial_dose_count == 0 {
        return Err(Error::Validation(format!(
            "{} has no doses to schedule",
            medication.name
        )));
    }
    if medication.initial_dose_count > MAX_DOSE_COUNT {
        return Err(Error::Validation(format!(
            "{} has more than {} doses to schedule",
            medication.name, MAX_DOSE_COUNT
        )));
    }
    if medication.frequency_hours == 0 {
        return Err(Error::Validation(format!(
            "{} has a zero-hour frequency",
            medication.name
        )));
    }

    let times = scheduled_times(
        first,
        medication.initial_dose_count,
        medication.frequency_hours,
    )?;

    Ok(times
        .into_iter()
        .enumerate()
        .map(|(index, scheduled_at)| DoseEvent {
            index,
            scheduled_at,
            status: DoseStatus::Pending,
        })
        .collect())
}

/// Replace the medication's entire history with a freshly generated one
///
/// Any Taken/Skipped marks are lost. On invalid input the history is left
/// empty and the validation error returned.
pub fn generate_history(medication: &mut Medication) -> Result<()> {
    medication.history.clear();

    match plan(medication) {
        Ok(history) => {
            medication.history = history;
            tracing::debug!(
                "Generated {} doses for {}",
                medication.history.len(),
                medication.name
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Cannot generate history for {}: {}", medication.name, e);
            Err(e)
        }
    }
}
