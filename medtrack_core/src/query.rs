//! Read-only projections over a medication's dose history.
//!
//! None of these mutate state; all of them tolerate empty or stale histories.

use crate::{DoseEvent, DoseStatus, Medication};
use chrono::{DateTime, Duration, Local};

/// Per-status dose counts for one medication
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DoseSummary {
    pub taken: usize,
    pub skipped: usize,
    pub pending: usize,
}

impl DoseSummary {
    pub fn total(&self) -> usize {
        self.taken + self.skipped + self.pending
    }

    /// Nothing left to take
    pub fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// What a reminder for the next dose would say
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reminder<'a> {
    /// Every dose has been taken or skipped
    NothingPending,
    /// The next dose time has passed (or is inside the due window)
    Due {
        dose: &'a DoseEvent,
        overdue_by: Duration,
    },
    /// The next dose is still ahead
    Upcoming { dose: &'a DoseEvent, due_in: Duration },
}

impl Medication {
    /// The pending dose scheduled earliest, lowest index first on ties
    pub fn next_pending_dose(&self) -> Option<&DoseEvent> {
        self.history
            .iter()
            .filter(|d| d.status == DoseStatus::Pending)
            .min_by_key(|d| (d.scheduled_at, d.index))
    }

    pub fn count_by_status(&self, status: DoseStatus) -> usize {
        self.history.iter().filter(|d| d.status == status).count()
    }

    pub fn summary(&self) -> DoseSummary {
        self.history
            .iter()
            .fold(DoseSummary::default(), |mut summary, dose| {
                match dose.status {
                    DoseStatus::Taken => summary.taken += 1,
                    DoseStatus::Skipped => summary.skipped += 1,
                    DoseStatus::Pending => summary.pending += 1,
                }
                summary
            })
    }

    /// Doses still to take
    pub fn remaining(&self) -> usize {
        self.count_by_status(DoseStatus::Pending)
    }

    /// History ordered by scheduled time, then index
    pub fn history_by_time(&self) -> Vec<&DoseEvent> {
        let mut doses: Vec<_> = self.history.iter().collect();
        doses.sort_by_key(|d| (d.scheduled_at, d.index));
        doses
    }

    /// Describe the next pending dose relative to `now`
    pub fn reminder(&self, now: DateTime<Local>, due_window: Duration) -> Reminder<'_> {
        let Some(dose) = self.next_pending_dose() else {
            return Reminder::NothingPending;
        };

        let due_in = dose.scheduled_at - now;
        if due_in <= due_window {
            Reminder::Due {
                dose,
                overdue_by: (now - dose.scheduled_at).max(Duration::zero()),
            }
        } else {
            Reminder::Upcoming { dose, due_in }
        }
    }
}
