//! Error types for the medtrack_core library.

use crate::DoseStatus;
use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-range input to create/update/generate
    #[error("Validation error: {0}")]
    Validation(String),

    /// No medication with this id in the collection
    #[error("Medication not found: {0}")]
    MedicationNotFound(String),

    /// The medication exists but has no dose with this index
    #[error("Dose {index} not found for medication {medication_id}")]
    DoseNotFound { medication_id: String, index: usize },

    /// The dose already has the requested status
    #[error("Dose {index} is already {status}")]
    NoChange { index: usize, status: DoseStatus },

    /// Every dose of the medication has been taken or skipped
    #[error("No pending dose for medication {0}")]
    NoPendingDose(String),

    /// The durable store could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Persisted data is corrupt or has an incompatible shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl Error {
    /// True for the "already in that state" guard, which is not a real failure.
    pub fn is_no_change(&self) -> bool {
        matches!(self, Error::NoChange { .. })
    }
}
