#![forbid(unsafe_code)]

//! Core domain model and business logic for medtrack.
//!
//! This crate provides:
//! - Domain types (medications, scheduled doses, dose status)
//! - Schedule generation from a first dose, frequency, and count
//! - The tracker engine that owns and mutates the collection
//! - Persistence (versioned JSON blob in a key-value store)
//! - Time formatting, CSV export, configuration, and logging

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod timefmt;
pub mod schedule;
pub mod query;
pub mod store;
pub mod persist;
pub mod tracker;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use schedule::generate_history;
pub use query::{DoseSummary, Reminder};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use persist::STORE_KEY;
pub use tracker::{Tracker, UpdateOutcome};
