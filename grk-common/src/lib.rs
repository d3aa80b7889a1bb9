//! # GRK Common Library
//!
//! Shared code for the GRK sync crates:
//! - Error and result types
//! - Sync configuration (TOML loading, folder pattern table)
//! - Registry record model (`PatientRecord`, `RecordTable`, `CopyUnit`)
//! - Registry date helpers
//! - Event types and the broadcast `EventBus`

pub mod config;
pub mod dates;
pub mod error;
pub mod events;
pub mod records;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use records::{CopyUnit, PatientRecord, RecordTable};
