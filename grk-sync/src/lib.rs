//! grk-sync library interface
//!
//! Exposes the sync components for the binary and for integration testing:
//! - [`extractors`]: source tree → candidate records
//! - [`services`]: registry store, reconciliation, copy planning, transfer
//! - [`workflow`]: the [`SyncSession`] orchestrator

pub mod extractors;
pub mod models;
pub mod services;
pub mod types;
pub mod workflow;

pub use extractors::{CandidateRecords, RecordExtractor};
pub use models::{SyncReport, SyncRequest};
pub use workflow::SyncSession;
