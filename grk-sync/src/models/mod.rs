//! Data models for grk-sync
//!
//! - Run request (the three run-time paths)
//! - Run report (what a session did)

pub mod sync_report;
pub mod sync_request;

pub use sync_report::SyncReport;
pub use sync_request::SyncRequest;
