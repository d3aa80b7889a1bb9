//! Service modules for the sync workflow
//!
//! Leaves first: scanning, registry store, reconciliation, copy planning and the
//! transfer worker. [`crate::workflow::SyncSession`] wires them together.

pub mod copy_planner;
pub mod folder_scanner;
pub mod reconciler;
pub mod record_store;
pub mod transfer_executor;

pub use copy_planner::{is_media_file, CopyEntry, CopyPlan, CopyPlanner};
pub use folder_scanner::{FolderScanner, ScanError};
pub use reconciler::{reconcile, ReconcileStats, Reconciliation};
pub use record_store::RecordStore;
pub use transfer_executor::{TransferExecutor, TransferHandle, TransferSummary};
