//! Sync workflow
//!
//! One [`SyncSession`] run goes through these phases in order:
//! 1. Validate the request, create the destination root
//! 2. Load the registry, check it can be written back
//! 3. Extract candidate records from the source tree
//! 4. Reconcile against the registry (GRK number assignment)
//! 5. Expand copy units into a file-level plan
//! 6. Transfer, wait for the completion signal
//! 7. Save the registry
//!
//! A dry run stops after phase 5 without touching the destination or the registry.

pub mod session;

pub use session::SyncSession;
