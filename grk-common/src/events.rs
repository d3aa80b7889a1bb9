//! Event types for the sync workflow
//!
//! Provides the [`SyncEvent`] enum and the [`EventBus`] used to broadcast it.
//! The transfer worker reports progress exclusively through this bus.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Sync workflow events
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag so a
/// front end can consume them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A sync session started
    SessionStarted {
        session_id: Uuid,
        source_root: PathBuf,
        destination_root: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Candidate records were extracted from the source tree
    ExtractionCompleted {
        session_id: Uuid,
        candidates: usize,
    },

    /// Candidates were merged into the registry table
    ReconciliationCompleted {
        session_id: Uuid,
        /// Rows in the merged table
        rows: usize,
        /// GRK numbers handed out for the first time
        fresh_numbers: usize,
        /// Folders scheduled for copying
        copy_units: usize,
    },

    /// Copy plan expanded to file level
    PlanReady {
        session_id: Uuid,
        files: usize,
        total_bytes: u64,
        /// Source folders that vanished since extraction
        missing_sources: usize,
    },

    /// Overall copy progress, permille of total bytes (0..=1000), never decreasing
    TransferProgress {
        permille: u16,
    },

    /// Transfer finished
    TransferCompleted {
        files_copied: usize,
        files_skipped: usize,
        bytes_copied: u64,
    },

    /// Transfer stopped on a fatal I/O error
    TransferFailed {
        message: String,
    },

    /// Registry written back
    RegistrySaved {
        session_id: Uuid,
        path: PathBuf,
        rows: usize,
    },

    /// Session finished
    SessionCompleted {
        session_id: Uuid,
        dry_run: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// True for the events that end a transfer
    pub fn is_transfer_terminal(&self) -> bool {
        matches!(
            self,
            SyncEvent::TransferCompleted { .. } | SyncEvent::TransferFailed { .. }
        )
    }
}

/// Broadcast bus for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::TransferProgress { permille: 250 }).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, SyncEvent::TransferProgress { permille: 250 });
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not() {
        let bus = EventBus::new(10);
        assert!(bus.emit(SyncEvent::TransferProgress { permille: 1 }).is_err());
        bus.emit_lossy(SyncEvent::TransferProgress { permille: 1 });
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(SyncEvent::TransferCompleted {
            files_copied: 2,
            files_skipped: 1,
            bytes_copied: 10,
        })
        .unwrap();
        assert_eq!(json["type"], "TransferCompleted");
        assert_eq!(json["files_copied"], 2);
    }

    #[test]
    fn test_terminal_events() {
        assert!(SyncEvent::TransferFailed { message: "disk full".into() }.is_transfer_terminal());
        assert!(!SyncEvent::TransferProgress { permille: 5 }.is_transfer_terminal());
    }
}
