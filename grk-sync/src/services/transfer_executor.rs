//! Transfer Executor
//!
//! Copies the planned files on a blocking worker and reports progress through the
//! [`EventBus`]:
//! - `TransferProgress { permille }` over the bytes of all files combined, never
//!   decreasing, ending at 1000 (an empty list reports 1000 straight away)
//! - `TransferCompleted` or `TransferFailed` as terminal signal
//!
//! A destination that already exists is skipped and its source size credited, so an
//! interrupted transfer can be resumed by running again. Destination folders are
//! created per file as needed.
//!
//! At most one transfer per destination root is in flight; `begin` on a root that
//! is already being written fails with [`Error::Conflict`].

use grk_common::config::TransferConfig;
use grk_common::events::{EventBus, SyncEvent};
use grk_common::{Error, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Destination roots with a transfer in flight
static ACTIVE_DESTINATIONS: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(Default::default);

/// Exclusive claim on a destination root, released on drop
#[derive(Debug)]
pub(crate) struct DestinationGuard {
    root: PathBuf,
}

impl DestinationGuard {
    pub(crate) fn acquire(root: &Path) -> Result<Self> {
        let mut active = ACTIVE_DESTINATIONS
            .lock()
            .map_err(|_| Error::Internal("Transfer registry lock poisoned".to_string()))?;
        if !active.insert(root.to_path_buf()) {
            return Err(Error::Conflict(format!(
                "A transfer into {} is already running",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl Drop for DestinationGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = ACTIVE_DESTINATIONS.lock() {
            active.remove(&self.root);
        }
    }
}

/// Outcome of a finished transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub bytes_copied: u64,
    /// Bytes of all files, skipped ones included
    pub total_bytes: u64,
}

/// Transfer executor
#[derive(Debug, Clone)]
pub struct TransferExecutor {
    event_bus: EventBus,
    chunk_size: usize,
    destination_root: Option<PathBuf>,
    sources: Vec<PathBuf>,
    destinations: Vec<PathBuf>,
}

impl TransferExecutor {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            event_bus,
            chunk_size: TransferConfig::default().chunk_size,
            destination_root: None,
            sources: Vec::new(),
            destinations: Vec::new(),
        }
    }

    /// Bytes per read/write cycle (at least 1)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Root guarded against concurrent transfers
    ///
    /// Defaults to the deepest folder shared by all destinations.
    pub fn with_destination_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.destination_root = Some(root.into());
        self
    }

    /// Set the files to copy; `sources[i]` goes to `destinations[i]`
    pub fn set_transfer_list(&mut self, sources: Vec<PathBuf>, destinations: Vec<PathBuf>) -> Result<()> {
        if sources.len() != destinations.len() {
            return Err(Error::InvalidInput(format!(
                "{} sources but {} destinations",
                sources.len(),
                destinations.len()
            )));
        }
        self.sources = sources;
        self.destinations = destinations;
        Ok(())
    }

    /// Start the transfer on a blocking worker
    ///
    /// Must be called inside a Tokio runtime.
    pub fn begin(self) -> Result<TransferHandle> {
        let root = self
            .destination_root
            .clone()
            .unwrap_or_else(|| common_ancestor(&self.destinations));
        let guard = DestinationGuard::acquire(&root)?;

        info!(
            destination = %root.display(),
            files = self.sources.len(),
            "Transfer started"
        );

        let join = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let result = self.run();
            match &result {
                Ok(summary) => self.event_bus.emit_lossy(SyncEvent::TransferCompleted {
                    files_copied: summary.files_copied,
                    files_skipped: summary.files_skipped,
                    bytes_copied: summary.bytes_copied,
                }),
                Err(e) => {
                    error!(error = %e, "Transfer failed");
                    self.event_bus.emit_lossy(SyncEvent::TransferFailed {
                        message: e.to_string(),
                    });
                }
            }
            result
        });

        Ok(TransferHandle { join })
    }

    fn run(&self) -> Result<TransferSummary> {
        let mut summary = TransferSummary::default();
        for source in &self.sources {
            summary.total_bytes += std::fs::metadata(source)
                .map_err(|e| Error::io_at(source, e))?
                .len();
        }

        let mut progress = Progress::new(&self.event_bus, summary.total_bytes);
        let mut buffer = vec![0u8; self.chunk_size];

        for (source, destination) in self.sources.iter().zip(&self.destinations) {
            if destination.exists() {
                let size = std::fs::metadata(source)
                    .map_err(|e| Error::io_at(source, e))?
                    .len();
                debug!(destination = %destination.display(), "Destination exists, skipped");
                summary.files_skipped += 1;
                progress.advance(size);
                continue;
            }

            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
            }

            let copied = copy_file(source, destination, &mut buffer, &mut progress).map_err(|e| {
                // A partial file would be skipped as done on the next run
                let _ = std::fs::remove_file(destination);
                e
            })?;

            summary.files_copied += 1;
            summary.bytes_copied += copied;
        }

        progress.finish();

        info!(
            files_copied = summary.files_copied,
            files_skipped = summary.files_skipped,
            bytes_copied = summary.bytes_copied,
            "Transfer complete"
        );
        Ok(summary)
    }
}

fn copy_file(
    source: &Path,
    destination: &Path,
    buffer: &mut [u8],
    progress: &mut Progress<'_>,
) -> Result<u64> {
    let mut reader = File::open(source).map_err(|e| Error::io_at(source, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(|e| Error::io_at(destination, e))?;

    let mut copied = 0u64;
    loop {
        let n = reader.read(buffer).map_err(|e| Error::io_at(source, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buffer[..n])
            .map_err(|e| Error::io_at(destination, e))?;
        copied += n as u64;
        progress.advance(n as u64);
    }
    writer.flush().map_err(|e| Error::io_at(destination, e))?;

    debug!(
        source = %source.display(),
        destination = %destination.display(),
        bytes = copied,
        "File copied"
    );
    Ok(copied)
}

/// Permille progress over a fixed byte total
struct Progress<'a> {
    event_bus: &'a EventBus,
    total: u64,
    done: u64,
    last_emitted: Option<u16>,
}

impl<'a> Progress<'a> {
    fn new(event_bus: &'a EventBus, total: u64) -> Self {
        let mut progress = Self {
            event_bus,
            total,
            done: 0,
            last_emitted: None,
        };
        progress.emit();
        progress
    }

    fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes);
        self.emit();
    }

    fn finish(&mut self) {
        self.done = self.total;
        self.emit();
    }

    fn permille(&self) -> u16 {
        if self.total == 0 {
            return 1000;
        }
        (self.done.min(self.total) * 1000 / self.total) as u16
    }

    /// Emit only when the value moved
    fn emit(&mut self) {
        let permille = self.permille();
        if self.last_emitted.is_some_and(|last| permille <= last) {
            return;
        }
        self.last_emitted = Some(permille);
        self.event_bus
            .emit_lossy(SyncEvent::TransferProgress { permille });
    }
}

/// Deepest folder shared by all paths
fn common_ancestor(paths: &[PathBuf]) -> PathBuf {
    let mut iter = paths.iter();
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };

    let mut ancestor = first.parent().map(Path::to_path_buf).unwrap_or_default();
    for path in iter {
        while !path.starts_with(&ancestor) {
            if !ancestor.pop() {
                return PathBuf::new();
            }
        }
    }
    ancestor
}

/// Handle to a running transfer
#[derive(Debug)]
pub struct TransferHandle {
    join: JoinHandle<Result<TransferSummary>>,
}

impl TransferHandle {
    /// Wait for the transfer to finish
    pub async fn wait(self) -> Result<TransferSummary> {
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Transfer worker panicked: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::broadcast::Receiver;

    fn drain(rx: &mut Receiver<SyncEvent>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn progress_values(events: &[SyncEvent]) -> Vec<u16> {
        events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::TransferProgress { permille } => Some(*permille),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_copies_files_with_monotonic_progress() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.bin"), vec![1u8; 3000]).unwrap();
        fs::write(src.path().join("b.bin"), vec![2u8; 1000]).unwrap();

        let bus = EventBus::new(4096);
        let mut rx = bus.subscribe();

        let mut executor = TransferExecutor::new(bus)
            .with_chunk_size(100)
            .with_destination_root(dst.path());
        executor
            .set_transfer_list(
                vec![src.path().join("a.bin"), src.path().join("b.bin")],
                vec![dst.path().join("x/a.bin"), dst.path().join("y/z/b.bin")],
            )
            .unwrap();

        let summary = executor.begin().unwrap().wait().await.unwrap();
        assert_eq!(summary.files_copied, 2);
        assert_eq!(summary.bytes_copied, 4000);
        assert_eq!(fs::read(dst.path().join("y/z/b.bin")).unwrap(), vec![2u8; 1000]);

        let events = drain(&mut rx);
        let values = progress_values(&events);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(values.first(), Some(&0));
        assert_eq!(values.last(), Some(&1000));
        assert!(matches!(
            events.last(),
            Some(SyncEvent::TransferCompleted { files_copied: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_existing_destination_skipped_and_credited() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("a.bin"), vec![1u8; 500]).unwrap();
        fs::write(src.path().join("b.bin"), vec![2u8; 500]).unwrap();
        fs::write(dst.path().join("a.bin"), b"older copy").unwrap();

        let bus = EventBus::new(4096);
        let mut rx = bus.subscribe();
        let mut executor = TransferExecutor::new(bus).with_destination_root(dst.path());
        executor
            .set_transfer_list(
                vec![src.path().join("a.bin"), src.path().join("b.bin")],
                vec![dst.path().join("a.bin"), dst.path().join("b.bin")],
            )
            .unwrap();

        let summary = executor.begin().unwrap().wait().await.unwrap();
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.files_copied, 1);
        assert_eq!(summary.total_bytes, 1000);
        // not overwritten
        assert_eq!(fs::read(dst.path().join("a.bin")).unwrap(), b"older copy");

        let values = progress_values(&drain(&mut rx));
        assert!(values.contains(&500));
        assert_eq!(values.last(), Some(&1000));
    }

    #[tokio::test]
    async fn test_empty_list_reports_complete() {
        let dst = TempDir::new().unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let summary = TransferExecutor::new(bus)
            .with_destination_root(dst.path())
            .begin()
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(summary, TransferSummary::default());

        let events = drain(&mut rx);
        assert_eq!(events[0], SyncEvent::TransferProgress { permille: 1000 });
        assert!(events[1].is_transfer_terminal());
    }

    #[tokio::test]
    async fn test_missing_source_fails_transfer() {
        let dst = TempDir::new().unwrap();
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let mut executor = TransferExecutor::new(bus).with_destination_root(dst.path());
        executor
            .set_transfer_list(
                vec![dst.path().join("missing.bin")],
                vec![dst.path().join("out/missing.bin")],
            )
            .unwrap();

        let result = executor.begin().unwrap().wait().await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(matches!(
            drain(&mut rx).last(),
            Some(SyncEvent::TransferFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_transfer_on_same_root_conflicts() {
        let dst = TempDir::new().unwrap();
        let held = DestinationGuard::acquire(dst.path()).unwrap();

        let result = TransferExecutor::new(EventBus::new(4))
            .with_destination_root(dst.path())
            .begin();
        assert!(matches!(result, Err(Error::Conflict(_))));

        drop(held);
        let handle = TransferExecutor::new(EventBus::new(4))
            .with_destination_root(dst.path())
            .begin()
            .unwrap();
        handle.wait().await.unwrap();

        // released once the worker is done
        DestinationGuard::acquire(dst.path()).unwrap();
    }

    #[test]
    fn test_mismatched_lists_rejected() {
        let mut executor = TransferExecutor::new(EventBus::new(4));
        let result = executor.set_transfer_list(vec![PathBuf::from("/a")], Vec::new());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_common_ancestor() {
        let paths = vec![
            PathBuf::from("/out/grk_0001/01.01.2020/a.png"),
            PathBuf::from("/out/grk_0002/02.02.2021/sub/b.png"),
        ];
        assert_eq!(common_ancestor(&paths), PathBuf::from("/out"));
        assert_eq!(common_ancestor(&[]), PathBuf::new());
    }
}
