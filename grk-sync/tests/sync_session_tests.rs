//! End-to-end sync sessions over temporary trees

use grk_common::events::{EventBus, SyncEvent};
use grk_common::{PatientRecord, RecordTable, SyncConfig};
use grk_sync::services::RecordStore;
use grk_sync::{SyncRequest, SyncSession};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0];

struct Fixture {
    _temp: TempDir,
    source: PathBuf,
    destination: PathBuf,
    registry: PathBuf,
}

impl Fixture {
    fn request(&self) -> SyncRequest {
        SyncRequest::new(&self.source, &self.destination, &self.registry)
    }
}

fn touch(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Source tree with four cases, one without media, plus a registry holding one
/// earlier procedure of Max Muster under GRK 3
fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("in");
    let destination = temp.path().join("out");
    let registry = temp.path().join("registry.xlsx");

    touch(
        &source.join("export/case.xml"),
        b"<Patient><LastName>Roe</LastName><FirstName>Rick</FirstName>\
          <BirthDate>1970-01-01</BirthDate><PatientID>555</PatientID>\
          <ProcedureDate>2022-01-10</ProcedureDate></Patient>",
    );
    touch(&source.join("export/shot.png"), PNG);

    let muster = source.join("Muster_Max_19800115_PID123_20200301_1230450102");
    touch(&muster.join("img.png"), PNG);
    touch(&muster.join("recorder.log"), b"log");

    touch(
        &source.join("doe_jane_4711_20210512_0915123/sub/frame.jpg"),
        JPEG,
    );
    touch(&source.join("doe_jane_4711_20210601_1000001/clip.png"), PNG);
    touch(&source.join("smith_ann_777_20220202_1111111/notes.txt"), b"text");

    let existing = RecordTable::from_rows(vec![PatientRecord {
        grk_number: Some(3),
        patient_id: "OLD".to_string(),
        name: Some("muster, max".to_string()),
        birth_date: "15.01.1980".to_string(),
        procedure_date: "01.01.2019".to_string(),
        source_directory: None,
        provenance: None,
    }]);
    RecordStore::new(&SyncConfig::default())
        .save(&existing, &registry)
        .unwrap();

    Fixture {
        _temp: temp,
        source,
        destination,
        registry,
    }
}

fn session(bus: EventBus) -> SyncSession {
    SyncSession::new(SyncConfig::default(), bus).unwrap()
}

fn grk_of(table: &RecordTable, patient_id: &str, procedure_date: &str) -> Option<u32> {
    table
        .find_case(patient_id, procedure_date)
        .and_then(|r| r.grk_number)
}

#[tokio::test]
async fn test_full_sync_assigns_numbers_and_copies_media() {
    let fx = fixture();
    let report = session(EventBus::new(1024)).run(&fx.request()).await.unwrap();

    assert_eq!(report.candidates, 5);
    assert_eq!(report.registry_rows, 6);
    assert_eq!(report.planned_files, 4);
    assert!(report.registry_saved);
    let transfer = report.transfer.unwrap();
    assert_eq!(transfer.files_copied, 4);
    assert_eq!(transfer.files_skipped, 0);

    let table = RecordStore::new(&SyncConfig::default())
        .load(&fx.registry)
        .unwrap();
    assert_eq!(table.len(), 6);
    // Roe is first in processing order, Muster joins GRK 3 by name and birth date,
    // both Doe procedures share one number
    assert_eq!(grk_of(&table, "555", "10.01.2022"), Some(4));
    assert_eq!(grk_of(&table, "PID123", "01.03.2020"), Some(3));
    assert_eq!(grk_of(&table, "4711", "12.05.2021"), Some(5));
    assert_eq!(grk_of(&table, "4711", "01.06.2021"), Some(5));
    assert_eq!(grk_of(&table, "777", "02.02.2022"), Some(6));

    let out = &fx.destination;
    assert_eq!(fs::read(out.join("grk_0004/10.01.2022/shot.png")).unwrap(), PNG);
    assert!(out.join("grk_0003/01.03.2020/img.png").is_file());
    assert!(!out.join("grk_0003/01.03.2020/recorder.log").exists());
    assert!(out.join("grk_0005/12.05.2021/sub/frame.jpg").is_file());
    assert!(out.join("grk_0005/01.06.2021/clip.png").is_file());
    assert!(!out.join("grk_0004/10.01.2022/case.xml").exists());
    // media-less case: numbered, but no folder
    assert!(!out.join("grk_0006").exists());
}

#[tokio::test]
async fn test_second_run_copies_nothing_new() {
    let fx = fixture();
    session(EventBus::new(1024)).run(&fx.request()).await.unwrap();

    let report = session(EventBus::new(1024)).run(&fx.request()).await.unwrap();

    assert!(report.copy_units.is_empty());
    assert_eq!(report.reconcile.fresh_numbers, 0);
    assert_eq!(report.registry_rows, 6);
    assert_eq!(report.transfer.unwrap().files_copied, 0);
}

#[tokio::test]
async fn test_resumed_transfer_skips_existing_files() {
    let fx = fixture();
    touch(&fx.destination.join("grk_0004/10.01.2022/shot.png"), b"partial run");

    let report = session(EventBus::new(1024)).run(&fx.request()).await.unwrap();

    let transfer = report.transfer.unwrap();
    assert_eq!(transfer.files_skipped, 1);
    assert_eq!(transfer.files_copied, 3);
    assert_eq!(
        fs::read(fx.destination.join("grk_0004/10.01.2022/shot.png")).unwrap(),
        b"partial run"
    );
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let fx = fixture();
    let before = fs::read(&fx.registry).unwrap();

    let report = session(EventBus::new(1024))
        .run(&fx.request().with_dry_run(true))
        .await
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.planned_files, 4);
    assert!(report.transfer.is_none());
    assert!(!report.registry_saved);
    assert!(!fx.destination.exists());
    assert_eq!(fs::read(&fx.registry).unwrap(), before);
}

#[tokio::test]
async fn test_first_run_creates_registry() {
    let fx = fixture();
    fs::remove_file(&fx.registry).unwrap();

    let report = session(EventBus::new(1024)).run(&fx.request()).await.unwrap();

    assert_eq!(report.reconcile.existing_rows, 0);
    let table = RecordStore::new(&SyncConfig::default())
        .load(&fx.registry)
        .unwrap();
    assert_eq!(table.len(), 5);
    assert_eq!(table.max_grk_number(), 4);
}

#[tokio::test]
async fn test_session_events_in_order() {
    let fx = fixture();
    let bus = EventBus::new(4096);
    let mut rx = bus.subscribe();

    session(bus).run(&fx.request()).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(SyncEvent::SessionStarted { .. })));
    assert!(matches!(events.last(), Some(SyncEvent::SessionCompleted { dry_run: false, .. })));

    let position = |pred: fn(&SyncEvent) -> bool| events.iter().position(pred).unwrap();
    let plan = position(|e| matches!(e, SyncEvent::PlanReady { .. }));
    let done = position(|e| matches!(e, SyncEvent::TransferCompleted { .. }));
    let saved = position(|e| matches!(e, SyncEvent::RegistrySaved { .. }));
    assert!(plan < done && done < saved);

    let progress: Vec<u16> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::TransferProgress { permille } => Some(*permille),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last(), Some(&1000));
}

#[tokio::test]
async fn test_missing_source_fails_before_writing() {
    let fx = fixture();
    let before = fs::read(&fx.registry).unwrap();
    let request = SyncRequest::new(fx.source.join("nope"), &fx.destination, &fx.registry);

    let result = session(EventBus::new(16)).run(&request).await;

    assert!(result.is_err());
    assert_eq!(fs::read(&fx.registry).unwrap(), before);
}

#[tokio::test]
async fn test_report_serializes() {
    let fx = fixture();
    let report = session(EventBus::new(1024))
        .run(&fx.request().with_dry_run(true))
        .await
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["planned_files"], 4);
    assert_eq!(json["reconcile"]["fresh_numbers"], 3);
    assert!(json["transfer"].is_null());
    assert_eq!(json["copy_units"][0]["target_label"], "grk_0004");
}
