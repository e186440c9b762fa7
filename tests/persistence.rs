//! Restart and corruption tests for the file-backed store.
//!
//! These tests verify that:
//! - Suppression state survives a process restart
//! - A corrupt blob is reported as `DiskRead` and treated as empty
//! - A crash before the rename leaves the previous snapshot intact
//! - A push after corruption still releases the regions it replaces

use std::fs;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tempfile::tempdir;

use geofence_tracker::storage::{open_store, STORAGE_FILE_NAME};
use geofence_tracker::{
    ErrorKind, Geofence, GeofenceId, GeofenceStore, LocationProvider, ManualClock, MonitoringController,
    RecordingReporter, RecordingSink, RegionState, SimulatedProvider, TrackerConfig,
};

fn controller_at(
    dir: &std::path::Path,
    clock: Arc<ManualClock>,
) -> (MonitoringController, Arc<RecordingSink>, Arc<RecordingReporter>) {
    let sink = Arc::new(RecordingSink::new());
    let reporter = Arc::new(RecordingReporter::new());
    let store = Arc::new(open_store(dir).unwrap().with_sync_on_write(false));
    let controller = MonitoringController::new(
        TrackerConfig::default(),
        Arc::new(SimulatedProvider::new()),
        sink.clone(),
        store,
        reporter.clone(),
        clock,
    );
    controller.start().unwrap();
    (controller, sink, reporter)
}

#[test]
fn test_suppression_survives_restart() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let id = GeofenceId::from("42");

    {
        let (controller, sink, _) = controller_at(dir.path(), clock.clone());
        controller
            .on_geofence_list_pushed(&json!([{"id": 42, "lat": 37.0, "lng": -122.0, "r": 100.0}]))
            .unwrap();
        controller
            .on_raw_region_state_report(&id, RegionState::Inside)
            .unwrap()
            .unwrap();
        assert_eq!(sink.events().len(), 1);
    }

    clock.advance(ChronoDuration::seconds(60));
    let (controller, sink, reporter) = controller_at(dir.path(), clock.clone());
    assert!(controller
        .on_raw_region_state_report(&id, RegionState::Inside)
        .unwrap()
        .is_none());
    assert!(sink.events().is_empty());
    assert!(reporter.kinds().is_empty());

    let state = controller.tracker().state_of(&id).unwrap().unwrap();
    assert_eq!(state.last_known_state(), RegionState::Inside);
}

#[test]
fn test_corrupt_blob_reports_disk_read_and_recovers_on_push() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    {
        let store = open_store(dir.path()).unwrap();
        store
            .replace_all(vec![Geofence::new("1", 1.0, 1.0, 10.0).unwrap()])
            .unwrap();
    }

    let path = dir.path().join(STORAGE_FILE_NAME);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let (controller, sink, reporter) = controller_at(dir.path(), clock);
    // Restoring regions on start could not read the blob.
    assert_eq!(reporter.kinds(), vec![ErrorKind::DiskRead]);

    let err = controller
        .on_raw_region_state_report(&GeofenceId::from("1"), RegionState::Inside)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DiskRead);
    assert!(sink.events().is_empty());

    // A fresh push overwrites the corrupt blob wholesale.
    controller
        .on_geofence_list_pushed(&json!([{"id": 2, "lat": 2.0, "lng": 2.0, "r": 10.0}]))
        .unwrap();
    assert!(controller
        .on_raw_region_state_report(&GeofenceId::from("2"), RegionState::Outside)
        .unwrap()
        .is_some());
}

#[test]
fn test_push_after_corruption_releases_old_regions() {
    let dir = tempdir().unwrap();
    let provider = Arc::new(SimulatedProvider::new());
    let reporter = Arc::new(RecordingReporter::new());
    let controller = MonitoringController::new(
        TrackerConfig::default(),
        provider.clone(),
        Arc::new(RecordingSink::new()),
        Arc::new(open_store(dir.path()).unwrap()),
        reporter.clone(),
        Arc::new(ManualClock::new(Utc::now())),
    );
    controller.start().unwrap();
    controller
        .on_geofence_list_pushed(&json!([{"id": 1, "lat": 1.0, "lng": 1.0, "r": 10.0}]))
        .unwrap();

    let path = dir.path().join(STORAGE_FILE_NAME);
    let mut bytes = fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    controller
        .on_geofence_list_pushed(&json!([{"id": 2, "lat": 2.0, "lng": 2.0, "r": 10.0}]))
        .unwrap();

    assert_eq!(provider.monitored_regions(), vec!["2".to_string()]);
    assert_eq!(reporter.kinds(), vec![ErrorKind::DiskRead]);
}

#[test]
fn test_duplicate_push_keeps_blob_readable() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (controller, _, reporter) = controller_at(dir.path(), clock);
    controller
        .on_geofences(vec![Geofence::new("1", 1.0, 1.0, 10.0).unwrap()])
        .unwrap();

    let err = controller
        .on_geofences(vec![
            Geofence::new("1", 1.0, 1.0, 10.0).unwrap(),
            Geofence::new("1", 2.0, 2.0, 10.0).unwrap(),
        ])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedData);

    assert!(controller
        .on_raw_region_state_report(&GeofenceId::from("1"), RegionState::Inside)
        .unwrap()
        .is_some());
    assert_eq!(reporter.kinds(), vec![ErrorKind::UnexpectedData]);
}

#[test]
fn test_stale_temp_file_does_not_replace_snapshot() {
    let dir = tempdir().unwrap();
    {
        let store = open_store(dir.path()).unwrap();
        store
            .replace_all(vec![Geofence::new("1", 1.0, 1.0, 10.0).unwrap()])
            .unwrap();
    }

    // Simulate a crash after writing the temp file but before the rename.
    let temp = dir.path().join(format!("{STORAGE_FILE_NAME}.tmp"));
    fs::write(&temp, b"half-written").unwrap();

    let store = open_store(dir.path()).unwrap();
    assert!(!temp.exists());
    assert_eq!(store.ids().unwrap(), vec![GeofenceId::from("1")]);
}

#[test]
fn test_empty_push_removes_blob() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (controller, _, _) = controller_at(dir.path(), clock);

    controller
        .on_geofence_list_pushed(&json!([{"id": 1, "lat": 1.0, "lng": 1.0, "r": 10.0}]))
        .unwrap();
    let path = dir.path().join(STORAGE_FILE_NAME);
    assert!(path.exists());

    controller.on_geofence_list_pushed(&json!([])).unwrap();
    assert!(!path.exists());
    assert!(controller.tracker().store().all().unwrap().is_empty());
}
