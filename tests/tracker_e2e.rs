//! End-to-end tests driving the controller the way a host app would.
//!
//! These tests verify:
//! - Push → register → region callbacks → de-duplicated transitions
//! - Re-arm after the time filter elapses
//! - Unknown regions and malformed pushes are reported, not fatal
//! - Provider events delivered on a queue are handled in order

use std::sync::Arc;
use std::thread;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use geofence_tracker::{
    ErrorKind, GeofenceId, InMemoryGeofenceStore, LocationProvider, ManualClock, MonitorState, MonitoringController,
    ProviderEvent, RecordingReporter, RecordingSink, RegionState, SimulatedProvider,
    TrackerConfig, TransitionKind,
};

struct App {
    controller: MonitoringController,
    provider: Arc<SimulatedProvider>,
    sink: Arc<RecordingSink>,
    reporter: Arc<RecordingReporter>,
    clock: Arc<ManualClock>,
}

fn app() -> App {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let provider = Arc::new(SimulatedProvider::new());
    let sink = Arc::new(RecordingSink::new());
    let reporter = Arc::new(RecordingReporter::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let controller = MonitoringController::new(
        TrackerConfig::default(),
        provider.clone(),
        sink.clone(),
        Arc::new(InMemoryGeofenceStore::new()),
        reporter.clone(),
        clock.clone(),
    );
    controller.start().unwrap();
    App {
        controller,
        provider,
        sink,
        reporter,
        clock,
    }
}

fn push_42(app: &App) {
    app.controller
        .on_geofence_list_pushed(&json!([
            {"id": "42", "lat": 37.0, "lng": -122.0, "radius": 100.0}
        ]))
        .unwrap();
}

#[test]
fn test_push_then_enter_suppress_and_rearm() {
    let app = app();
    push_42(&app);
    let id = GeofenceId::from("42");

    let first = app
        .controller
        .on_raw_region_state_report(&id, RegionState::Inside)
        .unwrap()
        .expect("first observation fires");
    assert_eq!(first.kind, TransitionKind::Entered);

    assert!(app
        .controller
        .on_raw_region_state_report(&id, RegionState::Inside)
        .unwrap()
        .is_none());

    app.clock.advance(ChronoDuration::seconds(1801));
    let again = app
        .controller
        .on_raw_region_state_report(&id, RegionState::Inside)
        .unwrap()
        .expect("re-armed after time filter");
    assert_eq!(again.kind, TransitionKind::Entered);
    assert_ne!(again.event_id, first.event_id);

    let recorded: Vec<TransitionKind> = app.sink.events().into_iter().map(|(k, _)| k).collect();
    assert_eq!(recorded, vec![TransitionKind::Entered, TransitionKind::Entered]);
}

#[test]
fn test_first_outside_observation_fires_exited() {
    let app = app();
    push_42(&app);
    let event = app
        .controller
        .on_raw_region_state_report(&GeofenceId::from("42"), RegionState::Outside)
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, TransitionKind::Exited);
    assert_eq!(event.name(), "GeofenceExited");
}

#[test]
fn test_unregistered_region_reports_unknown() {
    let app = app();
    push_42(&app);
    let err = app
        .controller
        .on_raw_region_state_report(&GeofenceId::from("99"), RegionState::Inside)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRegion);
    assert_eq!(app.reporter.kinds(), vec![ErrorKind::UnknownRegion]);
    assert!(app.sink.events().is_empty());
}

#[test]
fn test_push_missing_radius_keeps_previous_geofences() {
    let app = app();
    push_42(&app);

    let err = app
        .controller
        .on_geofence_list_pushed(&json!([
            {"id": "43", "lat": 38.0, "lng": -121.0, "radius": 50.0},
            {"id": "44", "lat": 39.0, "lng": -120.0}
        ]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedData);
    assert_eq!(app.provider.monitored_regions(), vec!["42".to_string()]);

    // The old geofence still tracks transitions.
    assert!(app
        .controller
        .on_raw_region_state_report(&GeofenceId::from("42"), RegionState::Inside)
        .unwrap()
        .is_some());
}

#[test]
fn test_disjoint_pushes_leave_no_residual_regions() {
    let app = app();
    app.controller
        .on_geofence_list_pushed(&json!({"geofences": [
            {"id": 1, "lat": 1.0, "lng": 1.0, "r": 10.0},
            {"id": 2, "lat": 2.0, "lng": 2.0, "r": 10.0}
        ]}))
        .unwrap();
    app.controller
        .on_geofence_list_pushed(&json!([
            {"id": 3, "lat": 3.0, "lng": 3.0, "r": 10.0}
        ]))
        .unwrap();

    assert_eq!(app.provider.monitored_regions(), vec!["3".to_string()]);

    // Callbacks for the dropped geofences are now unknown.
    app.controller
        .handle_event(ProviderEvent::RegionEntered(GeofenceId::from("1")));
    assert_eq!(app.reporter.kinds(), vec![ErrorKind::UnknownRegion]);
}

#[test]
fn test_subscribers_see_each_transition_once() {
    let app = app();
    push_42(&app);
    let entered = app.controller.subscribe(&[TransitionKind::Entered]);
    let exited = app.controller.subscribe(&[TransitionKind::Exited]);

    let id = GeofenceId::from("42");
    app.controller
        .handle_event(ProviderEvent::RegionEntered(id.clone()));
    app.controller.handle_event(ProviderEvent::RegionStateDetermined {
        region: id.clone(),
        state: RegionState::Inside,
    });
    app.controller.handle_event(ProviderEvent::RegionExited(id.clone()));
    app.controller.handle_event(ProviderEvent::RegionStateDetermined {
        region: id,
        state: RegionState::Outside,
    });

    assert_eq!(entered.drain().len(), 1);
    assert_eq!(exited.drain().len(), 1);
}

#[test]
fn test_event_queue_from_provider_thread() {
    let app = app();
    push_42(&app);
    let sub = app.controller.subscribe(&[]);

    let (tx, rx) = crossbeam_channel::bounded(16);
    let producer = thread::spawn(move || {
        let id = GeofenceId::from("42");
        for _ in 0..5 {
            tx.send(ProviderEvent::RegionEntered(id.clone())).unwrap();
        }
        tx.send(ProviderEvent::RegionExited(id)).unwrap();
    });

    let handled = app.controller.run(&rx);
    producer.join().unwrap();

    assert_eq!(handled, 6);
    let kinds: Vec<TransitionKind> = sub.drain().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![TransitionKind::Entered, TransitionKind::Exited]);
}

#[test]
fn test_stop_then_start_again() {
    let app = app();
    push_42(&app);
    let sub = app.controller.subscribe(&[]);

    app.controller.stop();
    assert_eq!(app.controller.state(), MonitorState::Stopped);
    assert!(sub.recv().is_none());
    app.controller
        .handle_event(ProviderEvent::RegionEntered(GeofenceId::from("42")));
    assert!(app.sink.events().is_empty());

    app.controller.start().unwrap();
    assert_eq!(app.provider.monitored_regions(), vec!["42".to_string()]);
    app.controller
        .handle_event(ProviderEvent::RegionEntered(GeofenceId::from("42")));
    assert_eq!(app.sink.events().len(), 1);
}
