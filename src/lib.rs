//! # geofence-tracker
//!
//! Client-side geofence transition tracking. The backend pushes a list of
//! circular geofences; the device registers them with its location provider,
//! and every enter/exit/state callback is de-duplicated into at most one
//! business event per real transition before it reaches analytics.
//!
//! ## Core Concepts
//!
//! - **Geofence**: A backend-assigned circle (`id`, center, radius in meters)
//! - **GeofenceState**: The persisted memo of the last confirmed state per geofence
//! - **TransitionTracker**: Turns noisy region callbacks into `Entered`/`Exited` events
//! - **MonitoringController**: Provider lifecycle, geofence pushes and event dispatch
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use geofence_tracker::{MonitoringController, RecordingSink, SimulatedProvider, TrackerConfig};
//!
//! let controller = MonitoringController::open(
//!     TrackerConfig::default(),
//!     Arc::new(SimulatedProvider::new()),
//!     Arc::new(RecordingSink::new()),
//! )?;
//! controller.start()?;
//! controller.on_geofence_list_pushed(&serde_json::json!([
//!     {"id": 42, "lat": 37.33, "lng": -122.03, "r": 100.0}
//! ]))?;
//! let entered = controller.subscribe(&[geofence_tracker::TransitionKind::Entered]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod clock;
pub mod config;
pub mod error;
pub mod geofence;
pub mod location;

// Collaborators
pub mod provider;
pub mod reporter;
pub mod sink;

// Tracking
pub mod controller;
pub mod filter;
pub mod notify;
pub mod storage;
pub mod tracker;

// Re-export primary types at crate root for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrackerConfig;
pub use controller::{MonitorState, MonitoringController};
pub use error::{ErrorKind, GeofenceError, GeofenceResult, Precondition};
pub use filter::LocationHistory;
pub use geofence::{
    parse_push, Geofence, GeofenceId, GeofenceState, RegionState, TransitionKind,
};
pub use location::{Coordinate, LocationSample};
pub use notify::{Notifier, Subscription, SubscriptionId, TransitionEvent};
pub use provider::{
    AuthorizationStatus, CircularRegion, LocationProvider, ProviderEvent, SimulatedProvider,
};
pub use reporter::{ErrorReporter, RecordingReporter, SinkErrorReporter};
pub use sink::{AnalyticsSink, RecordingSink, SinkCall};
pub use storage::{FileGeofenceStore, GeofenceStore, InMemoryGeofenceStore};
pub use tracker::TransitionTracker;
