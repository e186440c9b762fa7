//! Location-provider collaborator.
//!
//! The platform integration is out of scope. It is modelled as a command
//! interface ([`LocationProvider`]) the controller drives, and a typed event
//! enum ([`ProviderEvent`]) the platform delivers back on a single queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::geofence::{Geofence, GeofenceId, RegionState};
use crate::location::{Coordinate, LocationSample};

/// A circular region registered with the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircularRegion {
    /// Opaque identifier echoed back in region events.
    pub identifier: String,
    /// Center of the circle.
    pub center: Coordinate,
    /// Radius in meters.
    pub radius: f64,
}

impl From<&Geofence> for CircularRegion {
    fn from(geofence: &Geofence) -> Self {
        Self {
            identifier: geofence.id.as_str().to_string(),
            center: geofence.center(),
            radius: geofence.radius,
        }
    }
}

/// Location permission granted to the app.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    Always,
    WhenInUse,
    Denied,
    Restricted,
    NotDetermined,
    /// Granted, but only with approximate accuracy.
    ReducedAccuracy,
    /// A status this crate does not recognize.
    Unknown,
}

/// Commands the controller issues to the platform location provider.
pub trait LocationProvider: Send + Sync {
    /// Whether circular region monitoring is available on this device.
    fn is_monitoring_available(&self) -> bool;

    /// Minimum movement in meters between continuous updates.
    fn set_distance_filter(&self, meters: f64);

    /// Start continuous location updates.
    fn start_updating_location(&self);
    /// Stop continuous location updates.
    fn stop_updating_location(&self);
    /// Start delivering visit events.
    fn start_monitoring_visits(&self);
    /// Stop delivering visit events.
    fn stop_monitoring_visits(&self);
    /// Start significant-change location monitoring.
    fn start_monitoring_significant_changes(&self);
    /// Stop significant-change location monitoring.
    fn stop_monitoring_significant_changes(&self);

    /// Ask for a single one-shot location fix.
    fn request_location(&self);

    /// Start watching a circular region.
    fn start_monitoring_region(&self, region: CircularRegion);

    /// Stop watching the region with this identifier.
    fn stop_monitoring_region(&self, identifier: &str);

    /// Identifiers of every region currently watched.
    fn monitored_regions(&self) -> Vec<String>;
}

/// Everything the provider can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// A batch of location fixes, oldest first. Also used for significant
    /// location changes.
    Locations(Vec<LocationSample>),
    /// A coarse "user stayed somewhere" signal.
    Visit(LocationSample),
    /// The device crossed into a region.
    RegionEntered(GeofenceId),
    /// The device left a region.
    RegionExited(GeofenceId),
    /// Answer to a state query (or an unsolicited state refresh).
    RegionStateDetermined {
        /// Region the answer is about.
        region: GeofenceId,
        /// Determined position relative to the region.
        state: RegionState,
    },
    /// The provider began watching a region.
    MonitoringStarted(GeofenceId),
    /// The provider could not watch a region.
    MonitoringFailed {
        /// The region, when the provider names one.
        region: Option<GeofenceId>,
        /// Provider-supplied failure description.
        message: String,
    },
    /// The user changed the app's location permission.
    AuthorizationChanged(AuthorizationStatus),
    /// Getting the current location failed.
    LocationFailed(String),
    /// The provider paused continuous updates to save power.
    UpdatesPaused,
    /// Continuous updates resumed after a pause.
    UpdatesResumed,
    /// Deferred updates ended, optionally with an error description.
    DeferredUpdatesFinished(Option<String>),
}

/// In-process provider that records the commands it receives.
///
/// Useful for tests and simulations where no platform location stack exists.
#[derive(Debug)]
pub struct SimulatedProvider {
    available: AtomicBool,
    updating: AtomicBool,
    visits: AtomicBool,
    significant: AtomicBool,
    location_requests: AtomicUsize,
    distance_filter: Mutex<Option<f64>>,
    regions: Mutex<BTreeMap<String, CircularRegion>>,
}

impl SimulatedProvider {
    /// A provider that supports region monitoring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            updating: AtomicBool::new(false),
            visits: AtomicBool::new(false),
            significant: AtomicBool::new(false),
            location_requests: AtomicUsize::new(0),
            distance_filter: Mutex::new(None),
            regions: Mutex::new(BTreeMap::new()),
        }
    }

    /// A provider on a device without region monitoring.
    #[must_use]
    pub fn without_monitoring() -> Self {
        let provider = Self::new();
        provider.available.store(false, Ordering::Release);
        provider
    }

    /// Whether continuous updates are running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Whether visit monitoring is running.
    #[must_use]
    pub fn is_monitoring_visits(&self) -> bool {
        self.visits.load(Ordering::Acquire)
    }

    /// Whether significant-change monitoring is running.
    #[must_use]
    pub fn is_monitoring_significant_changes(&self) -> bool {
        self.significant.load(Ordering::Acquire)
    }

    /// How many one-shot location requests were made.
    #[must_use]
    pub fn location_requests(&self) -> usize {
        self.location_requests.load(Ordering::Acquire)
    }

    /// Last distance filter applied.
    #[must_use]
    pub fn distance_filter(&self) -> Option<f64> {
        self.distance_filter.lock().map(|d| *d).unwrap_or(None)
    }

    /// The watched region with this identifier.
    #[must_use]
    pub fn region(&self, identifier: &str) -> Option<CircularRegion> {
        self.regions
            .lock()
            .ok()
            .and_then(|r| r.get(identifier).cloned())
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationProvider for SimulatedProvider {
    fn is_monitoring_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    fn set_distance_filter(&self, meters: f64) {
        if let Ok(mut d) = self.distance_filter.lock() {
            *d = Some(meters);
        }
    }

    fn start_updating_location(&self) {
        self.updating.store(true, Ordering::Release);
    }

    fn stop_updating_location(&self) {
        self.updating.store(false, Ordering::Release);
    }

    fn start_monitoring_visits(&self) {
        self.visits.store(true, Ordering::Release);
    }

    fn stop_monitoring_visits(&self) {
        self.visits.store(false, Ordering::Release);
    }

    fn start_monitoring_significant_changes(&self) {
        self.significant.store(true, Ordering::Release);
    }

    fn stop_monitoring_significant_changes(&self) {
        self.significant.store(false, Ordering::Release);
    }

    fn request_location(&self) {
        self.location_requests.fetch_add(1, Ordering::AcqRel);
    }

    fn start_monitoring_region(&self, region: CircularRegion) {
        if let Ok(mut regions) = self.regions.lock() {
            regions.insert(region.identifier.clone(), region);
        }
    }

    fn stop_monitoring_region(&self, identifier: &str) {
        if let Ok(mut regions) = self.regions.lock() {
            regions.remove(identifier);
        }
    }

    fn monitored_regions(&self) -> Vec<String> {
        self.regions
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }
}
