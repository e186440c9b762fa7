//! Monitoring lifecycle and provider event dispatch.
//!
//! [`MonitoringController`] owns the connection to the location provider. It
//! registers pushed geofences as circular regions, funnels every provider
//! callback into the [`TransitionTracker`], forwards filtered coarse location to
//! the analytics sink, and turns permission changes into reported errors.
//!
//! All dispatch happens under one lock, so callbacks are handled one at a time
//! and [`MonitoringController::stop`] never races an in-flight callback.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Receiver;

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::{GeofenceError, GeofenceResult, Precondition};
use crate::filter::LocationHistory;
use crate::geofence::{
    ensure_unique_ids, parse_push, Geofence, GeofenceId, RegionState, TransitionKind,
};
use crate::location::LocationSample;
use crate::notify::{Notifier, Subscription, TransitionEvent};
use crate::provider::{AuthorizationStatus, CircularRegion, LocationProvider, ProviderEvent};
use crate::reporter::{ErrorReporter, SinkErrorReporter};
use crate::sink::AnalyticsSink;
use crate::storage::{open_store, GeofenceStore, InMemoryGeofenceStore};
use crate::tracker::TransitionTracker;

/// Lifecycle state of a [`MonitoringController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// No provider channels are running and callbacks are dropped.
    Stopped,
    /// Preconditions passed, provider channels are being started.
    Starting,
    /// Callbacks are dispatched.
    Running,
}

#[derive(Debug)]
struct Inner {
    state: MonitorState,
    history: LocationHistory,
}

/// Drives the location provider and dispatches its events.
pub struct MonitoringController {
    config: TrackerConfig,
    provider: Arc<dyn LocationProvider>,
    sink: Arc<dyn AnalyticsSink>,
    store: Arc<dyn GeofenceStore>,
    reporter: Arc<dyn ErrorReporter>,
    tracker: TransitionTracker,
    inner: Mutex<Inner>,
}

impl MonitoringController {
    /// Assembles a controller from explicit collaborators.
    #[must_use]
    pub fn new(
        config: TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        sink: Arc<dyn AnalyticsSink>,
        store: Arc<dyn GeofenceStore>,
        reporter: Arc<dyn ErrorReporter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notifier = Arc::new(Notifier::new(config.subscription_capacity));
        let tracker = TransitionTracker::new(
            Arc::clone(&store),
            Arc::clone(&sink),
            Arc::clone(&reporter),
            notifier,
            clock,
        )
        .with_time_filter(config.time_filter);

        Self {
            config,
            provider,
            sink,
            store,
            reporter,
            tracker,
            inner: Mutex::new(Inner {
                state: MonitorState::Stopped,
                history: LocationHistory::new(),
            }),
        }
    }

    /// Builds a controller with the default collaborators.
    ///
    /// Geofence state is kept in `config.storage_dir` when set, otherwise in
    /// memory. Errors go to the sink's error channel and time comes from the
    /// system clock.
    ///
    /// # Errors
    /// `InvalidConfig` if the configuration does not validate, `DiskFilePath`
    /// if the storage directory cannot be used, or `DiskRemove` if a stale
    /// temp file in it cannot be deleted. Storage errors are also reported.
    pub fn open(
        config: TrackerConfig,
        provider: Arc<dyn LocationProvider>,
        sink: Arc<dyn AnalyticsSink>,
    ) -> GeofenceResult<Self> {
        let config = config.validate()?;
        let reporter = Arc::new(SinkErrorReporter::new(Arc::clone(&sink)));
        let store: Arc<dyn GeofenceStore> = match &config.storage_dir {
            Some(dir) => match open_store(dir) {
                Ok(store) => Arc::new(store),
                Err(err) => {
                    reporter.report(&err);
                    return Err(err);
                }
            },
            None => Arc::new(InMemoryGeofenceStore::new()),
        };
        Ok(Self::new(config, provider, sink, store, reporter, Arc::new(SystemClock)))
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail<T>(&self, err: GeofenceError) -> GeofenceResult<T> {
        self.reporter.report(&err);
        Err(err)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> MonitorState {
        self.lock_inner().state
    }

    /// The validated configuration this controller runs with.
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The tracker callbacks are routed to.
    #[must_use]
    pub const fn tracker(&self) -> &TransitionTracker {
        &self.tracker
    }

    /// The notifier local observers subscribe through.
    #[must_use]
    pub const fn notifier(&self) -> &Arc<Notifier> {
        self.tracker.notifier()
    }

    /// Registers a local observer for the given transition kinds (empty means
    /// both). Every observer is removed by [`MonitoringController::stop`].
    #[must_use]
    pub fn subscribe(&self, kinds: &[TransitionKind]) -> Subscription {
        self.tracker.notifier().subscribe(kinds)
    }

    /// Starts monitoring.
    ///
    /// Applies the distance filter and starts continuous updates, visit
    /// monitoring and significant-change monitoring. Persisted geofences the
    /// provider is not already watching are registered again. Calling `start`
    /// while running re-applies the provider settings.
    ///
    /// # Errors
    /// `PreconditionFailed` if the sink is not initialized or the provider
    /// cannot monitor regions. The error is also reported.
    pub fn start(&self) -> GeofenceResult<()> {
        let mut inner = self.lock_inner();

        if !self.sink.is_initialized() {
            return self.fail(GeofenceError::PreconditionFailed(Precondition::SinkUninitialized));
        }
        if !self.provider.is_monitoring_available() {
            return self.fail(GeofenceError::PreconditionFailed(
                Precondition::MonitoringUnsupported,
            ));
        }

        let was_running = inner.state == MonitorState::Running;
        inner.state = MonitorState::Starting;

        self.provider.set_distance_filter(self.config.distance_filter_m);
        self.provider.start_updating_location();
        self.provider.start_monitoring_visits();
        self.provider.start_monitoring_significant_changes();
        let restored = self.restore_regions();

        inner.state = MonitorState::Running;
        tracing::info!(
            distance_filter_m = self.config.distance_filter_m,
            restored,
            was_running,
            "geofence monitoring started"
        );
        Ok(())
    }

    fn restore_regions(&self) -> usize {
        let states = match self.store.all() {
            Ok(states) => states,
            Err(err) => {
                self.reporter.report(&err);
                return 0;
            }
        };

        let monitored: HashSet<String> = self.provider.monitored_regions().into_iter().collect();
        let mut restored = 0;
        for state in states {
            if !monitored.contains(state.id().as_str()) {
                self.provider
                    .start_monitoring_region(CircularRegion::from(&state.geofence));
                restored += 1;
            }
        }
        restored
    }

    /// Stops monitoring. Idempotent.
    ///
    /// Callbacks are cut off first, then every monitored region is released,
    /// the provider channels are stopped, local observers are removed and the
    /// location history is cleared.
    pub fn stop(&self) {
        let mut inner = self.lock_inner();
        if inner.state == MonitorState::Stopped {
            tracing::debug!("stop requested while already stopped");
            return;
        }
        inner.state = MonitorState::Stopped;

        let regions = self.provider.monitored_regions();
        for identifier in &regions {
            self.provider.stop_monitoring_region(identifier);
        }
        self.provider.stop_updating_location();
        self.provider.stop_monitoring_visits();
        self.provider.stop_monitoring_significant_changes();
        self.tracker.notifier().unsubscribe_all();
        inner.history.clear();

        tracing::info!(released_regions = regions.len(), "geofence monitoring stopped");
    }

    /// Handles a raw geofence list pushed by the backend.
    ///
    /// The whole payload is parsed before anything changes, so a malformed
    /// entry leaves the registered regions and the store untouched.
    ///
    /// # Errors
    /// `UnexpectedData` for a malformed payload, otherwise see
    /// [`MonitoringController::on_geofences`]. Errors are also reported.
    pub fn on_geofence_list_pushed(&self, payload: &serde_json::Value) -> GeofenceResult<()> {
        match parse_push(payload) {
            Ok(geofences) => self.on_geofences(geofences),
            Err(err) => self.fail(err),
        }
    }

    /// Replaces the monitored geofence set.
    ///
    /// Regions of the previous set are released, the store is replaced
    /// wholesale, and one circular region is registered per geofence. When the
    /// previous set cannot be read every monitored region is released.
    ///
    /// # Errors
    /// - `UnexpectedData` if an id appears twice; nothing changes then
    /// - `ProviderUnavailable` if monitoring is not running
    /// - `Disk*` if the new set cannot be persisted; nothing is registered then
    pub fn on_geofences(&self, geofences: Vec<Geofence>) -> GeofenceResult<()> {
        if let Err(err) = ensure_unique_ids(&geofences) {
            return self.fail(err);
        }

        let inner = self.lock_inner();
        if inner.state != MonitorState::Running {
            tracing::info!(count = geofences.len(), "geofence push ignored while not running");
            return self.fail(GeofenceError::ProviderUnavailable);
        }

        let previous: Option<HashSet<GeofenceId>> = match self.store.ids() {
            Ok(ids) => Some(ids.into_iter().collect()),
            Err(err) => {
                self.reporter.report(&err);
                tracing::warn!("previous geofence set unreadable; releasing every monitored region");
                None
            }
        };

        let mut released = 0;
        for identifier in self.provider.monitored_regions() {
            let owned = match &previous {
                Some(ids) => ids.contains(&GeofenceId::new(identifier.as_str())),
                None => true,
            };
            if owned {
                self.provider.stop_monitoring_region(&identifier);
                released += 1;
            }
        }

        let regions: Vec<CircularRegion> = geofences.iter().map(CircularRegion::from).collect();
        if let Err(err) = self.store.replace_all(geofences) {
            return self.fail(err);
        }
        let registered = regions.len();
        for region in regions {
            self.provider.start_monitoring_region(region);
        }

        tracing::info!(released, registered, "geofence set replaced");
        drop(inner);
        Ok(())
    }

    /// Routes a region-state report to the tracker with the configured time
    /// filter. Reports arriving while not running are dropped (`Ok(None)`).
    ///
    /// # Errors
    /// See [`TransitionTracker::observe`].
    pub fn on_raw_region_state_report(
        &self,
        region_id: &GeofenceId,
        state: RegionState,
    ) -> GeofenceResult<Option<TransitionEvent>> {
        let inner = self.lock_inner();
        if inner.state != MonitorState::Running {
            tracing::debug!(region_id = %region_id, ?state, "region report dropped while not running");
            return Ok(None);
        }
        self.tracker.observe(region_id, state, self.config.time_filter)
    }

    /// Filters a location sample and forwards it to the sink when it passes.
    ///
    /// Returns whether the coordinate was forwarded. Samples arriving while not
    /// running are dropped.
    pub fn on_location_sample(&self, sample: LocationSample) -> bool {
        let mut inner = self.lock_inner();
        if inner.state != MonitorState::Running {
            tracing::debug!("location sample dropped while not running");
            return false;
        }
        self.forward_sample(&mut inner, sample)
    }

    fn forward_sample(&self, inner: &mut Inner, sample: LocationSample) -> bool {
        let coordinate = sample.coordinate;
        let accepted = inner.history.offer(
            sample,
            self.config.distance_filter_m,
            self.config.location_interval,
        );
        if accepted {
            self.sink.report_coordinate(
                coordinate.latitude,
                coordinate.longitude,
                &self.config.plugin_version,
            );
        }
        accepted
    }

    fn region_report(&self, region: &GeofenceId, state: RegionState) {
        // Errors were already reported by the tracker.
        let _ = self.tracker.observe(region, state, self.config.time_filter);
    }

    /// Dispatches one provider event. Events arriving while not running are
    /// dropped.
    pub fn handle_event(&self, event: ProviderEvent) {
        let mut inner = self.lock_inner();
        if inner.state != MonitorState::Running {
            tracing::debug!(?event, "provider event dropped while not running");
            return;
        }

        match event {
            ProviderEvent::Locations(mut samples) => match samples.pop() {
                Some(latest) => {
                    self.forward_sample(&mut inner, latest);
                }
                None => self.reporter.report(&GeofenceError::EmptyLocation),
            },
            ProviderEvent::Visit(sample) => {
                self.forward_sample(&mut inner, sample);
            }
            ProviderEvent::RegionEntered(region) => self.region_report(&region, RegionState::Inside),
            ProviderEvent::RegionExited(region) => self.region_report(&region, RegionState::Outside),
            ProviderEvent::RegionStateDetermined { region, state } => {
                self.region_report(&region, state);
            }
            ProviderEvent::MonitoringStarted(region) => {
                tracing::debug!(region_id = %region, "provider started monitoring region");
            }
            ProviderEvent::MonitoringFailed { region, message } => {
                self.reporter
                    .report(&GeofenceError::CannotMonitor { region, message });
            }
            ProviderEvent::AuthorizationChanged(status) => self.authorization_changed(status),
            ProviderEvent::LocationFailed(message) => {
                self.reporter
                    .report(&GeofenceError::CurrentLocation { message });
            }
            ProviderEvent::UpdatesPaused => self.provider.request_location(),
            ProviderEvent::UpdatesResumed => self.provider.start_updating_location(),
            ProviderEvent::DeferredUpdatesFinished(message) => {
                self.provider.request_location();
                self.reporter.report(&GeofenceError::DeferredUpdates {
                    message: message.unwrap_or_else(|| "no error description".to_string()),
                });
            }
        }
    }

    fn authorization_changed(&self, status: AuthorizationStatus) {
        tracing::debug!(?status, "location authorization changed");
        let err = match status {
            AuthorizationStatus::Always => {
                self.provider.start_updating_location();
                return;
            }
            AuthorizationStatus::WhenInUse => {
                self.provider.start_updating_location();
                GeofenceError::PermissionOnlyWhileUsing
            }
            AuthorizationStatus::Denied => GeofenceError::PermissionDenied,
            AuthorizationStatus::Restricted => GeofenceError::PermissionRestricted,
            AuthorizationStatus::NotDetermined => GeofenceError::PermissionUndetermined,
            AuthorizationStatus::ReducedAccuracy => GeofenceError::PermissionReduced,
            AuthorizationStatus::Unknown => GeofenceError::PermissionUnknown,
        };
        self.reporter.report(&err);
    }

    /// Drains `events` on the calling thread until every sender is gone.
    ///
    /// Returns the number of events handled.
    pub fn run(&self, events: &Receiver<ProviderEvent>) -> usize {
        let mut handled = 0;
        for event in events {
            self.handle_event(event);
            handled += 1;
        }
        tracing::debug!(handled, "provider event queue closed");
        handled
    }
}

impl std::fmt::Debug for MonitoringController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
