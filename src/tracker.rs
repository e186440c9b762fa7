//! Transition tracking and de-duplication.
//!
//! Region callbacks arrive from several independent triggers (enter/exit,
//! explicit state determination, periodic refreshes) and frequently repeat
//! themselves. [`TransitionTracker::observe`] turns that noise into at most one
//! business event per real transition, re-arming for an unchanged state only
//! after the time filter has elapsed.
//!
//! # Decision
//!
//! ```text
//! observe(id, state)
//!   ├─ sink not initialized ─────────────▶ PreconditionFailed
//!   ├─ state == Unknown ─────────────────▶ UndeterminedState
//!   ├─ id not in store ──────────────────▶ UnknownRegion
//!   ├─ never observed / changed / stale ─▶ persist, sink, notify ─▶ Some(event)
//!   └─ otherwise ────────────────────────▶ None (suppressed)
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::DEFAULT_TIME_FILTER;
use crate::error::{GeofenceError, GeofenceResult, Precondition};
use crate::geofence::{GeofenceId, GeofenceState, RegionState, TransitionKind};
use crate::notify::{Notifier, TransitionEvent};
use crate::reporter::ErrorReporter;
use crate::sink::AnalyticsSink;
use crate::storage::GeofenceStore;

/// Decides whether a raw region-state observation is a transition.
pub struct TransitionTracker {
    store: Arc<dyn GeofenceStore>,
    sink: Arc<dyn AnalyticsSink>,
    reporter: Arc<dyn ErrorReporter>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    default_time_filter: Duration,
    // Serializes read-decide-write so two callbacks for one region cannot both fire.
    observe_lock: Mutex<()>,
}

impl TransitionTracker {
    /// Wires a tracker over its collaborators with the default time filter.
    #[must_use]
    pub fn new(
        store: Arc<dyn GeofenceStore>,
        sink: Arc<dyn AnalyticsSink>,
        reporter: Arc<dyn ErrorReporter>,
        notifier: Arc<Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            sink,
            reporter,
            notifier,
            clock,
            default_time_filter: DEFAULT_TIME_FILTER,
            observe_lock: Mutex::new(()),
        }
    }

    /// Time filter used by [`TransitionTracker::observe_now`].
    #[must_use]
    pub const fn with_time_filter(mut self, time_filter: Duration) -> Self {
        self.default_time_filter = time_filter;
        self
    }

    /// The notifier transitions are published to.
    #[must_use]
    pub const fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// The store transitions are persisted to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn GeofenceStore> {
        &self.store
    }

    fn fail<T>(&self, err: GeofenceError) -> GeofenceResult<T> {
        self.reporter.report(&err);
        Err(err)
    }

    /// Processes one region-state observation.
    ///
    /// Returns the emitted event, or `None` when the observation was a repeat
    /// inside the `time_filter` window. Every error is reported to the
    /// [`ErrorReporter`] before being returned.
    ///
    /// # Errors
    /// - `PreconditionFailed` if the analytics sink is not initialized
    /// - `UndeterminedState` if `observed` is [`RegionState::Unknown`]
    /// - `UnknownRegion` if `region_id` has no persisted state
    /// - `Disk*` if the store could not be read
    pub fn observe(
        &self,
        region_id: &GeofenceId,
        observed: RegionState,
        time_filter: Duration,
    ) -> GeofenceResult<Option<TransitionEvent>> {
        if !self.sink.is_initialized() {
            return self.fail(GeofenceError::PreconditionFailed(Precondition::SinkUninitialized));
        }

        // Undetermined reports never touch storage.
        let Some(kind) = TransitionKind::from_state(observed) else {
            return self.fail(GeofenceError::UndeterminedState {
                id: region_id.clone(),
            });
        };

        let _guard = self.observe_lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut state = match self.store.get(region_id) {
            Ok(Some(state)) => state,
            Ok(None) => {
                return self.fail(GeofenceError::UnknownRegion {
                    id: region_id.clone(),
                })
            }
            Err(err) => return self.fail(err),
        };

        let now = self.clock.now();
        if !state.should_fire(observed, now, time_filter) {
            tracing::debug!(
                region_id = %region_id,
                state = ?observed,
                last_transition_at = ?state.last_transition_at(),
                "suppressed repeated region state inside time filter"
            );
            return Ok(None);
        }

        state.record_transition(observed, now);
        let event = TransitionEvent::new(kind, state.geofence.clone(), now);

        // The transition happened even if its memo cannot be written.
        if let Err(err) = self.store.update(state) {
            self.reporter.report(&err);
        }

        self.sink.record_event(kind, &event.geofence);
        let delivered = self.notifier.publish(&event);
        tracing::debug!(region_id = %region_id, kind = %kind, delivered, "geofence transition recorded");

        Ok(Some(event))
    }

    /// [`TransitionTracker::observe`] with the configured time filter.
    ///
    /// # Errors
    /// Same as [`TransitionTracker::observe`].
    pub fn observe_now(
        &self,
        region_id: &GeofenceId,
        observed: RegionState,
    ) -> GeofenceResult<Option<TransitionEvent>> {
        self.observe(region_id, observed, self.default_time_filter)
    }

    /// Persisted state for one geofence, for diagnostics.
    ///
    /// # Errors
    /// `Disk*` if the store could not be read.
    pub fn state_of(&self, region_id: &GeofenceId) -> GeofenceResult<Option<GeofenceState>> {
        self.store.get(region_id)
    }
}

impl std::fmt::Debug for TransitionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionTracker")
            .field("default_time_filter", &self.default_time_filter)
            .field("subscribers", &self.notifier.subscriber_count())
            .finish_non_exhaustive()
    }
}
