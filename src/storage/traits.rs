//! Abstract storage trait for geofence state.
//!
//! The store holds the full known-geofence set plus each geofence's tracking
//! state. The set is only ever replaced wholesale; individual states are
//! updated in place when a transition is confirmed.

use crate::error::GeofenceResult;
use crate::geofence::{Geofence, GeofenceId, GeofenceState};

/// Storage contract for geofence state.
///
/// # Errors
/// Implementations report storage failures as `DiskRead`, `DiskWrite`,
/// `DiskRemove` or `DiskFilePath`, and never panic on bad data. Callers treat a
/// failed read as an empty store.
pub trait GeofenceStore: Send + Sync {
    /// Replace the whole set. Every geofence starts out never observed; ids not
    /// in `geofences` are dropped.
    ///
    /// # Errors
    /// `UnexpectedData` if `geofences` names an id twice; the stored set is
    /// left unchanged.
    fn replace_all(&self, geofences: Vec<Geofence>) -> GeofenceResult<()>;

    /// Get the state for one geofence.
    fn get(&self, id: &GeofenceId) -> GeofenceResult<Option<GeofenceState>>;

    /// Overwrite the state of an existing geofence.
    ///
    /// # Errors
    /// `UnknownRegion` if the id is not part of the current set.
    fn update(&self, state: GeofenceState) -> GeofenceResult<()>;

    /// Remove one geofence. Returns whether it existed.
    fn remove(&self, id: &GeofenceId) -> GeofenceResult<bool>;

    /// Every stored state, in no particular order.
    fn all(&self) -> GeofenceResult<Vec<GeofenceState>>;

    /// Ids of every stored geofence.
    fn ids(&self) -> GeofenceResult<Vec<GeofenceId>> {
        Ok(self.all()?.into_iter().map(|s| s.geofence.id).collect())
    }
}
