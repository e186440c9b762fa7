//! In-memory storage backend.
//!
//! Thread-safe, non-durable implementation of [`GeofenceStore`]. Intended for
//! embedded usage, tests, and as a reference implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{GeofenceError, GeofenceResult};
use crate::geofence::{ensure_unique_ids, Geofence, GeofenceId, GeofenceState};
use crate::storage::traits::GeofenceStore;

fn lock_err(context: &'static str) -> GeofenceError {
    GeofenceError::DiskRead {
        message: format!("poisoned lock: {context}"),
    }
}

/// In-memory [`GeofenceStore`].
#[derive(Debug, Default)]
pub struct InMemoryGeofenceStore {
    states: RwLock<HashMap<GeofenceId, GeofenceState>>,
}

impl InMemoryGeofenceStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeofenceStore for InMemoryGeofenceStore {
    fn replace_all(&self, geofences: Vec<Geofence>) -> GeofenceResult<()> {
        ensure_unique_ids(&geofences)?;
        let fresh: HashMap<GeofenceId, GeofenceState> = geofences
            .into_iter()
            .map(|g| (g.id.clone(), GeofenceState::new(g)))
            .collect();
        *self.states.write().map_err(|_| lock_err("geofences.replace_all"))? = fresh;
        Ok(())
    }

    fn get(&self, id: &GeofenceId) -> GeofenceResult<Option<GeofenceState>> {
        Ok(self
            .states
            .read()
            .map_err(|_| lock_err("geofences.get"))?
            .get(id)
            .cloned())
    }

    fn update(&self, state: GeofenceState) -> GeofenceResult<()> {
        let mut states = self.states.write().map_err(|_| lock_err("geofences.update"))?;
        match states.get_mut(state.id()) {
            Some(slot) => {
                *slot = state;
                Ok(())
            }
            None => Err(GeofenceError::UnknownRegion {
                id: state.id().clone(),
            }),
        }
    }

    fn remove(&self, id: &GeofenceId) -> GeofenceResult<bool> {
        Ok(self
            .states
            .write()
            .map_err(|_| lock_err("geofences.remove"))?
            .remove(id)
            .is_some())
    }

    fn all(&self) -> GeofenceResult<Vec<GeofenceState>> {
        Ok(self
            .states
            .read()
            .map_err(|_| lock_err("geofences.all"))?
            .values()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::RegionState;
    use chrono::Utc;

    fn fence(id: &str) -> Geofence {
        Geofence::new(id, 37.0, -122.0, 100.0).unwrap()
    }

    #[test]
    fn test_replace_all_then_all_is_same_set() {
        let store = InMemoryGeofenceStore::new();
        store.replace_all(vec![fence("1"), fence("2"), fence("3")]).unwrap();

        let mut ids: Vec<String> = store.all().unwrap().into_iter().map(|s| s.id().to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_replace_all_drops_previous_ids() {
        let store = InMemoryGeofenceStore::new();
        store.replace_all(vec![fence("1"), fence("2")]).unwrap();
        store.replace_all(vec![fence("3")]).unwrap();

        assert!(store.get(&GeofenceId::from("1")).unwrap().is_none());
        assert_eq!(store.ids().unwrap(), vec![GeofenceId::from("3")]);
    }

    #[test]
    fn test_replace_all_rejects_duplicate_ids() {
        let store = InMemoryGeofenceStore::new();
        store.replace_all(vec![fence("1")]).unwrap();

        let err = store.replace_all(vec![fence("2"), fence("2")]).unwrap_err();
        assert!(matches!(err, GeofenceError::UnexpectedData { .. }));
        assert_eq!(store.ids().unwrap(), vec![GeofenceId::from("1")]);
    }

    #[test]
    fn test_update_requires_known_id() {
        let store = InMemoryGeofenceStore::new();
        store.replace_all(vec![fence("1")]).unwrap();

        let mut state = store.get(&GeofenceId::from("1")).unwrap().unwrap();
        state.record_transition(RegionState::Inside, Utc::now());
        store.update(state).unwrap();
        assert_eq!(
            store.get(&GeofenceId::from("1")).unwrap().unwrap().last_known_state(),
            RegionState::Inside
        );

        let stranger = GeofenceState::new(fence("9"));
        let err = store.update(stranger).unwrap_err();
        assert!(matches!(err, GeofenceError::UnknownRegion { .. }));
    }

    #[test]
    fn test_remove() {
        let store = InMemoryGeofenceStore::new();
        store.replace_all(vec![fence("1")]).unwrap();
        assert!(store.remove(&GeofenceId::from("1")).unwrap());
        assert!(!store.remove(&GeofenceId::from("1")).unwrap());
        assert!(store.all().unwrap().is_empty());
    }
}
