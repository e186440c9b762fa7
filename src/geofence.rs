//! Geofence records and their persisted tracking state.
//!
//! A [`Geofence`] is what the backend pushes: a circular region with an
//! identifier. A [`GeofenceState`] wraps it with the last region state the
//! tracker acted on, and is the unit the store persists.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{GeofenceError, GeofenceResult};
use crate::location::Coordinate;

/// Backend-assigned geofence identifier.
///
/// Push payloads carry integer ids; the provider-level region identifier is
/// always the string form, so both normalize to a string here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(String);

impl GeofenceId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as registered with the location provider.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GeofenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GeofenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for GeofenceId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

/// A circular region monitored for entry and exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    /// Backend-assigned identifier.
    pub id: GeofenceId,
    /// Center latitude in degrees.
    pub latitude: f64,
    /// Center longitude in degrees.
    pub longitude: f64,
    /// Radius in meters.
    pub radius: f64,
}

impl Geofence {
    /// Creates a validated geofence.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedData` when the id is empty, the center is not a valid
    /// coordinate, or the radius is not a positive finite number.
    pub fn new(
        id: impl Into<GeofenceId>,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> GeofenceResult<Self> {
        let id = id.into();
        if id.as_str().trim().is_empty() {
            return Err(GeofenceError::unexpected_data("geofence id cannot be empty"));
        }
        Coordinate::new(latitude, longitude)?;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(GeofenceError::unexpected_data(format!(
                "geofence {id} has invalid radius {radius}"
            )));
        }

        Ok(Self {
            id,
            latitude,
            longitude,
            radius,
        })
    }

    /// Center of the region.
    #[must_use]
    pub const fn center(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// Parses one entry of a geofence push (`{"id", "lat", "lng", "r"}`).
    ///
    /// `radius` is accepted in place of `r`. Integer and string ids are both
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedData` naming the first missing or malformed field.
    pub fn from_push_entry(entry: &JsonValue) -> GeofenceResult<Self> {
        let obj = entry
            .as_object()
            .ok_or_else(|| GeofenceError::unexpected_data("geofence entry is not an object"))?;

        let id = match obj.get("id") {
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .map(GeofenceId::from)
                .or_else(|| n.as_u64().map(|v| GeofenceId::new(v.to_string())))
                .ok_or_else(|| {
                    GeofenceError::unexpected_data(format!("geofence id {n} is not an integer"))
                })?,
            Some(JsonValue::String(s)) => GeofenceId::new(s.clone()),
            Some(other) => {
                return Err(GeofenceError::unexpected_data(format!(
                    "geofence id has unsupported type: {other}"
                )))
            }
            None => return Err(GeofenceError::unexpected_data("geofence entry is missing 'id'")),
        };

        let number = |keys: &[&str]| -> GeofenceResult<f64> {
            let value = keys.iter().find_map(|k| obj.get(*k));
            match value {
                Some(v) => v.as_f64().ok_or_else(|| {
                    GeofenceError::unexpected_data(format!(
                        "geofence {id} field '{}' is not a number",
                        keys[0]
                    ))
                }),
                None => Err(GeofenceError::unexpected_data(format!(
                    "geofence {id} is missing '{}'",
                    keys[0]
                ))),
            }
        };

        let latitude = number(&["lat"])?;
        let longitude = number(&["lng"])?;
        let radius = number(&["r", "radius"])?;

        Self::new(id, latitude, longitude, radius)
    }
}

/// Parses a full geofence push.
///
/// The payload is either the array of entries itself or an object carrying it
/// under `"geofences"`. Parsing is all-or-nothing: one malformed entry rejects
/// the whole push so that the caller can leave the previous set untouched.
///
/// # Errors
///
/// Returns `UnexpectedData` for a malformed payload, a malformed entry, or a
/// duplicated id.
pub fn parse_push(payload: &JsonValue) -> GeofenceResult<Vec<Geofence>> {
    let entries = match payload {
        JsonValue::Array(entries) => entries,
        JsonValue::Object(obj) => obj
            .get("geofences")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| GeofenceError::unexpected_data("push is missing a 'geofences' array"))?,
        other => {
            return Err(GeofenceError::unexpected_data(format!(
                "push payload must be an array or object, got {other}"
            )))
        }
    };

    let out = entries
        .iter()
        .map(Geofence::from_push_entry)
        .collect::<GeofenceResult<Vec<_>>>()?;
    ensure_unique_ids(&out)?;
    Ok(out)
}

/// Rejects a geofence set that names the same id twice.
///
/// # Errors
///
/// Returns `UnexpectedData` naming the first repeated id.
pub fn ensure_unique_ids(geofences: &[Geofence]) -> GeofenceResult<()> {
    let mut seen = HashSet::with_capacity(geofences.len());
    for geofence in geofences {
        if !seen.insert(&geofence.id) {
            return Err(GeofenceError::unexpected_data(format!(
                "duplicate geofence id {}",
                geofence.id
            )));
        }
    }
    Ok(())
}

/// Position relative to a geofence, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionState {
    /// Inside the region.
    Inside,
    /// Outside the region.
    Outside,
    /// The provider could not tell.
    Unknown,
}

/// Business-level transition emitted for a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// The device entered the region.
    Entered,
    /// The device left the region.
    Exited,
}

impl TransitionKind {
    /// Maps an observed state to the transition it represents.
    #[must_use]
    pub const fn from_state(state: RegionState) -> Option<Self> {
        match state {
            RegionState::Inside => Some(Self::Entered),
            RegionState::Outside => Some(Self::Exited),
            RegionState::Unknown => None,
        }
    }

    /// Name of the local notification published for this transition.
    #[must_use]
    pub const fn notification_name(self) -> &'static str {
        match self {
            Self::Entered => "GeofenceEntered",
            Self::Exited => "GeofenceExited",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.notification_name())
    }
}

/// Persisted tracking state for one geofence.
///
/// `last_known_state` and `last_transition_at` only change together, through
/// [`GeofenceState::record_transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceState {
    /// The geofence this state tracks.
    pub geofence: Geofence,
    last_known_state: RegionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_transition_at: Option<DateTime<Utc>>,
}

impl GeofenceState {
    /// Fresh state for a newly registered geofence: never observed.
    #[must_use]
    pub const fn new(geofence: Geofence) -> Self {
        Self {
            geofence,
            last_known_state: RegionState::Unknown,
            last_transition_at: None,
        }
    }

    /// The geofence id.
    #[must_use]
    pub const fn id(&self) -> &GeofenceId {
        &self.geofence.id
    }

    /// Last state a transition was recorded for.
    #[must_use]
    pub const fn last_known_state(&self) -> RegionState {
        self.last_known_state
    }

    /// When the last transition was recorded, if ever.
    #[must_use]
    pub const fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        self.last_transition_at
    }

    /// Whether observing `observed` at `now` is a business-meaningful transition.
    ///
    /// Fires on the first observation ever, on a change of state, and on a
    /// repeat of the same state once more than `time_filter` has elapsed since
    /// the last recorded transition. A clock that went backwards never re-arms.
    #[must_use]
    pub fn should_fire(&self, observed: RegionState, now: DateTime<Utc>, time_filter: Duration) -> bool {
        let Some(last) = self.last_transition_at else {
            return true;
        };
        if observed != self.last_known_state {
            return true;
        }
        (now - last).to_std().is_ok_and(|elapsed| elapsed > time_filter)
    }

    /// Records a confirmed transition.
    pub fn record_transition(&mut self, state: RegionState, at: DateTime<Utc>) {
        self.last_known_state = state;
        self.last_transition_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    #[test]
    fn test_push_entry_parses_integer_id() {
        let g = Geofence::from_push_entry(&json!({"id": 42, "lat": 37.0, "lng": -122.0, "r": 100}))
            .unwrap();
        assert_eq!(g.id, GeofenceId::from("42"));
        assert_eq!(g.radius, 100.0);
        assert_eq!(g.center(), Coordinate { latitude: 37.0, longitude: -122.0 });
    }

    #[test]
    fn test_push_entry_accepts_radius_alias_and_string_id() {
        let g = Geofence::from_push_entry(&json!({"id": "home", "lat": 1.0, "lng": 2.0, "radius": 50.5}))
            .unwrap();
        assert_eq!(g.id.as_str(), "home");
        assert_eq!(g.radius, 50.5);
    }

    #[test]
    fn test_push_entry_missing_radius_is_unexpected_data() {
        let err = Geofence::from_push_entry(&json!({"id": 1, "lat": 1.0, "lng": 2.0})).unwrap_err();
        assert!(matches!(err, GeofenceError::UnexpectedData { .. }));
        assert!(err.to_string().contains("'r'"));
    }

    #[test]
    fn test_push_entry_rejects_bad_values() {
        assert!(Geofence::from_push_entry(&json!({"id": 1, "lat": 91.0, "lng": 2.0, "r": 5})).is_err());
        assert!(Geofence::from_push_entry(&json!({"id": 1, "lat": 1.0, "lng": 2.0, "r": 0})).is_err());
        assert!(Geofence::from_push_entry(&json!({"id": 1.5, "lat": 1.0, "lng": 2.0, "r": 5})).is_err());
        assert!(Geofence::from_push_entry(&json!({"id": "", "lat": 1.0, "lng": 2.0, "r": 5})).is_err());
        assert!(Geofence::from_push_entry(&json!({"id": 1, "lat": "x", "lng": 2.0, "r": 5})).is_err());
        assert!(Geofence::from_push_entry(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_parse_push_accepts_wrapped_list() {
        let push = json!({"geofences": [
            {"id": 1, "lat": 1.0, "lng": 2.0, "r": 5},
            {"id": 2, "lat": 3.0, "lng": 4.0, "r": 6},
        ]});
        let list = parse_push(&push).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].id.as_str(), "2");
    }

    #[test]
    fn test_parse_push_rejects_duplicates_and_bad_shapes() {
        let dup = json!([
            {"id": 1, "lat": 1.0, "lng": 2.0, "r": 5},
            {"id": 1, "lat": 3.0, "lng": 4.0, "r": 6},
        ]);
        assert!(parse_push(&dup).is_err());
        assert!(parse_push(&json!({"other": []})).is_err());
        assert!(parse_push(&json!("nope")).is_err());
        assert!(parse_push(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn test_transition_kind_mapping() {
        assert_eq!(TransitionKind::from_state(RegionState::Inside), Some(TransitionKind::Entered));
        assert_eq!(TransitionKind::from_state(RegionState::Outside), Some(TransitionKind::Exited));
        assert_eq!(TransitionKind::from_state(RegionState::Unknown), None);
        assert_eq!(TransitionKind::Entered.notification_name(), "GeofenceEntered");
        assert_eq!(TransitionKind::Exited.notification_name(), "GeofenceExited");
    }

    #[test]
    fn test_should_fire_rules() {
        let geofence = Geofence::new("42", 37.0, -122.0, 100.0).unwrap();
        let mut state = GeofenceState::new(geofence);
        let t0 = Utc::now();
        let filter = Duration::from_secs(1800);

        // Never observed: always fires, even for the stored default state.
        assert!(state.should_fire(RegionState::Inside, t0, filter));

        state.record_transition(RegionState::Inside, t0);
        assert!(!state.should_fire(RegionState::Inside, t0 + ChronoDuration::seconds(10), filter));
        assert!(!state.should_fire(RegionState::Inside, t0 + ChronoDuration::seconds(1800), filter));
        assert!(state.should_fire(RegionState::Inside, t0 + ChronoDuration::seconds(1801), filter));
        assert!(state.should_fire(RegionState::Outside, t0 + ChronoDuration::seconds(1), filter));
        assert!(!state.should_fire(RegionState::Inside, t0 - ChronoDuration::seconds(5000), filter));
    }

    #[test]
    fn test_state_serde_roundtrip_keeps_pair() {
        let geofence = Geofence::new("7", 1.0, 2.0, 3.0).unwrap();
        let mut state = GeofenceState::new(geofence);
        let at = Utc::now();
        state.record_transition(RegionState::Outside, at);

        let json = serde_json::to_string(&state).unwrap();
        let back: GeofenceState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_known_state(), RegionState::Outside);
        assert_eq!(back.last_transition_at(), Some(at));
        assert_eq!(back, state);
    }
}
