//! Tracker configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GeofenceError, GeofenceResult};

/// Default minimum seconds between repeated transitions for one geofence.
pub const DEFAULT_TIME_FILTER: Duration = Duration::from_secs(1800);

/// Default minimum movement in meters before a location sample is forwarded.
pub const DEFAULT_DISTANCE_FILTER_M: f64 = 200.0;

/// Version string sent alongside reported coordinates.
pub const PLUGIN_VERSION: &str = "10006";

/// Configuration for the monitoring controller and transition tracker.
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Re-arm interval for repeated identical region states.
    #[serde(with = "secs")]
    pub time_filter: Duration,
    /// Minimum movement between forwarded location samples (meters). Also
    /// applied as the provider's distance filter.
    pub distance_filter_m: f64,
    /// Minimum time between forwarded location samples.
    #[serde(with = "secs")]
    pub location_interval: Duration,
    /// Directory holding the persisted geofence blob.
    pub storage_dir: Option<PathBuf>,
    /// Version string attached to coordinate reports.
    pub plugin_version: String,
    /// Per-subscriber notification buffer.
    pub subscription_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            time_filter: DEFAULT_TIME_FILTER,
            distance_filter_m: DEFAULT_DISTANCE_FILTER_M,
            location_interval: DEFAULT_TIME_FILTER,
            storage_dir: None,
            plugin_version: PLUGIN_VERSION.to_string(),
            subscription_capacity: 1024,
        }
    }
}

impl TrackerConfig {
    /// Checks the configuration, returning it unchanged when valid.
    ///
    /// # Errors
    /// `InvalidConfig` for a negative or non-finite distance filter, an empty
    /// plugin version, or a zero subscription capacity.
    pub fn validate(self) -> GeofenceResult<Self> {
        if !self.distance_filter_m.is_finite() || self.distance_filter_m < 0.0 {
            return Err(GeofenceError::InvalidConfig {
                reason: format!(
                    "distance_filter_m must be a non-negative number (got {})",
                    self.distance_filter_m
                ),
            });
        }
        if self.plugin_version.trim().is_empty() {
            return Err(GeofenceError::InvalidConfig {
                reason: "plugin_version cannot be empty".to_string(),
            });
        }
        if self.subscription_capacity == 0 {
            return Err(GeofenceError::InvalidConfig {
                reason: "subscription_capacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    /// `InvalidConfig` if the document is not valid JSON for this type or
    /// fails [`TrackerConfig::validate`].
    pub fn from_json(json: &str) -> GeofenceResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| GeofenceError::InvalidConfig {
            reason: format!("invalid configuration document: {e}"),
        })?;
        cfg.validate()
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
