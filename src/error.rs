//! Error types for the geofence tracker.
//!
//! Every failure the tracker can observe is a variant of [`GeofenceError`].
//! None of them are fatal to the host process: each one is surfaced once to the
//! [`ErrorReporter`](crate::reporter::ErrorReporter) and the affected
//! operation (one transition, one push) is dropped.

use thiserror::Error;

use crate::geofence::GeofenceId;

/// Error domain forwarded to the analytics sink's error channel.
pub const ERROR_DOMAIN: &str = "GeofenceTracker";

/// Error code forwarded to the analytics sink's error channel.
pub const ERROR_CODE: i64 = 515;

/// Precondition that must hold before monitoring can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precondition {
    /// The analytics backend has not been initialized.
    SinkUninitialized,
    /// The platform cannot monitor circular regions.
    MonitoringUnsupported,
}

impl std::fmt::Display for Precondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SinkUninitialized => write!(f, "analytics sink is not initialized"),
            Self::MonitoringUnsupported => {
                write!(f, "device does not support location region monitoring")
            }
        }
    }
}

/// Coarse classification of a [`GeofenceError`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PreconditionFailed,
    UnexpectedData,
    UnknownRegion,
    UndeterminedState,
    DiskRead,
    DiskWrite,
    DiskRemove,
    DiskFilePath,
    PermissionDenied,
    PermissionRestricted,
    PermissionOnlyWhileUsing,
    PermissionUndetermined,
    PermissionReduced,
    PermissionUnknown,
    EmptyLocation,
    CurrentLocation,
    DeferredUpdates,
    CannotMonitor,
    ProviderUnavailable,
    InvalidConfig,
}

/// All errors raised by the geofence tracker.
#[derive(Debug, Error)]
pub enum GeofenceError {
    /// Monitoring cannot start.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(Precondition),

    /// Malformed geofence push payload or persisted record.
    #[error("Unexpected geofences data format: {reason}")]
    UnexpectedData {
        /// What was wrong with the data.
        reason: String,
    },

    /// A provider callback referenced a region with no persisted state.
    #[error("Unknown region: {id}")]
    UnknownRegion {
        /// The region identifier the provider reported.
        id: GeofenceId,
    },

    /// The provider could not determine the current region state.
    #[error("Could not determine region state for {id}")]
    UndeterminedState {
        /// The region identifier the provider reported.
        id: GeofenceId,
    },

    #[error("Could not read geofences data from disk: {message}")]
    /// The blob exists but cannot be read or decoded.
    DiskRead { message: String },

    #[error("Could not save geofences data to disk: {message}")]
    /// The new snapshot could not be written or renamed into place.
    DiskWrite { message: String },

    #[error("Could not remove stale geofences data from disk: {message}")]
    /// A file that should be gone could not be deleted.
    DiskRemove { message: String },

    #[error("Could not resolve geofences storage path: {message}")]
    /// The storage directory cannot be used.
    DiskFilePath { message: String },

    /// User refused location access.
    #[error("User denied location permission, cannot get location data")]
    PermissionDenied,

    /// Location access is restricted (e.g. parental controls).
    #[error("Access to location data is restricted")]
    PermissionRestricted,

    /// Location is only available while the app is in the foreground.
    #[error("User allowed location data only while the app is in use")]
    PermissionOnlyWhileUsing,

    /// The permission prompt has not been answered yet.
    #[error("Location permission not determined yet")]
    PermissionUndetermined,

    /// Only reduced (approximate) accuracy was granted.
    #[error("Only reduced accuracy location permission granted")]
    PermissionReduced,

    /// The provider reported a permission status this crate does not know.
    #[error("Unknown location permission status")]
    PermissionUnknown,

    /// A location batch arrived with no samples in it.
    #[error("Location update delivered no samples")]
    EmptyLocation,

    #[error("Error getting current location: {message}")]
    /// The provider failed to produce a location fix.
    CurrentLocation { message: String },

    #[error("Finished deferred location updates: {message}")]
    /// Deferred location updates ended, possibly with an error.
    DeferredUpdates { message: String },

    /// The provider refused to monitor a region.
    #[error("Could not start monitoring for region {region:?}: {message}")]
    CannotMonitor {
        /// The region, when the provider names one.
        region: Option<GeofenceId>,
        /// Provider-supplied failure description.
        message: String,
    },

    /// An operation needed the location provider while monitoring was stopped.
    #[error("Location provider is not available")]
    ProviderUnavailable,

    #[error("Invalid configuration: {reason}")]
    /// A configuration value is out of range or unparsable.
    InvalidConfig { reason: String },
}

impl GeofenceError {
    /// Creates an unexpected-data error.
    #[must_use]
    pub fn unexpected_data(reason: impl Into<String>) -> Self {
        Self::UnexpectedData {
            reason: reason.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::UnexpectedData { .. } => ErrorKind::UnexpectedData,
            Self::UnknownRegion { .. } => ErrorKind::UnknownRegion,
            Self::UndeterminedState { .. } => ErrorKind::UndeterminedState,
            Self::DiskRead { .. } => ErrorKind::DiskRead,
            Self::DiskWrite { .. } => ErrorKind::DiskWrite,
            Self::DiskRemove { .. } => ErrorKind::DiskRemove,
            Self::DiskFilePath { .. } => ErrorKind::DiskFilePath,
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::PermissionRestricted => ErrorKind::PermissionRestricted,
            Self::PermissionOnlyWhileUsing => ErrorKind::PermissionOnlyWhileUsing,
            Self::PermissionUndetermined => ErrorKind::PermissionUndetermined,
            Self::PermissionReduced => ErrorKind::PermissionReduced,
            Self::PermissionUnknown => ErrorKind::PermissionUnknown,
            Self::EmptyLocation => ErrorKind::EmptyLocation,
            Self::CurrentLocation { .. } => ErrorKind::CurrentLocation,
            Self::DeferredUpdates { .. } => ErrorKind::DeferredUpdates,
            Self::CannotMonitor { .. } => ErrorKind::CannotMonitor,
            Self::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// Returns true for the location-permission family.
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::PermissionRestricted
                | Self::PermissionOnlyWhileUsing
                | Self::PermissionUndetermined
                | Self::PermissionReduced
                | Self::PermissionUnknown
        )
    }

    /// Returns true for storage access failures.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::DiskRead { .. }
                | Self::DiskWrite { .. }
                | Self::DiskRemove { .. }
                | Self::DiskFilePath { .. }
        )
    }
}

/// Result type alias for geofence tracker operations.
pub type GeofenceResult<T> = Result<T, GeofenceError>;
