//! Outbound analytics sink.
//!
//! The analytics backend is the system of record for transitions, coarse
//! location and errors. Dispatch is fire-and-forget: the sink is expected to
//! buffer and retry on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::geofence::{Geofence, TransitionKind};

/// External analytics backend.
pub trait AnalyticsSink: Send + Sync {
    /// Whether the backend has been initialized and can accept calls.
    fn is_initialized(&self) -> bool;

    /// Records a geofence transition.
    fn record_event(&self, kind: TransitionKind, geofence: &Geofence);

    /// Reports the device's rough position for server-side geofence evaluation.
    fn report_coordinate(&self, latitude: f64, longitude: f64, plugin_version: &str);

    /// Reports an error on the backend's error channel.
    fn report_error(&self, domain: &str, code: i64, message: &str);
}

/// One call received by a [`RecordingSink`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkCall {
    Event {
        kind: TransitionKind,
        geofence: Geofence,
    },
    Coordinate {
        latitude: f64,
        longitude: f64,
        plugin_version: String,
    },
    Error {
        domain: String,
        code: i64,
        message: String,
    },
}

/// In-memory sink that records every call.
///
/// Intended for tests and for embedders that want to inspect what would have
/// been sent.
#[derive(Debug)]
pub struct RecordingSink {
    initialized: AtomicBool,
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    /// An initialized sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A sink that reports itself as not yet initialized.
    #[must_use]
    pub fn uninitialized() -> Self {
        let sink = Self::new();
        sink.set_initialized(false);
        sink
    }

    /// Flips the value returned by `is_initialized`.
    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Release);
    }

    fn push(&self, call: SinkCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    /// Every call received so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Recorded transitions.
    #[must_use]
    pub fn events(&self) -> Vec<(TransitionKind, Geofence)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Event { kind, geofence } => Some((kind, geofence)),
                _ => None,
            })
            .collect()
    }

    /// Reported coordinates as `(latitude, longitude)`.
    #[must_use]
    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Coordinate {
                    latitude, longitude, ..
                } => Some((latitude, longitude)),
                _ => None,
            })
            .collect()
    }

    /// Reported error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Forgets every recorded call.
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsSink for RecordingSink {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn record_event(&self, kind: TransitionKind, geofence: &Geofence) {
        self.push(SinkCall::Event {
            kind,
            geofence: geofence.clone(),
        });
    }

    fn report_coordinate(&self, latitude: f64, longitude: f64, plugin_version: &str) {
        self.push(SinkCall::Coordinate {
            latitude,
            longitude,
            plugin_version: plugin_version.to_string(),
        });
    }

    fn report_error(&self, domain: &str, code: i64, message: &str) {
        self.push(SinkCall::Error {
            domain: domain.to_string(),
            code,
            message: message.to_string(),
        });
    }
}
