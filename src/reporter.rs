//! Error reporting.
//!
//! Errors are never thrown across component boundaries; they are handed to an
//! [`ErrorReporter`] exactly once, at the point where they are detected.

use std::sync::{Arc, Mutex};

use crate::error::{ErrorKind, GeofenceError, ERROR_CODE, ERROR_DOMAIN};
use crate::sink::AnalyticsSink;

/// Receives every error the tracker detects.
pub trait ErrorReporter: Send + Sync {
    /// Report one error.
    fn report(&self, error: &GeofenceError);
}

/// Logs the error and forwards it to the analytics sink's error channel.
///
/// When the sink is not initialized the error is only logged.
#[derive(Clone)]
pub struct SinkErrorReporter {
    sink: Arc<dyn AnalyticsSink>,
}

impl SinkErrorReporter {
    /// Reports through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AnalyticsSink>) -> Self {
        Self { sink }
    }
}

impl std::fmt::Debug for SinkErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkErrorReporter").finish_non_exhaustive()
    }
}

impl ErrorReporter for SinkErrorReporter {
    fn report(&self, error: &GeofenceError) {
        let message = error.to_string();
        tracing::error!(kind = ?error.kind(), "{message}");

        if self.sink.is_initialized() {
            self.sink.report_error(ERROR_DOMAIN, ERROR_CODE, &message);
        } else {
            tracing::error!("analytics sink is not initialized; error not forwarded");
        }
    }
}

/// Reporter that keeps every error it sees, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    kinds: Mutex<Vec<ErrorKind>>,
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    /// An empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kinds of every reported error.
    #[must_use]
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.kinds.lock().map(|k| k.clone()).unwrap_or_default()
    }

    /// Display strings of every reported error.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Forgets every recorded error.
    pub fn clear(&self) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.clear();
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &GeofenceError) {
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(error.kind());
        }
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(error.to_string());
        }
    }
}
