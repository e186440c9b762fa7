//! Distance/time filtering of location samples.
//!
//! Only samples that moved far enough *and* arrived late enough after the last
//! forwarded one are worth telling the backend about. The very first sample is
//! always forwarded.

use std::time::Duration;

use crate::location::LocationSample;

/// Maximum number of samples retained by [`LocationHistory`].
pub const HISTORY_CAPACITY: usize = 2;

/// Decides whether `sample` should be forwarded given the retained `history`.
///
/// `history` is ordered oldest first; only its most recent entry is compared.
#[must_use]
pub fn accept(
    history: &[LocationSample],
    sample: &LocationSample,
    min_distance_m: f64,
    min_interval: Duration,
) -> bool {
    let Some(previous) = history.last() else {
        return true;
    };

    let distance = previous.coordinate.distance_to(&sample.coordinate);
    let moved = distance > min_distance_m;
    let waited = (sample.timestamp - previous.timestamp)
        .to_std()
        .is_ok_and(|elapsed| elapsed > min_interval);

    moved && waited
}

/// Rolling window of the most recently forwarded samples.
#[derive(Debug, Clone, Default)]
pub struct LocationHistory {
    samples: Vec<LocationSample>,
}

impl LocationHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs [`accept`] and retains the sample when it passes.
    ///
    /// A sample at exactly the same coordinate as the newest retained one is
    /// never stored twice.
    pub fn offer(&mut self, sample: LocationSample, min_distance_m: f64, min_interval: Duration) -> bool {
        if !accept(&self.samples, &sample, min_distance_m, min_interval) {
            return false;
        }

        let duplicate = self
            .samples
            .last()
            .is_some_and(|last| last.coordinate == sample.coordinate);
        if !duplicate {
            if self.samples.len() == HISTORY_CAPACITY {
                self.samples.remove(0);
            }
            self.samples.push(sample);
        }
        true
    }

    /// Retained samples, oldest first.
    #[must_use]
    pub fn samples(&self) -> &[LocationSample] {
        &self.samples
    }

    /// Forgets every retained sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
