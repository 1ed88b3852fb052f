//! Recording clock shared by the capture stream and the event stream.
//!
//! The media recorder and the pointer listener run on independent clocks.
//! Both are reconciled by anchoring every sample to a single epoch taken
//! when the recorder starts:
//! - zoom effect timestamps are `sample instant - epoch`
//! - the recorder's own start latency is measured against the same epoch
//!
//! The clock is built on `tokio::time::Instant` so a paused test runtime
//! drives it deterministically.

use tokio::time::Instant;

/// A recording clock that provides monotonic timestamps relative to
/// a fixed epoch (the moment recording started).
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339).
    epoch_wall: String,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a clock from a known epoch.
    pub fn from_epoch(epoch: Instant, wall: String) -> Self {
        Self {
            epoch,
            epoch_wall: wall,
        }
    }

    /// Milliseconds between the epoch and `instant`.
    ///
    /// Instants sampled before the epoch saturate to zero.
    pub fn elapsed_ms_at(&self, instant: Instant) -> u64 {
        instant.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Milliseconds elapsed since recording start.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms_at(Instant::now())
    }

    /// Seconds elapsed since recording start.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

/// Offset between two streams that share one epoch.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Start offset of the reference stream (ms since epoch).
    pub reference_ms: u64,
    /// Start offset of the measured stream (ms since epoch).
    pub measured_ms: u64,
}

impl DriftMeasurement {
    /// Drift in milliseconds (positive = measured started later).
    pub fn drift_ms(&self) -> i64 {
        self.measured_ms as i64 - self.reference_ms as i64
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: u64) -> bool {
        self.drift_ms().unsigned_abs() > threshold_ms
    }
}
