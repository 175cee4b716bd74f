//! Clock utilities for recording timelines.
//!
//! Every recording is anchored to an epoch captured the moment navigation
//! starts. Elapsed milestones (first response, DOM-content-loaded, load)
//! are measured against the monotonic epoch; screencast frame offsets are
//! computed against the wall-clock epoch because the browser stamps frames
//! with epoch-seconds timestamps.

use std::time::Instant;

/// A recording clock anchored to a fixed start instant.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock milliseconds since the Unix epoch at start.
    epoch_wall_ms: i64,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Milliseconds elapsed since recording start.
    pub fn elapsed_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    /// Wall-clock milliseconds since the Unix epoch at recording start.
    pub fn epoch_wall_ms(&self) -> i64 {
        self.epoch_wall_ms
    }

    /// Offset of a protocol timestamp (epoch seconds) relative to start.
    ///
    /// Truncates to whole milliseconds before subtracting, matching how
    /// frame filenames and timeline entries are keyed.
    pub fn offset_from_epoch_secs(&self, timestamp_secs: f64) -> i64 {
        (timestamp_secs * 1000.0).floor() as i64 - self.epoch_wall_ms
    }

    /// The underlying epoch instant.
    pub fn epoch(&self) -> Instant {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed_is_small_at_start() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed_ms() < 1_000);
    }

    #[test]
    fn test_offset_from_epoch_secs_truncates_to_ms() {
        let clock = RecordingClock::start();
        let wall = clock.epoch_wall_ms();
        let ts = (wall as f64 + 1234.9) / 1000.0;
        assert_eq!(clock.offset_from_epoch_secs(ts), 1234);
    }
}
