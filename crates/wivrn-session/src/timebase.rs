//! Clock-offset estimation and tracking-poll pacing (SPEC_FULL.md §4.F).
//!
//! The headset stamps its own monotonic clock on every `Tracking` sample;
//! the server never assumes the two clocks agree and instead tracks a
//! running offset estimate with an exponential moving average, the same
//! smoothing shape the teacher's audio jitter buffer uses for its own
//! drift estimate.

use std::time::Duration;

/// Smoothing factor for the offset EWMA: `offset ← (1-α)·offset + α·sample`.
/// 1/64 follows the spec's damping guidance — fast enough to track real
/// drift, slow enough that one outlying sample can't swing the estimate.
const ALPHA: f64 = 1.0 / 64.0;

/// Tracks `headset_clock - server_clock`, smoothed over samples.
#[derive(Debug, Clone, Copy)]
pub struct ClockOffsetEstimator {
    offset_ns: Option<f64>,
}

impl ClockOffsetEstimator {
    pub fn new() -> Self {
        ClockOffsetEstimator { offset_ns: None }
    }

    /// Folds in one `(headset_now_ns, server_now_ns)` sample pair.
    pub fn observe(&mut self, headset_now_ns: i64, server_now_ns: i64) {
        let sample = (headset_now_ns - server_now_ns) as f64;
        self.offset_ns = Some(match self.offset_ns {
            Some(current) => (1.0 - ALPHA) * current + ALPHA * sample,
            None => sample,
        });
    }

    /// Converts a headset-clock timestamp to the server's clock, or passes
    /// it through unchanged until the first sample has been observed.
    pub fn to_server_clock(&self, headset_now_ns: i64) -> i64 {
        match self.offset_ns {
            Some(offset) => headset_now_ns - offset.round() as i64,
            None => headset_now_ns,
        }
    }

    pub fn current_offset_ns(&self) -> Option<i64> {
        self.offset_ns.map(|o| o.round() as i64)
    }
}

impl Default for ClockOffsetEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Produces the interval between tracking polls for a given headset-reported
/// refresh rate, clamped to a sane range in case a headset reports garbage.
#[derive(Debug, Clone, Copy)]
pub struct TrackingPacer {
    interval: Duration,
}

const MIN_RATE_HZ: f32 = 30.0;
const MAX_RATE_HZ: f32 = 1000.0;

impl TrackingPacer {
    pub fn from_rate_hz(rate_hz: f32) -> Self {
        let clamped = rate_hz.clamp(MIN_RATE_HZ, MAX_RATE_HZ);
        TrackingPacer {
            interval: Duration::from_secs_f64(1.0 / clamped as f64),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
