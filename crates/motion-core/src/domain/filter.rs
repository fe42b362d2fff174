//! One Euro low-pass filtering of pointer coordinates.
//!
//! The One Euro filter is an exponential smoother whose cutoff frequency rises
//! with the pointer's speed: slow movements are smoothed heavily (less jitter),
//! fast movements barely at all (less lag).  See Casiez, Roussel and Vogel,
//! "1€ Filter" (CHI 2012).

use serde::{Deserialize, Serialize};

use crate::domain::motion::{AxisId, Nanos, PointerCoords};

const NANOS_PER_SECOND: f64 = 1e9;

/// Cutoff used to smooth the speed estimate itself.
pub const SPEED_CUTOFF_FREQ: f64 = 1.0;

/// Tuning for the coordinate filter, read from the `[filter]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Wraps the resampler in a [`crate::FilteredResampler`] when `true`.
    #[serde(default)]
    pub enabled: bool,
    /// Minimum cutoff frequency in Hz, used when the pointer is still.
    #[serde(default = "default_min_cutoff_freq")]
    pub min_cutoff_freq: f64,
    /// Speed coefficient in 1 / (position unit).
    #[serde(default = "default_beta")]
    pub beta: f64,
}

fn default_min_cutoff_freq() -> f64 {
    4.7
}

fn default_beta() -> f64 {
    0.01
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_cutoff_freq: default_min_cutoff_freq(),
            beta: default_beta(),
        }
    }
}

// ── Scalar filter ─────────────────────────────────────────────────────────────

/// Filters one scalar position over time.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff_freq: f64,
    beta: f64,
    speed_cutoff_freq: f64,
    prev_timestamp: Option<Nanos>,
    prev_filtered_velocity: Option<f64>,
    prev_filtered_position: Option<f64>,
}

/// `c / (c + 1)` with `c = 2π · period · cutoff`.
fn smoothing_factor(period_ns: f64, cutoff_hz: f64) -> f64 {
    let constant = 2.0 * std::f64::consts::PI * (period_ns / NANOS_PER_SECOND) * cutoff_hz;
    constant / (constant + 1.0)
}

fn low_pass(raw: f64, prev_filtered: f64, smoothing: f64) -> f64 {
    smoothing * raw + (1.0 - smoothing) * prev_filtered
}

impl OneEuroFilter {
    pub fn new(min_cutoff_freq: f64, beta: f64) -> Self {
        Self::with_speed_cutoff(min_cutoff_freq, beta, SPEED_CUTOFF_FREQ)
    }

    pub fn with_speed_cutoff(min_cutoff_freq: f64, beta: f64, speed_cutoff_freq: f64) -> Self {
        Self {
            min_cutoff_freq,
            beta,
            speed_cutoff_freq,
            prev_timestamp: None,
            prev_filtered_velocity: None,
            prev_filtered_position: None,
        }
    }

    /// Filters `raw` observed at `timestamp`.
    ///
    /// Returns `None`, leaving the state untouched, when `timestamp` is not
    /// strictly after the previous one or the gap does not fit in [`Nanos`].  The first sample passes through
    /// unchanged and is treated as one second after an imaginary predecessor.
    pub fn filter(&mut self, timestamp: Nanos, raw: f64) -> Option<f64> {
        let period_ns = match self.prev_timestamp {
            Some(prev) if timestamp <= prev => return None,
            Some(prev) => timestamp.checked_sub(prev)? as f64,
            None => NANOS_PER_SECOND,
        };

        // Units: position per nanosecond.
        let raw_velocity = self
            .prev_filtered_position
            .map_or(0.0, |prev| (raw - prev) / period_ns);

        let speed_smoothing = smoothing_factor(period_ns, self.speed_cutoff_freq);
        let filtered_velocity = self
            .prev_filtered_velocity
            .map_or(raw_velocity, |prev| low_pass(raw_velocity, prev, speed_smoothing));

        // beta is per position unit; speed is converted to position per second.
        let cutoff = self.min_cutoff_freq + self.beta * (filtered_velocity * NANOS_PER_SECOND).abs();
        let position_smoothing = smoothing_factor(period_ns, cutoff);
        let filtered_position = self
            .prev_filtered_position
            .map_or(raw, |prev| low_pass(raw, prev, position_smoothing));

        self.prev_timestamp = Some(timestamp);
        self.prev_filtered_velocity = Some(filtered_velocity);
        self.prev_filtered_position = Some(filtered_position);
        Some(filtered_position)
    }
}

// ── Coordinate filter ─────────────────────────────────────────────────────────

/// Applies independent One Euro filters to the X and Y axes of one pointer.
#[derive(Debug, Clone)]
pub struct CoordinateFilter {
    x: OneEuroFilter,
    y: OneEuroFilter,
}

impl CoordinateFilter {
    pub fn new(min_cutoff_freq: f64, beta: f64) -> Self {
        Self {
            x: OneEuroFilter::new(min_cutoff_freq, beta),
            y: OneEuroFilter::new(min_cutoff_freq, beta),
        }
    }

    /// Replaces X and Y of `coords` with their filtered values.
    ///
    /// Returns `false` and leaves `coords` untouched when `timestamp` does not
    /// advance past the previous filtered sample.
    pub fn filter(&mut self, timestamp: Nanos, coords: &mut PointerCoords) -> bool {
        let (Some(x), Some(y)) = (
            self.x.filter(timestamp, f64::from(coords.x())),
            self.y.filter(timestamp, f64::from(coords.y())),
        ) else {
            return false;
        };
        coords.set_axis(AxisId::X, x as f32);
        coords.set_axis(AxisId::Y, y as f32);
        true
    }
}
