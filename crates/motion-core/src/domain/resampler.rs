//! Temporal resampling of motion events at frame deadlines.
//!
//! # Why resample? (for beginners)
//!
//! A producer that samples at 200 Hz and a consumer that renders at 60 Hz
//! rarely agree on *when* a position was valid.  Rendering the newest real
//! sample makes the cursor judder because the age of that sample varies from
//! frame to frame.  Instead the consumer asks: "where was the pointer at
//! `frame_time − latency`?" and synthesizes one sample for exactly that
//! instant.
//!
//! - **Interpolation** is used when a real sample *after* the target time is
//!   already queued: the answer lies on the line between the last delivered
//!   sample and that future sample.
//! - **Extrapolation** is used otherwise: the line through the two newest
//!   delivered samples is extended forward, but never by more than half their
//!   spacing or [`ResamplerConfig::max_prediction`].
//!
//! Only X and Y are predicted.  Every other axis of the synthetic sample is
//! copied from the last real sample.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::filter::{CoordinateFilter, FilterConfig};
use crate::domain::motion::{AxisId, MotionEvent, MotionSample, Nanos, Pointer, PointerCoords};

// ── Trait ─────────────────────────────────────────────────────────────────────

/// A strategy that may append one synthetic sample to a motion event.
///
/// One instance serves one gesture on one device; it keeps whatever history it
/// needs between calls.
pub trait Resampler: Send {
    /// Offset subtracted from a frame time to obtain the resample time.
    fn latency(&self) -> Nanos;

    /// Appends at most one resampled sample to `event` for `frame_time`.
    ///
    /// Every sample in `event` must be real.  `future_sample` is the oldest
    /// queued real sample that was not yet due at this frame, if any.  When
    /// resampling is not possible the event is left unchanged.
    fn resample_motion_event(
        &mut self,
        frame_time: Nanos,
        event: &mut MotionEvent,
        future_sample: Option<&MotionSample>,
    );

    /// Records the real samples of an event delivered without a frame
    /// deadline.  Never appends a sample.
    fn observe_motion_event(&mut self, event: &mut MotionEvent);
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Resampling tunables, all expressed in microseconds so that TOML files stay
/// readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResamplerConfig {
    /// Resampling is skipped entirely when `false`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_latency_us")]
    pub latency_us: u64,
    /// Minimum spacing of the two reference samples.
    #[serde(default = "default_min_delta_us")]
    pub min_delta_us: u64,
    /// Maximum spacing of the two extrapolation reference samples.
    #[serde(default = "default_max_delta_us")]
    pub max_delta_us: u64,
    /// Farthest an extrapolation may reach past the last real sample.
    #[serde(default = "default_max_prediction_us")]
    pub max_prediction_us: u64,
    /// The resample time must be at least this far past the last real sample.
    #[serde(default = "default_min_resample_offset_us")]
    pub min_resample_offset_us: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_latency_us() -> u64 {
    5_000
}

fn default_min_delta_us() -> u64 {
    2_000
}

fn default_max_delta_us() -> u64 {
    20_000
}

fn default_max_prediction_us() -> u64 {
    8_000
}

fn default_min_resample_offset_us() -> u64 {
    1
}

impl Default for ResamplerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            latency_us: default_latency_us(),
            min_delta_us: default_min_delta_us(),
            max_delta_us: default_max_delta_us(),
            max_prediction_us: default_max_prediction_us(),
            min_resample_offset_us: default_min_resample_offset_us(),
        }
    }
}

fn micros_to_nanos(us: u64) -> Nanos {
    Nanos::try_from(us.saturating_mul(1_000)).unwrap_or(Nanos::MAX)
}

impl ResamplerConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us)
    }

    pub fn min_delta(&self) -> Duration {
        Duration::from_micros(self.min_delta_us)
    }

    pub fn max_delta(&self) -> Duration {
        Duration::from_micros(self.max_delta_us)
    }

    pub fn max_prediction(&self) -> Duration {
        Duration::from_micros(self.max_prediction_us)
    }

    pub fn min_resample_offset(&self) -> Duration {
        Duration::from_micros(self.min_resample_offset_us)
    }
}

/// The same tunables converted once to nanoseconds.
#[derive(Debug, Clone, Copy)]
struct Tunables {
    latency: Nanos,
    min_delta: Nanos,
    max_delta: Nanos,
    max_prediction: Nanos,
    min_resample_offset: Nanos,
}

impl From<&ResamplerConfig> for Tunables {
    fn from(config: &ResamplerConfig) -> Self {
        Self {
            latency: micros_to_nanos(config.latency_us),
            min_delta: micros_to_nanos(config.min_delta_us),
            max_delta: micros_to_nanos(config.max_delta_us),
            max_prediction: micros_to_nanos(config.max_prediction_us),
            min_resample_offset: micros_to_nanos(config.min_resample_offset_us),
        }
    }
}

// ── Linear resampler ──────────────────────────────────────────────────────────

/// Per-pointer X/Y velocity in position units per nanosecond.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f64,
    y: f64,
}

/// What the last extrapolation was built from, and what it produced.
#[derive(Debug, Clone)]
struct Prediction {
    /// Event time of the newer reference sample.
    base_time: Nanos,
    velocities: BTreeMap<i32, Velocity>,
    /// Event time of the synthesized sample.
    event_time: Nanos,
    /// Synthesized coordinates per pointer id.
    coords: BTreeMap<i32, PointerCoords>,
}

/// Linear interpolation / extrapolation over the last two real samples.
pub struct LinearResampler {
    tunables: Tunables,
    /// The two most recent real samples delivered, oldest first.
    latest_samples: VecDeque<MotionSample>,
    previous_prediction: Option<Prediction>,
}

fn lerp(a: f32, b: f32, alpha: f32) -> f32 {
    a + alpha * (b - a)
}

/// Builds a synthetic pointer: X/Y replaced, every other axis kept.
fn resampled_pointer(template: &Pointer, x: f32, y: f32) -> Pointer {
    let mut pointer = template.clone();
    pointer.coords.set_axis(AxisId::X, x);
    pointer.coords.set_axis(AxisId::Y, y);
    pointer.coords.is_resampled = true;
    pointer
}

/// `true` when both samples hold the same pointer ids with the same tool types.
fn pointers_match(a: &MotionSample, b: &MotionSample) -> bool {
    a.same_pointer_ids(b)
        && a.pointers.iter().all(|p| {
            b.pointer(p.id())
                .is_some_and(|q| q.properties.tool_type == p.properties.tool_type)
        })
}

impl LinearResampler {
    pub fn new(config: &ResamplerConfig) -> Self {
        Self {
            tunables: Tunables::from(config),
            latest_samples: VecDeque::with_capacity(2),
            previous_prediction: None,
        }
    }

    fn update_latest_samples(&mut self, event: &MotionEvent) {
        let start = event.samples.len().saturating_sub(2);
        for sample in &event.samples[start..] {
            if self.latest_samples.len() == 2 {
                self.latest_samples.pop_front();
            }
            self.latest_samples.push_back(sample.clone());
        }
    }

    /// Pins every sample older than the last delivered prediction to that
    /// prediction's coordinates, so positions never move back past what the
    /// application has already drawn.  Event times are left as they are.
    fn overwrite_old_samples(&self, event: &mut MotionEvent) {
        let Some(prev) = self.previous_prediction.as_ref() else {
            return;
        };
        for sample in event
            .samples
            .iter_mut()
            .filter(|s| s.event_time < prev.event_time)
        {
            debug!(
                event_time = sample.event_time,
                predicted_time = prev.event_time,
                "sample older than the previous prediction, overwriting coordinates"
            );
            for pointer in &mut sample.pointers {
                if let Some(coords) = prev.coords.get(&pointer.id()) {
                    pointer.coords = coords.clone();
                }
            }
        }
    }

    fn attempt_interpolation(
        &self,
        resample_time: Nanos,
        last: &MotionSample,
        future: &MotionSample,
    ) -> Option<MotionSample> {
        if future.event_time <= resample_time {
            debug!("not interpolated: future sample is not after the resample time");
            return None;
        }
        if !pointers_match(last, future) {
            debug!("not interpolated: pointer sets differ");
            return None;
        }
        if !future.pointers.iter().all(|p| p.properties.tool_type.can_resample()) {
            debug!("not interpolated: future sample has a non-resampleable tool");
            return None;
        }
        let (Some(delta), Some(offset)) = (
            future.event_time.checked_sub(last.event_time),
            resample_time.checked_sub(last.event_time),
        ) else {
            debug!("not interpolated: time span out of range");
            return None;
        };
        if delta < self.tunables.min_delta {
            debug!(delta_ns = delta, "not interpolated: delta too small");
            return None;
        }

        let alpha = (offset as f64 / delta as f64) as f32;
        let pointers = last
            .pointers
            .iter()
            .filter_map(|p| {
                let f = future.pointer(p.id())?;
                Some(resampled_pointer(
                    p,
                    lerp(p.coords.x(), f.coords.x(), alpha),
                    lerp(p.coords.y(), f.coords.y(), alpha),
                ))
            })
            .collect();
        Some(MotionSample::new(resample_time, pointers))
    }

    fn attempt_extrapolation(&self, resample_time: Nanos) -> Option<(MotionSample, Prediction)> {
        if self.latest_samples.len() < 2 {
            debug!("not extrapolated: not enough data");
            return None;
        }
        let (Some(past), Some(present)) = (self.latest_samples.front(), self.latest_samples.back())
        else {
            return None;
        };
        if !pointers_match(past, present) {
            debug!("not extrapolated: pointer sets differ");
            return None;
        }

        let Some(delta) = present.event_time.checked_sub(past.event_time) else {
            debug!("not extrapolated: time span out of range");
            return None;
        };
        if delta < self.tunables.min_delta {
            debug!(delta_ns = delta, "not extrapolated: delta too small");
            return None;
        }
        if delta > self.tunables.max_delta {
            debug!(delta_ns = delta, "not extrapolated: delta too large");
            return None;
        }

        let farthest = present
            .event_time
            .saturating_add((delta / 2).min(self.tunables.max_prediction));
        let target = resample_time.min(farthest);
        if target < resample_time {
            debug!(
                requested_ns = resample_time.saturating_sub(present.event_time),
                capped_ns = target.saturating_sub(present.event_time),
                "resample time too far in the future, prediction capped"
            );
        }
        let alpha = (target.saturating_sub(past.event_time) as f64 / delta as f64) as f32;
        let ahead = target.saturating_sub(present.event_time) as f64;

        let carried = self
            .previous_prediction
            .as_ref()
            .filter(|prev| prev.base_time == past.event_time);

        let mut velocities = BTreeMap::new();
        let mut pointers = Vec::with_capacity(present.pointers.len());
        for p in &present.pointers {
            let Some(a) = past.pointer(p.id()) else {
                continue;
            };
            let stale_velocity = carried
                .filter(|_| a.coords.same_xy(&p.coords))
                .and_then(|prev| prev.velocities.get(&p.id()).copied());

            let pointer = match stale_velocity {
                Some(v) => {
                    debug!(pointer_id = p.id(), "pointer did not move, carrying prior velocity");
                    velocities.insert(p.id(), Velocity { x: 0.0, y: 0.0 });
                    resampled_pointer(
                        p,
                        (f64::from(p.coords.x()) + v.x * ahead) as f32,
                        (f64::from(p.coords.y()) + v.y * ahead) as f32,
                    )
                }
                None => {
                    velocities.insert(
                        p.id(),
                        Velocity {
                            x: f64::from(p.coords.x() - a.coords.x()) / delta as f64,
                            y: f64::from(p.coords.y() - a.coords.y()) / delta as f64,
                        },
                    );
                    resampled_pointer(
                        p,
                        lerp(a.coords.x(), p.coords.x(), alpha),
                        lerp(a.coords.y(), p.coords.y(), alpha),
                    )
                }
            };
            pointers.push(pointer);
        }

        let coords = pointers.iter().map(|p| (p.id(), p.coords.clone())).collect();
        Some((
            MotionSample::new(target, pointers),
            Prediction {
                base_time: present.event_time,
                velocities,
                event_time: target,
                coords,
            },
        ))
    }
}

impl Resampler for LinearResampler {
    fn latency(&self) -> Nanos {
        self.tunables.latency
    }

    fn resample_motion_event(
        &mut self,
        frame_time: Nanos,
        event: &mut MotionEvent,
        future_sample: Option<&MotionSample>,
    ) {
        let Some(last) = event.last_sample().cloned() else {
            return;
        };
        self.update_latest_samples(event);

        let resample_time = frame_time.saturating_sub(self.tunables.latency);
        let offset = resample_time.checked_sub(last.event_time);
        if offset.map_or(true, |offset| offset < self.tunables.min_resample_offset) {
            debug!(
                resample_time,
                last_time = last.event_time,
                "not resampled: resample time not after the last sample"
            );
            self.overwrite_old_samples(event);
            return;
        }
        if !last.pointers.iter().all(|p| p.properties.tool_type.can_resample()) {
            debug!("not resampled: event has a non-resampleable tool");
            self.previous_prediction = None;
            return;
        }

        let interpolated = future_sample
            .and_then(|future| self.attempt_interpolation(resample_time, &last, future));
        let (sample, prediction) = match interpolated {
            Some(sample) => (Some(sample), None),
            None => match self.attempt_extrapolation(resample_time) {
                Some((sample, prediction)) => (Some(sample), Some(prediction)),
                None => (None, None),
            },
        };

        if let Some(sample) = sample {
            if sample.event_time > last.event_time {
                event.samples.push(sample);
            }
        }
        // Checked against the prediction already shown, before it is replaced.
        self.overwrite_old_samples(event);
        if prediction.is_some() {
            self.previous_prediction = prediction;
        }
    }

    fn observe_motion_event(&mut self, event: &mut MotionEvent) {
        self.update_latest_samples(event);
    }
}

// ── Filtered resampler ────────────────────────────────────────────────────────

/// Runs the linear resampler, then One Euro filters X/Y of every sample.
///
/// Filter state is kept per pointer id for the life of the resampler.
pub struct FilteredResampler {
    inner: LinearResampler,
    min_cutoff_freq: f64,
    beta: f64,
    filters: BTreeMap<i32, CoordinateFilter>,
}

impl FilteredResampler {
    pub fn new(config: &ResamplerConfig, filter: &FilterConfig) -> Self {
        Self {
            inner: LinearResampler::new(config),
            min_cutoff_freq: filter.min_cutoff_freq,
            beta: filter.beta,
            filters: BTreeMap::new(),
        }
    }

    fn filter_event(&mut self, event: &mut MotionEvent) {
        for sample in &mut event.samples {
            for pointer in &mut sample.pointers {
                let filter = self
                    .filters
                    .entry(pointer.id())
                    .or_insert_with(|| CoordinateFilter::new(self.min_cutoff_freq, self.beta));
                if !filter.filter(sample.event_time, &mut pointer.coords) {
                    debug!(
                        pointer_id = pointer.properties.id,
                        event_time = sample.event_time,
                        "sample not filtered: timestamp did not advance"
                    );
                }
            }
        }
    }
}

impl Resampler for FilteredResampler {
    fn latency(&self) -> Nanos {
        self.inner.latency()
    }

    fn resample_motion_event(
        &mut self,
        frame_time: Nanos,
        event: &mut MotionEvent,
        future_sample: Option<&MotionSample>,
    ) {
        self.inner
            .resample_motion_event(frame_time, event, future_sample);
        self.filter_event(event);
    }

    fn observe_motion_event(&mut self, event: &mut MotionEvent) {
        self.inner.observe_motion_event(event);
        self.filter_event(event);
    }
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// Creates one resampler per gesture from the configured tunables.
#[derive(Debug, Clone, Default)]
pub struct ResamplerFactory {
    pub resampler: ResamplerConfig,
    pub filter: FilterConfig,
}

impl ResamplerFactory {
    pub fn new(resampler: ResamplerConfig, filter: FilterConfig) -> Self {
        Self { resampler, filter }
    }

    /// A factory that never resamples.
    pub fn disabled() -> Self {
        Self {
            resampler: ResamplerConfig {
                enabled: false,
                ..ResamplerConfig::default()
            },
            filter: FilterConfig::default(),
        }
    }

    /// Returns `None` when resampling is disabled.
    pub fn create(&self) -> Option<Box<dyn Resampler>> {
        if !self.resampler.enabled {
            return None;
        }
        if self.filter.enabled {
            Some(Box::new(FilteredResampler::new(&self.resampler, &self.filter)))
        } else {
            Some(Box::new(LinearResampler::new(&self.resampler)))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
