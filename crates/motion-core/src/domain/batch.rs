//! Per-device batching of motion samples.
//!
//! # How batching works (for beginners)
//!
//! MOVE samples arrive much faster than the application renders.  Rather than
//! waking the application for each one, the engine queues them per device and
//! hands them over in one [`MotionEvent`] when the application drains at its
//! next frame.  Everything that changes the *shape* of a gesture (a finger
//! going down or up, a cancel, a scroll) cannot wait: the queued samples are
//! flushed first and the boundary sample is delivered right away, so the
//! application always sees records in wire order.
//!
//! ```text
//! DOWN ─► deliver now, open batch
//! MOVE ─► queue                 ┐
//! MOVE ─► queue                 ├─ drain(frame) ─► one event (+ resampled tail)
//! MOVE ─► queue (not yet due)   ┘   stays queued, offered as "future" sample
//! UP   ─► flush queue, deliver now, close batch
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use tracing::{debug, trace};

use crate::domain::motion::{DeviceId, MotionAction, MotionEvent, MotionSample, Nanos};
use crate::domain::resampler::{Resampler, ResamplerFactory};

/// Identifier of one batch, unique for the life of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// What [`BatchingEngine::enqueue`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    /// A new batch was opened for the device.
    StartedNewBatch(BatchId),
    /// The sample was queued on the device's open batch.
    AppendedToBatch(BatchId),
    /// The device's batch was closed (and possibly replaced by a new one).
    ClosedBatch(BatchId),
    /// The sample was delivered without touching any batch.
    Immediate,
}

/// A motion event ready for the application, plus the sequence numbers of
/// every real sample inside it in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredEvent {
    pub event: MotionEvent,
    pub seqs: Vec<u32>,
}

impl DeliveredEvent {
    /// The sequence number the application finishes: that of the newest real
    /// sample.
    pub fn seq(&self) -> u32 {
        self.seqs.last().copied().unwrap_or(0)
    }
}

/// Result of [`BatchingEngine::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued {
    pub action: BatchAction,
    /// Events that must be delivered now, in order.
    pub deliver: Vec<DeliveredEvent>,
}

struct QueuedSample {
    seq: u32,
    sample: MotionSample,
}

struct Batch {
    id: BatchId,
    /// MOVE or HOVER_MOVE; the action every flushed event carries.
    class: MotionAction,
    /// Sorted pointer ids every queued sample must match.
    pointer_ids: Vec<i32>,
    samples: VecDeque<QueuedSample>,
    /// Event time of the newest sample accepted into this batch.
    last_event_time: Option<Nanos>,
    resampler: Option<Box<dyn Resampler>>,
}

impl Batch {
    fn accepts(&self, action: MotionAction, sample: &MotionSample) -> bool {
        action == self.class
            && sample.pointer_ids() == self.pointer_ids
            && self.last_event_time.map_or(true, |t| sample.event_time > t)
    }

    fn push(&mut self, seq: u32, sample: MotionSample) {
        self.last_event_time = Some(sample.event_time);
        self.samples.push_back(QueuedSample { seq, sample });
    }

    /// Moves queued samples into one event; `count` of them, oldest first.
    fn take_event(&mut self, device_id: DeviceId, count: usize) -> Option<DeliveredEvent> {
        if count == 0 {
            return None;
        }
        let mut seqs = Vec::with_capacity(count);
        let mut samples = Vec::with_capacity(count);
        for queued in self.samples.drain(..count) {
            seqs.push(queued.seq);
            samples.push(queued.sample);
        }
        Some(DeliveredEvent {
            event: MotionEvent {
                device_id,
                action: self.class,
                samples,
            },
            seqs,
        })
    }

    /// Delivers everything queued, without resampling.
    fn flush(&mut self, device_id: DeviceId) -> Option<DeliveredEvent> {
        let mut delivered = self.take_event(device_id, self.samples.len())?;
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.observe_motion_event(&mut delivered.event);
        }
        debug!(
            batch = %self.id,
            device_id,
            samples = delivered.seqs.len(),
            "flushed batch without resampling"
        );
        Some(delivered)
    }

    fn observe(&mut self, delivered: &mut DeliveredEvent) {
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.observe_motion_event(&mut delivered.event);
        }
    }
}

/// Groups consecutive motion samples per device until they are drained.
pub struct BatchingEngine {
    batches: BTreeMap<DeviceId, Batch>,
    factory: ResamplerFactory,
    next_id: u64,
}

impl BatchingEngine {
    pub fn new(factory: ResamplerFactory) -> Self {
        Self {
            batches: BTreeMap::new(),
            factory,
            next_id: 1,
        }
    }

    fn new_batch(&mut self, class: MotionAction, pointer_ids: Vec<i32>) -> Batch {
        let id = BatchId(self.next_id);
        self.next_id += 1;
        Batch {
            id,
            class,
            pointer_ids,
            samples: VecDeque::new(),
            last_event_time: None,
            resampler: self.factory.create(),
        }
    }

    /// Routes one received motion sample.
    pub fn enqueue(
        &mut self,
        seq: u32,
        device_id: DeviceId,
        action: MotionAction,
        sample: MotionSample,
    ) -> Enqueued {
        trace!(seq, device_id, ?action, "enqueue motion sample");
        let mut deliver = Vec::new();
        let immediate = |sample: MotionSample| DeliveredEvent {
            event: MotionEvent::new(device_id, action, sample),
            seqs: vec![seq],
        };

        let batch_action = if action.is_batchable() {
            match self.batches.get_mut(&device_id) {
                Some(batch) if batch.accepts(action, &sample) => {
                    batch.push(seq, sample);
                    BatchAction::AppendedToBatch(batch.id)
                }
                Some(_) => {
                    let closed = self.close(device_id, &mut deliver);
                    let mut batch = self.new_batch(action, sample.pointer_ids());
                    batch.push(seq, sample);
                    self.batches.insert(device_id, batch);
                    BatchAction::ClosedBatch(closed)
                }
                None => {
                    let mut batch = self.new_batch(action, sample.pointer_ids());
                    let id = batch.id;
                    batch.push(seq, sample);
                    self.batches.insert(device_id, batch);
                    BatchAction::StartedNewBatch(id)
                }
            }
        } else if action.starts_gesture() {
            let closed = self.close(device_id, &mut deliver);
            let class = match action {
                MotionAction::HoverEnter => MotionAction::HoverMove,
                _ => MotionAction::Move,
            };
            let mut batch = self.new_batch(class, sample.pointer_ids());
            batch.last_event_time = Some(sample.event_time);
            let id = batch.id;
            let mut event = immediate(sample);
            batch.observe(&mut event);
            deliver.push(event);
            self.batches.insert(device_id, batch);
            if closed == NO_BATCH {
                BatchAction::StartedNewBatch(id)
            } else {
                BatchAction::ClosedBatch(closed)
            }
        } else if action.ends_gesture() {
            let closed = self.batches.remove(&device_id).map(|mut batch| {
                deliver.extend(batch.flush(device_id));
                let mut event = immediate(sample.clone());
                batch.observe(&mut event);
                deliver.push(event);
                batch.id
            });
            match closed {
                Some(id) => BatchAction::ClosedBatch(id),
                None => {
                    deliver.push(immediate(sample));
                    BatchAction::Immediate
                }
            }
        } else if action.changes_pointer_count() {
            let class = self
                .batches
                .get(&device_id)
                .map_or(MotionAction::Move, |b| b.class);
            let closed = self.close(device_id, &mut deliver);
            let remaining = remaining_pointer_ids(action, &sample);
            let mut batch = self.new_batch(class, remaining);
            batch.last_event_time = Some(sample.event_time);
            let id = batch.id;
            let mut event = immediate(sample);
            batch.observe(&mut event);
            deliver.push(event);
            self.batches.insert(device_id, batch);
            if closed == NO_BATCH {
                BatchAction::StartedNewBatch(id)
            } else {
                BatchAction::ClosedBatch(closed)
            }
        } else {
            if let Some(batch) = self.batches.get_mut(&device_id) {
                deliver.extend(batch.flush(device_id));
            }
            deliver.push(immediate(sample));
            BatchAction::Immediate
        };

        Enqueued {
            action: batch_action,
            deliver,
        }
    }

    /// Flushes and removes the device's batch; returns its id or [`NO_BATCH`].
    fn close(&mut self, device_id: DeviceId, deliver: &mut Vec<DeliveredEvent>) -> BatchId {
        match self.batches.remove(&device_id) {
            Some(mut batch) => {
                deliver.extend(batch.flush(device_id));
                batch.id
            }
            None => NO_BATCH,
        }
    }

    /// `true` when the device has queued samples waiting for a drain.
    pub fn has_pending_batch(&self, device_id: DeviceId) -> bool {
        self.batches
            .get(&device_id)
            .is_some_and(|b| !b.samples.is_empty())
    }

    /// `true` when any device has queued samples.
    pub fn has_any_pending(&self) -> bool {
        self.batches.values().any(|b| !b.samples.is_empty())
    }

    /// Devices with queued samples, ascending.
    pub fn pending_devices(&self) -> Vec<DeviceId> {
        self.batches
            .iter()
            .filter(|(_, b)| !b.samples.is_empty())
            .map(|(d, _)| *d)
            .collect()
    }

    /// Delivers due samples from every batch.
    ///
    /// With `Some(frame_time)` only samples at or before the batch's
    /// resample time are due, and each delivered event may gain one
    /// resampled sample.  With `None` everything is due and nothing is
    /// resampled.
    pub fn drain(&mut self, frame_time: Option<Nanos>) -> Vec<DeliveredEvent> {
        let mut out = Vec::new();
        for (&device_id, batch) in self.batches.iter_mut() {
            let Some(frame_time) = frame_time else {
                out.extend(batch.flush(device_id));
                continue;
            };

            let latency = batch.resampler.as_ref().map_or(0, |r| r.latency());
            let cutoff = frame_time.saturating_sub(latency);
            let due = batch
                .samples
                .iter()
                .take_while(|q| q.sample.event_time <= cutoff)
                .count();
            let Some(mut delivered) = batch.take_event(device_id, due) else {
                continue;
            };

            if let Some(resampler) = batch.resampler.as_mut() {
                let future = batch.samples.front().map(|q| &q.sample);
                resampler.resample_motion_event(frame_time, &mut delivered.event, future);
            }
            debug!(
                batch = %batch.id,
                device_id,
                samples = delivered.seqs.len(),
                queued = batch.samples.len(),
                resampled = delivered.event.last_sample().is_some_and(MotionSample::is_resampled),
                "drained batch"
            );
            out.push(delivered);
        }
        out
    }

    /// Removes every queued sample and returns their sequence numbers.
    ///
    /// All batches are discarded; used at shutdown.
    pub fn take_all_pending(&mut self) -> Vec<u32> {
        let batches = std::mem::take(&mut self.batches);
        batches
            .into_values()
            .flat_map(|b| b.samples.into_iter().map(|q| q.seq))
            .collect()
    }
}

/// Placeholder id for "no batch was open".
const NO_BATCH: BatchId = BatchId(0);

/// Pointer ids still down after a POINTER_DOWN / POINTER_UP sample.
fn remaining_pointer_ids(action: MotionAction, sample: &MotionSample) -> Vec<i32> {
    match action {
        MotionAction::PointerUp { index } => {
            let lifted = sample.pointers.get(usize::from(index)).map(|p| p.id());
            let mut ids = sample.pointer_ids();
            ids.retain(|id| Some(*id) != lifted);
            ids
        }
        _ => sample.pointer_ids(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
