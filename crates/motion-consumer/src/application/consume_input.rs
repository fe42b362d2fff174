//! Consume input use case.
//!
//! [`InputConsumer`] owns one [`InputChannel`], the batching engine and the
//! pending-acknowledgment ledger.  It turns received records into
//! materialized events for the application and turns the application's
//! "finished" answers back into `Finished` records.
//!
//! # Call pattern (for beginners)
//!
//! The host event loop calls into the consumer at two moments:
//!
//! 1. **The channel became readable** → [`InputConsumer::handle_receive_callback`].
//!    Everything waiting on the channel is read.  Key, focus, capture, drag
//!    and touch-mode records, plus gesture boundaries (DOWN, UP, ...), are
//!    delivered right away.  MOVE samples are parked in a per-device batch.
//!
//! 2. **A frame is about to be drawn** → [`InputConsumer::consume_batched_input_events`].
//!    Parked samples that are old enough are folded into one event per
//!    device, optionally with one synthetic sample placed exactly at the
//!    frame's sampling time so motion looks smooth.
//!
//! Whenever the application has handled an event it calls
//! [`InputConsumer::finish_input_event`] with the sequence number it was
//! given.  For a batched event that single call answers every real sample
//! folded into it.

use std::collections::VecDeque;

use motion_core::{
    BatchingEngine, CaptureEvent, DeliveredEvent, DeviceId, DragEvent, FocusEvent, InputMessage,
    KeyEvent, LedgerError, MessageBody, MotionEvent, MotionSample, Nanos, PendingAckLedger,
    ResamplerFactory, TouchModeEvent,
};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::application::channel::{ChannelError, InputChannel};
use crate::application::clock::{monotonic_now, Clock};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors returned by [`InputConsumer`] operations.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The channel failed; the consumer is now [`ConsumerState::Faulted`].
    #[error("input channel failed: {0}")]
    Channel(#[from] ChannelError),

    /// `finish_input_event` was called with a sequence that is not pending.
    #[error("cannot finish input event: {0}")]
    Ledger(#[from] LedgerError),

    /// The consumer was shut down; no further I/O is performed.
    #[error("consumer is shut down")]
    ShutDown,
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

/// Receives materialized events from an [`InputConsumer`].
///
/// Each method gets the event and the sequence number to pass to
/// [`InputConsumer::finish_input_event`] once the event has been handled.
pub trait InputConsumerCallbacks {
    fn on_key_event(&mut self, event: KeyEvent, seq: u32);
    fn on_motion_event(&mut self, event: MotionEvent, seq: u32);
    fn on_focus_event(&mut self, event: FocusEvent, seq: u32);
    fn on_capture_event(&mut self, event: CaptureEvent, seq: u32);
    fn on_drag_event(&mut self, event: DragEvent, seq: u32);
    fn on_touch_mode_event(&mut self, event: TouchModeEvent, seq: u32);

    /// Motion samples for `device_id` are waiting for the next frame.
    fn on_batched_input_event_pending(&mut self, device_id: DeviceId) {
        let _ = device_id;
    }

    /// Events the callbacks finished since the last call, as `(seq, handled)`.
    ///
    /// Event-loop drivers call this after every dispatch and forward each
    /// entry to [`InputConsumer::finish_input_event`].
    fn take_completed(&mut self) -> Vec<(u32, bool)> {
        Vec::new()
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Lifecycle of an [`InputConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Waiting for readiness or a frame.
    Idle,
    /// Reading records after a readiness notification.
    ReadinessSignaled,
    /// Draining batches for a frame deadline.
    Draining,
    /// The channel failed; no more receives are attempted.
    Faulted,
    /// [`InputConsumer::shutdown`] has run.
    ShutDown,
}

/// Outcome of [`InputConsumer::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Batched samples never delivered, acknowledged as unhandled.
    pub acknowledged_unhandled: Vec<u32>,
    /// Delivered events the application never finished.
    pub unfinished: Vec<u32>,
}

// ── Consumer ──────────────────────────────────────────────────────────────────

/// Consumer end of an input channel.
pub struct InputConsumer<C: InputChannel> {
    channel: C,
    engine: BatchingEngine,
    ledger: PendingAckLedger,
    /// Records that hit `WouldBlock`, retried in order on the next call.
    outbound: VecDeque<InputMessage>,
    state: ConsumerState,
    fault_surfaced: bool,
    clock: Clock,
}

impl<C: InputChannel> InputConsumer<C> {
    /// Creates a consumer; `factory` decides how batches are resampled.
    pub fn new(channel: C, factory: ResamplerFactory) -> Self {
        info!(
            channel = channel.name(),
            token = %channel.token(),
            resampling = factory.resampler.enabled,
            filtering = factory.filter.enabled,
            "input consumer created"
        );
        Self {
            channel,
            engine: BatchingEngine::new(factory),
            ledger: PendingAckLedger::new(),
            outbound: VecDeque::new(),
            state: ConsumerState::Idle,
            fault_surfaced: false,
            clock: monotonic_now,
        }
    }

    /// Replaces the clock used for `Finished` consume times.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Sequence numbers received but not yet finished.
    pub fn ledger(&self) -> &PendingAckLedger {
        &self.ledger
    }

    /// Records waiting for the channel to accept them.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    fn is_stopped(&self) -> bool {
        matches!(self.state, ConsumerState::Faulted | ConsumerState::ShutDown)
    }

    // ── Receiving ─────────────────────────────────────────────────────────────

    /// Reads every waiting record and dispatches it.
    ///
    /// Non-motion records and gesture boundaries are delivered immediately;
    /// MOVE samples are batched and announced through
    /// [`InputConsumerCallbacks::on_batched_input_event_pending`].
    ///
    /// # Errors
    ///
    /// [`ConsumerError::Channel`] the first time the channel fails.  The
    /// consumer is then [`ConsumerState::Faulted`] and later calls return
    /// `Ok(())` without reading.
    pub fn handle_receive_callback(
        &mut self,
        callbacks: &mut dyn InputConsumerCallbacks,
    ) -> Result<(), ConsumerError> {
        if self.is_stopped() {
            return Ok(());
        }
        self.flush_outbound()?;
        self.state = ConsumerState::ReadinessSignaled;
        self.receive_all(callbacks)?;
        self.state = ConsumerState::Idle;

        for device_id in self.engine.pending_devices() {
            callbacks.on_batched_input_event_pending(device_id);
        }
        Ok(())
    }

    /// Reads newly arrived records, then drains the batches for `frame_time`.
    ///
    /// With `Some(frame_time)` only samples old enough for that frame are
    /// delivered and each batch may gain one resampled sample; with `None`
    /// everything batched is delivered as-is.  Returns `true` when at least
    /// one event was delivered.
    ///
    /// # Errors
    ///
    /// Same as [`Self::handle_receive_callback`].
    pub fn consume_batched_input_events(
        &mut self,
        frame_time: Option<Nanos>,
        callbacks: &mut dyn InputConsumerCallbacks,
    ) -> Result<bool, ConsumerError> {
        if self.is_stopped() {
            return Ok(false);
        }
        self.flush_outbound()?;
        self.state = ConsumerState::ReadinessSignaled;
        let mut delivered = self.receive_all(callbacks)?;

        self.state = ConsumerState::Draining;
        for event in self.engine.drain(frame_time) {
            self.deliver_motion(event, callbacks)?;
            delivered += 1;
        }
        self.state = ConsumerState::Idle;
        Ok(delivered > 0)
    }

    /// Receives until `WouldBlock`; returns how many events were delivered.
    fn receive_all(
        &mut self,
        callbacks: &mut dyn InputConsumerCallbacks,
    ) -> Result<usize, ConsumerError> {
        let mut delivered = 0;
        loop {
            match self.channel.receive_message() {
                Ok(msg) => delivered += self.dispatch(msg, callbacks)?,
                Err(ChannelError::WouldBlock) => return Ok(delivered),
                Err(err) => return Err(self.fault(err)),
            }
        }
    }

    fn dispatch(
        &mut self,
        msg: InputMessage,
        callbacks: &mut dyn InputConsumerCallbacks,
    ) -> Result<usize, ConsumerError> {
        let InputMessage { header, body } = msg;
        let seq = header.seq;
        trace!(channel = self.channel.name(), seq, kind = ?body.kind(), "received record");

        if body.kind().is_consumer_to_producer() {
            return Err(self.fault(ChannelError::Malformed(format!(
                "{:?} record received by the consumer",
                body.kind()
            ))));
        }
        if seq == 0 {
            return Err(self.fault(ChannelError::Malformed(
                "sequence number 0 is reserved".to_string(),
            )));
        }
        if let Err(err) = self.ledger.record_received(seq) {
            return Err(self.fault(ChannelError::Malformed(err.to_string())));
        }

        let time = header.event_time;
        match body {
            MessageBody::Motion { action, pointers } => {
                let sample = MotionSample::new(time, pointers);
                let enqueued = self.engine.enqueue(seq, header.device_id, action, sample);
                trace!(seq, action = ?enqueued.action, "motion sample routed");
                let count = enqueued.deliver.len();
                for event in enqueued.deliver {
                    self.deliver_motion(event, callbacks)?;
                }
                Ok(count)
            }
            MessageBody::Key {
                action,
                key_code,
                scan_code,
                meta_state,
                repeat_count,
                down_time,
            } => {
                self.ledger.mark_delivered(&[seq])?;
                callbacks.on_key_event(
                    KeyEvent {
                        device_id: header.device_id,
                        event_time: time,
                        action,
                        key_code,
                        scan_code,
                        meta_state,
                        repeat_count,
                        down_time,
                    },
                    seq,
                );
                Ok(1)
            }
            MessageBody::Focus { has_focus } => {
                self.ledger.mark_delivered(&[seq])?;
                callbacks.on_focus_event(
                    FocusEvent {
                        event_time: time,
                        has_focus,
                    },
                    seq,
                );
                Ok(1)
            }
            MessageBody::Capture {
                pointer_capture_enabled,
            } => {
                self.ledger.mark_delivered(&[seq])?;
                callbacks.on_capture_event(
                    CaptureEvent {
                        event_time: time,
                        pointer_capture_enabled,
                    },
                    seq,
                );
                Ok(1)
            }
            MessageBody::Drag { is_exiting, x, y } => {
                self.ledger.mark_delivered(&[seq])?;
                callbacks.on_drag_event(
                    DragEvent {
                        event_time: time,
                        is_exiting,
                        x,
                        y,
                    },
                    seq,
                );
                Ok(1)
            }
            MessageBody::TouchMode { is_in_touch_mode } => {
                self.ledger.mark_delivered(&[seq])?;
                callbacks.on_touch_mode_event(
                    TouchModeEvent {
                        event_time: time,
                        is_in_touch_mode,
                    },
                    seq,
                );
                Ok(1)
            }
            // Rejected above.
            MessageBody::Finished { .. } | MessageBody::Timeline { .. } => Ok(0),
        }
    }

    fn deliver_motion(
        &mut self,
        delivered: DeliveredEvent,
        callbacks: &mut dyn InputConsumerCallbacks,
    ) -> Result<(), ConsumerError> {
        let public = self.ledger.mark_delivered(&delivered.seqs)?;
        debug!(
            seq = public,
            device_id = delivered.event.device_id,
            action = ?delivered.event.action,
            samples = delivered.event.sample_count(),
            "delivering motion event"
        );
        callbacks.on_motion_event(delivered.event, public);
        Ok(())
    }

    /// Moves to `Faulted`; returns the error to surface.
    ///
    /// The original channel error is surfaced only once; later faults come
    /// back as [`ConsumerError::ShutDown`] so callers stop retrying.
    fn fault(&mut self, err: ChannelError) -> ConsumerError {
        self.state = ConsumerState::Faulted;
        if self.fault_surfaced {
            return ConsumerError::ShutDown;
        }
        self.fault_surfaced = true;
        match &err {
            ChannelError::Closed => info!(channel = self.channel.name(), "producer hung up"),
            _ => warn!(channel = self.channel.name(), error = %err, "input channel faulted"),
        }
        ConsumerError::Channel(err)
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Acknowledges the event delivered with `seq`.
    ///
    /// Sends one `Finished` record for `seq` and for every real sample
    /// chained behind it, oldest first.  Records the channel cannot take
    /// right now are queued and retried on the next consumer call.
    ///
    /// # Errors
    ///
    /// - [`ConsumerError::Ledger`] if `seq` is not a delivered, unfinished
    ///   event sequence.
    /// - [`ConsumerError::Channel`] if the channel fails while sending.
    /// - [`ConsumerError::ShutDown`] after a fault or shutdown; the ledger
    ///   entry is still cleared.
    pub fn finish_input_event(&mut self, seq: u32, handled: bool) -> Result<(), ConsumerError> {
        let chain = self.ledger.acknowledge(seq)?;
        if self.is_stopped() {
            return Err(ConsumerError::ShutDown);
        }
        let now = (self.clock)();
        debug!(seq, handled, chained = chain.len().saturating_sub(1), "finishing input event");
        for s in chain {
            self.outbound.push_back(InputMessage::finished(s, handled, now));
        }
        self.flush_outbound()
    }

    /// Reports graphics timing for the event delivered as `input_event_id`.
    ///
    /// # Errors
    ///
    /// Same channel errors as [`Self::finish_input_event`].
    pub fn report_timeline(
        &mut self,
        input_event_id: u32,
        gpu_completed_time: Nanos,
        present_time: Nanos,
    ) -> Result<(), ConsumerError> {
        if self.is_stopped() {
            return Err(ConsumerError::ShutDown);
        }
        self.outbound.push_back(InputMessage::timeline(
            input_event_id,
            gpu_completed_time,
            present_time,
        ));
        self.flush_outbound()
    }

    /// Sends queued records in order until the channel pushes back.
    fn flush_outbound(&mut self) -> Result<(), ConsumerError> {
        while let Some(msg) = self.outbound.front() {
            match self.channel.send_message(msg) {
                Ok(()) => {
                    self.outbound.pop_front();
                }
                Err(ChannelError::WouldBlock) => {
                    debug!(queued = self.outbound.len(), "channel full, deferring sends");
                    return Ok(());
                }
                Err(err) => {
                    self.outbound.clear();
                    return Err(self.fault(err));
                }
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// `true` when a batch is waiting or the channel probably holds a record.
    pub fn probably_has_input(&self) -> bool {
        self.engine.has_any_pending() || (!self.is_stopped() && self.channel.probably_has_input())
    }

    /// `true` when `device_id` has batched samples waiting for a frame.
    pub fn has_pending_batch(&self, device_id: DeviceId) -> bool {
        self.engine.has_pending_batch(device_id)
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Stops the consumer.
    ///
    /// Every batched sample that was never delivered is acknowledged as
    /// unhandled.  Delivered events the application never finished are
    /// logged and returned.  Idempotent; also runs on drop.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.state == ConsumerState::ShutDown {
            return ShutdownReport::default();
        }
        let pending = self.engine.take_all_pending();
        let acknowledged_unhandled = self.ledger.discard_undelivered(&pending);

        if self.state != ConsumerState::Faulted {
            let now = (self.clock)();
            for &seq in &acknowledged_unhandled {
                self.outbound.push_back(InputMessage::finished(seq, false, now));
            }
            if let Err(err) = self.flush_outbound() {
                debug!(error = %err, "could not acknowledge batched samples at shutdown");
            }
            if !self.outbound.is_empty() {
                warn!(
                    dropped = self.outbound.len(),
                    "channel full at shutdown, dropping queued records"
                );
            }
        }
        self.outbound.clear();

        let unfinished = self.ledger.delivered_unfinished();
        if !unfinished.is_empty() {
            warn!(
                channel = self.channel.name(),
                ?unfinished,
                "shutting down with unfinished input events"
            );
        }
        self.state = ConsumerState::ShutDown;
        info!(
            channel = self.channel.name(),
            acknowledged = acknowledged_unhandled.len(),
            "input consumer shut down"
        );
        ShutdownReport {
            acknowledged_unhandled,
            unfinished,
        }
    }
}

impl<C: InputChannel> Drop for InputConsumer<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
