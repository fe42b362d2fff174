//! # motion-core
//!
//! Shared library for the motionlink input channel containing the wire codec,
//! the motion domain model, the batching engine, the resampler, and the
//! pending-acknowledgment ledger.
//!
//! This crate has zero dependencies on OS APIs, sockets, or event loops.  The
//! `motion-consumer` crate wires it to a real channel.
//!
//! # Architecture overview
//!
//! An input service (the *producer*) samples pointer hardware at a high rate,
//! often 200 Hz or more, and writes one record per sample into a private
//! channel.  The application on the other end (the *consumer*) renders at the
//! display rate, typically 60 Hz, so it cannot use every sample individually.
//!
//! - **`protocol`** – How records travel over the channel.  Each record is a
//!   17-byte header plus a kind-specific body, encoded into a compact
//!   big-endian format and decoded back into typed Rust values.  The decoder
//!   is the trust boundary: every length is checked before it is used.
//!
//! - **`domain`** – Pure logic with no OS dependencies:
//!   - `motion`: pointers, samples, actions, and the delivered event types.
//!   - `events`: the non-motion kinds, delivered without batching.
//!   - `batch`: groups consecutive MOVE samples per device until the consumer
//!     asks for them at a frame deadline.
//!   - `resampler`: synthesizes one extra sample at the frame deadline by
//!     interpolation or extrapolation.
//!   - `filter`: optional One Euro smoothing applied after resampling.
//!   - `ledger`: tracks received-but-unacknowledged sequence numbers.

pub mod domain;
pub mod protocol;

pub use domain::batch::{BatchAction, BatchId, BatchingEngine, DeliveredEvent, Enqueued};
pub use domain::events::{
    CaptureEvent, DragEvent, FocusEvent, KeyAction, KeyEvent, TouchModeEvent,
};
pub use domain::filter::{CoordinateFilter, FilterConfig, OneEuroFilter};
pub use domain::ledger::{LedgerError, PendingAckLedger};
pub use domain::motion::{
    AxisId, DeviceId, MotionAction, MotionEvent, MotionSample, Nanos, Pointer, PointerCoords,
    PointerProperties, ToolType, MAX_POINTERS, MAX_POINTER_AXES,
};
pub use domain::resampler::{
    FilteredResampler, LinearResampler, Resampler, ResamplerConfig, ResamplerFactory,
};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{
    InputMessage, MessageBody, MessageHeader, MessageKind, HEADER_SIZE, MAX_MESSAGE_SIZE,
};
pub use protocol::sequence::SequenceCounter;
