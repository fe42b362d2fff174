//! Domain logic for the motionlink input channel.
//!
//! This module contains pure logic with no OS, socket, or event-loop
//! dependencies, so every rule here can be unit-tested in isolation.
//!
//! Code in outer layers (the consumer's channel and event loop) depends on the
//! domain, but the domain never depends on them.

/// Per-device batching of MOVE samples until a frame drains them.
pub mod batch;
/// Non-motion events (key, focus, capture, drag, touch mode).
pub mod events;
/// One Euro coordinate smoothing.
pub mod filter;
/// Received-but-unacknowledged sequence tracking.
pub mod ledger;
/// Pointers, samples, actions and delivered motion events.
pub mod motion;
/// Interpolation and extrapolation at frame deadlines.
pub mod resampler;
