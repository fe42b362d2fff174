//! Tokio driver for an [`InputConsumer`].
//!
//! The consumer itself never blocks and never spawns anything.  This module
//! supplies the three wake-ups it needs:
//!
//! - the channel descriptor became readable (via [`AsyncFd`]),
//! - a frame is about to be drawn (a frame time arrives on an `mpsc` channel),
//! - shutdown was requested.
//!
//! After each wake-up the loop asks the callbacks which events they have
//! finished ([`InputConsumerCallbacks::take_completed`]) and acknowledges
//! them.  Everything runs on the task that calls [`run_event_loop`].

use std::os::fd::{AsRawFd, RawFd};

use motion_core::Nanos;
use thiserror::Error;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::application::channel::InputChannel;
use crate::application::consume_input::{ConsumerError, InputConsumer, InputConsumerCallbacks};

/// Errors that end [`run_event_loop`].
#[derive(Debug, Error)]
pub enum EventLoopError {
    /// The channel descriptor could not be registered with the reactor.
    #[error("cannot watch input channel descriptor: {0}")]
    Register(#[source] std::io::Error),

    /// The consumer reported a fatal error.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
}

/// Why [`run_event_loop`] returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown signal fired (or its sender was dropped).
    ShutdownRequested,
    /// The frame clock stopped.
    FramesEnded,
}

/// Borrowed descriptor handed to [`AsyncFd`]; the channel keeps ownership.
struct ChannelFd(RawFd);

impl AsRawFd for ChannelFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Runs `consumer` until shutdown, the end of the frame stream, or a fault.
///
/// `frames` carries one frame time per display refresh, in the channel's
/// monotonic time base.
///
/// The consumer is borrowed so the caller can call
/// [`InputConsumer::shutdown`] afterwards and inspect the report.
///
/// # Errors
///
/// - [`EventLoopError::Register`] if the descriptor cannot be watched.
/// - [`EventLoopError::Consumer`] when the consumer faults or an
///   acknowledgment fails.
pub async fn run_event_loop<C: InputChannel>(
    consumer: &mut InputConsumer<C>,
    callbacks: &mut dyn InputConsumerCallbacks,
    mut frames: mpsc::Receiver<Nanos>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<LoopExit, EventLoopError> {
    let fd = AsyncFd::with_interest(
        ChannelFd(consumer.channel().readiness_fd()),
        Interest::READABLE,
    )
    .map_err(EventLoopError::Register)?;
    info!(channel = consumer.channel().name(), "event loop started");

    let exit = loop {
        tokio::select! {
            _ = &mut shutdown => break LoopExit::ShutdownRequested,

            readable = fd.readable() => {
                let mut guard = readable.map_err(EventLoopError::Register)?;
                consumer.handle_receive_callback(callbacks)?;
                // The consumer read until WouldBlock.
                guard.clear_ready();
            }

            frame = frames.recv() => match frame {
                Some(frame_time) => {
                    let consumed = consumer.consume_batched_input_events(Some(frame_time), callbacks)?;
                    debug!(frame_time, consumed, "frame processed");
                }
                None => break LoopExit::FramesEnded,
            },
        }

        finish_completed(consumer, callbacks)?;
    };

    finish_completed(consumer, callbacks)?;
    info!(?exit, "event loop stopped");
    Ok(exit)
}

/// Acknowledges everything the callbacks finished since the last call.
fn finish_completed<C: InputChannel>(
    consumer: &mut InputConsumer<C>,
    callbacks: &mut dyn InputConsumerCallbacks,
) -> Result<(), ConsumerError> {
    for (seq, handled) in callbacks.take_completed() {
        if let Err(err) = consumer.finish_input_event(seq, handled) {
            match err {
                ConsumerError::Ledger(_) => {
                    warn!(seq, error = %err, "callbacks finished an unknown event");
                }
                other => return Err(other),
            }
        }
    }
    Ok(())
}
