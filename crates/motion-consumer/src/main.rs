//! motion-consumer demo entry point.
//!
//! Opens a socket pair, runs a synthetic 200 Hz touch producer on one end
//! and the consumption loop on the other, and logs what the application
//! would receive.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_from(config path)         -- [consumer] [resampler] [filter]
//!  └─ SocketInputChannel::open_pair  -- (producer end, consumer end)
//!  └─ std::thread: synthetic producer
//!       └─ DOWN, MOVE × n, UP, repeat  every 5 ms
//!       └─ counts Finished records coming back
//!  └─ tokio (current thread)
//!       ├─ frame ticker   -> mpsc<Nanos> at frame_rate_hz
//!       ├─ Ctrl-C         -> oneshot
//!       └─ run_event_loop(consumer, LoggingCallbacks, frames, shutdown)
//! ```
//!
//! Usage: `motion-consumer [CONFIG_PATH]`.  Without a path the default
//! config location is used; a missing file means defaults.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use motion_consumer::application::channel::{ChannelError, InputChannel};
use motion_consumer::application::clock::monotonic_now;
use motion_consumer::application::consume_input::{
    ConsumerError, InputConsumer, InputConsumerCallbacks,
};
use motion_consumer::infrastructure::channel::SocketInputChannel;
use motion_consumer::infrastructure::event_loop::{run_event_loop, EventLoopError};
use motion_consumer::infrastructure::storage::config::{default_path, load_from};
use motion_core::{
    CaptureEvent, DragEvent, FocusEvent, InputMessage, KeyEvent, MessageBody, MessageHeader,
    MotionAction, MotionEvent, Pointer, SequenceCounter, ToolType, TouchModeEvent,
};

/// Producer sampling period (200 Hz).
const PRODUCER_PERIOD: Duration = Duration::from_millis(5);
/// Samples per synthetic gesture, DOWN and UP included.
const GESTURE_LEN: u32 = 120;
const DEVICE_ID: i32 = 1;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config_path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => default_path().context("locating config file")?,
    };
    let config = load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    // Initialise structured logging; RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.consumer.log_level)),
        )
        .init();

    info!(
        config = %config_path.display(),
        frame_rate_hz = config.consumer.frame_rate_hz,
        resampling = config.resampler.enabled,
        filtering = config.filter.enabled,
        "motion-consumer starting"
    );

    let (producer_end, consumer_end) = SocketInputChannel::open_pair(&config.consumer.channel_name)
        .context("opening input channel")?;

    // ── Synthetic producer ────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("synthetic-producer".to_string())
            .spawn(move || run_synthetic_producer(producer_end, &running))
            .context("spawning producer thread")?
    };

    // ── Frame ticker ──────────────────────────────────────────────────────────
    let (frame_tx, frame_rx) = mpsc::channel(4);
    let frame_period = Duration::from_secs(1) / config.consumer.frame_rate_hz;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if frame_tx.send(monotonic_now()).await.is_err() {
                break;
            }
        }
    });

    // ── Ctrl-C ────────────────────────────────────────────────────────────────
    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        let _ = stop_tx.send(());
    });

    // ── Consumption loop ──────────────────────────────────────────────────────
    let mut consumer = InputConsumer::new(consumer_end, config.resampler_factory());
    let mut callbacks = LoggingCallbacks::default();
    let outcome = run_event_loop(&mut consumer, &mut callbacks, frame_rx, stop_rx).await;

    let report = consumer.shutdown();
    running.store(false, Ordering::Relaxed);
    drop(consumer);
    match producer.join() {
        Ok(stats) => info!(
            sent = stats.sent,
            finished = stats.finished,
            dropped = stats.dropped,
            "producer stopped"
        ),
        Err(_) => warn!("producer thread panicked"),
    }
    info!(
        delivered = callbacks.delivered,
        acknowledged_unhandled = report.acknowledged_unhandled.len(),
        unfinished = report.unfinished.len(),
        "motion-consumer stopped"
    );

    match outcome {
        Ok(exit) => {
            debug!(?exit, "event loop exited");
            Ok(())
        }
        Err(EventLoopError::Consumer(ConsumerError::Channel(ChannelError::Closed))) => {
            info!("producer hung up");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

// ── Application stand-in ──────────────────────────────────────────────────────

/// Logs every event and finishes it as handled on the next loop turn.
#[derive(Default)]
struct LoggingCallbacks {
    completed: Vec<(u32, bool)>,
    delivered: u64,
}

impl LoggingCallbacks {
    fn complete(&mut self, seq: u32) {
        self.delivered += 1;
        self.completed.push((seq, true));
    }
}

impl InputConsumerCallbacks for LoggingCallbacks {
    fn on_key_event(&mut self, event: KeyEvent, seq: u32) {
        info!(seq, key_code = event.key_code, action = ?event.action, "key");
        self.complete(seq);
    }

    fn on_motion_event(&mut self, event: MotionEvent, seq: u32) {
        if let Some(last) = event.last_sample() {
            let (x, y) = last
                .pointers
                .first()
                .map_or((0.0, 0.0), |p| (p.coords.x(), p.coords.y()));
            info!(
                seq,
                action = ?event.action,
                samples = event.sample_count(),
                resampled = last.is_resampled(),
                x,
                y,
                "motion"
            );
        }
        self.complete(seq);
    }

    fn on_focus_event(&mut self, event: FocusEvent, seq: u32) {
        info!(seq, has_focus = event.has_focus, "focus");
        self.complete(seq);
    }

    fn on_capture_event(&mut self, event: CaptureEvent, seq: u32) {
        info!(seq, enabled = event.pointer_capture_enabled, "pointer capture");
        self.complete(seq);
    }

    fn on_drag_event(&mut self, event: DragEvent, seq: u32) {
        debug!(seq, x = event.x, y = event.y, exiting = event.is_exiting, "drag");
        self.complete(seq);
    }

    fn on_touch_mode_event(&mut self, event: TouchModeEvent, seq: u32) {
        info!(seq, touch_mode = event.is_in_touch_mode, "touch mode");
        self.complete(seq);
    }

    fn on_batched_input_event_pending(&mut self, device_id: i32) {
        debug!(device_id, "batched input pending");
    }

    fn take_completed(&mut self) -> Vec<(u32, bool)> {
        std::mem::take(&mut self.completed)
    }
}

// ── Synthetic producer ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ProducerStats {
    sent: u64,
    finished: u64,
    dropped: u64,
}

/// Traces a circle with one finger, one gesture every [`GESTURE_LEN`] samples.
fn run_synthetic_producer(mut channel: SocketInputChannel, running: &AtomicBool) -> ProducerStats {
    let seq = SequenceCounter::new();
    let mut stats = ProducerStats::default();

    let focus = InputMessage {
        header: MessageHeader {
            seq: seq.next(),
            device_id: 0,
            event_time: monotonic_now(),
        },
        body: MessageBody::Focus { has_focus: true },
    };
    if channel.send_message(&focus).is_ok() {
        stats.sent += 1;
    }

    let mut step: u32 = 0;
    while running.load(Ordering::Relaxed) {
        let phase = step % GESTURE_LEN;
        let action = match phase {
            0 => MotionAction::Down,
            p if p == GESTURE_LEN - 1 => MotionAction::Up,
            _ => MotionAction::Move,
        };
        let angle = step as f32 * 0.05;
        let pointer = Pointer::new(
            0,
            ToolType::Finger,
            500.0 + 200.0 * angle.cos(),
            500.0 + 200.0 * angle.sin(),
        );
        let msg = InputMessage::motion(seq.next(), DEVICE_ID, monotonic_now(), action, vec![pointer]);

        match channel.send_message(&msg) {
            Ok(()) => stats.sent += 1,
            Err(ChannelError::WouldBlock) => stats.dropped += 1,
            Err(err) => {
                info!(error = %err, "consumer gone, producer stopping");
                break;
            }
        }

        loop {
            match channel.receive_message() {
                Ok(reply) if matches!(reply.body, MessageBody::Finished { .. }) => {
                    stats.finished += 1;
                }
                Ok(_) => {}
                Err(ChannelError::WouldBlock) => break,
                Err(_) => return stats,
            }
        }

        step = step.wrapping_add(1);
        std::thread::sleep(PRODUCER_PERIOD);
    }
    stats
}
