//! Integration tests for batching and resampling through the public API.
//!
//! Each test plays a producer stream through the codec and the batching
//! engine, then drains at frame deadlines the way a consumer would.

use motion_core::{
    decode_message, encode_message, BatchAction, BatchingEngine, DeliveredEvent, FilterConfig,
    InputMessage, MessageBody, MotionAction, MotionSample, Nanos, Pointer, ResamplerConfig,
    ResamplerFactory, SequenceCounter, ToolType,
};

const MS: Nanos = 1_000_000;

/// Encodes a one-pointer record, decodes it again and feeds it to the engine.
fn feed(
    engine: &mut BatchingEngine,
    counter: &SequenceCounter,
    device_id: i32,
    action: MotionAction,
    t_ms: i64,
    x: f32,
    y: f32,
) -> Vec<DeliveredEvent> {
    let msg = InputMessage::motion(
        counter.next(),
        device_id,
        t_ms * MS,
        action,
        vec![Pointer::new(0, ToolType::Finger, x, y)],
    );
    let bytes = encode_message(&msg).expect("encode must succeed");
    let decoded = decode_message(&bytes).expect("decode must succeed");
    let MessageBody::Motion { action, pointers } = decoded.body else {
        panic!("expected a motion record");
    };
    engine
        .enqueue(
            decoded.header.seq,
            decoded.header.device_id,
            action,
            MotionSample::new(decoded.header.event_time, pointers),
        )
        .deliver
}

fn last_xy(delivered: &DeliveredEvent) -> (Nanos, f32, f32, bool) {
    let s = delivered.event.last_sample().expect("event has samples");
    let p = &s.pointers[0];
    (s.event_time, p.coords.x(), p.coords.y(), p.coords.is_resampled)
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_interpolation_then_extrapolation_across_frames() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    let down = feed(&mut engine, &counter, 0, MotionAction::Down, 0, 0.0, 0.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 10, 1.0, 2.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 15, 2.0, 4.0);

    // Act
    let frame1 = engine.drain(Some(16 * MS));
    let frame2 = engine.drain(Some(21 * MS));

    // Assert
    assert_eq!(down.len(), 1);
    assert_eq!(frame1.len(), 1);
    assert_eq!(frame1[0].seqs, vec![2]);
    let (t, x, y, resampled) = last_xy(&frame1[0]);
    assert_eq!(t, 11 * MS);
    assert_close(x, 1.2);
    assert_close(y, 2.4);
    assert!(resampled);

    assert_eq!(frame2[0].seqs, vec![3]);
    let (t, x, y, resampled) = last_xy(&frame2[0]);
    assert_eq!(t, 16 * MS);
    assert_close(x, 2.2);
    assert_close(y, 4.4);
    assert!(resampled);
}

#[test]
fn test_devices_are_batched_and_resampled_independently() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    feed(&mut engine, &counter, 0, MotionAction::Move, 5, 1.0, 2.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 10, 2.0, 4.0);
    feed(&mut engine, &counter, 1, MotionAction::Move, 20, 10.0, 10.0);
    feed(&mut engine, &counter, 1, MotionAction::Move, 25, 12.0, 14.0);

    // Act
    let first = engine.drain(Some(16 * MS));
    let second = engine.drain(Some(32 * MS));

    // Assert
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].event.device_id, 0);
    let (t, x, y, _) = last_xy(&first[0]);
    assert_eq!(t, 11 * MS);
    assert_close(x, 2.2);
    assert_close(y, 4.4);

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].event.device_id, 1);
    assert_eq!(second[0].seqs, vec![3, 4]);
    let (t, x, y, _) = last_xy(&second[0]);
    assert_eq!(t, 27 * MS);
    assert_close(x, 12.8);
    assert_close(y, 15.6);
}

#[test]
fn test_at_most_one_trailing_resampled_sample() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    for (i, t) in [2, 6, 10, 14].into_iter().enumerate() {
        feed(&mut engine, &counter, 0, MotionAction::Move, t, i as f32, 0.0);
    }

    // Act
    let drained = engine.drain(Some(24 * MS));

    // Assert
    let samples = &drained[0].event.samples;
    assert_eq!(samples.len(), 5);
    assert!(samples[..4].iter().all(|s| !s.is_resampled()));
    assert!(samples[4].is_resampled());
}

#[test]
fn test_stale_pointer_gets_fresh_forward_prediction() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    feed(&mut engine, &counter, 0, MotionAction::Move, 30, 100.0, 0.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 40, 120.0, 0.0);
    let first = engine.drain(Some(50 * MS));

    // Act
    feed(&mut engine, &counter, 0, MotionAction::Move, 48, 120.0, 0.0);
    let second = engine.drain(Some(58 * MS));

    // Assert
    let (_, x, _, _) = last_xy(&first[0]);
    assert_close(x, 130.0);
    let (t, x, _, resampled) = last_xy(&second[0]);
    assert_eq!(t, 52 * MS);
    assert_close(x, 128.0);
    assert!(resampled);
}

#[test]
fn test_late_sample_after_prediction_is_pinned_to_predicted_position() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    feed(&mut engine, &counter, 0, MotionAction::Down, 0, 10.0, 20.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 10, 20.0, 30.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 20, 30.0, 30.0);
    let first = engine.drain(Some(35 * MS));

    // Act: a real sample older than the 25 ms prediction arrives afterwards.
    feed(&mut engine, &counter, 0, MotionAction::Move, 24, 40.0, 30.0);
    let second = engine.drain(Some(50 * MS));

    // Assert
    let (t, x, y, resampled) = last_xy(&first[0]);
    assert_eq!(t, 25 * MS);
    assert_close(x, 35.0);
    assert_close(y, 30.0);
    assert!(resampled);

    let samples = &second[0].event.samples;
    assert_eq!(second[0].seqs, vec![4]);
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].event_time, 24 * MS);
    assert_close(samples[0].pointers[0].coords.x(), 35.0);
    assert_close(samples[0].pointers[0].coords.y(), 30.0);
    assert!(samples[0].is_resampled());
    assert_eq!(samples[1].event_time, 26 * MS);
    assert_close(samples[1].pointers[0].coords.x(), 45.0);
    assert_close(samples[1].pointers[0].coords.y(), 30.0);
    assert!(samples[1].is_resampled());
}

#[test]
fn test_extreme_event_times_are_delivered_without_resampling() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    engine.enqueue(
        1,
        0,
        MotionAction::Move,
        MotionSample::new(i64::MIN, vec![Pointer::new(0, ToolType::Finger, 1.0, 1.0)]),
    );
    engine.enqueue(
        2,
        0,
        MotionAction::Move,
        MotionSample::new(
            i64::MAX - 10 * MS,
            vec![Pointer::new(0, ToolType::Finger, 2.0, 2.0)],
        ),
    );

    // Act
    let first = engine.drain(Some(16 * MS));
    let second = engine.drain(Some(i64::MIN));
    let third = engine.drain(Some(i64::MAX));

    // Assert
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].seqs, vec![1]);
    assert_eq!(first[0].event.sample_count(), 1);
    assert!(second.is_empty());
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].seqs, vec![2]);
    assert!(third[0]
        .event
        .samples
        .iter()
        .all(|s| !s.is_resampled()));
}

#[test]
fn test_gesture_end_closes_batch_without_resampling() {
    // Arrange
    let mut engine = BatchingEngine::new(ResamplerFactory::default());
    let counter = SequenceCounter::new();
    feed(&mut engine, &counter, 0, MotionAction::Down, 0, 0.0, 0.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 5, 1.0, 1.0);

    // Act
    let delivered = feed(&mut engine, &counter, 0, MotionAction::Up, 10, 2.0, 2.0);

    // Assert
    assert_eq!(delivered.len(), 2);
    assert!(delivered
        .iter()
        .all(|d| d.event.samples.iter().all(|s| !s.is_resampled())));
    assert!(!engine.has_any_pending());
}

#[test]
fn test_disabled_resampling_delivers_real_samples_only() {
    let mut engine = BatchingEngine::new(ResamplerFactory::disabled());
    let counter = SequenceCounter::new();
    feed(&mut engine, &counter, 0, MotionAction::Move, 5, 1.0, 2.0);
    feed(&mut engine, &counter, 0, MotionAction::Move, 10, 2.0, 4.0);

    let drained = engine.drain(Some(16 * MS));

    assert_eq!(drained[0].event.sample_count(), 2);
    assert!(!drained[0].event.samples[1].is_resampled());
}

#[test]
fn test_filtered_engine_smooths_but_preserves_sample_count() {
    // Arrange
    let factory = ResamplerFactory::new(
        ResamplerConfig::default(),
        FilterConfig {
            enabled: true,
            min_cutoff_freq: 1.0,
            beta: 0.0,
        },
    );
    let mut engine = BatchingEngine::new(factory);
    let counter = SequenceCounter::new();
    let first = engine.enqueue(
        counter.next(),
        0,
        MotionAction::Move,
        MotionSample::new(5 * MS, vec![Pointer::new(0, ToolType::Finger, 0.0, 0.0)]),
    );
    engine.enqueue(
        counter.next(),
        0,
        MotionAction::Move,
        MotionSample::new(10 * MS, vec![Pointer::new(0, ToolType::Finger, 100.0, 0.0)]),
    );

    // Act
    let drained = engine.drain(Some(16 * MS));

    // Assert
    assert!(matches!(first.action, BatchAction::StartedNewBatch(_)));
    let samples = &drained[0].event.samples;
    assert_eq!(samples.len(), 3);
    let x = samples[1].pointers[0].coords.x();
    assert!(x > 0.0 && x < 100.0, "filtered x {x} should lag the raw 100");
}
