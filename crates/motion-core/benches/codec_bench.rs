//! Criterion benchmarks for the input channel codec.
//!
//! A 200 Hz producer with ten fingers down writes a ten-pointer motion record
//! every 5 ms; decoding must stay a negligible share of that budget.
//!
//! Run with:
//! ```bash
//! cargo bench --package motion-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use motion_core::{
    decode_message, encode_message, AxisId, InputMessage, KeyAction, MessageBody, MessageHeader,
    MotionAction, Pointer, ToolType,
};

// ── Record fixtures ───────────────────────────────────────────────────────────

fn make_motion(pointer_count: i32) -> InputMessage {
    let pointers = (0..pointer_count)
        .map(|id| {
            let mut p = Pointer::new(id, ToolType::Finger, 100.0 + id as f32, 200.0);
            p.coords.set_axis(AxisId::PRESSURE, 0.8);
            p.coords.set_axis(AxisId::TOUCH_MAJOR, 12.0);
            p
        })
        .collect();
    InputMessage::motion(1, 4, 16_000_000, MotionAction::Move, pointers)
}

fn make_key() -> InputMessage {
    InputMessage {
        header: MessageHeader {
            seq: 1,
            device_id: 2,
            event_time: 0,
        },
        body: MessageBody::Key {
            action: KeyAction::Down,
            key_code: 29,
            scan_code: 30,
            meta_state: 0,
            repeat_count: 0,
            down_time: 0,
        },
    }
}

fn fixtures() -> Vec<(&'static str, InputMessage)> {
    vec![
        ("Finished", InputMessage::finished(1, true, 0)),
        ("Key", make_key()),
        ("Motion(1)", make_motion(1)),
        ("Motion(10)", make_motion(10)),
        ("Timeline", InputMessage::timeline(1, 10, 20)),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_message");
    for (name, msg) in fixtures() {
        group.bench_with_input(BenchmarkId::new("record", name), &msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_message");
    for (name, msg) in fixtures() {
        let bytes = encode_message(&msg).expect("encode must succeed for benchmark setup");
        group.bench_with_input(BenchmarkId::new("record", name), &bytes, |b, bytes| {
            b.iter(|| decode_message(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
