//! Criterion benchmarks for the frame decode paths.
//!
//! Run with: cargo bench --bench convert

use bayer_capture::buffer::FrameBuffer;
use bayer_capture::format::{FormatCode, FrameLayout};
use bayer_capture::ring::BufferRing;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const SIZES: [(&str, u32, u32); 3] = [("vga", 640, 480), ("1080p", 1920, 1080), ("5mp", 2592, 1944)];

fn textured_frame(width: u32, height: u32, format: FormatCode) -> FrameBuffer {
    let layout = FrameLayout::negotiate(width, height, format);
    let data = (0..layout.image_size())
        .map(|i| (i.wrapping_mul(31) ^ (i >> 7)) as u8)
        .collect();
    FrameBuffer::from_bytes(layout, data).unwrap()
}

fn convert_rgb565(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_rgb565");

    for (name, width, height) in SIZES {
        let frame = textured_frame(width, height, FormatCode::SGBRG10);
        let mut out = vec![0u16; width as usize * height as usize];

        group.throughput(Throughput::Elements(out.len() as u64));
        group.bench_with_input(BenchmarkId::new("10bit", name), &frame, |b, frame| {
            b.iter(|| frame.convert_to_rgb565(black_box(&mut out)).unwrap());
        });
    }

    group.finish();
}

fn convert_rgb888(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_rgb888");

    for format in [FormatCode::SRGGB8, FormatCode::SRGGB10, FormatCode::SRGGB10P] {
        let frame = textured_frame(1920, 1080, format);
        let mut out = vec![0u8; 1920 * 1080 * 3];

        group.throughput(Throughput::Bytes(out.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("1080p", format.to_string()),
            &frame,
            |b, frame| b.iter(|| frame.convert_to_rgb888(black_box(&mut out)).unwrap()),
        );
    }

    group.finish();
}

fn white_balance(c: &mut Criterion) {
    let mut frame = textured_frame(1920, 1080, FormatCode::SBGGR10);

    c.bench_function("white_balance_50x10", |b| {
        b.iter(|| frame.white_balance(black_box(50), black_box(10)))
    });
}

fn ring_round_trip(c: &mut Criterion) {
    let layout = FrameLayout::negotiate(640, 480, FormatCode::SRGGB8);
    let (mut producer, mut consumer) = BufferRing::allocate(4, &layout).unwrap();

    c.bench_function("ring_acquire_publish_release", |b| {
        b.iter(|| {
            let buffer = producer.try_acquire_free().unwrap();
            producer.publish(buffer).unwrap();
            black_box(consumer.try_acquire_ready().is_some());
            consumer.release();
        })
    });
}

criterion_group!(
    benches,
    convert_rgb565,
    convert_rgb888,
    white_balance,
    ring_round_trip
);
criterion_main!(benches);
