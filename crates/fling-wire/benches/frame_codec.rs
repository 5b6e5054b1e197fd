use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fling_wire::{decode_frame_from_slice, encode_frame, encode_frame_into, Frame};

fn gen_message(len: usize) -> Frame {
    let mut payload = vec![0u8; len];
    for (i, b) in payload.iter_mut().enumerate() {
        *b = (i as u8).wrapping_mul(31).wrapping_add(7);
    }
    Frame::Message { call: 1, payload }
}

fn bench_frame_codec(c: &mut Criterion) {
    let sizes = [1usize, 128, 1024, 16384];
    let mut group = c.benchmark_group("fling_frame_codec");
    for &size in &sizes {
        let frame = gen_message(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode_into", size), &frame, |b, f| {
            let mut buf = Vec::with_capacity(32 + size);
            b.iter(|| {
                buf.clear();
                encode_frame_into(f, &mut buf).unwrap();
            })
        });

        let encoded = encode_frame(&frame).unwrap();
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, e| {
            b.iter(|| {
                let _ = decode_frame_from_slice(e.as_slice()).unwrap();
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame_codec);
criterion_main!(benches);
