use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fling::Histogram;

// Latency-like samples between 1us and ~1ms.
fn gen_samples(n: usize) -> Vec<f64> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            1_000.0 + (state % 1_000_000) as f64
        })
        .collect()
}

fn bench_histogram(c: &mut Criterion) {
    let samples = gen_samples(4096);
    let mut group = c.benchmark_group("fling_histogram");

    group.bench_function("insert", |b| {
        let mut histogram = Histogram::new(0.01, 60e9).unwrap();
        let mut i = 0;
        b.iter(|| {
            histogram.insert(black_box(samples[i & 4095])).unwrap();
            i += 1;
        })
    });

    let mut filled = Histogram::new(0.01, 60e9).unwrap();
    for &sample in &samples {
        filled.insert(sample).unwrap();
    }
    for p in [50.0, 99.9] {
        group.bench_with_input(BenchmarkId::new("percentile", p), &p, |b, &p| {
            b.iter(|| black_box(filled.percentile(p)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_histogram);
criterion_main!(benches);
