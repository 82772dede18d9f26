use agex_core::{sha256, Value};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn sample_value() -> Value {
    Value::list((0..256).map(|i| Value::Str(format!("item-{i}"))).collect())
}

fn bench_display_and_hash(c: &mut Criterion) {
    let value = sample_value();

    c.bench_function("value/display", |b| {
        b.iter(|| black_box(value.to_string()));
    });

    c.bench_function("value/sha256_of_display", |b| {
        b.iter(|| black_box(sha256(value.to_string().as_bytes())));
    });
}

criterion_group!(benches, bench_display_and_hash);
criterion_main!(benches);
