//! Benchmarks the write -> propagate -> flush path through a chain of
//! derived expressions feeding one observer.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use weft_core::reactive::Runtime;

fn write_and_flush(c: &mut Criterion) {
    let rt = Runtime::new();
    let input = rt.value(0u64);

    let mut stage = {
        let input = input.clone();
        rt.derived(move || Ok(input.get()? + 1))
    };
    for _ in 0..32 {
        let upstream = stage.clone();
        stage = rt.derived(move || Ok(upstream.get()? + 1));
    }

    let sink = stage.clone();
    let _observer = rt
        .observe(move || {
            black_box(sink.get()?);
            Ok(())
        })
        .expect("observer construction");

    let mut tick = 0u64;
    c.bench_function("write_propagate_flush_depth_32", |b| {
        b.iter(|| {
            tick += 1;
            input.set(tick).expect("value is writable");
            rt.flush().expect("flush settles");
        })
    });
}

criterion_group!(benches, write_and_flush);
criterion_main!(benches);
