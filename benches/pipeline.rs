use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use inferline::{FrameInfo, InferPipeline};

fn feed_two_batches(c: &mut Criterion) {
    c.bench_function("feed_two_batches_of_four", |b| {
        b.iter_batched(
            || InferPipeline::builder(4).build(),
            |mut pipeline| {
                let mut cards = Vec::with_capacity(8);
                for i in 0..2u32 {
                    for j in 0..4u32 {
                        let timestamp = i64::from(i * 4 + j);
                        cards.push(pipeline.feed_data(FrameInfo::new(timestamp, i, j)));
                    }
                }
                for card in &cards {
                    card.wait_for_call();
                }
                pipeline.shutdown();
            },
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, feed_two_batches);
criterion_main!(benches);
