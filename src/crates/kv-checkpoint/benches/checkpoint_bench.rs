use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::TryStreamExt;
use kv_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryBackend,
    KvCheckpointSaver,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn saver() -> KvCheckpointSaver {
    KvCheckpointSaver::new(Arc::new(InMemoryBackend::new()))
}

async fn seeded_thread(saver: &KvCheckpointSaver, thread_id: &str, count: usize) -> CheckpointConfig {
    let mut config = CheckpointConfig::for_thread(thread_id);
    for step in 0..count {
        let checkpoint = Checkpoint::empty().with_channel_value("step", json!(step));
        config = saver
            .put(&config, checkpoint, CheckpointMetadata::new().with_step(step as i32), HashMap::new())
            .await
            .unwrap();
    }
    config
}

fn checkpoint_put_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = saver();
    let config = CheckpointConfig::for_thread("bench-thread");

    c.bench_function("checkpoint put", |b| {
        b.to_async(&runtime).iter(|| async {
            let checkpoint = Checkpoint::empty().with_channel_value("messages", json!(["hello"]));
            saver
                .put(&config, black_box(checkpoint), CheckpointMetadata::new(), HashMap::new())
                .await
                .unwrap();
        });
    });
}

fn checkpoint_latest_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = saver();
    runtime.block_on(seeded_thread(&saver, "bench-thread", 100));
    let config = CheckpointConfig::for_thread("bench-thread");

    c.bench_function("checkpoint latest of 100", |b| {
        b.to_async(&runtime).iter(|| async {
            saver.get_tuple(black_box(&config)).await.unwrap();
        });
    });
}

fn checkpoint_list_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let saver = saver();
    runtime.block_on(seeded_thread(&saver, "bench-thread", 100));
    let config = CheckpointConfig::for_thread("bench-thread");

    c.bench_function("checkpoint list 10 of 100", |b| {
        b.to_async(&runtime).iter(|| async {
            let page: Vec<_> = saver
                .list(Some(&config), None, None, Some(10))
                .await
                .unwrap()
                .try_collect()
                .await
                .unwrap();
            black_box(page);
        });
    });
}

criterion_group!(
    benches,
    checkpoint_put_benchmark,
    checkpoint_latest_benchmark,
    checkpoint_list_benchmark
);
criterion_main!(benches);
