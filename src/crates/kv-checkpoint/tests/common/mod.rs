//! Common test utilities and setup

#![allow(dead_code)]

use kv_checkpoint::id::checkpoint_id_at;
use kv_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointTuple,
    InMemoryBackend, KvCheckpointSaver, StoreConfig,
};
use futures::TryStreamExt;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route store logs to the test writer; set RUST_LOG to see them
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A fresh backend and a saver over it with the given configuration
pub fn setup_store(config: StoreConfig) -> (InMemoryBackend, KvCheckpointSaver) {
    init_tracing();
    let backend = InMemoryBackend::new();
    let saver = KvCheckpointSaver::with_config(Arc::new(backend.clone()), config)
        .expect("valid store config");
    (backend, saver)
}

/// Checkpoint whose id encodes `millis`
pub fn checkpoint_at(millis: u64) -> Checkpoint {
    Checkpoint::new(checkpoint_id_at(millis), HashMap::new(), HashMap::new(), HashMap::new())
        .with_channel_value("at", json!(millis))
}

/// Store checkpoints at each of `millis` as a chain, returning their configs
pub async fn put_chain(
    saver: &KvCheckpointSaver,
    base: &CheckpointConfig,
    millis: &[u64],
) -> Vec<CheckpointConfig> {
    let mut parent = base.clone();
    let mut saved = Vec::with_capacity(millis.len());
    for (step, at) in millis.iter().enumerate() {
        parent = saver
            .put(
                &parent,
                checkpoint_at(*at),
                CheckpointMetadata::new().with_step(step as i32),
                HashMap::new(),
            )
            .await
            .expect("put checkpoint");
        saved.push(parent.clone());
    }
    saved
}

/// Collect a `list` call into a vector
pub async fn list_all(
    saver: &KvCheckpointSaver,
    config: Option<&CheckpointConfig>,
    before: Option<&CheckpointConfig>,
    limit: Option<usize>,
) -> Vec<CheckpointTuple> {
    saver
        .list(config, None, before, limit)
        .await
        .expect("list")
        .try_collect()
        .await
        .expect("list stream")
}

/// Checkpoint id carried by a stored config
pub fn id_of(config: &CheckpointConfig) -> String {
    config.checkpoint_id.clone().expect("stored config carries a checkpoint id")
}

pub fn ids(tuples: &[CheckpointTuple]) -> Vec<String> {
    tuples.iter().map(|t| t.checkpoint.id.clone()).collect()
}
