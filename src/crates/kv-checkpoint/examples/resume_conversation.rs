//! Resume an interrupted conversation
//!
//! Records three steps of a conversation, stages the writes of a task that
//! finished before the fourth step, then resumes from the latest checkpoint
//! and forks from an earlier one.
//!
//! ```text
//! RUST_LOG=kv_checkpoint=debug cargo run --example resume_conversation
//! CHECKPOINT_TTL_SECONDS=3600 cargo run --example resume_conversation
//! ```

use futures::TryStreamExt;
use kv_checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    InMemoryBackend, KvCheckpointSaver, StoreConfig,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = StoreConfig::from_env("CHECKPOINT")?;
    tracing::info!(ttl_seconds = ?config.ttl_seconds, "store configured");
    let saver = KvCheckpointSaver::with_config(Arc::new(InMemoryBackend::new()), config)?;

    let thread = CheckpointConfig::for_thread("support-ticket-1138");
    let mut head = thread.clone();
    let mut messages = Vec::new();
    for (step, text) in ["my order is late", "let me check", "it ships tomorrow"].iter().enumerate() {
        messages.push(json!(text));
        let checkpoint = Checkpoint::empty().with_channel_value("messages", json!(messages));
        let source = if step == 0 { CheckpointSource::Input } else { CheckpointSource::Loop };
        let metadata = CheckpointMetadata::new().with_source(source).with_step(step as i32);
        head = saver.put(&head, checkpoint, metadata, HashMap::new()).await?;
        tracing::info!(checkpoint_id = ?head.checkpoint_id, step, "recorded step");
    }

    saver
        .put_writes(&head, vec![("messages".to_string(), json!("thanks!"))], "user-turn".to_string())
        .await?;

    let Some(latest) = saver.get_tuple(&thread).await? else {
        return Err("no checkpoint to resume from".into());
    };
    tracing::info!(
        checkpoint_id = %latest.checkpoint.id,
        pending = latest.pending_writes.len(),
        "resuming"
    );
    for write in &latest.pending_writes {
        tracing::info!(task_id = %write.task_id, channel = %write.channel, value = %write.value, "replaying write");
    }

    let history: Vec<_> = saver.list(Some(&thread), None, None, None).await?.try_collect().await?;
    tracing::info!(checkpoints = history.len(), "history loaded");

    // Fork from the first step: the new checkpoint's parent is the old one.
    if let Some(first) = history.last() {
        let fork = Checkpoint::empty().with_channel_value("messages", json!(["my order is late", "escalating"]));
        let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Fork).with_step(1);
        let forked = saver.put(&first.config, fork, metadata, HashMap::new()).await?;
        let lineage = saver.ancestors(&forked).await?;
        tracing::info!(checkpoint_id = ?forked.checkpoint_id, ancestors = lineage.len(), "forked");
    }

    saver.delete_thread("support-ticket-1138").await?;
    tracing::info!("thread deleted");
    Ok(())
}
