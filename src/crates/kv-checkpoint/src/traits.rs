//! The checkpoint saver contract
//!
//! [`CheckpointSaver`] is the surface the agent runtime talks to. Every
//! operation is addressed by a [`CheckpointConfig`], i.e. by
//! `(thread_id, checkpoint_ns, checkpoint_id?)`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            Agent runtime (caller)            │
//! │  put() once per step, put_writes() per task  │
//! └────────────────────┬─────────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────────┐
//! │        CheckpointSaver (this trait)          │
//! │  put / put_writes / get / get_tuple / list   │
//! │  delete_thread                               │
//! └────────────────────┬─────────────────────────┘
//!                      ▼
//! ┌──────────────────────────────────────────────┐
//! │  KvCheckpointSaver ── KeyValueBackend        │
//! │  (InMemoryBackend, RedisBackend, ...)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Missing versus broken
//!
//! Reads return `Ok(None)` / skip entries when a checkpoint is absent, has
//! expired, or cannot be decoded. Only transport failures surface as `Err`
//! on the read path, so a corrupted entry never blocks the rest of a
//! thread's history and a caller can always fall back to starting fresh.
//!
//! # Concurrency
//!
//! Implementations are `Send + Sync` and take no global lock. Two `put`
//! calls for the same checkpoint id both succeed and the later one wins.

use crate::{
    checkpoint::{
        ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
    },
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Type alias for async stream of checkpoint tuples
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Core trait for checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Fetch a checkpoint using the given configuration
    ///
    /// # Returns
    ///
    /// The requested checkpoint, or `None` if not found
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        if let Some(tuple) = self.get_tuple(config).await? {
            Ok(Some(tuple.checkpoint))
        } else {
            Ok(None)
        }
    }

    /// Retrieve a complete checkpoint tuple.
    ///
    /// * With `checkpoint_id`: that checkpoint.
    /// * Without: the latest checkpoint of `(thread_id, checkpoint_ns)`,
    ///   judged by the timestamp embedded in the checkpoint id.
    ///
    /// The tuple carries the checkpoint's pending writes and, when it has a
    /// parent, the parent's config.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(tuple))` - Checkpoint found and decoded
    /// - `Ok(None)` - Nothing stored, expired, or undecodable
    /// - `Err` - Missing `thread_id` or backend failure
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Stream checkpoints newest first.
    ///
    /// # Arguments
    ///
    /// * `config` - `thread_id` restricts to one thread and `checkpoint_ns`
    ///   to one namespace; `None` lists everything
    /// * `filter` - Metadata fields that must equal the given values
    /// * `before` - Excludes the single checkpoint with this config's
    ///   `checkpoint_id`; this is an identity filter, not a time cutoff
    /// * `limit` - Maximum number of tuples, applied after filtering
    ///
    /// The stream is finite, lazily loads one record per item and cannot be
    /// restarted. Undecodable entries are skipped.
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Store a checkpoint.
    ///
    /// `config.checkpoint_id`, if set, becomes the new checkpoint's parent.
    /// `new_versions` is accepted for callers that track per-step channel
    /// versions but is not stored; the versions persisted are the
    /// checkpoint's own `channel_versions`.
    ///
    /// # Returns
    ///
    /// The config addressing the stored checkpoint.
    ///
    /// # Errors
    ///
    /// [`MissingIdentifier`](crate::error::CheckpointError::MissingIdentifier)
    /// without a `thread_id`.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig>;

    /// Stage writes produced by `task_id` against the checkpoint in `config`.
    ///
    /// Writes are addressed by `(task_id, idx)`, so repeating a call
    /// overwrites the same slots. `idx` is the write's position in `writes`,
    /// except for the reserved channels `__error__`, `__scheduled__`,
    /// `__interrupt__` and `__resume__`, which take the fixed negative slots
    /// -1 to -4 (see [`reserved_write_index`](crate::writes::reserved_write_index)).
    /// The position is always kept in [`PendingWrite::global_idx`](crate::checkpoint::PendingWrite::global_idx).
    ///
    /// # Errors
    ///
    /// [`MissingIdentifier`](crate::error::CheckpointError::MissingIdentifier)
    /// without a `thread_id` or `checkpoint_id`.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Delete all checkpoints and writes of a thread, best effort.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
