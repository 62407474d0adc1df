//! # kv-checkpoint - Checkpoint Persistence over a Key-Value Store
//!
//! **Durable, branch-aware snapshots of agent conversation state** stored in a
//! key-value backend with pattern scanning and per-key expiry (Redis, or the
//! bundled in-memory backend).
//!
//! ## Overview
//!
//! An agent runtime records a checkpoint after every step of a conversation.
//! This crate persists those checkpoints so the conversation can be resumed,
//! inspected or branched later:
//!
//! - **Resume** - Load the latest checkpoint of a thread
//! - **History** - List a thread's checkpoints newest first
//! - **Branching** - Every checkpoint remembers its parent, so earlier
//!   checkpoints can be forked
//! - **Partial progress** - Writes produced by tasks of an unfinished step are
//!   staged against the checkpoint and replayed on resume
//! - **Retention** - Optional TTL on everything a checkpoint owns
//!
//! ## Core Concepts
//!
//! ### 1. Addressing
//!
//! A checkpoint is addressed by `(thread_id, checkpoint_ns, checkpoint_id)`.
//! The namespace separates sub-conversations of a thread; the root namespace
//! is the empty string. Checkpoint ids are UUIDv7 strings, so "latest" is
//! decided by the timestamp embedded in the id (see [`id`]).
//!
//! ### 2. Key Layout
//!
//! ```text
//! checkpoint:{thread_id}:{checkpoint_ns}:{checkpoint_id}
//! checkpoint:{thread_id}:{checkpoint_ns}:{checkpoint_id}:write:{task_id}:{idx}
//! ```
//!
//! Segments are escaped, so ids containing `:` or glob metacharacters are
//! stored and scanned safely (see [`keys`]).
//!
//! ### 3. Payloads
//!
//! Checkpoint state, metadata and write values are encoded by a
//! [`TypedSerializer`] into `(type tag, bytes)`, then base64 wrapped so every
//! backend can store them as text. Records written before type tags existed
//! are still readable (see [`serializer`]).
//!
//! ### 4. Failure Model
//!
//! Missing, expired and undecodable checkpoints read as "nothing there";
//! backend failures are errors. One corrupt record never hides the rest of a
//! thread's history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kv_checkpoint::{
//!     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, CheckpointSource,
//!     InMemoryBackend, KvCheckpointSaver,
//! };
//! use futures::TryStreamExt;
//! use serde_json::json;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = KvCheckpointSaver::new(Arc::new(InMemoryBackend::new()));
//!     let thread = CheckpointConfig::for_thread("conversation-42");
//!
//!     // Step 1
//!     let checkpoint = Checkpoint::empty().with_channel_value("messages", json!(["hello"]));
//!     let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input).with_step(0);
//!     let saved = saver.put(&thread, checkpoint, metadata, HashMap::new()).await?;
//!
//!     // A task finished before the next step was recorded
//!     saver
//!         .put_writes(&saved, vec![("messages".into(), json!("hi!"))], "agent".into())
//!         .await?;
//!
//!     // Resume
//!     if let Some(tuple) = saver.get_tuple(&thread).await? {
//!         println!("resuming {} with {} staged writes", tuple.checkpoint.id, tuple.pending_writes.len());
//!     }
//!
//!     // History, newest first
//!     let history: Vec<_> = saver.list(Some(&thread), None, None, Some(10)).await?.try_collect().await?;
//!     println!("{} checkpoints", history.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Agent runtime (caller)                 │
//! └────────────────────┬────────────────────────────────────┘
//!                      │ CheckpointSaver
//!                      ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   KvCheckpointSaver                     │
//! │  keys ── serializer ── PendingWriteLedger ── KeyScan    │
//! └────────────────────┬────────────────────────────────────┘
//!                      │ KeyValueBackend
//!         ┌────────────┴────────────┐
//!         ▼                         ▼
//!  ┌──────────────┐        ┌─────────────────┐
//!  │  In-Memory   │        │  Redis          │
//!  │              │        │ (feature)       │
//!  └──────────────┘        └─────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`saver`] - [`KvCheckpointSaver`], the [`CheckpointSaver`] implementation
//! - [`traits`] - [`CheckpointSaver`] trait and [`CheckpointStream`]
//! - [`checkpoint`] - [`Checkpoint`], [`CheckpointConfig`], [`CheckpointMetadata`], [`CheckpointTuple`]
//! - [`writes`] - [`PendingWriteLedger`] and reserved write slots
//! - [`keys`] - Key construction, parsing and scan patterns
//! - [`scan`] - Cursor-based key scanning
//! - [`serializer`] - [`TypedSerializer`] and [`JsonPlusSerializer`]
//! - [`backend`] - [`KeyValueBackend`] trait
//! - [`memory`] - [`InMemoryBackend`]
//! - [`id`] - Time-ordered checkpoint ids
//! - [`config`] - [`StoreConfig`]
//! - [`error`] - [`CheckpointError`]
//!
//! ## Features
//!
//! - `redis` - [`RedisBackend`](redis_backend::RedisBackend) over a
//!   multiplexed Redis connection

pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod id;
pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod saver;
pub mod scan;
pub mod serializer;
pub mod traits;
pub mod writes;

// Re-export main types
pub use backend::{KeyValueBackend, Record, SCAN_START};
pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
    CheckpointMetadata, CheckpointSource, CheckpointTuple, PendingWrite,
};
pub use config::StoreConfig;
pub use error::{CheckpointError, Result};
pub use keys::{build_key, build_write_key, parse_key, parse_write_key, CheckpointKey, WriteKey};
pub use memory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use saver::KvCheckpointSaver;
pub use scan::{scan_keys, KeyScan};
pub use serializer::{JsonPlusSerializer, SerializationFormat, StoredPayload, TypedSerializer};
pub use traits::{CheckpointSaver, CheckpointStream};
pub use writes::PendingWriteLedger;
