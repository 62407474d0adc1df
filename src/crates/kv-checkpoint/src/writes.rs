//! Pending write ledger
//!
//! Writes staged by a task during a step are stored one per key under the
//! checkpoint they target:
//!
//! ```text
//! checkpoint:{thread}:{ns}:{checkpoint_id}:write:{task_id}:{idx}
//! ```
//!
//! Each `(task_id, idx)` pair is its own slot, so writes from different
//! tasks never collide and a repeated `put_writes` for the same task
//! overwrites slot by slot. Writes to the reserved channels (errors,
//! scheduled work, interrupts, resume values) use fixed negative slots.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{KeyValueBackend, Record};
use crate::checkpoint::PendingWrite;
use crate::error::Result;
use crate::keys::{build_write_key, parse_write_key, writes_pattern, CheckpointKey};
use crate::scan::KeyScan;
use crate::serializer::{StoredPayload, TypedSerializer};

/// Channel carrying a task error
pub const ERROR: &str = "__error__";
/// Channel carrying scheduled follow-up work
pub const SCHEDULED: &str = "__scheduled__";
/// Channel carrying an interrupt raised by a task
pub const INTERRUPT: &str = "__interrupt__";
/// Channel carrying a resume value for an interrupted task
pub const RESUME: &str = "__resume__";

/// Fixed slot for writes to a reserved channel
pub fn reserved_write_index(channel: &str) -> Option<i64> {
    match channel {
        ERROR => Some(-1),
        SCHEDULED => Some(-2),
        INTERRUPT => Some(-3),
        RESUME => Some(-4),
        _ => None,
    }
}

/// Scalar fields of a stored write; the value is decoded separately
#[derive(Debug, Deserialize)]
struct WriteHeader {
    task_id: String,
    idx: i64,
    channel: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    global_idx: Option<i64>,
}

/// Records and retrieves the writes staged against checkpoints
pub struct PendingWriteLedger<S> {
    backend: Arc<dyn KeyValueBackend>,
    serializer: Arc<S>,
    scan_count: usize,
    ttl_seconds: Option<u64>,
}

impl<S> Clone for PendingWriteLedger<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: Arc::clone(&self.serializer),
            scan_count: self.scan_count,
            ttl_seconds: self.ttl_seconds,
        }
    }
}

impl<S: TypedSerializer> PendingWriteLedger<S> {
    pub fn new(
        backend: Arc<dyn KeyValueBackend>,
        serializer: Arc<S>,
        scan_count: usize,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            backend,
            serializer,
            scan_count,
            ttl_seconds,
        }
    }

    /// Store `writes` for `task_id` against `checkpoint`, one slot per write.
    ///
    /// Returns the keys written, in order.
    pub async fn put_writes(
        &self,
        checkpoint: &CheckpointKey,
        task_id: &str,
        writes: &[(String, Value)],
    ) -> Result<Vec<String>> {
        let checkpoint_key = checkpoint.to_key();
        let recorded_at = Utc::now().timestamp_millis();
        let mut written = Vec::with_capacity(writes.len());

        for (position, (channel, value)) in writes.iter().enumerate() {
            let position = position as i64;
            let idx = reserved_write_index(channel).unwrap_or(position);
            let (value_type, encoded) = self.serializer.dumps_text(value)?;

            let key = build_write_key(&checkpoint_key, task_id, idx);
            let record = write_record(checkpoint, task_id, idx, position, channel, value_type, encoded, recorded_at);
            self.backend.set_record(&key, record).await?;
            if let Some(ttl) = self.ttl_seconds {
                self.backend.expire(&key, ttl).await?;
            }
            written.push(key);
        }

        debug!(
            checkpoint_key = %checkpoint_key,
            task_id = %task_id,
            count = written.len(),
            "stored pending writes"
        );
        Ok(written)
    }

    /// Keys of every write stored under `checkpoint_key`.
    pub async fn write_keys(&self, checkpoint_key: &str) -> Result<Vec<String>> {
        KeyScan::new(
            Arc::clone(&self.backend),
            writes_pattern(checkpoint_key),
            self.scan_count,
        )
        .collect_remaining()
        .await
    }

    /// Load the writes of one checkpoint ordered by `(task_id, idx)`.
    ///
    /// Entries that cannot be parsed or decoded are logged and skipped.
    pub async fn get_pending_writes(&self, checkpoint_key: &str) -> Result<Vec<PendingWrite>> {
        let mut writes = Vec::new();
        for key in self.write_keys(checkpoint_key).await? {
            if let Err(e) = parse_write_key(&key) {
                warn!(key = %key, error = %e, "skipping malformed write key");
                continue;
            }
            let Some(record) = self.backend.get_record(&key).await? else {
                continue;
            };
            match self.decode_write(&record) {
                Ok(write) => writes.push(write),
                Err(e) => warn!(key = %key, error = %e, "skipping undecodable pending write"),
            }
        }

        writes.sort_by(|a, b| a.task_id.cmp(&b.task_id).then(a.idx.cmp(&b.idx)));
        Ok(writes)
    }

    /// Re-apply the configured TTL to every write of a checkpoint.
    pub async fn refresh_ttl(&self, checkpoint_key: &str) -> Result<()> {
        let Some(ttl) = self.ttl_seconds else {
            return Ok(());
        };
        for key in self.write_keys(checkpoint_key).await? {
            self.backend.expire(&key, ttl).await?;
        }
        Ok(())
    }

    fn decode_write(&self, record: &Record) -> Result<PendingWrite> {
        let header: WriteHeader = serde_json::from_value(Value::Object(record.clone()))?;
        let payload = StoredPayload::from_fields(record.get("value"), record.get("value_type"))?;
        let value: Value = payload.decode(self.serializer.as_ref())?;

        Ok(PendingWrite {
            global_idx: header.global_idx.unwrap_or(header.idx),
            task_id: header.task_id,
            channel: header.channel,
            value,
            idx: header.idx,
            recorded_at_millis: header.timestamp,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn write_record(
    checkpoint: &CheckpointKey,
    task_id: &str,
    idx: i64,
    position: i64,
    channel: &str,
    value_type: String,
    encoded: String,
    recorded_at: i64,
) -> Record {
    let mut record = Record::new();
    record.insert("thread_id".into(), json!(checkpoint.thread_id));
    record.insert("checkpoint_ns".into(), json!(checkpoint.checkpoint_ns));
    record.insert("checkpoint_id".into(), json!(checkpoint.checkpoint_id));
    record.insert("task_id".into(), json!(task_id));
    record.insert("idx".into(), json!(idx));
    record.insert("channel".into(), json!(channel));
    record.insert("value".into(), json!(encoded));
    record.insert("value_type".into(), json!(value_type));
    record.insert("timestamp".into(), json!(recorded_at));
    record.insert("global_idx".into(), json!(position));
    record
}
