//! Checkpoint store over a key-value backend
//!
//! [`KvCheckpointSaver`] implements [`CheckpointSaver`] on top of any
//! [`KeyValueBackend`]. Each checkpoint is one structured record:
//!
//! | Field | Content |
//! |-------|---------|
//! | `thread_id`, `checkpoint_ns`, `checkpoint_id` | Address |
//! | `checkpoint`, `checkpoint_type` | Base64 state payload and its type tag |
//! | `metadata`, `metadata_type` | Base64 metadata payload and its type tag |
//! | `checkpoint_ts` | Snapshot time, unix milliseconds |
//! | `has_writes` | Raised once writes are staged against the checkpoint |
//! | `parent_checkpoint_id` | Parent in the same (thread, namespace), if any |
//! | `source`, `step` | Copied from metadata for inspection without decoding |
//!
//! Pending writes live in sibling keys managed by [`PendingWriteLedger`].
//!
//! # Last write wins
//!
//! There is no compare-and-swap: two `put` calls for the same checkpoint id
//! both succeed and the later record replaces the earlier one. Callers are
//! expected to advance a (thread, namespace) from a single writer.

use async_trait::async_trait;
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{KeyValueBackend, Record};
use crate::checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
    PendingWrite,
};
use crate::config::StoreConfig;
use crate::error::{CheckpointError, Result};
use crate::id::compare_ids;
use crate::keys::{
    all_pattern, build_key, is_write_key, namespace_pattern, parse_key, thread_pattern,
    CheckpointKey,
};
use crate::scan::KeyScan;
use crate::serializer::{JsonPlusSerializer, StoredPayload, TypedSerializer};
use crate::traits::{CheckpointSaver, CheckpointStream};
use crate::writes::PendingWriteLedger;

#[derive(Serialize)]
struct StoredCheckpoint<'a> {
    thread_id: &'a str,
    checkpoint_ns: &'a str,
    checkpoint_id: &'a str,
    checkpoint: String,
    metadata: String,
    checkpoint_type: String,
    metadata_type: String,
    checkpoint_ts: i64,
    has_writes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_checkpoint_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<i32>,
}

/// Fields read back alongside the payloads
#[derive(Debug, Default, Deserialize)]
struct CheckpointHeader {
    #[serde(default)]
    parent_checkpoint_id: Option<String>,
}

/// Checkpoint store backed by a [`KeyValueBackend`]
///
/// The backend is shared and owned by the caller; cloning the saver shares
/// it too.
///
/// # Example
///
/// ```rust,no_run
/// use kv_checkpoint::{
///     Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver, InMemoryBackend,
///     KvCheckpointSaver, StoreConfig,
/// };
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = Arc::new(InMemoryBackend::new());
///     let saver = KvCheckpointSaver::with_config(backend, StoreConfig::new().with_ttl_seconds(3600))?;
///
///     let config = CheckpointConfig::for_thread("conversation-1");
///     let saved = saver
///         .put(&config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
///         .await?;
///
///     let latest = saver.get_tuple(&config).await?;
///     assert_eq!(latest.map(|t| t.config), Some(saved));
///     Ok(())
/// }
/// ```
pub struct KvCheckpointSaver<S = JsonPlusSerializer> {
    backend: Arc<dyn KeyValueBackend>,
    serializer: Arc<S>,
    config: StoreConfig,
    writes: PendingWriteLedger<S>,
}

impl<S> Clone for KvCheckpointSaver<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: Arc::clone(&self.serializer),
            config: self.config.clone(),
            writes: self.writes.clone(),
        }
    }
}

impl KvCheckpointSaver<JsonPlusSerializer> {
    /// Saver with default configuration
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self::with_serializer(backend, JsonPlusSerializer::new(), StoreConfig::default())
    }

    /// Saver with the given configuration, validated
    pub fn with_config(backend: Arc<dyn KeyValueBackend>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_serializer(backend, JsonPlusSerializer::new(), config))
    }
}

impl<S: TypedSerializer + 'static> KvCheckpointSaver<S> {
    /// Saver with a custom serializer
    pub fn with_serializer(backend: Arc<dyn KeyValueBackend>, serializer: S, config: StoreConfig) -> Self {
        let serializer = Arc::new(serializer);
        let writes = PendingWriteLedger::new(
            Arc::clone(&backend),
            Arc::clone(&serializer),
            config.scan_count,
            config.ttl_seconds,
        );
        Self {
            backend,
            serializer,
            config,
            writes,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueBackend> {
        &self.backend
    }

    /// Writes staged against the checkpoint addressed by `config`
    pub async fn get_pending_writes(&self, config: &CheckpointConfig) -> Result<Vec<PendingWrite>> {
        let key = checkpoint_key(config)?;
        self.writes.get_pending_writes(&key.to_key()).await
    }

    /// Walk the parent links of the checkpoint addressed by `config`.
    ///
    /// Returns the ancestors newest first, stopping at the root, at a parent
    /// that is missing or undecodable, or at a link that revisits a
    /// checkpoint.
    pub async fn ancestors(&self, config: &CheckpointConfig) -> Result<Vec<CheckpointTuple>> {
        let mut lineage = Vec::new();
        let Some(start) = self.get_tuple(config).await? else {
            return Ok(lineage);
        };

        let mut seen = HashSet::from([start.checkpoint_id().to_string()]);
        let mut next = start.parent_config;
        while let Some(parent) = next {
            let Some(tuple) = self.get_tuple(&parent).await? else {
                debug!(checkpoint_id = ?parent.checkpoint_id, "lineage ends at missing parent");
                break;
            };
            if !seen.insert(tuple.checkpoint_id().to_string()) {
                warn!(checkpoint_id = %tuple.checkpoint_id(), "cycle in checkpoint lineage");
                break;
            }
            next = tuple.parent_config.clone();
            lineage.push(tuple);
        }
        Ok(lineage)
    }

    /// Key of the newest checkpoint in `(thread_id, checkpoint_ns)`.
    async fn resolve_latest(&self, thread_id: &str, checkpoint_ns: &str) -> Result<Option<String>> {
        let keys = self
            .backend
            .list_keys(&namespace_pattern(thread_id, checkpoint_ns))
            .await?;

        let latest = keys
            .into_iter()
            .filter(|key| !is_write_key(key))
            .filter_map(|key| match parse_key(&key) {
                Ok(parsed) => Some((parsed.checkpoint_id, key)),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping malformed checkpoint key");
                    None
                }
            })
            .max_by(|a, b| compare_ids(&a.0, &b.0))
            .map(|(_, key)| key);

        debug!(thread_id = %thread_id, checkpoint_ns = %checkpoint_ns, latest = ?latest, "resolved latest checkpoint");
        Ok(latest)
    }

    /// Load and decode one checkpoint record with its writes.
    ///
    /// Absent, malformed and undecodable records all yield `None`.
    async fn load_tuple(&self, key: &str) -> Result<Option<CheckpointTuple>> {
        let parsed = match parse_key(key) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key = %key, error = %e, "skipping malformed checkpoint key");
                return Ok(None);
            }
        };
        let Some(record) = self.backend.get_record(key).await? else {
            return Ok(None);
        };
        let (checkpoint, metadata, header) = match self.decode_record(&record) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(key = %key, error = %e, "skipping undecodable checkpoint");
                return Ok(None);
            }
        };
        let pending_writes = self.writes.get_pending_writes(key).await?;

        let config = CheckpointConfig::new()
            .with_thread_id(parsed.thread_id.clone())
            .with_checkpoint_ns(parsed.checkpoint_ns.clone())
            .with_checkpoint_id(parsed.checkpoint_id.clone());
        let mut tuple =
            CheckpointTuple::new(config, checkpoint, metadata).with_pending_writes(pending_writes);
        if let Some(parent_id) = header.parent_checkpoint_id {
            tuple = tuple.with_parent_config(
                CheckpointConfig::new()
                    .with_thread_id(parsed.thread_id)
                    .with_checkpoint_ns(parsed.checkpoint_ns)
                    .with_checkpoint_id(parent_id),
            );
        }
        Ok(Some(tuple))
    }

    fn decode_record(&self, record: &Record) -> Result<(Checkpoint, CheckpointMetadata, CheckpointHeader)> {
        let header: CheckpointHeader = serde_json::from_value(Value::Object(record.clone()))?;

        let state = StoredPayload::from_fields(record.get("checkpoint"), record.get("checkpoint_type"))?;
        if state.is_legacy() {
            debug!("decoding checkpoint through legacy fallback");
        }
        let checkpoint: Checkpoint = state.decode(self.serializer.as_ref())?;

        let metadata = match record.get("metadata") {
            None | Some(Value::Null) => CheckpointMetadata::default(),
            Some(payload) => StoredPayload::from_fields(Some(payload), record.get("metadata_type"))?
                .decode(self.serializer.as_ref())?,
        };
        Ok((checkpoint, metadata, header))
    }

    /// Raise `has_writes` on a stored checkpoint, if it exists.
    async fn mark_has_writes(&self, key: &str) -> Result<()> {
        let Some(mut record) = self.backend.get_record(key).await? else {
            debug!(key = %key, "writes staged before their checkpoint was stored");
            return Ok(());
        };
        if record.get("has_writes") == Some(&Value::Bool(true)) {
            return Ok(());
        }
        record.insert("has_writes".to_string(), Value::Bool(true));
        self.backend.set_record(key, record).await?;
        self.apply_ttl(key).await
    }

    async fn apply_ttl(&self, key: &str) -> Result<()> {
        if let Some(ttl) = self.config.ttl_seconds {
            self.backend.expire(key, ttl).await?;
        }
        Ok(())
    }

    async fn refresh_ttl(&self, key: &str) -> Result<()> {
        if self.config.ttl_seconds.is_none() {
            return Ok(());
        }
        self.apply_ttl(key).await?;
        self.writes.refresh_ttl(key).await
    }

    fn list_pattern(config: Option<&CheckpointConfig>) -> String {
        match config.and_then(|cfg| cfg.thread_id.as_deref().map(|t| (t, cfg))) {
            Some((thread_id, cfg)) => match cfg.checkpoint_ns.as_deref() {
                Some(ns) => namespace_pattern(thread_id, ns),
                None => thread_pattern(thread_id),
            },
            None => all_pattern(),
        }
    }
}

/// Address carried by a config, with the root namespace default applied
fn checkpoint_key(config: &CheckpointConfig) -> Result<CheckpointKey> {
    let thread_id = config
        .thread_id
        .as_deref()
        .ok_or(CheckpointError::MissingIdentifier("thread_id"))?;
    let checkpoint_id = config
        .checkpoint_id
        .as_deref()
        .ok_or(CheckpointError::MissingIdentifier("checkpoint_id"))?;
    Ok(CheckpointKey::new(thread_id, config.namespace(), checkpoint_id))
}

fn into_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(record) => Ok(record),
        other => Err(CheckpointError::InvalidRecord(format!(
            "expected an object, serialized to {}",
            other
        ))),
    }
}

/// Remaining work of a `list` stream
struct ListState<S> {
    saver: KvCheckpointSaver<S>,
    keys: std::vec::IntoIter<String>,
    filter: HashMap<String, Value>,
    remaining: Option<usize>,
}

#[async_trait]
impl<S: TypedSerializer + 'static> CheckpointSaver for KvCheckpointSaver<S> {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let thread_id = config
            .thread_id
            .as_deref()
            .ok_or(CheckpointError::MissingIdentifier("thread_id"))?;
        let checkpoint_ns = config.namespace();

        let key = match config.checkpoint_id.as_deref() {
            Some(checkpoint_id) => build_key(thread_id, checkpoint_ns, checkpoint_id),
            None => match self.resolve_latest(thread_id, checkpoint_ns).await? {
                Some(key) => key,
                None => return Ok(None),
            },
        };

        let tuple = self.load_tuple(&key).await?;
        if tuple.is_some() && self.config.refresh_on_read {
            self.refresh_ttl(&key).await?;
        }
        Ok(tuple)
    }

    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        let pattern = Self::list_pattern(config);
        let only_id = config.and_then(|cfg| cfg.checkpoint_id.clone());
        let before_id = before.and_then(|cfg| cfg.checkpoint_id.clone());

        let mut scan = KeyScan::new(Arc::clone(&self.backend), pattern, self.config.scan_count);
        let mut entries: Vec<(String, String)> = Vec::new();
        while let Some(key) = scan.next_key().await? {
            if is_write_key(&key) {
                continue;
            }
            let parsed = match parse_key(&key) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping malformed checkpoint key");
                    continue;
                }
            };
            if only_id.as_ref().map_or(false, |id| *id != parsed.checkpoint_id) {
                continue;
            }
            if before_id.as_ref() == Some(&parsed.checkpoint_id) {
                continue;
            }
            entries.push((parsed.checkpoint_id, key));
        }
        entries.sort_by(|a, b| compare_ids(&b.0, &a.0));

        let state = ListState {
            saver: self.clone(),
            keys: entries
                .into_iter()
                .map(|(_, key)| key)
                .collect::<Vec<_>>()
                .into_iter(),
            filter: filter.unwrap_or_default(),
            remaining: limit,
        };

        let stream = stream::try_unfold(state, |mut state| async move {
            if state.remaining == Some(0) {
                return Ok(None);
            }
            while let Some(key) = state.keys.next() {
                let Some(tuple) = state.saver.load_tuple(&key).await? else {
                    continue;
                };
                if !tuple.metadata.matches(&state.filter) {
                    continue;
                }
                state.remaining = state.remaining.map(|n| n - 1);
                return Ok(Some((tuple, state)));
            }
            Ok(None)
        });
        Ok(Box::pin(stream))
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        _new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig> {
        let thread_id = config
            .thread_id
            .as_deref()
            .ok_or(CheckpointError::MissingIdentifier("thread_id"))?;
        if checkpoint.id.is_empty() {
            return Err(CheckpointError::MissingIdentifier("checkpoint.id"));
        }
        let checkpoint_ns = config.namespace();
        let key = build_key(thread_id, checkpoint_ns, &checkpoint.id);

        let (checkpoint_type, checkpoint_text) = self.serializer.dumps_text(&checkpoint)?;
        let (metadata_type, metadata_text) = self.serializer.dumps_text(&metadata)?;
        let record = into_record(&StoredCheckpoint {
            thread_id,
            checkpoint_ns,
            checkpoint_id: &checkpoint.id,
            checkpoint: checkpoint_text,
            metadata: metadata_text,
            checkpoint_type,
            metadata_type,
            checkpoint_ts: checkpoint.ts.timestamp_millis(),
            has_writes: false,
            parent_checkpoint_id: config.checkpoint_id.as_deref(),
            source: metadata.source.map(|source| source.as_str()),
            step: metadata.step,
        })?;

        self.backend.set_record(&key, record).await?;
        self.refresh_ttl(&key).await?;
        debug!(key = %key, parent = ?config.checkpoint_id, "stored checkpoint");

        Ok(CheckpointConfig::new()
            .with_thread_id(thread_id.to_string())
            .with_checkpoint_ns(checkpoint_ns.to_string())
            .with_checkpoint_id(checkpoint.id))
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()> {
        let checkpoint = checkpoint_key(config)?;
        self.writes.put_writes(&checkpoint, &task_id, &writes).await?;
        self.mark_has_writes(&checkpoint.to_key()).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let keys = self.backend.list_keys(&thread_pattern(thread_id)).await?;
        let mut deleted = 0;
        for batch in keys.chunks(self.config.delete_batch_size) {
            deleted += self.backend.delete_keys(batch).await?;
        }
        debug!(thread_id = %thread_id, deleted, "deleted thread");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{ChannelVersion, CheckpointSource};
    use crate::id::checkpoint_id_at;
    use crate::memory::InMemoryBackend;
    use futures::TryStreamExt;
    use serde_json::json;

    fn saver(backend: &InMemoryBackend) -> KvCheckpointSaver {
        KvCheckpointSaver::new(Arc::new(backend.clone()))
    }

    fn checkpoint_at(millis: u64) -> Checkpoint {
        Checkpoint::new(checkpoint_id_at(millis), HashMap::new(), HashMap::new(), HashMap::new())
    }

    #[tokio::test]
    async fn test_save_and_load_checkpoint() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let checkpoint = Checkpoint::empty().with_channel_value("messages", json!(["hi"]));
        let metadata = CheckpointMetadata::new().with_source(CheckpointSource::Input);
        let config = CheckpointConfig::for_thread("thread-1");

        let saved_config = saver
            .put(&config, checkpoint.clone(), metadata.clone(), HashMap::new())
            .await
            .unwrap();
        assert_eq!(saved_config.checkpoint_id.as_deref(), Some(checkpoint.id.as_str()));
        assert_eq!(saved_config.checkpoint_ns.as_deref(), Some(""));

        let tuple = saver.get_tuple(&saved_config).await.unwrap().unwrap();
        assert_eq!(tuple.checkpoint, checkpoint);
        assert_eq!(tuple.metadata, metadata);
        assert_eq!(tuple.config, saved_config);
        assert!(tuple.parent_config.is_none());
        assert!(tuple.pending_writes.is_empty());
    }

    #[tokio::test]
    async fn test_stored_record_fields() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let checkpoint = checkpoint_at(5_000);
        let parent = CheckpointConfig::for_thread("T").with_checkpoint_id("parent".to_string());
        saver
            .put(
                &parent,
                checkpoint.clone(),
                CheckpointMetadata::new().with_source(CheckpointSource::Loop).with_step(2),
                HashMap::new(),
            )
            .await
            .unwrap();

        let record = backend
            .get_record(&build_key("T", "", &checkpoint.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["thread_id"], json!("T"));
        assert_eq!(record["checkpoint_ns"], json!(""));
        assert_eq!(record["checkpoint_type"], json!("json"));
        assert_eq!(record["metadata_type"], json!("json"));
        assert_eq!(record["checkpoint_ts"], json!(checkpoint.ts.timestamp_millis()));
        assert_eq!(record["has_writes"], json!(false));
        assert_eq!(record["parent_checkpoint_id"], json!("parent"));
        assert_eq!(record["source"], json!("loop"));
        assert_eq!(record["step"], json!(2));
        assert!(record["checkpoint"].is_string());
    }

    #[tokio::test]
    async fn test_put_requires_thread_id() {
        let saver = saver(&InMemoryBackend::new());
        let err = saver
            .put(&CheckpointConfig::new(), Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::MissingIdentifier("thread_id")));
    }

    #[tokio::test]
    async fn test_put_writes_requires_checkpoint_id() {
        let saver = saver(&InMemoryBackend::new());
        let err = saver
            .put_writes(&CheckpointConfig::for_thread("T"), vec![], "task".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::MissingIdentifier("checkpoint_id")));
    }

    #[tokio::test]
    async fn test_put_writes_marks_checkpoint() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let saved = saver
            .put(&CheckpointConfig::for_thread("T"), checkpoint_at(1_000), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();

        saver
            .put_writes(&saved, vec![("out".to_string(), json!(1))], "task".to_string())
            .await
            .unwrap();

        let key = checkpoint_key(&saved).unwrap().to_key();
        let record = backend.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record["has_writes"], json!(true));

        let tuple = saver.get_tuple(&saved).await.unwrap().unwrap();
        assert_eq!(tuple.pending_writes.len(), 1);
        assert_eq!(tuple.pending_writes[0].channel, "out");
    }

    #[tokio::test]
    async fn test_latest_ignores_other_namespaces() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let root = CheckpointConfig::for_thread("T");
        let sub = CheckpointConfig::for_thread("T").with_checkpoint_ns("sub".to_string());

        let c1 = checkpoint_at(1_000);
        saver.put(&root, c1.clone(), CheckpointMetadata::new(), HashMap::new()).await.unwrap();
        saver.put(&sub, checkpoint_at(9_000), CheckpointMetadata::new(), HashMap::new()).await.unwrap();

        let latest = saver.get_tuple(&root).await.unwrap().unwrap();
        assert_eq!(latest.checkpoint.id, c1.id);
    }

    #[tokio::test]
    async fn test_list_filter_by_metadata() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let config = CheckpointConfig::for_thread("T");
        for step in 0..4 {
            let metadata = CheckpointMetadata::new()
                .with_step(step)
                .with_extra("approved".to_string(), json!(step % 2 == 0));
            saver
                .put(&config, checkpoint_at(1_000 + step as u64), metadata, HashMap::new())
                .await
                .unwrap();
        }

        let filter = HashMap::from([("approved".to_string(), json!(true))]);
        let steps: Vec<_> = saver
            .list(Some(&config), Some(filter), None, None)
            .await
            .unwrap()
            .map_ok(|t| t.metadata.step)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(steps, vec![Some(2), Some(0)]);
    }

    #[tokio::test]
    async fn test_ancestors_follow_parent_links() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let mut config = CheckpointConfig::for_thread("T");
        let mut ids = Vec::new();
        for millis in [1_000, 2_000, 3_000] {
            let checkpoint = checkpoint_at(millis);
            ids.push(checkpoint.id.clone());
            config = saver
                .put(&config, checkpoint, CheckpointMetadata::new(), HashMap::new())
                .await
                .unwrap();
        }

        let lineage = saver.ancestors(&config).await.unwrap();
        let lineage_ids: Vec<_> = lineage.iter().map(|t| t.checkpoint.id.clone()).collect();
        assert_eq!(lineage_ids, vec![ids[1].clone(), ids[0].clone()]);
    }

    #[tokio::test]
    async fn test_legacy_record_is_readable() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let checkpoint = checkpoint_at(1_000);

        let mut record = Record::new();
        record.insert("thread_id".into(), json!("T"));
        record.insert("checkpoint".into(), serde_json::to_value(&checkpoint).unwrap());
        record.insert("metadata".into(), json!({"step": 7}));
        backend
            .set_record(&build_key("T", "", &checkpoint.id), record)
            .await
            .unwrap();

        let tuple = saver
            .get_tuple(&CheckpointConfig::for_thread("T"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tuple.checkpoint, checkpoint);
        assert_eq!(tuple.metadata.step, Some(7));
    }

    #[tokio::test]
    async fn test_undecodable_checkpoint_reads_as_missing() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let saved = saver
            .put(&CheckpointConfig::for_thread("T"), checkpoint_at(1_000), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();

        let key = checkpoint_key(&saved).unwrap().to_key();
        let mut record = backend.get_record(&key).await.unwrap().unwrap();
        record.insert("checkpoint_type".into(), json!("pickle"));
        backend.set_record(&key, record).await.unwrap();

        assert!(saver.get_tuple(&saved).await.unwrap().is_none());
        assert!(saver.get(&CheckpointConfig::for_thread("T")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_versions_are_not_persisted() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let mut checkpoint = checkpoint_at(1_000);
        checkpoint
            .channel_versions
            .insert("messages".to_string(), ChannelVersion::Int(2));
        let new_versions = HashMap::from([("messages".to_string(), ChannelVersion::Int(7))]);

        let saved = saver
            .put(&CheckpointConfig::for_thread("T"), checkpoint.clone(), CheckpointMetadata::new(), new_versions)
            .await
            .unwrap();

        let stored = saver.get_tuple(&saved).await.unwrap().unwrap();
        assert_eq!(stored.checkpoint.channel_versions, checkpoint.channel_versions);
    }

    #[tokio::test]
    async fn test_reserved_channel_writes_take_negative_slots() {
        let backend = InMemoryBackend::new();
        let saver = saver(&backend);
        let saved = saver
            .put(&CheckpointConfig::for_thread("T"), checkpoint_at(1_000), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap();

        saver
            .put_writes(
                &saved,
                vec![
                    ("out".to_string(), json!(1)),
                    (crate::writes::INTERRUPT.to_string(), json!({"reason": "approval"})),
                ],
                "task".to_string(),
            )
            .await
            .unwrap();

        let slots: Vec<_> = saver
            .get_pending_writes(&saved)
            .await
            .unwrap()
            .iter()
            .map(|w| (w.channel.clone(), w.idx, w.global_idx))
            .collect();
        assert_eq!(
            slots,
            vec![
                (crate::writes::INTERRUPT.to_string(), -3, 1),
                ("out".to_string(), 0, 0),
            ]
        );
    }
}
