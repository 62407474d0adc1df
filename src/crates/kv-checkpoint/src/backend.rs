//! Key-value backend abstraction
//!
//! [`KeyValueBackend`] is the only thing the store knows about storage: a
//! structured record store with glob-pattern key enumeration and per-key
//! expiry, shaped after Redis. The store receives an already-connected
//! backend and never connects, pools or closes it.
//!
//! Patterns use Redis glob syntax: `*` matches any run of characters, `?`
//! one character, `[...]` a character class, and `\` escapes the next
//! character.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Structured record stored under one key
pub type Record = Map<String, Value>;

/// Cursor value that starts a scan and, when returned, ends it
pub const SCAN_START: u64 = 0;

/// Storage operations consumed by [`KvCheckpointSaver`](crate::saver::KvCheckpointSaver)
///
/// Transport failures should be reported as
/// [`CheckpointError::BackendUnavailable`](crate::error::CheckpointError::BackendUnavailable);
/// the store propagates them without retrying.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Store `record` at `key`, replacing any previous record and clearing
    /// any expiry on it
    async fn set_record(&self, key: &str, record: Record) -> Result<()>;

    /// Fetch the record at `key`, or `None` if absent or expired
    async fn get_record(&self, key: &str) -> Result<Option<Record>>;

    /// Return one page of keys matching `pattern`
    ///
    /// Start with [`SCAN_START`]; the scan is complete when the returned
    /// cursor is [`SCAN_START`] again. `count` is a hint for how much of the
    /// keyspace to examine per call. A page may be empty while the scan is
    /// still in progress.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)>;

    /// Delete the given keys, returning how many existed
    async fn delete_keys(&self, keys: &[String]) -> Result<usize>;

    /// Expire `key` after `seconds`; returns false if the key does not exist
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool>;

    /// Return every key matching `pattern` in a single call
    ///
    /// Only used where the keyspace is bounded per thread.
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;
}
