//! In-memory backend
//!
//! [`InMemoryBackend`] implements [`KeyValueBackend`] over a sorted map and
//! mirrors the Redis behaviour the store relies on: glob-pattern SCAN with a
//! numeric cursor that resumes after the last key examined (so keys removed
//! mid-scan never cause a live key to be skipped), per-key expiry that is checked lazily on access, and
//! `SET` clearing any previous expiry. It is suitable for development,
//! tests and single-process deployments.

use async_trait::async_trait;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::backend::{KeyValueBackend, Record, SCAN_START};
use crate::error::{CheckpointError, Result};

#[derive(Debug, Clone)]
struct Entry {
    record: Record,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| now >= at)
    }
}

/// Thread-safe in-memory key-value storage
type Storage = Arc<RwLock<BTreeMap<String, Entry>>>;

/// Open scan cursors, each mapped to the last key it examined
#[derive(Debug, Default)]
struct Cursors {
    next_id: AtomicU64,
    resume_after: Mutex<HashMap<u64, String>>,
}

/// In-memory key-value backend
///
/// Clones share the same storage, so a clone can be handed to the store
/// while the original is kept for inspection.
///
/// # Example
///
/// ```rust
/// use kv_checkpoint::{InMemoryBackend, KvCheckpointSaver};
/// use std::sync::Arc;
///
/// let saver = KvCheckpointSaver::new(Arc::new(InMemoryBackend::new()));
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    storage: Storage,
    cursors: Arc<Cursors>,
    available: Arc<AtomicBool>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend
    pub fn new() -> Self {
        Self {
            storage: Arc::new(RwLock::new(BTreeMap::new())),
            cursors: Arc::new(Cursors::default()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of live (unexpired) keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.storage
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live of `key`, if it exists and has an expiry
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let storage = self.storage.read().await;
        let entry = storage.get(key).filter(|entry| !entry.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut storage = self.storage.write().await;
        let before = storage.len();
        storage.retain(|_, entry| !entry.is_expired(now));
        before - storage.len()
    }

    /// Clear all keys
    pub async fn clear(&self) {
        self.storage.write().await.clear();
        self.cursors.resume_after.lock().await.clear();
    }

    /// Simulate a lost connection: while unavailable every operation fails
    /// with [`CheckpointError::BackendUnavailable`]
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CheckpointError::BackendUnavailable(
                "in-memory backend marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Translate a Redis-style glob into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push_str("(?s)^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                } else {
                    re.push_str(&regex::escape("\\"));
                }
            }
            '[' => {
                re.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    re.push('^');
                }
                let mut closed = false;
                for class_ch in chars.by_ref() {
                    if class_ch == ']' {
                        closed = true;
                        break;
                    }
                    match class_ch {
                        '\\' | '[' | '&' | '~' => {
                            re.push('\\');
                            re.push(class_ch);
                        }
                        other => re.push(other),
                    }
                }
                if !closed {
                    return Err(CheckpointError::InvalidRecord(format!(
                        "unterminated character class in pattern {:?}",
                        pattern
                    )));
                }
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| CheckpointError::InvalidRecord(format!("bad pattern: {}", e)))
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn set_record(&self, key: &str, record: Record) -> Result<()> {
        self.ensure_available()?;
        let mut storage = self.storage.write().await;
        storage.insert(
            key.to_string(),
            Entry {
                record,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn get_record(&self, key: &str) -> Result<Option<Record>> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut storage = self.storage.write().await;

        match storage.get(key) {
            Some(entry) if entry.is_expired(now) => {
                storage.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.record.clone())),
            None => Ok(None),
        }
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        self.ensure_available()?;
        let matcher = glob_to_regex(pattern)?;

        let resume_after = if cursor == SCAN_START {
            None
        } else {
            match self.cursors.resume_after.lock().await.remove(&cursor) {
                Some(key) => Some(key),
                // Unknown or already consumed cursor: nothing left to return.
                None => return Ok((SCAN_START, Vec::new())),
            }
        };

        let now = Instant::now();
        let storage = self.storage.read().await;
        let lower = match resume_after.as_deref() {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut remaining = storage.range::<str, _>((lower, Bound::Unbounded)).peekable();

        let mut last_examined = None;
        let mut keys = Vec::new();
        for _ in 0..count.max(1) {
            let Some((key, entry)) = remaining.next() else {
                break;
            };
            if !entry.is_expired(now) && matcher.is_match(key) {
                keys.push(key.clone());
            }
            last_examined = Some(key.clone());
        }

        let next_cursor = match (remaining.peek(), last_examined) {
            (Some(_), Some(last)) => {
                let id = self.cursors.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                self.cursors.resume_after.lock().await.insert(id, last);
                id
            }
            _ => SCAN_START,
        };
        Ok((next_cursor, keys))
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut storage = self.storage.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| storage.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(removed)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut storage = self.storage.write().await;
        match storage.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_available()?;
        let matcher = glob_to_regex(pattern)?;
        let now = Instant::now();
        let storage = self.storage.read().await;
        Ok(storage
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
