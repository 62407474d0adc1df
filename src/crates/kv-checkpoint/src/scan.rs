//! Cursor-based key enumeration
//!
//! [`KeyScan`] walks the keys matching a pattern one backend page at a time,
//! holding only the opaque cursor, the current page and an exhausted flag
//! between calls, plus the keys already yielded: Redis may report a key in
//! more than one page, and each key is yielded once. [`scan_keys`] wraps the same state as a
//! [`futures::Stream`]. Neither can be rewound: start a new scan to
//! enumerate again.

use futures::stream::{self, Stream};
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use crate::backend::{KeyValueBackend, SCAN_START};
use crate::error::Result;

/// Default page size hint passed to the backend
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Stream of keys produced by a scan
pub type KeyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send + 'static>>;

/// State of an in-progress scan
pub struct KeyScan {
    backend: Arc<dyn KeyValueBackend>,
    pattern: String,
    count: usize,
    cursor: u64,
    page: VecDeque<String>,
    exhausted: bool,
    seen: HashSet<String>,
}

impl KeyScan {
    pub fn new(backend: Arc<dyn KeyValueBackend>, pattern: impl Into<String>, count: usize) -> Self {
        Self {
            backend,
            pattern: pattern.into(),
            count: count.max(1),
            cursor: SCAN_START,
            page: VecDeque::new(),
            exhausted: false,
            seen: HashSet::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the backend has signalled the end of the scan and the
    /// buffered page is drained
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.page.is_empty()
    }

    /// Next matching key, fetching pages as needed.
    ///
    /// Backend errors end the scan.
    pub async fn next_key(&mut self) -> Result<Option<String>> {
        loop {
            while let Some(key) = self.page.pop_front() {
                if self.seen.insert(key.clone()) {
                    return Ok(Some(key));
                }
            }
            if self.exhausted {
                return Ok(None);
            }

            let fetched = self
                .backend
                .scan(self.cursor, &self.pattern, self.count)
                .await;
            let (next_cursor, keys) = match fetched {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Err(e);
                }
            };
            self.cursor = next_cursor;
            self.exhausted = next_cursor == SCAN_START;
            self.page.extend(keys);
        }
    }

    /// Drain the rest of the scan.
    pub async fn collect_remaining(&mut self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        while let Some(key) = self.next_key().await? {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Turn the scan into a stream.
    pub fn into_stream(self) -> KeyStream {
        Box::pin(stream::try_unfold(self, |mut scan| async move {
            Ok(scan.next_key().await?.map(|key| (key, scan)))
        }))
    }
}

/// Scan `pattern` lazily, `count` keys examined per backend call.
pub fn scan_keys(backend: Arc<dyn KeyValueBackend>, pattern: &str, count: usize) -> KeyStream {
    KeyScan::new(backend, pattern, count).into_stream()
}
