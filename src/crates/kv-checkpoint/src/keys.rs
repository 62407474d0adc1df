//! Storage key codec
//!
//! Every entry lives under a single flat keyspace:
//!
//! ```text
//! checkpoint:{thread_id}:{checkpoint_ns}:{checkpoint_id}
//! checkpoint:{thread_id}:{checkpoint_ns}:{checkpoint_id}:write:{task_id}:{idx}
//! ```
//!
//! Segments are percent-escaped (`%` → `%25`, `:` → `%3A`) before they are
//! joined, so a thread id such as `user:42` cannot bleed into the namespace
//! segment. Percent escaping keeps backslashes out of stored keys, which
//! leaves `\` free to act as the glob escape in scan patterns.

use crate::error::{CheckpointError, Result};

/// Leading segment of every checkpoint key
pub const CHECKPOINT_PREFIX: &str = "checkpoint";

/// Marker segment separating a checkpoint key from its write suffix
pub const WRITE_MARKER: &str = "write";

const SEPARATOR: char = ':';

/// Decoded checkpoint record key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub thread_id: String,
    pub checkpoint_ns: String,
    pub checkpoint_id: String,
}

impl CheckpointKey {
    pub fn new(
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: impl Into<String>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: checkpoint_ns.into(),
            checkpoint_id: checkpoint_id.into(),
        }
    }

    /// Encode back to the storage key
    pub fn to_key(&self) -> String {
        build_key(&self.thread_id, &self.checkpoint_ns, &self.checkpoint_id)
    }
}

/// Decoded pending-write key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WriteKey {
    pub checkpoint: CheckpointKey,
    pub task_id: String,
    pub idx: i64,
}

/// Escape a single key segment.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        match ch {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            other => out.push(other),
        }
    }
    out
}

/// Reverse [`escape_segment`]. `key` is only used for error reporting.
fn unescape_segment(segment: &str, key: &str) -> Result<String> {
    let mut out = String::with_capacity(segment.len());
    let mut chars = segment.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "3A" | "3a" => out.push(':'),
            _ => {
                return Err(CheckpointError::key_parse(
                    key,
                    format!("invalid escape sequence %{}", code),
                ))
            }
        }
    }
    Ok(out)
}

/// Escape glob metacharacters so an escaped segment matches literally.
fn glob_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Build the record key for a checkpoint.
pub fn build_key(thread_id: &str, checkpoint_ns: &str, checkpoint_id: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        CHECKPOINT_PREFIX,
        escape_segment(thread_id),
        escape_segment(checkpoint_ns),
        escape_segment(checkpoint_id),
        sep = SEPARATOR
    )
}

/// Build the key of one pending write slot under a checkpoint key.
pub fn build_write_key(checkpoint_key: &str, task_id: &str, idx: i64) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        checkpoint_key,
        WRITE_MARKER,
        escape_segment(task_id),
        idx,
        sep = SEPARATOR
    )
}

fn split_checked<'a>(key: &'a str, expected: usize) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    if parts.len() != expected {
        return Err(CheckpointError::key_parse(
            key,
            format!("expected {} segments, found {}", expected, parts.len()),
        ));
    }
    if parts[0] != CHECKPOINT_PREFIX {
        return Err(CheckpointError::key_parse(
            key,
            format!("expected prefix {:?}", CHECKPOINT_PREFIX),
        ));
    }
    Ok(parts)
}

fn checkpoint_from_parts(parts: &[&str], key: &str) -> Result<CheckpointKey> {
    let checkpoint_id = unescape_segment(parts[3], key)?;
    if checkpoint_id.is_empty() {
        return Err(CheckpointError::key_parse(key, "empty checkpoint id"));
    }
    Ok(CheckpointKey {
        thread_id: unescape_segment(parts[1], key)?,
        checkpoint_ns: unescape_segment(parts[2], key)?,
        checkpoint_id,
    })
}

/// Parse a checkpoint record key. Write keys are rejected.
pub fn parse_key(key: &str) -> Result<CheckpointKey> {
    let parts = split_checked(key, 4)?;
    checkpoint_from_parts(&parts, key)
}

/// Parse a pending-write key.
pub fn parse_write_key(key: &str) -> Result<WriteKey> {
    let parts = split_checked(key, 7)?;
    if parts[4] != WRITE_MARKER {
        return Err(CheckpointError::key_parse(
            key,
            format!("expected {:?} marker", WRITE_MARKER),
        ));
    }
    let idx = parts[6]
        .parse::<i64>()
        .map_err(|e| CheckpointError::key_parse(key, format!("bad write index: {}", e)))?;
    Ok(WriteKey {
        checkpoint: checkpoint_from_parts(&parts, key)?,
        task_id: unescape_segment(parts[5], key)?,
        idx,
    })
}

/// Whether `key` addresses a pending write rather than a checkpoint record.
pub fn is_write_key(key: &str) -> bool {
    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    parts.len() == 7 && parts[4] == WRITE_MARKER
}

/// Pattern matching every key of a thread, writes included.
pub fn thread_pattern(thread_id: &str) -> String {
    format!(
        "{}{sep}{}{sep}*",
        CHECKPOINT_PREFIX,
        glob_literal(&escape_segment(thread_id)),
        sep = SEPARATOR
    )
}

/// Pattern matching every key of one (thread, namespace), writes included.
///
/// Callers filter write keys out with [`parse_key`].
pub fn namespace_pattern(thread_id: &str, checkpoint_ns: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}{sep}*",
        CHECKPOINT_PREFIX,
        glob_literal(&escape_segment(thread_id)),
        glob_literal(&escape_segment(checkpoint_ns)),
        sep = SEPARATOR
    )
}

/// Pattern matching the pending writes of one checkpoint.
pub fn writes_pattern(checkpoint_key: &str) -> String {
    format!(
        "{}{sep}{}{sep}*",
        glob_literal(checkpoint_key),
        WRITE_MARKER,
        sep = SEPARATOR
    )
}

/// Pattern matching the whole checkpoint keyspace.
pub fn all_pattern() -> String {
    format!("{}{}*", CHECKPOINT_PREFIX, SEPARATOR)
}
