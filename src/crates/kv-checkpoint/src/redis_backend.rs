//! Redis backend
//!
//! Records are stored as JSON strings with `SET`, so a plain Redis server is
//! enough. Key enumeration uses `SCAN ... MATCH ... COUNT` and expiry uses
//! `EXPIRE`. `SET` drops any previous expiry, which is the behaviour
//! [`KeyValueBackend::set_record`] asks for.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use serde_json::Value;
use tracing::warn;

use crate::backend::{KeyValueBackend, Record};
use crate::error::{CheckpointError, Result};

fn unavailable(error: RedisError) -> CheckpointError {
    CheckpointError::BackendUnavailable(error.to_string())
}

/// [`KeyValueBackend`] over a multiplexed Redis connection
///
/// The connection manager reconnects on its own; cloning the backend shares
/// the underlying connection.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Open a connection manager for `url`, e.g. `redis://127.0.0.1:6379/0`
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let conn = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl KeyValueBackend for RedisBackend {
    async fn set_record(&self, key: &str, record: Record) -> Result<()> {
        let payload = serde_json::to_string(&record)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, payload).await.map_err(unavailable)
    }

    async fn get_record(&self, key: &str) -> Result<Option<Record>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(unavailable)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(record)) => Ok(Some(record)),
            Ok(_) => {
                warn!(key = %key, "stored value is not a JSON object");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "stored value is not JSON");
                Ok(None)
            }
        }
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<(u64, Vec<String>)> {
        let mut conn = self.conn.clone();
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async::<_, (u64, Vec<String>)>(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del::<_, usize>(keys).await.map_err(unavailable)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let seconds = i64::try_from(seconds)
            .map_err(|_| CheckpointError::Config(format!("ttl out of range: {}", seconds)))?;
        let mut conn = self.conn.clone();
        conn.expire::<_, bool>(key, seconds).await.map_err(unavailable)
    }

    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys::<_, Vec<String>>(pattern).await.map_err(unavailable)
    }
}
