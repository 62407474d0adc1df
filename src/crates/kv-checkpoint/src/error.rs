//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
///
/// Only [`MissingIdentifier`](CheckpointError::MissingIdentifier) and
/// [`BackendUnavailable`](CheckpointError::BackendUnavailable) escape the
/// read path of [`KvCheckpointSaver`](crate::saver::KvCheckpointSaver).
/// Decode failures on stored entries are logged and the entry is treated as
/// absent.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A required identifier was absent on a write call
    #[error("Missing identifier: {0} is required")]
    MissingIdentifier(&'static str),

    /// Stored payload names an encoding this serializer cannot read
    #[error("Unsupported type tag: {0}")]
    UnsupportedTypeTag(String),

    /// Stored key does not have the expected structure
    #[error("Malformed key {key:?}: {reason}")]
    KeyParse { key: String, reason: String },

    /// Transport or connection failure in the backend
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Text-safe payload could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    /// Stored record is missing fields or has the wrong shape
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    pub(crate) fn key_parse(key: &str, reason: impl Into<String>) -> Self {
        Self::KeyParse {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from reading a stored entry rather than from
    /// the caller or the transport.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedTypeTag(_)
                | Self::KeyParse { .. }
                | Self::Serialization(_)
                | Self::BinarySerialization(_)
                | Self::Encoding(_)
                | Self::InvalidRecord(_)
        )
    }
}
