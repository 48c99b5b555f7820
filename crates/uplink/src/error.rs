use std::sync::Arc;

use reqwest::StatusCode;

/// Errors raised while building request parameters for a fingerprint
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Parameter '{key}' cannot be serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the cache store while (re)configuring its storage.
///
/// Reads and writes never surface these; they degrade to a miss instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

/// Terminal failure of an upload.
///
/// Cloneable so that every terminal observer of a handle receives the same value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Upload cancelled")]
    Cancelled,

    #[error("Server returned status code {0}")]
    Status(StatusCode),

    #[error("Network error: {source}")]
    Network {
        #[from]
        source: Arc<reqwest::Error>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to build upload request: {0}")]
    Build(String),

    #[error("Transport closed before reporting a result")]
    Disconnected,
}

// Manual implementation because of the Arc wrapping.
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Network {
            source: Arc::new(err),
        }
    }
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

/// Crate level error
#[derive(Debug, thiserror::Error)]
pub enum UplinkError {
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
