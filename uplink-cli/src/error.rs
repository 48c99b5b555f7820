use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parameter error: {0}")]
    Key(#[from] uplink_engine::KeyError),

    #[error("Cache error: {0}")]
    Cache(#[from] uplink_engine::CacheError),

    #[error("Upload error: {0}")]
    Transport(#[from] uplink_engine::TransportError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
