//! Queue, duplicate filter and scheduler error types.

use thiserror::Error;

use crawlq_core::{CodecError, ConfigError};
use crawlq_storage::StorageError;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("scheduler is not open")]
    NotOpen,
}
