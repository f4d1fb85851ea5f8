//! Store errors

use thiserror::Error;

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Failures of the durable tier.
///
/// Access denials are not errors: reads return `None` and writes are logged
/// and skipped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend failure: {0}")]
    Backend(String),

    #[error("record codec failure: {0}")]
    Codec(#[from] bincode::Error),
}
