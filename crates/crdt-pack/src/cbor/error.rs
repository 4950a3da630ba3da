use thiserror::Error;

use crate::buffers::BufferError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CborError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("invalid cbor payload")]
    InvalidPayload,
    #[error("unsupported cbor major type {0}")]
    Unsupported(u8),
    #[error("expected a cbor text string")]
    ExpectedString,
}
