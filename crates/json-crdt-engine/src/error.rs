//! Crate-wide error taxonomy.

use crdt_pack::buffers::BufferError;
use crdt_pack::CborError;
use thiserror::Error;

/// Errors raised while building, encoding, decoding or applying CRDT data.
///
/// Protocol failures display as their stable upper-case code so that callers
/// can match on the string form across process boundaries.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrdtError {
    #[error("PATCH_EMPTY")]
    PatchEmpty,
    #[error("UNKNOWN_NODE")]
    UnknownNode,
    #[error("UNKNOWN_OP")]
    UnknownOp(u8),
    #[error("INVALID_OBJ")]
    InvalidObj,
    #[error("INVALID_VEC")]
    InvalidVec,
    #[error("INVALID_STR")]
    InvalidStr,
    #[error("INVALID_BIN")]
    InvalidBin,
    #[error("INVALID_ARR")]
    InvalidArr,
    #[error("TIME_TRAVEL")]
    TimeTravel,
    #[error("CLOCK_NOT_FOUND")]
    ClockNotFound,
    #[error("OUT_OF_BOUNDS")]
    OutOfBounds,
    #[error("INVALID_SERVER_SESSION")]
    InvalidServerSession,
    #[error("INVALID_CLOCK_TABLE")]
    InvalidClockTable,
    #[error("unexpected end of input")]
    Eof,
    #[error("cbor: {0}")]
    Cbor(CborError),
    #[error("invalid utf-8 sequence")]
    Utf8,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed input: {0}")]
    Format(String),
}

impl CrdtError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        CrdtError::Format(msg.into())
    }
}

impl From<BufferError> for CrdtError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::Eof => CrdtError::Eof,
            BufferError::Utf8 => CrdtError::Utf8,
        }
    }
}

impl From<CborError> for CrdtError {
    fn from(err: CborError) -> Self {
        match err {
            CborError::Buffer(inner) => inner.into(),
            other => CrdtError::Cbor(other),
        }
    }
}
