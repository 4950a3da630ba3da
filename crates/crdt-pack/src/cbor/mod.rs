//! CBOR (RFC 8949) encoder and decoder over [`PackValue`](crate::PackValue).

pub mod constants;
mod decoder;
mod encoder;
mod error;

pub use decoder::CborDecoder;
pub use encoder::{CborEncoder, FloatMode};
pub use error::CborError;
