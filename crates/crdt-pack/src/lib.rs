//! Value model and CBOR codec shared by the JSON CRDT wire formats.
//!
//! - [`PackValue`]: a JSON superset with `undefined` and binary blobs.
//! - [`Writer`] / [`Reader`]: growable output buffer and bounds-checked
//!   input cursor.
//! - [`cbor`]: [`CborEncoder`] and [`CborDecoder`].

pub mod buffers;
pub mod cbor;
mod pack_value;

pub use buffers::{Reader, Writer};
pub use cbor::{CborDecoder, CborEncoder, CborError, FloatMode};
pub use pack_value::{PackValue, BYTES_DATA_URI_PREFIX};
