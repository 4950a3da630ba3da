//! Binary patch format.
//!
//! ```text
//! vu57 sid | vu57 time | meta | vu57 op_count | op*
//! ```
//!
//! `meta` is CBOR `undefined` when absent, otherwise a one-element CBOR
//! array holding the value. Each op starts with `opcode << 3 | len` where a
//! `len` of 1..=7 is inline and 0 means a `vu57` length follows. Op ids are
//! implicit: they continue from the header time. Referenced ids of the
//! patch's own session are `b1vu56(0, time)`, others `b1vu56(1, time)`
//! followed by `vu57 sid`.

mod decoder;
mod encoder;

pub use decoder::Decoder;
pub use encoder::Encoder;

use crate::error::CrdtError;
use crate::json_crdt_patch::patch::Patch;

pub fn encode(patch: &Patch) -> Result<Vec<u8>, CrdtError> {
    Encoder::new().encode(patch)
}

pub fn decode(data: &[u8]) -> Result<Patch, CrdtError> {
    Decoder::new().decode(data)
}
