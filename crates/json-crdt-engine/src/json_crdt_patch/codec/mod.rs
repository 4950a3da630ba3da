//! Patch wire formats and the clock-table helpers the model codecs share.
//!
//! - [`binary`]: the primary compact binary format.
//! - [`compact`]: positional JSON arrays.
//! - [`verbose`]: self-describing JSON objects.

pub mod binary;
pub mod clock;
pub mod compact;
pub mod verbose;
