//! Reserved timestamps.

use crate::json_crdt_patch::clock::Ts;
use crate::json_crdt_patch::enums::{session, system_time};

/// The "no reference" sentinel and the id of the document root register.
pub const ORIGIN: Ts = Ts::new(session::SYSTEM, system_time::ORIGIN);

/// Id of the shared `undefined` constant.
pub const UNDEFINED: Ts = Ts::new(session::SYSTEM, system_time::UNDEFINED);

/// Longest `vec` a patch may address.
pub const MAX_TUPLE_LENGTH: usize = 256;
