//! Document snapshot formats.
//!
//! - [`structural`]: the whole tree in one blob (binary, compact JSON,
//!   verbose JSON).
//! - [`indexed`]: one binary field per node, for storage that updates
//!   nodes individually.
//! - [`sidecar`]: the plain view plus a metadata blob holding ids and
//!   tombstones.

pub mod indexed;
pub mod sidecar;
pub mod structural;

use crdt_pack::{Reader, Writer};

use crate::error::CrdtError;
use crate::json_crdt::model::{Model, ModelClock};
use crate::json_crdt_patch::clock::{ClockVector, ServerClockVector};
use crate::json_crdt_patch::codec::clock::ClockTable;
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::util::binary::{CrdtReader, CrdtWriter};

/// Writes a node's type-length octet: the data type in the top three bits,
/// the length inline below 31 or as a trailing `vu57`.
pub(crate) fn write_tl(w: &mut Writer, data_type: DataType, len: u64) {
    let major = (data_type as u8) << 5;
    if len < 31 {
        w.u8(major | len as u8);
    } else {
        w.u8(major | 31);
        w.vu57(len);
    }
}

pub(crate) fn read_tl(r: &mut Reader<'_>) -> Result<(DataType, u64), CrdtError> {
    let octet = r.u8()?;
    let data_type = DataType::try_from(octet >> 5)?;
    let len = match octet & 0b11111 {
        31 => r.vu57()?,
        n => n as u64,
    };
    Ok((data_type, len))
}

/// Reference table for codecs that write their clock up front. A server
/// clock becomes a single `SERVER` entry.
pub(crate) fn clock_table(model: &Model) -> ClockTable {
    match &model.clock {
        ModelClock::Logical(clock) => ClockTable::from_clock(clock),
        ModelClock::Server(clock) => ClockTable::from_clock(&ClockVector::new(session::SERVER, clock.time)),
    }
}

/// Inverse of [`clock_table`].
pub(crate) fn table_clock(table: &ClockTable) -> Result<ModelClock, CrdtError> {
    match table.by_idx.as_slice() {
        [only] if only.sid == session::SERVER => Ok(ModelClock::Server(ServerClockVector::new(only.time + 1))),
        _ => Ok(ModelClock::Logical(table.to_clock()?)),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fmt::Debug;

    use crate::json_crdt::model::Model;
    use crate::json_crdt::nodes::rga::{ChunkData, Rga};
    use crate::json_crdt::nodes::JsonNode;

    fn chunks<T: ChunkData + Debug>(rga: &Rga<T>) -> Vec<String> {
        rga.iter()
            .map(|c| format!("{:?}+{} del={} {:?}", c.id, c.span, c.del, c.data))
            .collect()
    }

    fn describe(node: &JsonNode) -> String {
        match node {
            JsonNode::Str(n) => format!("str {:?} {:?}", n.id, chunks(&n.rga)),
            JsonNode::Bin(n) => format!("bin {:?} {:?}", n.id, chunks(&n.rga)),
            JsonNode::Arr(n) => format!("arr {:?} {:?}", n.id, chunks(&n.rga)),
            other => format!("{other:?}"),
        }
    }

    /// Same root, same node ids and same per-node state, chunk boundaries
    /// and tombstones included.
    pub(crate) fn assert_same_document(a: &Model, b: &Model) {
        assert_eq!(a.root.val, b.root.val);
        assert_eq!(a.view_pack(), b.view_pack());
        let mut left: Vec<String> = a.index.values().map(describe).collect();
        let mut right: Vec<String> = b.index.values().map(describe).collect();
        left.sort();
        right.sort();
        assert_eq!(left, right);
    }
}
