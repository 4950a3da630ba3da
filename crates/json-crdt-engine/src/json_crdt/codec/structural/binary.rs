//! Structural binary snapshot.
//!
//! Logical clock:
//! ```text
//! u32 table_offset | node tree | vu57 count | (vu57 sid, vu57 time)*
//! ```
//! `table_offset` counts from the end of the offset itself. Ids are
//! `id(session_index, time_diff)` against the trailing table, whose first
//! entry is the local session.
//!
//! Server clock:
//! ```text
//! 0x80 | vu57 time | node tree
//! ```
//! Ids are `vu57(time - id.time)`.
//!
//! A node is `id | type-length | payload`; the type-length octet holds the
//! data type in its top three bits. A single `0` byte where a node is
//! expected stands for `undefined` (an empty root or a vec hole).
//!
//! | type | length            | payload                                      |
//! |------|-------------------|----------------------------------------------|
//! | con  | 0 or 1            | CBOR value, or the referenced id             |
//! | val  | 0                 | child node                                   |
//! | obj  | key count         | (CBOR key, child node)*                      |
//! | vec  | slot count        | child node per slot                          |
//! | str  | chunk count       | (id, CBOR text or CBOR uint tombstone span)* |
//! | bin  | chunk count       | (id, b1vu56(deleted, span), bytes if live)*  |
//! | arr  | chunk count       | (id, b1vu56(deleted, span), nodes if live)*  |

use crdt_pack::{CborDecoder, CborEncoder, PackValue, Reader};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt::codec::{read_tl, write_tl};
use crate::json_crdt::model::{Model, ModelClock};
use crate::json_crdt::nodes::{ArrNode, BinNode, ConNode, JsonNode, ObjNode, StrNode, ValNode, VecNode};
use crate::json_crdt_patch::clock::{ts, ServerClockVector, Ts};
use crate::json_crdt_patch::codec::clock::{ClockEncoder, ClockTable};
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::operations::ConValue;
use crate::json_crdt_patch::util::binary::{CrdtReader, CrdtWriter};

const SERVER_FLAG: u8 = 0x80;

// ── Encoder ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Encoder {
    cbor: CborEncoder,
    clock: ClockEncoder,
    server_time: Option<u64>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, model: &Model) -> Result<Vec<u8>, CrdtError> {
        self.cbor.writer.reset();
        match &model.clock {
            ModelClock::Server(clock) => {
                self.server_time = Some(clock.time);
                self.cbor.writer.u8(SERVER_FLAG);
                self.cbor.writer.vu57(clock.time);
                self.child(model, model.root.val)?;
            }
            ModelClock::Logical(clock) => {
                self.server_time = None;
                self.clock.reset(clock);
                self.cbor.writer.u32(0);
                self.child(model, model.root.val)?;
                let offset = self.cbor.writer.x() - 4;
                let offset = u32::try_from(offset).map_err(|_| CrdtError::format("document too large"))?;
                self.cbor.writer.set_u32(0, offset);
                let entries = self.clock.entries();
                let w = &mut self.cbor.writer;
                w.vu57(entries.len() as u64);
                for entry in entries {
                    w.vu57(entry.sid);
                    w.vu57(entry.time);
                }
            }
        }
        let bytes = self.cbor.writer.flush();
        debug!(bytes = bytes.len(), nodes = model.index.len(), "encoded structural binary model");
        Ok(bytes)
    }

    fn id(&mut self, id: Ts) -> Result<(), CrdtError> {
        match self.server_time {
            Some(time) => {
                let diff = time.checked_sub(id.time).ok_or(CrdtError::TimeTravel)?;
                self.cbor.writer.vu57(diff);
            }
            None => {
                let rel = self.clock.append(id)?;
                self.cbor.writer.id(rel.session_index, rel.time_diff);
            }
        }
        Ok(())
    }

    /// Constant references may point anywhere, so on a server clock they are
    /// written as absolute `sid, time` pairs.
    fn reference(&mut self, id: Ts) -> Result<(), CrdtError> {
        if self.server_time.is_some() {
            self.cbor.writer.vu57(id.sid);
            self.cbor.writer.vu57(id.time);
            return Ok(());
        }
        self.id(id)
    }

    fn child(&mut self, model: &Model, id: Ts) -> Result<(), CrdtError> {
        match model.index.get(&id) {
            Some(node) => self.node(model, node),
            None => {
                self.cbor.writer.u8(0);
                Ok(())
            }
        }
    }

    fn node(&mut self, model: &Model, node: &JsonNode) -> Result<(), CrdtError> {
        self.id(node.id())?;
        match node {
            JsonNode::Con(n) => match &n.val {
                ConValue::Val(value) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, 0);
                    self.cbor.write_any(value);
                }
                ConValue::Ref(reference) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, 1);
                    self.reference(*reference)?;
                }
            },
            JsonNode::Val(n) => {
                write_tl(&mut self.cbor.writer, DataType::Val, 0);
                self.child(model, n.val)?;
            }
            JsonNode::Obj(n) => {
                write_tl(&mut self.cbor.writer, DataType::Obj, n.keys.len() as u64);
                for (key, val) in &n.keys {
                    self.cbor.write_str(key);
                    self.child(model, *val)?;
                }
            }
            JsonNode::Vec(n) => {
                write_tl(&mut self.cbor.writer, DataType::Vec, n.elements.len() as u64);
                for slot in &n.elements {
                    match slot {
                        Some(val) => self.child(model, *val)?,
                        None => self.cbor.writer.u8(0),
                    }
                }
            }
            JsonNode::Str(n) => {
                write_tl(&mut self.cbor.writer, DataType::Str, n.rga.size() as u64);
                for chunk in n.rga.iter() {
                    self.id(chunk.id)?;
                    match &chunk.data {
                        Some(text) => self.cbor.write_str(text),
                        None => self.cbor.write_u_integer(chunk.span),
                    }
                }
            }
            JsonNode::Bin(n) => {
                write_tl(&mut self.cbor.writer, DataType::Bin, n.rga.size() as u64);
                for chunk in n.rga.iter() {
                    self.id(chunk.id)?;
                    match &chunk.data {
                        Some(bytes) => {
                            self.cbor.writer.b1vu56(0, chunk.span);
                            self.cbor.writer.buf(bytes);
                        }
                        None => self.cbor.writer.b1vu56(1, chunk.span),
                    }
                }
            }
            JsonNode::Arr(n) => {
                write_tl(&mut self.cbor.writer, DataType::Arr, n.rga.size() as u64);
                for chunk in n.rga.iter() {
                    self.id(chunk.id)?;
                    match &chunk.data {
                        Some(values) => {
                            self.cbor.writer.b1vu56(0, chunk.span);
                            for val in values {
                                self.child(model, *val)?;
                            }
                        }
                        None => self.cbor.writer.b1vu56(1, chunk.span),
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────

enum Ids {
    Logical(ClockTable),
    Server(u64),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder {
    cbor: CborDecoder,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, data: &[u8]) -> Result<Model, CrdtError> {
        debug!(bytes = data.len(), "decoding structural binary model");
        let mut r = Reader::new(data);
        let (ids, mut model, tree) = if r.peek()? & SERVER_FLAG != 0 {
            r.skip(1)?;
            let time = r.vu57()?;
            let model = Model::from_clock(ModelClock::Server(ServerClockVector::new(time)));
            (Ids::Server(time), model, &data[r.x..])
        } else {
            let offset = r.u32()? as usize;
            let end = offset.checked_add(4).filter(|end| *end <= data.len()).ok_or(CrdtError::Eof)?;
            let mut table_reader = Reader::new(&data[end..]);
            let table = ClockTable::read(&mut table_reader)?;
            if table_reader.size() != 0 {
                return Err(CrdtError::format("trailing bytes after clock table"));
            }
            let model = Model::from_clock(ModelClock::Logical(table.to_clock()?));
            (Ids::Logical(table), model, &data[4..end])
        };
        let mut r = Reader::new(tree);
        let root = self.node(&mut r, &ids, &mut model)?;
        if r.size() != 0 {
            return Err(CrdtError::format("trailing bytes after node tree"));
        }
        model.root = ValNode::new(ORIGIN, root);
        Ok(model)
    }

    fn id(&self, r: &mut Reader<'_>, ids: &Ids) -> Result<Ts, CrdtError> {
        match ids {
            Ids::Server(time) => {
                let diff = r.vu57()?;
                let id_time = time.checked_sub(diff).ok_or(CrdtError::InvalidClockTable)?;
                Ok(ts(session::SERVER, id_time))
            }
            Ids::Logical(table) => {
                let (index, diff) = r.id()?;
                table.decode_id(index, diff)
            }
        }
    }

    fn reference(&self, r: &mut Reader<'_>, ids: &Ids) -> Result<Ts, CrdtError> {
        match ids {
            Ids::Server(_) => Ok(ts(r.vu57()?, r.vu57()?)),
            Ids::Logical(_) => self.id(r, ids),
        }
    }

    /// Reads one node and its subtree into `model`. Returns `UNDEFINED` for
    /// an empty slot.
    fn node(&self, r: &mut Reader<'_>, ids: &Ids, model: &mut Model) -> Result<Ts, CrdtError> {
        if r.peek()? == 0 {
            r.skip(1)?;
            return Ok(UNDEFINED);
        }
        let id = self.id(r, ids)?;
        let (data_type, len) = read_tl(r)?;
        let node = match data_type {
            DataType::Con if len == 0 => JsonNode::Con(ConNode::new(id, ConValue::Val(self.cbor.read_any(r)?))),
            DataType::Con => JsonNode::Con(ConNode::new(id, ConValue::Ref(self.reference(r, ids)?))),
            DataType::Val => JsonNode::Val(ValNode::new(id, self.node(r, ids, model)?)),
            DataType::Obj => {
                let mut obj = ObjNode::new(id);
                for _ in 0..len {
                    let key = self.cbor.read_str(r)?;
                    let val = self.node(r, ids, model)?;
                    obj.keys.insert(key, val);
                }
                JsonNode::Obj(obj)
            }
            DataType::Vec => {
                if len > MAX_TUPLE_LENGTH as u64 {
                    return Err(CrdtError::InvalidVec);
                }
                let mut vec = VecNode::new(id);
                for _ in 0..len {
                    let val = self.node(r, ids, model)?;
                    vec.elements.push((val != UNDEFINED).then_some(val));
                }
                JsonNode::Vec(vec)
            }
            DataType::Str => {
                let mut node = StrNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(r, ids)?;
                    match self.cbor.read_any(r)? {
                        PackValue::Str(text) => {
                            let span = text.chars().count() as u64;
                            node.rga.push_chunk(chunk_id, span, Some(text));
                        }
                        PackValue::Integer(span) if span > 0 => node.rga.push_chunk(chunk_id, span as u64, None),
                        _ => return Err(CrdtError::InvalidStr),
                    }
                }
                JsonNode::Str(node)
            }
            DataType::Bin => {
                let mut node = BinNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(r, ids)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match deleted {
                        0 => Some(r.buf(span as usize)?.to_vec()),
                        _ => None,
                    };
                    node.rga.push_chunk(chunk_id, span, data);
                }
                JsonNode::Bin(node)
            }
            DataType::Arr => {
                let mut node = ArrNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(r, ids)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match deleted {
                        0 => {
                            let mut values = Vec::with_capacity((span as usize).min(r.size()));
                            for _ in 0..span {
                                values.push(self.node(r, ids, model)?);
                            }
                            Some(values)
                        }
                        _ => None,
                    };
                    node.rga.push_chunk(chunk_id, span, data);
                }
                JsonNode::Arr(node)
            }
        };
        model.index.insert(id, node);
        Ok(id)
    }
}

pub fn encode(model: &Model) -> Result<Vec<u8>, CrdtError> {
    Encoder::new().encode(model)
}

pub fn decode(data: &[u8]) -> Result<Model, CrdtError> {
    Decoder::new().decode(data)
}
