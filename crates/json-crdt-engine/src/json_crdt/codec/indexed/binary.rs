//! Indexed binary snapshot.
//!
//! The document is a map of fields so that storage can rewrite single
//! nodes:
//!
//! - `"c"`: the clock table, `vu57 count | (vu57 sid, vu57 time)*`, local
//!   session first;
//! - `"r"`: the root value id, absent for an empty document;
//! - `"<index>_<time>"`: one field per node, both numbers in base 36, keyed
//!   by the node's clock table index and absolute time.
//!
//! Node fields start at the type-length octet; the id lives in the key.
//! Children are referenced by `id(session_index, time_diff)` against the
//! clock table instead of being nested, so every field is read together
//! with `"c"`. Vec slots carry a `0` (hole) or `1` (id follows) prefix. A
//! con holding a timestamp writes it as absolute `vu57 sid, vu57 time`,
//! since the referenced session need not be in the table.

use std::collections::HashMap;

use crdt_pack::{CborDecoder, CborEncoder, PackValue, Reader};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt::codec::{clock_table, read_tl, table_clock, write_tl};
use crate::json_crdt::model::util::{from_base36, to_base36};
use crate::json_crdt::model::Model;
use crate::json_crdt::nodes::{ArrNode, BinNode, ConNode, JsonNode, ObjNode, StrNode, ValNode, VecNode};
use crate::json_crdt_patch::clock::{ts, Ts};
use crate::json_crdt_patch::codec::clock::ClockTable;
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::operations::ConValue;
use crate::json_crdt_patch::util::binary::{CrdtReader, CrdtWriter};

pub const CLOCK_FIELD: &str = "c";
pub const ROOT_FIELD: &str = "r";

/// Field name to field bytes.
pub type IndexedFields = HashMap<String, Vec<u8>>;

fn session_index(table: &ClockTable, sid: u64) -> Result<u64, CrdtError> {
    if sid == session::SYSTEM {
        return Ok(0);
    }
    table.get_by_sid(sid).map(|(index, _)| index).ok_or(CrdtError::ClockNotFound)
}

fn session_at(table: &ClockTable, index: u64) -> Option<u64> {
    match index {
        0 => Some(session::SYSTEM),
        _ => table.get_by_index(index).map(|reference| reference.sid),
    }
}

/// Name of the field holding node `id`.
pub fn field_name(table: &ClockTable, id: Ts) -> Result<String, CrdtError> {
    let index = session_index(table, id.sid)?;
    Ok(format!("{}_{}", to_base36(index), to_base36(id.time)))
}

/// Inverse of [`field_name`]; `None` for the clock and root fields or a
/// malformed name.
pub fn parse_field_name(table: &ClockTable, name: &str) -> Option<Ts> {
    let (index, time) = name.split_once('_')?;
    let sid = session_at(table, from_base36(index)?)?;
    Some(ts(sid, from_base36(time)?))
}

// ── Encoder ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Encoder {
    cbor: CborEncoder,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, model: &Model) -> Result<IndexedFields, CrdtError> {
        let table = clock_table(model);
        let mut fields = IndexedFields::with_capacity(model.index.len() + 2);
        fields.insert(CLOCK_FIELD.to_string(), table.to_binary());
        if model.root.val != UNDEFINED {
            self.cbor.writer.reset();
            self.id(&table, model.root.val)?;
            fields.insert(ROOT_FIELD.to_string(), self.cbor.writer.flush());
        }
        for node in model.index.values() {
            let name = field_name(&table, node.id())?;
            fields.insert(name, self.encode_node(&table, node)?);
        }
        debug!(fields = fields.len(), "encoded indexed model");
        Ok(fields)
    }

    fn id(&mut self, table: &ClockTable, id: Ts) -> Result<(), CrdtError> {
        let rel = table.encode_id(id)?;
        self.cbor.writer.id(rel.session_index, rel.time_diff);
        Ok(())
    }

    /// Bytes of a single node field.
    pub fn encode_node(&mut self, table: &ClockTable, node: &JsonNode) -> Result<Vec<u8>, CrdtError> {
        self.cbor.writer.reset();
        match node {
            JsonNode::Con(n) => match &n.val {
                ConValue::Val(value) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, 0);
                    self.cbor.write_any(value);
                }
                ConValue::Ref(reference) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, 1);
                    self.cbor.writer.vu57(reference.sid);
                    self.cbor.writer.vu57(reference.time);
                }
            },
            JsonNode::Val(n) => {
                write_tl(&mut self.cbor.writer, DataType::Val, 0);
                self.id(table, n.val)?;
            }
            JsonNode::Obj(n) => {
                write_tl(&mut self.cbor.writer, DataType::Obj, n.keys.len() as u64);
                for (key, val) in &n.keys {
                    self.cbor.write_str(key);
                    self.id(table, *val)?;
                }
            }
            JsonNode::Vec(n) => {
                write_tl(&mut self.cbor.writer, DataType::Vec, n.elements.len() as u64);
                for slot in &n.elements {
                    match slot {
                        Some(val) => {
                            self.cbor.writer.u8(1);
                            self.id(table, *val)?;
                        }
                        None => self.cbor.writer.u8(0),
                    }
                }
            }
            JsonNode::Str(n) => {
                write_tl(&mut self.cbor.writer, DataType::Str, n.rga.size() as u64);
                for chunk in n.rga.iter() {
                    self.id(table, chunk.id)?;
                    match &chunk.data {
                        Some(text) => self.cbor.write_str(text),
                        None => self.cbor.write_u_integer(chunk.span),
                    }
                }
            }
            JsonNode::Bin(n) => {
                write_tl(&mut self.cbor.writer, DataType::Bin, n.rga.size() as u64);
                for chunk in n.rga.iter() {
                    self.id(table, chunk.id)?;
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
                    self.id(table, chunk.id)?;
                    match &chunk.data {
                        Some(values) => {
                            self.cbor.writer.b1vu56(0, chunk.span);
                            for val in values {
                                self.id(table, *val)?;
                            }
                        }
                        None => self.cbor.writer.b1vu56(1, chunk.span),
                    }
                }
            }
        }
        Ok(self.cbor.writer.flush())
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder {
    cbor: CborDecoder,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, fields: &IndexedFields) -> Result<Model, CrdtError> {
        debug!(fields = fields.len(), "decoding indexed model");
        let table_bytes = fields
            .get(CLOCK_FIELD)
            .ok_or_else(|| CrdtError::format("missing clock field"))?;
        let table = ClockTable::from_binary(table_bytes)?;
        let mut model = Model::from_clock(table_clock(&table)?);
        for (name, bytes) in fields {
            if name == CLOCK_FIELD || name == ROOT_FIELD {
                continue;
            }
            let id = parse_field_name(&table, name)
                .ok_or_else(|| CrdtError::format(format!("invalid field name {name:?}")))?;
            let node = self.decode_node(&table, id, bytes)?;
            model.index.insert(id, node);
        }
        let root = match fields.get(ROOT_FIELD) {
            Some(bytes) => {
                let mut r = Reader::new(bytes);
                self.id(&table, &mut r)?
            }
            None => UNDEFINED,
        };
        model.root = ValNode::new(ORIGIN, root);
        Ok(model)
    }

    fn id(&self, table: &ClockTable, r: &mut Reader<'_>) -> Result<Ts, CrdtError> {
        let (index, diff) = r.id()?;
        table.decode_id(index, diff)
    }

    /// Decodes one node field.
    pub fn decode_node(&self, table: &ClockTable, id: Ts, data: &[u8]) -> Result<JsonNode, CrdtError> {
        let mut r = Reader::new(data);
        let (data_type, len) = read_tl(&mut r)?;
        let node = match data_type {
            DataType::Con if len == 0 => JsonNode::Con(ConNode::new(id, ConValue::Val(self.cbor.read_any(&mut r)?))),
            DataType::Con => {
                let sid = r.vu57()?;
                let time = r.vu57()?;
                JsonNode::Con(ConNode::new(id, ConValue::Ref(ts(sid, time))))
            }
            DataType::Val => JsonNode::Val(ValNode::new(id, self.id(table, &mut r)?)),
            DataType::Obj => {
                let mut obj = ObjNode::new(id);
                for _ in 0..len {
                    let key = self.cbor.read_str(&mut r)?;
                    let val = self.id(table, &mut r)?;
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
                    let slot = match r.u8()? {
                        0 => None,
                        _ => Some(self.id(table, &mut r)?),
                    };
                    vec.elements.push(slot);
                }
                JsonNode::Vec(vec)
            }
            DataType::Str => {
                let mut node = StrNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(table, &mut r)?;
                    match self.cbor.read_any(&mut r)? {
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
                    let chunk_id = self.id(table, &mut r)?;
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
                    let chunk_id = self.id(table, &mut r)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match deleted {
                        0 => {
                            let mut values = Vec::with_capacity((span as usize).min(r.size()));
                            for _ in 0..span {
                                values.push(self.id(table, &mut r)?);
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
        if r.size() != 0 {
            return Err(CrdtError::format("trailing bytes after node"));
        }
        Ok(node)
    }
}

pub fn encode(model: &Model) -> Result<IndexedFields, CrdtError> {
    Encoder::new().encode(model)
}

pub fn decode(fields: &IndexedFields) -> Result<Model, CrdtError> {
    Decoder::new().decode(fields)
}
