//! Sidecar snapshot: the plain document view travels as ordinary data and
//! a separate metadata blob holds what the view cannot express, node ids
//! and tombstones.
//!
//! ```text
//! meta = clock table | node tree
//! ```
//!
//! The tree mirrors the structural binary layout, except that values are
//! taken from the view wherever it agrees with the node:
//!
//! - con: length 0 takes the value from the view, 1 is a timestamp written
//!   as absolute `vu57 sid, vu57 time`, 2 carries an inline CBOR value;
//! - obj: (CBOR key, child)*, the child reads the view's key;
//! - vec: a mode octet (0 = slots read the view's elements, 1 = no view,
//!   used for extension wrappers whose view is not an array) then a child
//!   per slot;
//! - str, bin: a mode octet (0 = live data comes from the view, 1 = inline)
//!   then `(id, b1vu56(deleted, span))` per chunk, followed by the chunk's
//!   data in inline mode;
//! - arr: `(id, b1vu56(deleted, span), child*)` per chunk, live children
//!   reading consecutive view elements.
//!
//! Node ids are `id(session_index, time_diff)` against the clock table. The
//! decoder rejects a view whose shape disagrees with the metadata.

use crdt_pack::{CborDecoder, CborEncoder, PackValue, Reader};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt::codec::{clock_table, read_tl, table_clock, write_tl};
use crate::json_crdt::model::Model;
use crate::json_crdt::nodes::{ArrNode, BinNode, ConNode, JsonNode, ObjNode, StrNode, ValNode, VecNode};
use crate::json_crdt_patch::clock::{ts, Ts};
use crate::json_crdt_patch::codec::clock::ClockTable;
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::DataType;
use crate::json_crdt_patch::operations::ConValue;
use crate::json_crdt_patch::util::binary::{CrdtReader, CrdtWriter};

/// View of an object key the view leaves out, a deleted key.
static MISSING: PackValue = PackValue::Undefined;

const CON_FROM_VIEW: u64 = 0;
const CON_REF: u64 = 1;
const CON_INLINE: u64 = 2;

const DATA_FROM_VIEW: u8 = 0;
const DATA_INLINE: u8 = 1;

const SLOTS_FROM_VIEW: u8 = 0;
const SLOTS_WITHOUT_VIEW: u8 = 1;

fn key_view<'v>(view: Option<&'v PackValue>, key: &str) -> Option<&'v PackValue> {
    view.map(|v| v.get(key).unwrap_or(&MISSING))
}

fn item_view(view: Option<&PackValue>, index: usize) -> Option<&PackValue> {
    view.and_then(PackValue::as_array).and_then(|items| items.get(index))
}

fn is_extension(model: &Model, node: &VecNode) -> bool {
    node.ext_id(&model.index).and_then(|ext| model.ext.get(ext)).is_some()
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

    /// Returns the view and the metadata blob.
    pub fn encode(&mut self, model: &Model) -> Result<(PackValue, Vec<u8>), CrdtError> {
        let view = model.view_pack();
        let table = clock_table(model);
        self.cbor.writer.reset();
        table.write(&mut self.cbor.writer);
        self.child(model, &table, model.root.val, Some(&view))?;
        let meta = self.cbor.writer.flush();
        debug!(meta = meta.len(), "encoded sidecar model");
        Ok((view, meta))
    }

    fn id(&mut self, table: &ClockTable, id: Ts) -> Result<(), CrdtError> {
        let rel = table.encode_id(id)?;
        self.cbor.writer.id(rel.session_index, rel.time_diff);
        Ok(())
    }

    fn child(&mut self, model: &Model, table: &ClockTable, id: Ts, view: Option<&PackValue>) -> Result<(), CrdtError> {
        match model.index.get(&id) {
            Some(node) => self.node(model, table, node, view),
            None => {
                self.cbor.writer.u8(0);
                Ok(())
            }
        }
    }

    fn node(
        &mut self,
        model: &Model,
        table: &ClockTable,
        node: &JsonNode,
        view: Option<&PackValue>,
    ) -> Result<(), CrdtError> {
        self.id(table, node.id())?;
        match node {
            JsonNode::Con(n) => match &n.val {
                ConValue::Ref(reference) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, CON_REF);
                    self.cbor.writer.vu57(reference.sid);
                    self.cbor.writer.vu57(reference.time);
                }
                ConValue::Val(value) if view == Some(value) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, CON_FROM_VIEW);
                }
                ConValue::Val(value) => {
                    write_tl(&mut self.cbor.writer, DataType::Con, CON_INLINE);
                    self.cbor.write_any(value);
                }
            },
            JsonNode::Val(n) => {
                write_tl(&mut self.cbor.writer, DataType::Val, 0);
                self.child(model, table, n.val, view)?;
            }
            JsonNode::Obj(n) => {
                write_tl(&mut self.cbor.writer, DataType::Obj, n.keys.len() as u64);
                for (key, val) in &n.keys {
                    self.cbor.write_str(key);
                    self.child(model, table, *val, key_view(view, key))?;
                }
            }
            JsonNode::Vec(n) => {
                write_tl(&mut self.cbor.writer, DataType::Vec, n.elements.len() as u64);
                let view = view.filter(|_| !is_extension(model, n));
                self.cbor.writer.u8(if view.is_some() { SLOTS_FROM_VIEW } else { SLOTS_WITHOUT_VIEW });
                for (i, slot) in n.elements.iter().enumerate() {
                    match slot {
                        Some(val) => self.child(model, table, *val, item_view(view, i))?,
                        None => self.cbor.writer.u8(0),
                    }
                }
            }
            JsonNode::Str(n) => {
                write_tl(&mut self.cbor.writer, DataType::Str, n.rga.size() as u64);
                let inline = view.and_then(PackValue::as_str) != Some(n.view().as_str());
                self.cbor.writer.u8(if inline { DATA_INLINE } else { DATA_FROM_VIEW });
                for chunk in n.rga.iter() {
                    self.id(table, chunk.id)?;
                    self.cbor.writer.b1vu56(chunk.del as u8, chunk.span);
                    if let (true, Some(text)) = (inline, &chunk.data) {
                        self.cbor.write_str(text);
                    }
                }
            }
            JsonNode::Bin(n) => {
                write_tl(&mut self.cbor.writer, DataType::Bin, n.rga.size() as u64);
                let inline = view.and_then(PackValue::as_bytes) != Some(n.view().as_slice());
                self.cbor.writer.u8(if inline { DATA_INLINE } else { DATA_FROM_VIEW });
                for chunk in n.rga.iter() {
                    self.id(table, chunk.id)?;
                    self.cbor.writer.b1vu56(chunk.del as u8, chunk.span);
                    if let (true, Some(bytes)) = (inline, &chunk.data) {
                        self.cbor.writer.buf(bytes);
                    }
                }
            }
            JsonNode::Arr(n) => {
                write_tl(&mut self.cbor.writer, DataType::Arr, n.rga.size() as u64);
                let mut position = 0;
                for chunk in n.rga.iter() {
                    self.id(table, chunk.id)?;
                    self.cbor.writer.b1vu56(chunk.del as u8, chunk.span);
                    if let Some(values) = &chunk.data {
                        for val in values {
                            self.child(model, table, *val, item_view(view, position))?;
                            position += 1;
                        }
                    }
                }
            }
        }
        Ok(())
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

    pub fn decode(&self, view: &PackValue, meta: &[u8]) -> Result<Model, CrdtError> {
        debug!(meta = meta.len(), "decoding sidecar model");
        let mut r = Reader::new(meta);
        let table = ClockTable::read(&mut r)?;
        let mut model = Model::from_clock(table_clock(&table)?);
        let root = self.node(&mut r, &table, Some(view), &mut model)?;
        if r.size() != 0 {
            return Err(CrdtError::format("trailing bytes after node tree"));
        }
        model.root = ValNode::new(ORIGIN, root);
        Ok(model)
    }

    fn id(&self, r: &mut Reader<'_>, table: &ClockTable) -> Result<Ts, CrdtError> {
        let (index, diff) = r.id()?;
        table.decode_id(index, diff)
    }

    fn mode(&self, r: &mut Reader<'_>) -> Result<bool, CrdtError> {
        match r.u8()? {
            DATA_FROM_VIEW => Ok(false),
            DATA_INLINE => Ok(true),
            other => Err(CrdtError::format(format!("unknown data mode {other}"))),
        }
    }

    /// Decodes one node. `view` is `None` inside subtrees the view does not
    /// describe; there every value must be inline.
    fn node(
        &self,
        r: &mut Reader<'_>,
        table: &ClockTable,
        view: Option<&PackValue>,
        model: &mut Model,
    ) -> Result<Ts, CrdtError> {
        if r.peek()? == 0 {
            r.skip(1)?;
            return Ok(UNDEFINED);
        }
        let id = self.id(r, table)?;
        let (data_type, len) = read_tl(r)?;
        let node = match data_type {
            DataType::Con => {
                let val = match len {
                    CON_FROM_VIEW => {
                        let value = view.ok_or_else(|| CrdtError::format("con value missing from the view"))?;
                        ConValue::Val(value.clone())
                    }
                    CON_REF => {
                        let sid = r.vu57()?;
                        let time = r.vu57()?;
                        ConValue::Ref(ts(sid, time))
                    }
                    CON_INLINE => ConValue::Val(self.cbor.read_any(r)?),
                    _ => return Err(CrdtError::format(format!("unknown con mode {len}"))),
                };
                JsonNode::Con(ConNode::new(id, val))
            }
            DataType::Val => JsonNode::Val(ValNode::new(id, self.node(r, table, view, model)?)),
            DataType::Obj => {
                let fields = view.map(|v| v.as_object().ok_or(CrdtError::InvalidObj)).transpose()?;
                let mut obj = ObjNode::new(id);
                for _ in 0..len {
                    let key = self.cbor.read_str(r)?;
                    let val = self.node(r, table, key_view(view, &key), model)?;
                    obj.keys.insert(key, val);
                }
                if let Some(fields) = fields {
                    if fields.iter().any(|(key, _)| !obj.keys.contains_key(key)) {
                        return Err(CrdtError::InvalidObj);
                    }
                }
                JsonNode::Obj(obj)
            }
            DataType::Vec => {
                if len > MAX_TUPLE_LENGTH as u64 {
                    return Err(CrdtError::InvalidVec);
                }
                let slots = match r.u8()? {
                    SLOTS_FROM_VIEW => {
                        let items = view.and_then(PackValue::as_array).ok_or(CrdtError::InvalidVec)?;
                        if items.len() as u64 != len {
                            return Err(CrdtError::InvalidVec);
                        }
                        Some(items)
                    }
                    SLOTS_WITHOUT_VIEW => None,
                    other => return Err(CrdtError::format(format!("unknown vec mode {other}"))),
                };
                let mut vec = VecNode::new(id);
                for i in 0..len as usize {
                    let val = self.node(r, table, slots.and_then(|items| items.get(i)), model)?;
                    vec.elements.push((val != UNDEFINED).then_some(val));
                }
                // Only an extension wrapper may stand under a view without
                // describing its slots.
                if slots.is_none() && view.is_some() && !is_extension(model, &vec) {
                    return Err(CrdtError::InvalidVec);
                }
                JsonNode::Vec(vec)
            }
            DataType::Str => {
                let inline = self.mode(r)?;
                let text = match view {
                    Some(v) => v.as_str().ok_or(CrdtError::InvalidStr)?,
                    None if inline => "",
                    None => return Err(CrdtError::InvalidStr),
                };
                let mut chars = text.chars();
                let mut node = StrNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(r, table)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match (deleted, inline) {
                        (0, true) => Some(self.cbor.read_str(r)?),
                        (0, false) => {
                            let text: String = chars.by_ref().take(span as usize).collect();
                            if text.chars().count() as u64 != span {
                                return Err(CrdtError::InvalidStr);
                            }
                            Some(text)
                        }
                        _ => None,
                    };
                    node.rga.push_chunk(chunk_id, span, data);
                }
                if !inline && chars.next().is_some() {
                    return Err(CrdtError::InvalidStr);
                }
                JsonNode::Str(node)
            }
            DataType::Bin => {
                let inline = self.mode(r)?;
                let mut bytes: &[u8] = match view {
                    Some(v) => v.as_bytes().ok_or(CrdtError::InvalidBin)?,
                    None if inline => &[],
                    None => return Err(CrdtError::InvalidBin),
                };
                let mut node = BinNode::new(id);
                for _ in 0..len {
                    let chunk_id = self.id(r, table)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match (deleted, inline) {
                        (0, true) => Some(r.buf(span as usize)?.to_vec()),
                        (0, false) => {
                            let span = span as usize;
                            if bytes.len() < span {
                                return Err(CrdtError::InvalidBin);
                            }
                            let (head, rest) = bytes.split_at(span);
                            bytes = rest;
                            Some(head.to_vec())
                        }
                        _ => None,
                    };
                    node.rga.push_chunk(chunk_id, span, data);
                }
                if !inline && !bytes.is_empty() {
                    return Err(CrdtError::InvalidBin);
                }
                JsonNode::Bin(node)
            }
            DataType::Arr => {
                let items = view.map(|v| v.as_array().ok_or(CrdtError::InvalidArr)).transpose()?;
                let mut node = ArrNode::new(id);
                let mut position = 0;
                for _ in 0..len {
                    let chunk_id = self.id(r, table)?;
                    let (deleted, span) = r.b1vu56()?;
                    let data = match deleted {
                        0 => {
                            let mut values = Vec::with_capacity((span as usize).min(r.size()));
                            for _ in 0..span {
                                let item = match items {
                                    Some(items) => Some(items.get(position).ok_or(CrdtError::InvalidArr)?),
                                    None => None,
                                };
                                values.push(self.node(r, table, item, model)?);
                                position += 1;
                            }
                            Some(values)
                        }
                        _ => None,
                    };
                    node.rga.push_chunk(chunk_id, span, data);
                }
                if items.is_some_and(|items| items.len() != position) {
                    return Err(CrdtError::InvalidArr);
                }
                JsonNode::Arr(node)
            }
        };
        model.index.insert(id, node);
        Ok(id)
    }
}

pub fn encode(model: &Model) -> Result<(PackValue, Vec<u8>), CrdtError> {
    Encoder::new().encode(model)
}

pub fn decode(view: &PackValue, meta: &[u8]) -> Result<Model, CrdtError> {
    Decoder::new().decode(view, meta)
}
