//! JSON CRDT node types.
//!
//! | Type      | Semantics                                    |
//! |-----------|----------------------------------------------|
//! | `ConNode` | immutable constant                           |
//! | `ValNode` | last-write-wins register (also the root)     |
//! | `ObjNode` | LWW map from string keys to node ids         |
//! | `VecNode` | fixed-length LWW tuple                       |
//! | `StrNode` | RGA string                                   |
//! | `BinNode` | RGA byte string                              |
//! | `ArrNode` | RGA array of node ids                        |
//!
//! Container views take a resolver closure that turns a child id into its
//! view; the model supplies one backed by its index.

pub mod rga;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::mem;

use crdt_pack::PackValue;
use indexmap::IndexMap;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{compare, Ts, Tss};
use crate::json_crdt_patch::constants::MAX_TUPLE_LENGTH;
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::operations::ConValue;
use rga::Rga;

/// All nodes of a document keyed by id.
pub type NodeIndex = HashMap<Ts, JsonNode>;

// ── ConNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ConNode {
    pub id: Ts,
    pub val: ConValue,
}

impl ConNode {
    pub fn new(id: Ts, val: ConValue) -> Self {
        Self { id, val }
    }

    /// A timestamp constant is data, not a pointer: it is shown as
    /// `[sid, time]`.
    pub fn view(&self) -> PackValue {
        match &self.val {
            ConValue::Val(v) => v.clone(),
            ConValue::Ref(id) => PackValue::Array(vec![PackValue::uint(id.sid), PackValue::uint(id.time)]),
        }
    }
}

// ── ValNode ───────────────────────────────────────────────────────────────

/// LWW register. The document root is a `ValNode` with id `ORIGIN`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValNode {
    pub id: Ts,
    pub val: Ts,
}

impl ValNode {
    pub fn new(id: Ts, val: Ts) -> Self {
        Self { id, val }
    }

    /// Points the register at `val` if it is newer than both the current
    /// value and the register itself. Returns the replaced pointer.
    pub fn set(&mut self, val: Ts) -> Option<Ts> {
        if self.val.sid != session::SYSTEM && compare(val, self.val) != Ordering::Greater {
            return None;
        }
        if compare(val, self.id) != Ordering::Greater {
            return None;
        }
        Some(mem::replace(&mut self.val, val))
    }
}

// ── ObjNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ObjNode {
    pub id: Ts,
    pub keys: IndexMap<String, Ts>,
}

impl ObjNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            keys: IndexMap::new(),
        }
    }

    /// LWW write of one key. Returns `Some(previous)` when an existing
    /// value was replaced; a first write and a stale write both return
    /// `None`, use [`ObjNode::get`] to tell them apart.
    pub fn put(&mut self, key: &str, val: Ts) -> Option<Ts> {
        match self.keys.get_mut(key) {
            Some(cur) => {
                if compare(*cur, val) != Ordering::Less {
                    return None;
                }
                Some(mem::replace(cur, val))
            }
            None => {
                self.keys.insert(key.to_owned(), val);
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Ts> {
        self.keys.get(key).copied()
    }

    pub fn view(&self, mut resolve: impl FnMut(Ts) -> PackValue) -> PackValue {
        let mut out = Vec::with_capacity(self.keys.len());
        for (key, id) in &self.keys {
            let value = resolve(*id);
            if !value.is_undefined() {
                out.push((key.clone(), value));
            }
        }
        PackValue::Object(out)
    }
}

// ── VecNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct VecNode {
    pub id: Ts,
    pub elements: Vec<Option<Ts>>,
}

impl VecNode {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            elements: Vec::new(),
        }
    }

    /// LWW write of one slot, growing the tuple with holes as needed.
    pub fn put(&mut self, index: usize, val: Ts) -> Result<Option<Ts>, CrdtError> {
        if index >= MAX_TUPLE_LENGTH {
            return Err(CrdtError::OutOfBounds);
        }
        if index >= self.elements.len() {
            self.elements.resize(index + 1, None);
        }
        let slot = &mut self.elements[index];
        match *slot {
            Some(cur) if compare(cur, val) != Ordering::Less => Ok(None),
            _ => Ok(mem::replace(slot, Some(val))),
        }
    }

    pub fn get(&self, index: usize) -> Option<Ts> {
        self.elements.get(index).copied().flatten()
    }

    /// Extension id, when this vec is an extension wrapper: two slots, the
    /// first a constant holding `[ext_id, sid % 256, time % 256]` of this
    /// vec's own id.
    pub fn ext_id(&self, index: &NodeIndex) -> Option<u8> {
        if self.elements.len() != 2 {
            return None;
        }
        let tag = self.elements[0]?;
        let Some(JsonNode::Con(con)) = index.get(&tag) else {
            return None;
        };
        let ConValue::Val(PackValue::Bytes(bytes)) = &con.val else {
            return None;
        };
        match bytes.as_slice() {
            [ext, sid, time]
                if *sid == (self.id.sid % 256) as u8 && *time == (self.id.time % 256) as u8 =>
            {
                Some(*ext)
            }
            _ => None,
        }
    }

    /// Payload node of an extension wrapper.
    pub fn ext_data(&self) -> Option<Ts> {
        self.get(1)
    }

    pub fn view(&self, mut resolve: impl FnMut(Ts) -> PackValue) -> PackValue {
        PackValue::Array(
            self.elements
                .iter()
                .map(|e| e.map_or(PackValue::Undefined, &mut resolve))
                .collect(),
        )
    }
}

// ── StrNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StrNode {
    pub id: Ts,
    pub rga: Rga<String>,
}

impl StrNode {
    pub fn new(id: Ts) -> Self {
        Self { id, rga: Rga::new(id) }
    }

    pub fn ins(&mut self, after: Ts, id: Ts, data: String) -> bool {
        self.rga.ins(after, id, data)
    }

    pub fn delete(&mut self, spans: &[Tss]) {
        self.rga.delete(spans);
    }

    /// Number of visible characters.
    pub fn length(&self) -> u64 {
        self.rga.length()
    }

    pub fn view(&self) -> String {
        self.rga.iter().filter_map(|c| c.data.as_deref()).collect()
    }
}

// ── BinNode ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BinNode {
    pub id: Ts,
    pub rga: Rga<Vec<u8>>,
}

impl BinNode {
    pub fn new(id: Ts) -> Self {
        Self { id, rga: Rga::new(id) }
    }

    pub fn ins(&mut self, after: Ts, id: Ts, data: Vec<u8>) -> bool {
        self.rga.ins(after, id, data)
    }

    pub fn delete(&mut self, spans: &[Tss]) {
        self.rga.delete(spans);
    }

    pub fn length(&self) -> u64 {
        self.rga.length()
    }

    pub fn view(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.rga.length() as usize);
        for chunk in self.rga.iter() {
            if let Some(data) = &chunk.data {
                out.extend_from_slice(data);
            }
        }
        out
    }
}

// ── ArrNode ───────────────────────────────────────────────────────────────

/// RGA of element slots, each holding the id of a value node.
#[derive(Debug, Clone)]
pub struct ArrNode {
    pub id: Ts,
    pub rga: Rga<Vec<Ts>>,
}

impl ArrNode {
    pub fn new(id: Ts) -> Self {
        Self { id, rga: Rga::new(id) }
    }

    pub fn ins(&mut self, after: Ts, id: Ts, data: Vec<Ts>) -> bool {
        self.rga.ins(after, id, data)
    }

    /// Deletes element slots and returns the value ids they held.
    pub fn delete(&mut self, spans: &[Tss]) -> Vec<Ts> {
        self.rga.delete(spans).into_iter().flatten().collect()
    }

    pub fn length(&self) -> u64 {
        self.rga.length()
    }

    /// Value currently held by the live element `element`.
    pub fn get_by_id(&self, element: Ts) -> Option<Ts> {
        let chunk = self.rga.chunk(self.rga.find_by_id(element)?);
        let data = chunk.data.as_ref()?;
        data.get((element.time - chunk.id.time) as usize).copied()
    }

    /// Value at visible position `pos`.
    pub fn get_value(&self, pos: u64) -> Option<Ts> {
        let (idx, offset) = self.rga.find_chunk(pos)?;
        self.rga.chunk(idx).data.as_ref()?.get(offset as usize).copied()
    }

    /// LWW replacement of the value held by `element`. Returns the replaced
    /// value id.
    pub fn upd(&mut self, element: Ts, val: Ts) -> Option<Ts> {
        let current = self.get_by_id(element)?;
        if compare(current, val) != Ordering::Less {
            return None;
        }
        let idx = self.rga.isolate(element)?;
        let slot = self.rga.data_mut(idx)?.first_mut()?;
        Some(mem::replace(slot, val))
    }

    /// Live value ids in document order.
    pub fn values(&self) -> impl Iterator<Item = Ts> + '_ {
        self.rga
            .iter()
            .filter_map(|c| c.data.as_ref())
            .flat_map(|d| d.iter().copied())
    }

    pub fn view(&self, resolve: impl FnMut(Ts) -> PackValue) -> PackValue {
        PackValue::Array(self.values().map(resolve).collect())
    }
}

// ── JsonNode ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum JsonNode {
    Con(ConNode),
    Val(ValNode),
    Obj(ObjNode),
    Vec(VecNode),
    Str(StrNode),
    Bin(BinNode),
    Arr(ArrNode),
}

impl JsonNode {
    pub fn id(&self) -> Ts {
        match self {
            JsonNode::Con(n) => n.id,
            JsonNode::Val(n) => n.id,
            JsonNode::Obj(n) => n.id,
            JsonNode::Vec(n) => n.id,
            JsonNode::Str(n) => n.id,
            JsonNode::Bin(n) => n.id,
            JsonNode::Arr(n) => n.id,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            JsonNode::Con(_) => DataType::Con,
            JsonNode::Val(_) => DataType::Val,
            JsonNode::Obj(_) => DataType::Obj,
            JsonNode::Vec(_) => DataType::Vec,
            JsonNode::Str(_) => DataType::Str,
            JsonNode::Bin(_) => DataType::Bin,
            JsonNode::Arr(_) => DataType::Arr,
        }
    }

    pub fn name(&self) -> &'static str {
        self.data_type().name()
    }

    /// Ids of the nodes this node points at.
    pub fn children(&self) -> Vec<Ts> {
        match self {
            JsonNode::Con(_) | JsonNode::Str(_) | JsonNode::Bin(_) => Vec::new(),
            JsonNode::Val(n) => vec![n.val],
            JsonNode::Obj(n) => n.keys.values().copied().collect(),
            JsonNode::Vec(n) => n.elements.iter().flatten().copied().collect(),
            JsonNode::Arr(n) => n.values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::clock::{ts, tss};
    use crate::json_crdt_patch::constants::{ORIGIN, UNDEFINED};

    #[test]
    fn con_views() {
        let con = ConNode::new(ts(1, 1), ConValue::Val(PackValue::from("x")));
        assert_eq!(con.view(), PackValue::from("x"));
        let reference = ConNode::new(ts(1, 2), ConValue::Ref(ts(7, 9)));
        assert_eq!(reference.view(), PackValue::Array(vec![PackValue::Integer(7), PackValue::Integer(9)]));
    }

    #[test]
    fn val_register_is_last_write_wins() {
        let mut root = ValNode::new(ORIGIN, UNDEFINED);
        assert_eq!(root.set(ts(5, 3)), Some(UNDEFINED));
        assert_eq!(root.set(ts(9, 2)), None);
        assert_eq!(root.set(ts(4, 3)), None);
        assert_eq!(root.set(ts(6, 3)), Some(ts(5, 3)));
        let mut reg = ValNode::new(ts(1, 10), UNDEFINED);
        assert_eq!(reg.set(ts(1, 5)), None);
        assert_eq!(reg.val, UNDEFINED);
    }

    #[test]
    fn obj_put_keeps_newest() {
        let mut obj = ObjNode::new(ts(1, 1));
        assert_eq!(obj.put("a", ts(1, 5)), None);
        assert_eq!(obj.put("a", ts(1, 4)), None);
        assert_eq!(obj.get("a"), Some(ts(1, 5)));
        assert_eq!(obj.put("a", ts(2, 5)), Some(ts(1, 5)));
        let view = obj.view(|id| PackValue::uint(id.sid));
        assert_eq!(view, PackValue::Object(vec![("a".into(), PackValue::Integer(2))]));
    }

    #[test]
    fn obj_view_skips_undefined() {
        let mut obj = ObjNode::new(ts(1, 1));
        obj.put("gone", UNDEFINED);
        obj.put("here", ts(1, 2));
        let view = obj.view(|id| if id == UNDEFINED { PackValue::Undefined } else { PackValue::Null });
        assert_eq!(view, PackValue::Object(vec![("here".into(), PackValue::Null)]));
    }

    #[test]
    fn vec_put_grows_with_holes() {
        let mut vec = VecNode::new(ts(1, 1));
        assert_eq!(vec.put(2, ts(1, 3)), Ok(None));
        assert_eq!(vec.elements, vec![None, None, Some(ts(1, 3))]);
        assert_eq!(vec.put(2, ts(1, 2)), Ok(None));
        assert_eq!(vec.put(2, ts(1, 4)), Ok(Some(ts(1, 3))));
        assert_eq!(vec.put(256, ts(1, 9)), Err(CrdtError::OutOfBounds));
    }

    #[test]
    fn vec_recognises_extension_tag() {
        let id = ts(300, 258);
        let mut index = NodeIndex::new();
        let tag = ts(300, 259);
        index.insert(tag, JsonNode::Con(ConNode::new(tag, ConValue::Val(PackValue::Bytes(vec![1, 44, 2])))));
        let mut vec = VecNode::new(id);
        vec.put(0, tag).unwrap();
        assert_eq!(vec.ext_id(&index), None);
        vec.put(1, ts(300, 260)).unwrap();
        assert_eq!(vec.ext_id(&index), Some(1));
        assert_eq!(vec.ext_data(), Some(ts(300, 260)));
        let other = VecNode { id: ts(301, 258), elements: vec.elements.clone() };
        assert_eq!(other.ext_id(&index), None);
    }

    #[test]
    fn arr_update_and_delete() {
        let mut arr = ArrNode::new(ts(1, 1));
        arr.ins(ts(1, 1), ts(1, 5), vec![ts(1, 2), ts(1, 3), ts(1, 4)]);
        assert_eq!(arr.get_by_id(ts(1, 6)), Some(ts(1, 3)));
        assert_eq!(arr.upd(ts(1, 6), ts(1, 9)), Some(ts(1, 3)));
        assert_eq!(arr.upd(ts(1, 6), ts(1, 8)), None);
        assert_eq!(arr.values().collect::<Vec<_>>(), vec![ts(1, 2), ts(1, 9), ts(1, 4)]);
        assert_eq!(arr.get_value(1), Some(ts(1, 9)));
        assert_eq!(arr.delete(&[tss(1, 5, 2)]), vec![ts(1, 2), ts(1, 9)]);
        assert_eq!(arr.length(), 1);
        assert_eq!(arr.get_by_id(ts(1, 5)), None);
    }

    #[test]
    fn str_and_bin_views() {
        let mut s = StrNode::new(ts(1, 1));
        s.ins(ts(1, 1), ts(1, 2), "héllo".into());
        s.delete(&[tss(1, 3, 1)]);
        assert_eq!(s.view(), "hllo");
        assert_eq!(s.length(), 4);
        let mut b = BinNode::new(ts(1, 1));
        b.ins(ts(1, 1), ts(1, 2), vec![1, 2, 3]);
        assert_eq!(b.view(), vec![1, 2, 3]);
        assert_eq!(JsonNode::Bin(b).name(), "bin");
    }
}
