//! Local editing API.
//!
//! [`ModelApi`] turns position-based edits ("insert `x` at 3") into
//! operations on the model's own clock, applies them right away and keeps
//! them so that [`ModelApi::flush`] can hand the whole batch over for
//! sending to other replicas.
//!
//! ```
//! use json_crdt_engine::Model;
//! use serde_json::json;
//!
//! let mut model = Model::new(70000);
//! let mut api = model.api();
//! api.set_root(&json!({"text": "helo"})).unwrap();
//! let text = api.find(&[json!("text")]).unwrap();
//! api.str_ins(text, 3, "l").unwrap();
//! let patch = api.flush();
//! assert_eq!(model.view(), json!({"text": "hello"}));
//! assert!(!patch.is_empty());
//! ```

use std::mem;

use crdt_pack::PackValue;
use serde_json::Value;
use thiserror::Error;

use super::Model;
use crate::error::CrdtError;
use crate::json_crdt::extensions::{cnt, mval, CntApi, ExtId, MvalApi};
use crate::json_crdt::nodes::rga::{ChunkData, Rga};
use crate::json_crdt::nodes::JsonNode;
use crate::json_crdt_patch::clock::{Ts, Tss};
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN};
use crate::json_crdt_patch::patch::Patch;
use crate::json_crdt_patch::patch_builder::PatchBuilder;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("WRONG_TYPE")]
    WrongType,
    #[error("OUT_OF_BOUNDS")]
    OutOfBounds,
    #[error(transparent)]
    Crdt(#[from] CrdtError),
}

pub struct ModelApi<'a> {
    pub model: &'a mut Model,
    /// Records operations on the model's clock; flushed by
    /// [`ModelApi::apply`].
    pub builder: PatchBuilder,
    applied: Patch,
}

impl<'a> ModelApi<'a> {
    pub fn new(model: &'a mut Model) -> Self {
        let builder = model.builder();
        Self {
            model,
            builder,
            applied: Patch::new(),
        }
    }

    /// Applies the operations recorded since the last call.
    pub fn apply(&mut self) {
        let patch = self.builder.flush();
        if patch.is_empty() {
            return;
        }
        self.model.apply_patch(&patch);
        self.applied.ops.extend(patch.ops);
    }

    /// Applies pending operations and returns everything applied through
    /// this handle since the previous flush.
    pub fn flush(&mut self) -> Patch {
        self.apply();
        mem::take(&mut self.applied)
    }

    // ── navigation ────────────────────────────────────────────────────────

    /// Node at `path` from the document root.
    pub fn find(&self, path: &[Value]) -> Result<Ts, ApiError> {
        find_path(self.model, self.model.root.val, path)
    }

    pub fn find_from(&self, start: Ts, path: &[Value]) -> Result<Ts, ApiError> {
        find_path(self.model, start, path)
    }

    fn node(&self, id: Ts) -> Result<&JsonNode, ApiError> {
        self.model.index.get(&id).ok_or(ApiError::NotFound)
    }

    // ── val ───────────────────────────────────────────────────────────────

    /// Replaces the whole document.
    pub fn set_root(&mut self, value: &Value) -> Result<(), ApiError> {
        let val = self.builder.const_or_json(&PackValue::from(value));
        self.set_root_id(val);
        Ok(())
    }

    /// Points the root at an already recorded node.
    pub fn set_root_id(&mut self, id: Ts) {
        self.builder.root(id);
        self.apply();
    }

    pub fn val_set(&mut self, val: Ts, value: &Value) -> Result<(), ApiError> {
        if val != ORIGIN && !matches!(self.node(val)?, JsonNode::Val(_)) {
            return Err(ApiError::WrongType);
        }
        let child = self.builder.const_or_json(&PackValue::from(value));
        self.builder.set_val(val, child);
        self.apply();
        Ok(())
    }

    // ── obj ───────────────────────────────────────────────────────────────

    pub fn obj_set(&mut self, obj: Ts, entries: &[(String, Value)]) -> Result<(), ApiError> {
        if !matches!(self.node(obj)?, JsonNode::Obj(_)) {
            return Err(ApiError::WrongType);
        }
        let data: Vec<(String, Ts)> = entries
            .iter()
            .map(|(key, value)| (key.clone(), self.builder.const_or_json(&PackValue::from(value))))
            .collect();
        self.builder.ins_obj(obj, data);
        self.apply();
        Ok(())
    }

    /// Deletes keys by pointing them at an `undefined` constant.
    pub fn obj_del(&mut self, obj: Ts, keys: &[&str]) -> Result<(), ApiError> {
        if !matches!(self.node(obj)?, JsonNode::Obj(_)) {
            return Err(ApiError::WrongType);
        }
        let data: Vec<(String, Ts)> = keys
            .iter()
            .map(|key| ((*key).to_owned(), self.builder.con(PackValue::Undefined)))
            .collect();
        self.builder.ins_obj(obj, data);
        self.apply();
        Ok(())
    }

    pub fn obj_get(&self, obj: Ts, key: &str) -> Result<Option<Ts>, ApiError> {
        match self.node(obj)? {
            JsonNode::Obj(node) => Ok(node.get(key)),
            _ => Err(ApiError::WrongType),
        }
    }

    // ── vec ───────────────────────────────────────────────────────────────

    pub fn vec_set(&mut self, vec: Ts, entries: &[(usize, Value)]) -> Result<(), ApiError> {
        if !matches!(self.node(vec)?, JsonNode::Vec(_)) {
            return Err(ApiError::WrongType);
        }
        if entries.iter().any(|(index, _)| *index >= MAX_TUPLE_LENGTH) {
            return Err(ApiError::OutOfBounds);
        }
        let data: Vec<(u8, Ts)> = entries
            .iter()
            .map(|(index, value)| (*index as u8, self.builder.const_or_json(&PackValue::from(value))))
            .collect();
        self.builder.ins_vec(vec, data);
        self.apply();
        Ok(())
    }

    // ── str ───────────────────────────────────────────────────────────────

    fn str_rga(&self, id: Ts) -> Result<&Rga<String>, ApiError> {
        match self.node(id)? {
            JsonNode::Str(node) => Ok(&node.rga),
            _ => Err(ApiError::WrongType),
        }
    }

    /// Inserts `text` so that it starts at character `pos`.
    pub fn str_ins(&mut self, id: Ts, pos: u64, text: &str) -> Result<(), ApiError> {
        let after = insert_anchor(self.str_rga(id)?, pos)?;
        self.builder.ins_str(id, after, text);
        self.apply();
        Ok(())
    }

    pub fn str_del(&mut self, id: Ts, pos: u64, len: u64) -> Result<(), ApiError> {
        let spans = delete_spans(self.str_rga(id)?, pos, len)?;
        self.delete(id, spans);
        Ok(())
    }

    pub fn str_len(&self, id: Ts) -> Result<u64, ApiError> {
        Ok(self.str_rga(id)?.length())
    }

    // ── bin ───────────────────────────────────────────────────────────────

    fn bin_rga(&self, id: Ts) -> Result<&Rga<Vec<u8>>, ApiError> {
        match self.node(id)? {
            JsonNode::Bin(node) => Ok(&node.rga),
            _ => Err(ApiError::WrongType),
        }
    }

    pub fn bin_ins(&mut self, id: Ts, pos: u64, data: &[u8]) -> Result<(), ApiError> {
        let after = insert_anchor(self.bin_rga(id)?, pos)?;
        self.builder.ins_bin(id, after, data.to_vec());
        self.apply();
        Ok(())
    }

    pub fn bin_del(&mut self, id: Ts, pos: u64, len: u64) -> Result<(), ApiError> {
        let spans = delete_spans(self.bin_rga(id)?, pos, len)?;
        self.delete(id, spans);
        Ok(())
    }

    pub fn bin_len(&self, id: Ts) -> Result<u64, ApiError> {
        Ok(self.bin_rga(id)?.length())
    }

    // ── arr ───────────────────────────────────────────────────────────────

    fn arr_rga(&self, id: Ts) -> Result<&Rga<Vec<Ts>>, ApiError> {
        match self.node(id)? {
            JsonNode::Arr(node) => Ok(&node.rga),
            _ => Err(ApiError::WrongType),
        }
    }

    /// Inserts `values` so that the first one lands at index `pos`.
    pub fn arr_ins(&mut self, id: Ts, pos: u64, values: &[Value]) -> Result<(), ApiError> {
        let after = insert_anchor(self.arr_rga(id)?, pos)?;
        let data: Vec<Ts> = values
            .iter()
            .map(|value| self.builder.json(&PackValue::from(value)))
            .collect();
        self.builder.ins_arr(id, after, data);
        self.apply();
        Ok(())
    }

    pub fn arr_del(&mut self, id: Ts, pos: u64, len: u64) -> Result<(), ApiError> {
        let spans = delete_spans(self.arr_rga(id)?, pos, len)?;
        self.delete(id, spans);
        Ok(())
    }

    /// Replaces the value at index `pos`.
    pub fn arr_upd(&mut self, id: Ts, pos: u64, value: &Value) -> Result<(), ApiError> {
        let element = self.arr_rga(id)?.find(pos).ok_or(ApiError::OutOfBounds)?;
        let val = self.builder.const_or_json(&PackValue::from(value));
        self.builder.upd_arr(id, element, val);
        self.apply();
        Ok(())
    }

    pub fn arr_len(&self, id: Ts) -> Result<u64, ApiError> {
        Ok(self.arr_rga(id)?.length())
    }

    /// Id of the value at index `pos`.
    pub fn arr_get(&self, id: Ts, pos: u64) -> Result<Ts, ApiError> {
        match self.node(id)? {
            JsonNode::Arr(node) => node.get_value(pos).ok_or(ApiError::OutOfBounds),
            _ => Err(ApiError::WrongType),
        }
    }

    fn delete(&mut self, id: Ts, spans: Vec<Tss>) {
        if spans.is_empty() {
            return;
        }
        self.builder.del(id, spans);
        self.apply();
    }

    // ── extensions ────────────────────────────────────────────────────────

    /// Data node of the extension node `id`, checking that it is an
    /// instance of extension `ext`.
    pub fn ext_data(&self, id: Ts, ext: ExtId) -> Result<Ts, ApiError> {
        let JsonNode::Vec(vec) = self.node(id)? else {
            return Err(ApiError::WrongType);
        };
        if vec.ext_id(&self.model.index) != Some(ext) {
            return Err(ApiError::WrongType);
        }
        vec.ext_data().ok_or(ApiError::NotFound)
    }

    pub fn cnt(&mut self, id: Ts) -> Result<CntApi<'_, 'a>, ApiError> {
        self.ext_data(id, cnt::ID)?;
        Ok(CntApi::new(self, id))
    }

    pub fn mval(&mut self, id: Ts) -> Result<MvalApi<'_, 'a>, ApiError> {
        self.ext_data(id, mval::ID)?;
        Ok(MvalApi::new(self, id))
    }
}

/// Element to insert after so that new content starts at `pos`.
fn insert_anchor<T: ChunkData>(rga: &Rga<T>, pos: u64) -> Result<Ts, ApiError> {
    if pos == 0 {
        return Ok(rga.id);
    }
    rga.find(pos - 1).ok_or(ApiError::OutOfBounds)
}

fn delete_spans<T: ChunkData>(rga: &Rga<T>, pos: u64, len: u64) -> Result<Vec<Tss>, ApiError> {
    let end = pos.checked_add(len).ok_or(ApiError::OutOfBounds)?;
    if end > rga.length() {
        return Err(ApiError::OutOfBounds);
    }
    Ok(rga.find_interval(pos, len))
}

/// Walks `path` from `start`. Object steps are keys; array and tuple steps
/// are indices, given as numbers or numeric strings. `val` registers are
/// looked through before every step and at the end.
pub fn find_path(model: &Model, start: Ts, path: &[Value]) -> Result<Ts, ApiError> {
    let mut current = unwrap_val(model, start);
    for step in path {
        let node = model.index.get(&current).ok_or(ApiError::NotFound)?;
        current = match node {
            JsonNode::Obj(obj) => {
                let key = step.as_str().ok_or(ApiError::NotFound)?;
                obj.get(key).ok_or(ApiError::NotFound)?
            }
            JsonNode::Arr(arr) => arr.get_value(step_index(step)?).ok_or(ApiError::OutOfBounds)?,
            JsonNode::Vec(vec) => {
                let index = usize::try_from(step_index(step)?).map_err(|_| ApiError::OutOfBounds)?;
                vec.get(index).ok_or(ApiError::OutOfBounds)?
            }
            _ => return Err(ApiError::WrongType),
        };
        current = unwrap_val(model, current);
    }
    Ok(current)
}

fn unwrap_val(model: &Model, mut id: Ts) -> Ts {
    while let Some(JsonNode::Val(val)) = model.index.get(&id) {
        id = val.val;
    }
    id
}

fn step_index(step: &Value) -> Result<u64, ApiError> {
    match step {
        Value::Number(n) => n.as_u64().ok_or(ApiError::OutOfBounds),
        Value::String(s) => s.parse().map_err(|_| ApiError::NotFound),
        _ => Err(ApiError::NotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Model {
        let mut model = Model::new(70000);
        model.api().set_root(&value).unwrap();
        model
    }

    #[test]
    fn string_editing() {
        let mut model = doc(json!({"s": "helo"}));
        let mut api = model.api();
        let s = api.find(&[json!("s")]).unwrap();
        api.str_ins(s, 3, "l").unwrap();
        api.str_ins(s, 0, ">").unwrap();
        api.str_ins(s, 6, "!").unwrap();
        assert_eq!(api.str_len(s), Ok(7));
        api.str_del(s, 0, 1).unwrap();
        assert_eq!(api.str_ins(s, 99, "x"), Err(ApiError::OutOfBounds));
        assert_eq!(api.str_del(s, 4, 5), Err(ApiError::OutOfBounds));
        api.flush();
        assert_eq!(model.view(), json!({"s": "hello!"}));
    }

    #[test]
    fn object_set_and_delete() {
        let mut model = doc(json!({"a": 1, "b": 2}));
        let mut api = model.api();
        let obj = api.find(&[]).unwrap();
        api.obj_set(obj, &[("c".into(), json!([true]))]).unwrap();
        api.obj_del(obj, &["a"]).unwrap();
        assert!(api.obj_get(obj, "a").unwrap().is_some());
        assert_eq!(api.obj_get(obj, "zzz"), Ok(None));
        api.flush();
        assert_eq!(model.view(), json!({"b": 2, "c": [true]}));
    }

    #[test]
    fn array_editing() {
        let mut model = doc(json!([1, 2, 3]));
        let mut api = model.api();
        let arr = api.find(&[]).unwrap();
        api.arr_ins(arr, 1, &[json!("x"), json!({"y": null})]).unwrap();
        api.arr_del(arr, 0, 1).unwrap();
        api.arr_upd(arr, 2, &json!(20)).unwrap();
        assert_eq!(api.arr_len(arr), Ok(4));
        assert!(api.arr_get(arr, 4).is_err());
        let y = api.find(&[json!(1), json!("y")]).unwrap();
        assert!(matches!(model.node(y), Some(JsonNode::Con(_))));
        assert_eq!(model.view(), json!(["x", {"y": null}, 20, 3]));
    }

    #[test]
    fn bin_editing() {
        let mut model = Model::new(70000);
        let mut api = model.api();
        let bin = api.builder.json_bin(&[1, 2, 3, 4]);
        api.set_root_id(bin);
        api.bin_ins(bin, 2, &[9, 9]).unwrap();
        api.bin_del(bin, 0, 1).unwrap();
        assert_eq!(api.bin_len(bin), Ok(5));
        api.flush();
        assert_eq!(model.view_pack(), PackValue::Bytes(vec![2, 9, 9, 3, 4]));
    }

    #[test]
    fn vec_and_val() {
        let mut model = Model::new(70000);
        let mut api = model.api();
        let vec = api.builder.vec();
        let reg = api.builder.val();
        api.builder.ins_vec(vec, vec![(0, reg)]);
        api.set_root_id(vec);
        api.vec_set(vec, &[(1, json!("b"))]).unwrap();
        api.val_set(reg, &json!(5)).unwrap();
        assert_eq!(api.vec_set(vec, &[(256, json!(0))]), Err(ApiError::OutOfBounds));
        assert_eq!(api.val_set(vec, &json!(0)), Err(ApiError::WrongType));
        assert_eq!(api.find(&[json!("0")]), Ok(api.find(&[json!(0)]).unwrap()));
        api.flush();
        assert_eq!(model.view(), json!([5, "b"]));
    }

    #[test]
    fn find_errors() {
        let mut model = doc(json!({"a": [1]}));
        let api = model.api();
        assert_eq!(api.find(&[json!("missing")]), Err(ApiError::NotFound));
        assert_eq!(api.find(&[json!("a"), json!(3)]), Err(ApiError::OutOfBounds));
        assert_eq!(api.find(&[json!("a"), json!(0), json!("x")]), Err(ApiError::WrongType));
    }

    #[test]
    fn flush_returns_everything_applied() {
        let mut model = Model::new(70000);
        let mut api = model.api();
        api.set_root(&json!({"n": 1})).unwrap();
        let obj = api.find(&[]).unwrap();
        api.obj_set(obj, &[("n".into(), json!(2))]).unwrap();
        let patch = api.flush();
        assert!(api.flush().is_empty());
        let mut replica = Model::new(80000);
        replica.apply_patch(&patch);
        assert_eq!(replica.view(), json!({"n": 2}));
        assert_eq!(model.view(), json!({"n": 2}));
    }
}
