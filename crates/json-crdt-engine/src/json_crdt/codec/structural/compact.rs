//! Compact JSON snapshot: positional arrays.
//!
//! ```text
//! [clock, root]
//! ```
//!
//! `clock` is the server time, or a flat `[sid, time, sid, time, …]` table
//! whose first pair is the local session. Node ids are bare times on a
//! server clock and `[-session_index, time_diff]` against the table
//! otherwise; `[0, time]` is a system id and `[sid, time]` with a positive
//! session is absolute. `0` stands for an empty slot.
//!
//! ```text
//! [0, id] | [0, id, value] | [0, id, ref, true]   con
//! [1, id, child]                                  val
//! [2, id, {key: child}]                           obj
//! [3, id, [child | 0]]                            vec
//! [4, id, [[chunk_id, "text" | span]]]            str
//! [5, id, [[chunk_id, "base64" | span]]]          bin
//! [6, id, [[chunk_id, [child] | span]]]           arr
//! ```

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use crdt_pack::PackValue;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt::model::{Model, ModelClock};
use crate::json_crdt::nodes::{ArrNode, BinNode, ConNode, JsonNode, ObjNode, StrNode, ValNode, VecNode};
use crate::json_crdt_patch::clock::{ts, ServerClockVector, Ts};
use crate::json_crdt_patch::codec::clock::{ClockDecoder, ClockEncoder};
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::operations::ConValue;

// ── Encoder ───────────────────────────────────────────────────────────────

struct Encoder<'m> {
    model: &'m Model,
    clock: Option<ClockEncoder>,
}

impl Encoder<'_> {
    fn id(&mut self, id: Ts) -> Result<Value, CrdtError> {
        match &mut self.clock {
            None if id.sid == session::SERVER => Ok(json!(id.time)),
            None => Ok(json!([id.sid, id.time])),
            Some(clock) => {
                let rel = clock.append(id)?;
                Ok(json!([-(rel.session_index as i64), rel.time_diff]))
            }
        }
    }

    fn child(&mut self, id: Ts) -> Result<Value, CrdtError> {
        let model = self.model;
        match model.index.get(&id) {
            Some(node) => self.node(node),
            None => Ok(json!(0)),
        }
    }

    fn chunks<T>(
        &mut self,
        rga: impl Iterator<Item = (Ts, u64, Option<T>)>,
        mut data: impl FnMut(&mut Self, T) -> Result<Value, CrdtError>,
    ) -> Result<Value, CrdtError> {
        let mut out = Vec::new();
        for (id, span, content) in rga {
            let id = self.id(id)?;
            let body = match content {
                Some(content) => data(self, content)?,
                None => json!(span),
            };
            out.push(json!([id, body]));
        }
        Ok(Value::Array(out))
    }

    fn node(&mut self, node: &JsonNode) -> Result<Value, CrdtError> {
        let code = json!(node.data_type() as u8);
        let id = self.id(node.id())?;
        Ok(match node {
            JsonNode::Con(n) => match &n.val {
                ConValue::Val(PackValue::Undefined) => json!([code, id]),
                ConValue::Val(value) => json!([code, id, value.to_json()]),
                ConValue::Ref(reference) => json!([code, id, self.id(*reference)?, true]),
            },
            JsonNode::Val(n) => json!([code, id, self.child(n.val)?]),
            JsonNode::Obj(n) => {
                let mut map = Map::with_capacity(n.keys.len());
                for (key, val) in &n.keys {
                    map.insert(key.clone(), self.child(*val)?);
                }
                json!([code, id, map])
            }
            JsonNode::Vec(n) => {
                let mut slots = Vec::with_capacity(n.elements.len());
                for slot in &n.elements {
                    slots.push(match slot {
                        Some(val) => self.child(*val)?,
                        None => json!(0),
                    });
                }
                json!([code, id, slots])
            }
            JsonNode::Str(n) => {
                let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
                json!([code, id, self.chunks(chunks, |_, text: &str| Ok(json!(text)))?])
            }
            JsonNode::Bin(n) => {
                let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
                json!([code, id, self.chunks(chunks, |_, bytes: &[u8]| Ok(json!(B64.encode(bytes))))?])
            }
            JsonNode::Arr(n) => {
                let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
                let body = self.chunks(chunks, |enc, values: &[Ts]| {
                    let mut children = Vec::with_capacity(values.len());
                    for val in values {
                        children.push(enc.child(*val)?);
                    }
                    Ok(Value::Array(children))
                })?;
                json!([code, id, body])
            }
        })
    }
}

pub fn encode(model: &Model) -> Result<Value, CrdtError> {
    let clock = match &model.clock {
        ModelClock::Logical(clock) => {
            let mut encoder = ClockEncoder::new();
            encoder.reset(clock);
            Some(encoder)
        }
        ModelClock::Server(_) => None,
    };
    let mut encoder = Encoder { model, clock };
    let root = encoder.child(model.root.val)?;
    let clock = match (&encoder.clock, &model.clock) {
        (Some(table), _) => json!(table.to_json()),
        (None, clock) => json!(clock.time()),
    };
    Ok(json!([clock, root]))
}

// ── Decoder ───────────────────────────────────────────────────────────────

fn uint(v: &Value) -> Result<u64, CrdtError> {
    v.as_u64().ok_or_else(|| CrdtError::format(format!("expected unsigned integer, got {v}")))
}

fn array(v: &Value) -> Result<&[Value], CrdtError> {
    v.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| CrdtError::format(format!("expected array, got {v}")))
}

fn at(items: &[Value], i: usize) -> Result<&Value, CrdtError> {
    items.get(i).ok_or_else(|| CrdtError::format(format!("missing field {i}")))
}

struct Decoder {
    clock: Option<ClockDecoder>,
}

impl Decoder {
    fn id(&self, v: &Value) -> Result<Ts, CrdtError> {
        match v {
            Value::Number(_) => Ok(ts(session::SERVER, uint(v)?)),
            Value::Array(pair) if pair.len() == 2 => {
                let time = uint(&pair[1])?;
                match (pair[0].as_i64(), &self.clock) {
                    (Some(index), Some(clock)) if index <= 0 => clock.decode_id(index.unsigned_abs(), time),
                    _ => Ok(ts(uint(&pair[0])?, time)),
                }
            }
            other => Err(CrdtError::format(format!("invalid id {other}"))),
        }
    }

    fn child(&self, v: &Value, model: &mut Model) -> Result<Ts, CrdtError> {
        match v {
            Value::Number(n) if n.as_u64() == Some(0) => Ok(UNDEFINED),
            _ => self.node(v, model),
        }
    }

    fn chunks<'v, T>(
        &self,
        v: &'v Value,
        mut push: impl FnMut(Ts, u64, Option<T>),
        mut data: impl FnMut(&'v Value) -> Result<(u64, T), CrdtError>,
    ) -> Result<(), CrdtError> {
        for chunk in array(v)? {
            let parts = array(chunk)?;
            let id = self.id(at(parts, 0)?)?;
            match at(parts, 1)? {
                Value::Number(_) => push(id, uint(&parts[1])?, None),
                body => {
                    let (span, content) = data(body)?;
                    push(id, span, Some(content));
                }
            }
        }
        Ok(())
    }

    fn node(&self, v: &Value, model: &mut Model) -> Result<Ts, CrdtError> {
        let parts = array(v)?;
        let data_type = u8::try_from(uint(at(parts, 0)?)?).map_err(|_| CrdtError::UnknownNode)?;
        let id = self.id(at(parts, 1)?)?;
        let node = match DataType::try_from(data_type)? {
            DataType::Con => {
                let val = match parts {
                    [_, _] => ConValue::Val(PackValue::Undefined),
                    [_, _, value] => ConValue::Val(PackValue::from_json_lossless(value)),
                    [_, _, reference, Value::Bool(true)] => ConValue::Ref(self.id(reference)?),
                    _ => return Err(CrdtError::format(format!("invalid con node {v}"))),
                };
                JsonNode::Con(ConNode::new(id, val))
            }
            DataType::Val => JsonNode::Val(ValNode::new(id, self.child(at(parts, 2)?, model)?)),
            DataType::Obj => {
                let map = at(parts, 2)?
                    .as_object()
                    .ok_or_else(|| CrdtError::format(format!("invalid obj node {v}")))?;
                let mut obj = ObjNode::new(id);
                for (key, child) in map {
                    let val = self.child(child, model)?;
                    obj.keys.insert(key.clone(), val);
                }
                JsonNode::Obj(obj)
            }
            DataType::Vec => {
                let slots = array(at(parts, 2)?)?;
                if slots.len() > MAX_TUPLE_LENGTH {
                    return Err(CrdtError::InvalidVec);
                }
                let mut vec = VecNode::new(id);
                for slot in slots {
                    let val = self.child(slot, model)?;
                    vec.elements.push((val != UNDEFINED).then_some(val));
                }
                JsonNode::Vec(vec)
            }
            DataType::Str => {
                let mut node = StrNode::new(id);
                self.chunks(
                    at(parts, 2)?,
                    |id, span, data| node.rga.push_chunk(id, span, data),
                    |body| {
                        let text = body.as_str().ok_or(CrdtError::InvalidStr)?;
                        Ok((text.chars().count() as u64, text.to_owned()))
                    },
                )?;
                JsonNode::Str(node)
            }
            DataType::Bin => {
                let mut node = BinNode::new(id);
                self.chunks(
                    at(parts, 2)?,
                    |id, span, data| node.rga.push_chunk(id, span, data),
                    |body| {
                        let bytes = B64.decode(body.as_str().ok_or(CrdtError::InvalidBin)?)?;
                        Ok((bytes.len() as u64, bytes))
                    },
                )?;
                JsonNode::Bin(node)
            }
            DataType::Arr => {
                let mut node = ArrNode::new(id);
                let mut chunks = Vec::new();
                self.chunks(
                    at(parts, 2)?,
                    |id, span, data| chunks.push((id, span, data)),
                    |body| {
                        let items = array(body)?;
                        Ok((items.len() as u64, items))
                    },
                )?;
                for (chunk_id, span, items) in chunks {
                    let data = match items {
                        Some(items) => {
                            let mut values = Vec::with_capacity(items.len());
                            for item in items {
                                values.push(self.child(item, model)?);
                            }
                            Some(values)
                        }
                        None => None,
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

pub fn decode(data: &Value) -> Result<Model, CrdtError> {
    let parts = array(data)?;
    debug!("decoding compact model");
    let (clock, mut model) = match at(parts, 0)? {
        Value::Number(_) => {
            let time = uint(&parts[0])?;
            (None, Model::from_clock(ModelClock::Server(ServerClockVector::new(time))))
        }
        table => {
            let flat = array(table)?.iter().map(uint).collect::<Result<Vec<u64>, _>>()?;
            let decoder = ClockDecoder::from_arr(&flat)?;
            let model = Model::from_clock(ModelClock::Logical(decoder.clock.clone()));
            (Some(decoder), model)
        }
    };
    let decoder = Decoder { clock };
    let root = decoder.child(at(parts, 1)?, &mut model)?;
    model.root = ValNode::new(ORIGIN, root);
    Ok(model)
}
