//! Verbose JSON snapshot: self-describing objects, meant for debugging and
//! fixtures.
//!
//! ```text
//! {"time": clock, "root": node | null}
//! ```
//!
//! `clock` is the server time, or `[[sid, next_time], [peer_sid, time], …]`
//! with the local session first. Ids are `[sid, time]`; on a server clock
//! ids of the server session are bare times.
//!
//! ```text
//! {"type": "con", "id", "value"?}       "value" absent means undefined
//! {"type": "con", "id", "ref": id}
//! {"type": "val", "id", "value": node | null}
//! {"type": "obj", "id", "map": {key: node | null}}
//! {"type": "vec", "id", "map": [node | null]}
//! {"type": "str" | "bin" | "arr", "id", "chunks": [{"id", "value"} | {"id", "span"}]}
//! ```
//!
//! Binary chunk values are base64, array chunk values are lists of nodes.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use crdt_pack::PackValue;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt::model::{Model, ModelClock};
use crate::json_crdt::nodes::{ArrNode, BinNode, ConNode, JsonNode, ObjNode, StrNode, ValNode, VecNode};
use crate::json_crdt_patch::clock::{ts, ClockVector, ServerClockVector, Ts};
use crate::json_crdt_patch::constants::{MAX_TUPLE_LENGTH, ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::{session, DataType};
use crate::json_crdt_patch::operations::ConValue;

// ── Encoding ──────────────────────────────────────────────────────────────

fn encode_id(server: bool, id: Ts) -> Value {
    if server && id.sid == session::SERVER {
        json!(id.time)
    } else {
        json!([id.sid, id.time])
    }
}

fn encode_child(model: &Model, server: bool, id: Ts) -> Value {
    match model.index.get(&id) {
        Some(node) => encode_node(model, server, node),
        None => Value::Null,
    }
}

fn encode_chunks<T>(
    server: bool,
    chunks: impl Iterator<Item = (Ts, u64, Option<T>)>,
    mut value: impl FnMut(T) -> Value,
) -> Value {
    let out: Vec<Value> = chunks
        .map(|(id, span, data)| match data {
            Some(data) => json!({"id": encode_id(server, id), "value": value(data)}),
            None => json!({"id": encode_id(server, id), "span": span}),
        })
        .collect();
    Value::Array(out)
}

fn encode_node(model: &Model, server: bool, node: &JsonNode) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), json!(node.name()));
    out.insert("id".into(), encode_id(server, node.id()));
    match node {
        JsonNode::Con(n) => match &n.val {
            ConValue::Val(PackValue::Undefined) => {}
            ConValue::Val(value) => {
                out.insert("value".into(), value.to_json());
            }
            ConValue::Ref(reference) => {
                out.insert("ref".into(), encode_id(server, *reference));
            }
        },
        JsonNode::Val(n) => {
            out.insert("value".into(), encode_child(model, server, n.val));
        }
        JsonNode::Obj(n) => {
            let map: Map<String, Value> = n
                .keys
                .iter()
                .map(|(key, val)| (key.clone(), encode_child(model, server, *val)))
                .collect();
            out.insert("map".into(), Value::Object(map));
        }
        JsonNode::Vec(n) => {
            let slots: Vec<Value> = n
                .elements
                .iter()
                .map(|slot| slot.map_or(Value::Null, |val| encode_child(model, server, val)))
                .collect();
            out.insert("map".into(), Value::Array(slots));
        }
        JsonNode::Str(n) => {
            let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
            out.insert("chunks".into(), encode_chunks(server, chunks, |text: &str| json!(text)));
        }
        JsonNode::Bin(n) => {
            let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
            out.insert("chunks".into(), encode_chunks(server, chunks, |bytes: &[u8]| json!(B64.encode(bytes))));
        }
        JsonNode::Arr(n) => {
            let chunks = n.rga.iter().map(|c| (c.id, c.span, c.data.as_deref()));
            let body = encode_chunks(server, chunks, |values: &[Ts]| {
                Value::Array(values.iter().map(|val| encode_child(model, server, *val)).collect())
            });
            out.insert("chunks".into(), body);
        }
    }
    Value::Object(out)
}

pub fn encode(model: &Model) -> Value {
    let (server, time) = match &model.clock {
        ModelClock::Server(clock) => (true, json!(clock.time)),
        ModelClock::Logical(clock) => {
            let mut entries = vec![json!([clock.sid, clock.time])];
            entries.extend(clock.sorted_peers().into_iter().map(|p| json!([p.sid, p.time])));
            (false, Value::Array(entries))
        }
    };
    json!({"time": time, "root": encode_child(model, server, model.root.val)})
}

// ── Decoding ──────────────────────────────────────────────────────────────

fn uint(v: &Value) -> Result<u64, CrdtError> {
    v.as_u64().ok_or_else(|| CrdtError::format(format!("expected unsigned integer, got {v}")))
}

fn field<'v>(obj: &'v Map<String, Value>, key: &str) -> Result<&'v Value, CrdtError> {
    obj.get(key).ok_or_else(|| CrdtError::format(format!("missing \"{key}\"")))
}

fn list(v: &Value) -> Result<&[Value], CrdtError> {
    v.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| CrdtError::format(format!("expected array, got {v}")))
}

fn decode_id(v: &Value) -> Result<Ts, CrdtError> {
    match v {
        Value::Number(_) => Ok(ts(session::SERVER, uint(v)?)),
        Value::Array(pair) if pair.len() == 2 => Ok(ts(uint(&pair[0])?, uint(&pair[1])?)),
        other => Err(CrdtError::format(format!("invalid id {other}"))),
    }
}

fn decode_clock(v: &Value) -> Result<ModelClock, CrdtError> {
    if let Value::Number(_) = v {
        return Ok(ModelClock::Server(ServerClockVector::new(uint(v)?)));
    }
    let entries = list(v)?;
    let (local, peers) = entries.split_first().ok_or(CrdtError::InvalidClockTable)?;
    let local = decode_id(local)?;
    let mut clock = ClockVector::new(local.sid, local.time);
    for peer in peers {
        clock.observe(decode_id(peer)?, 1);
    }
    Ok(ModelClock::Logical(clock))
}

fn decode_child(v: &Value, model: &mut Model) -> Result<Ts, CrdtError> {
    match v {
        Value::Null => Ok(UNDEFINED),
        _ => decode_node(v, model),
    }
}

/// Calls `push` once per chunk; `value` turns a live chunk's payload into
/// its span and data.
fn decode_chunks<'v, T>(
    v: &'v Value,
    mut push: impl FnMut(Ts, u64, Option<T>),
    mut value: impl FnMut(&'v Value) -> Result<(u64, T), CrdtError>,
) -> Result<(), CrdtError> {
    for chunk in list(v)? {
        let chunk = chunk
            .as_object()
            .ok_or_else(|| CrdtError::format(format!("invalid chunk {chunk}")))?;
        let id = decode_id(field(chunk, "id")?)?;
        match chunk.get("value") {
            Some(body) => {
                let (span, data) = value(body)?;
                push(id, span, Some(data));
            }
            None => push(id, uint(field(chunk, "span")?)?, None),
        }
    }
    Ok(())
}

fn decode_node(v: &Value, model: &mut Model) -> Result<Ts, CrdtError> {
    let obj = v
        .as_object()
        .ok_or_else(|| CrdtError::format(format!("expected node, got {v}")))?;
    let name = field(obj, "type")?.as_str().unwrap_or_default();
    let data_type = DataType::from_name(name).ok_or(CrdtError::UnknownNode)?;
    let id = decode_id(field(obj, "id")?)?;
    let node = match data_type {
        DataType::Con => {
            let val = match (obj.get("ref"), obj.get("value")) {
                (Some(reference), _) => ConValue::Ref(decode_id(reference)?),
                (None, Some(value)) => ConValue::Val(PackValue::from_json_lossless(value)),
                (None, None) => ConValue::Val(PackValue::Undefined),
            };
            JsonNode::Con(ConNode::new(id, val))
        }
        DataType::Val => JsonNode::Val(ValNode::new(id, decode_child(field(obj, "value")?, model)?)),
        DataType::Obj => {
            let map = field(obj, "map")?
                .as_object()
                .ok_or_else(|| CrdtError::format("obj map must be an object"))?;
            let mut node = ObjNode::new(id);
            for (key, child) in map {
                let val = decode_child(child, model)?;
                node.keys.insert(key.clone(), val);
            }
            JsonNode::Obj(node)
        }
        DataType::Vec => {
            let slots = list(field(obj, "map")?)?;
            if slots.len() > MAX_TUPLE_LENGTH {
                return Err(CrdtError::InvalidVec);
            }
            let mut node = VecNode::new(id);
            for slot in slots {
                let val = decode_child(slot, model)?;
                node.elements.push((val != UNDEFINED).then_some(val));
            }
            JsonNode::Vec(node)
        }
        DataType::Str => {
            let mut node = StrNode::new(id);
            decode_chunks(
                field(obj, "chunks")?,
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
            decode_chunks(
                field(obj, "chunks")?,
                |id, span, data| node.rga.push_chunk(id, span, data),
                |body| {
                    let bytes = B64.decode(body.as_str().ok_or(CrdtError::InvalidBin)?)?;
                    Ok((bytes.len() as u64, bytes))
                },
            )?;
            JsonNode::Bin(node)
        }
        DataType::Arr => {
            let mut chunks = Vec::new();
            decode_chunks(
                field(obj, "chunks")?,
                |id, span, data| chunks.push((id, span, data)),
                |body| {
                    let items = list(body)?;
                    Ok((items.len() as u64, items))
                },
            )?;
            let mut node = ArrNode::new(id);
            for (chunk_id, span, items) in chunks {
                let data = match items {
                    Some(items) => Some(
                        items
                            .iter()
                            .map(|item| decode_child(item, model))
                            .collect::<Result<Vec<Ts>, _>>()?,
                    ),
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

pub fn decode(data: &Value) -> Result<Model, CrdtError> {
    debug!("decoding verbose model");
    let doc = data
        .as_object()
        .ok_or_else(|| CrdtError::format("verbose model must be an object"))?;
    let mut model = Model::from_clock(decode_clock(field(doc, "time")?)?);
    let root = match doc.get("root") {
        Some(root) => decode_child(root, &mut model)?,
        None => UNDEFINED,
    };
    model.root = ValNode::new(ORIGIN, root);
    Ok(model)
}
