//! Compact JSON patch format: positional arrays.
//!
//! ```text
//! [[id, meta?], [opcode, ...operands], ...]
//! ```
//!
//! `id` is `[sid, time]`, or just `time` for the server session. Referenced
//! timestamps of the patch's own session are bare times, others `[sid, time]`;
//! deleted spans are `[time, span]` or `[sid, time, span]`. Binary payloads
//! are base64 strings.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use crdt_pack::PackValue;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{ts, tss, Ts, Tss};
use crate::json_crdt_patch::enums::{session, Opcode};
use crate::json_crdt_patch::operations::{ConValue, Op};
use crate::json_crdt_patch::patch::Patch;

fn timestamp(sid: u64, id: Ts) -> Value {
    if id.sid == sid {
        json!(id.time)
    } else {
        json!([id.sid, id.time])
    }
}

fn timespan(sid: u64, span: &Tss) -> Value {
    if span.sid == sid {
        json!([span.time, span.span])
    } else {
        json!([span.sid, span.time, span.span])
    }
}

/// Fails with `PATCH_EMPTY` for a patch without operations, which has no id.
pub fn encode(patch: &Patch) -> Result<Value, CrdtError> {
    let id = patch.get_id().ok_or(CrdtError::PatchEmpty)?;
    let sid = id.sid;
    let mut header = vec![if sid == session::SERVER {
        json!(id.time)
    } else {
        json!([id.sid, id.time])
    }];
    if let Some(meta) = &patch.meta {
        header.push(meta.to_json());
    }
    let mut out = Vec::with_capacity(patch.ops.len() + 1);
    out.push(Value::Array(header));
    for op in &patch.ops {
        let code = json!(op.opcode() as u8);
        let encoded = match op {
            Op::NewCon { val: ConValue::Ref(r), .. } => json!([code, timestamp(sid, *r), true]),
            Op::NewCon { val: ConValue::Val(PackValue::Undefined), .. } => json!([code]),
            Op::NewCon { val: ConValue::Val(v), .. } => json!([code, v.to_json()]),
            Op::NewVal { .. }
            | Op::NewObj { .. }
            | Op::NewVec { .. }
            | Op::NewStr { .. }
            | Op::NewBin { .. }
            | Op::NewArr { .. } => json!([code]),
            Op::InsVal { obj, val, .. } => json!([code, timestamp(sid, *obj), timestamp(sid, *val)]),
            Op::InsObj { obj, data, .. } => {
                let tuples: Vec<Value> = data.iter().map(|(k, v)| json!([k, timestamp(sid, *v)])).collect();
                json!([code, timestamp(sid, *obj), tuples])
            }
            Op::InsVec { obj, data, .. } => {
                let tuples: Vec<Value> = data.iter().map(|(i, v)| json!([i, timestamp(sid, *v)])).collect();
                json!([code, timestamp(sid, *obj), tuples])
            }
            Op::InsStr { obj, after, data, .. } => {
                json!([code, timestamp(sid, *obj), timestamp(sid, *after), data])
            }
            Op::InsBin { obj, after, data, .. } => {
                json!([code, timestamp(sid, *obj), timestamp(sid, *after), B64.encode(data)])
            }
            Op::InsArr { obj, after, data, .. } => {
                let items: Vec<Value> = data.iter().map(|v| timestamp(sid, *v)).collect();
                json!([code, timestamp(sid, *obj), timestamp(sid, *after), items])
            }
            Op::UpdArr { obj, after, val, .. } => {
                json!([code, timestamp(sid, *obj), timestamp(sid, *after), timestamp(sid, *val)])
            }
            Op::Del { obj, what, .. } => {
                let spans: Vec<Value> = what.iter().map(|s| timespan(sid, s)).collect();
                json!([code, timestamp(sid, *obj), spans])
            }
            Op::Nop { len: 1, .. } => json!([code]),
            Op::Nop { len, .. } => json!([code, len]),
        };
        out.push(encoded);
    }
    Ok(Value::Array(out))
}

fn uint(v: &Value) -> Result<u64, CrdtError> {
    v.as_u64().ok_or_else(|| CrdtError::format(format!("expected unsigned integer, got {v}")))
}

fn array(v: &Value) -> Result<&[Value], CrdtError> {
    v.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| CrdtError::format(format!("expected array, got {v}")))
}

fn at(items: &[Value], i: usize) -> Result<&Value, CrdtError> {
    items.get(i).ok_or_else(|| CrdtError::format(format!("missing operand {i}")))
}

fn decode_ts(sid: u64, v: &Value) -> Result<Ts, CrdtError> {
    match v {
        Value::Number(_) => Ok(ts(sid, uint(v)?)),
        Value::Array(pair) if pair.len() == 2 => Ok(ts(uint(&pair[0])?, uint(&pair[1])?)),
        other => Err(CrdtError::format(format!("invalid timestamp {other}"))),
    }
}

fn decode_tss(sid: u64, v: &Value) -> Result<Tss, CrdtError> {
    let parts = array(v)?;
    match parts {
        [time, span] => Ok(tss(sid, uint(time)?, uint(span)?)),
        [s, time, span] => Ok(tss(uint(s)?, uint(time)?, uint(span)?)),
        _ => Err(CrdtError::format(format!("invalid timespan {v}"))),
    }
}

pub fn decode(data: &Value) -> Result<Patch, CrdtError> {
    let rows = array(data)?;
    debug!(rows = rows.len(), "decoding compact patch");
    let header = array(rows.first().ok_or_else(|| CrdtError::format("missing header"))?)?;
    let (sid, mut time) = match at(header, 0)? {
        Value::Number(_) => (session::SERVER, uint(&header[0])?),
        id => {
            let id = decode_ts(0, id)?;
            (id.sid, id.time)
        }
    };
    let meta = header.get(1).map(PackValue::from_json_lossless);
    let mut ops = Vec::with_capacity(rows.len() - 1);
    for row in &rows[1..] {
        let items = array(row)?;
        let id = ts(sid, time);
        let code = uint(at(items, 0)?)?;
        let code = u8::try_from(code).map_err(|_| CrdtError::UnknownOp(u8::MAX))?;
        let obj = || decode_ts(sid, at(items, 1)?);
        let op = match Opcode::try_from(code)? {
            Opcode::NewCon => match items {
                [_, r, Value::Bool(true)] => Op::NewCon { id, val: ConValue::Ref(decode_ts(sid, r)?) },
                [_, v, ..] => Op::NewCon { id, val: ConValue::Val(PackValue::from_json_lossless(v)) },
                _ => Op::NewCon { id, val: ConValue::Val(PackValue::Undefined) },
            },
            Opcode::NewVal => Op::NewVal { id },
            Opcode::NewObj => Op::NewObj { id },
            Opcode::NewVec => Op::NewVec { id },
            Opcode::NewStr => Op::NewStr { id },
            Opcode::NewBin => Op::NewBin { id },
            Opcode::NewArr => Op::NewArr { id },
            Opcode::InsVal => Op::InsVal { id, obj: obj()?, val: decode_ts(sid, at(items, 2)?)? },
            Opcode::InsObj => {
                let mut data = Vec::new();
                for tuple in array(at(items, 2)?)? {
                    let pair = array(tuple)?;
                    let key = at(pair, 0)?.as_str().ok_or(CrdtError::InvalidObj)?.to_owned();
                    data.push((key, decode_ts(sid, at(pair, 1)?)?));
                }
                Op::InsObj { id, obj: obj()?, data }
            }
            Opcode::InsVec => {
                let mut data = Vec::new();
                for tuple in array(at(items, 2)?)? {
                    let pair = array(tuple)?;
                    let index = u8::try_from(uint(at(pair, 0)?)?).map_err(|_| CrdtError::OutOfBounds)?;
                    data.push((index, decode_ts(sid, at(pair, 1)?)?));
                }
                Op::InsVec { id, obj: obj()?, data }
            }
            Opcode::InsStr => Op::InsStr {
                id,
                obj: obj()?,
                after: decode_ts(sid, at(items, 2)?)?,
                data: at(items, 3)?.as_str().ok_or(CrdtError::InvalidStr)?.to_owned(),
            },
            Opcode::InsBin => Op::InsBin {
                id,
                obj: obj()?,
                after: decode_ts(sid, at(items, 2)?)?,
                data: B64.decode(at(items, 3)?.as_str().ok_or(CrdtError::InvalidBin)?)?,
            },
            Opcode::InsArr => Op::InsArr {
                id,
                obj: obj()?,
                after: decode_ts(sid, at(items, 2)?)?,
                data: array(at(items, 3)?)?
                    .iter()
                    .map(|v| decode_ts(sid, v))
                    .collect::<Result<_, _>>()?,
            },
            Opcode::UpdArr => Op::UpdArr {
                id,
                obj: obj()?,
                after: decode_ts(sid, at(items, 2)?)?,
                val: decode_ts(sid, at(items, 3)?)?,
            },
            Opcode::Del => Op::Del {
                id,
                obj: obj()?,
                what: array(at(items, 2)?)?
                    .iter()
                    .map(|v| decode_tss(sid, v))
                    .collect::<Result<_, _>>()?,
            },
            Opcode::Nop => Op::Nop {
                id,
                len: items.get(1).map(uint).transpose()?.unwrap_or(1),
            },
        };
        time = time
            .checked_add(op.span())
            .ok_or_else(|| CrdtError::format("operation ids overflow"))?;
        ops.push(op);
    }
    Ok(Patch { ops, meta })
}
