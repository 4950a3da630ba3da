//! Verbose JSON patch format: one self-describing object per operation.
//!
//! ```json
//! {"id": [sid, time], "meta": …, "ops": [{"op": "new_con", "value": 1}, …]}
//! ```
//!
//! Server-session timestamps are written as bare times.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use crdt_pack::PackValue;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{ts, tss, Ts, Tss};
use crate::json_crdt_patch::enums::{session, Opcode};
use crate::json_crdt_patch::operations::{opcode_from_name, ConValue, Op};
use crate::json_crdt_patch::patch::Patch;

fn timestamp(id: Ts) -> Value {
    if id.sid == session::SERVER {
        json!(id.time)
    } else {
        json!([id.sid, id.time])
    }
}

fn timespan(span: &Tss) -> Value {
    if span.sid == session::SERVER {
        json!([span.time, span.span])
    } else {
        json!([span.sid, span.time, span.span])
    }
}

fn encode_op(op: &Op) -> Value {
    let mut out = Map::new();
    out.insert("op".into(), json!(op.name()));
    let mut set = |key: &str, value: Value| {
        out.insert(key.to_owned(), value);
    };
    match op {
        Op::NewCon { val: ConValue::Ref(r), .. } => {
            set("timestamp", json!(true));
            set("value", timestamp(*r));
        }
        Op::NewCon { val: ConValue::Val(PackValue::Undefined), .. } => {}
        Op::NewCon { val: ConValue::Val(v), .. } => set("value", v.to_json()),
        Op::NewVal { .. }
        | Op::NewObj { .. }
        | Op::NewVec { .. }
        | Op::NewStr { .. }
        | Op::NewBin { .. }
        | Op::NewArr { .. } => {}
        Op::InsVal { obj, val, .. } => {
            set("obj", timestamp(*obj));
            set("value", timestamp(*val));
        }
        Op::InsObj { obj, data, .. } => {
            set("obj", timestamp(*obj));
            set("value", data.iter().map(|(k, v)| json!([k, timestamp(*v)])).collect());
        }
        Op::InsVec { obj, data, .. } => {
            set("obj", timestamp(*obj));
            set("value", data.iter().map(|(i, v)| json!([i, timestamp(*v)])).collect());
        }
        Op::InsStr { obj, after, data, .. } => {
            set("obj", timestamp(*obj));
            set("after", timestamp(*after));
            set("value", json!(data));
        }
        Op::InsBin { obj, after, data, .. } => {
            set("obj", timestamp(*obj));
            set("after", timestamp(*after));
            set("value", json!(B64.encode(data)));
        }
        Op::InsArr { obj, after, data, .. } => {
            set("obj", timestamp(*obj));
            set("after", timestamp(*after));
            set("values", data.iter().map(|v| timestamp(*v)).collect());
        }
        Op::UpdArr { obj, after, val, .. } => {
            set("obj", timestamp(*obj));
            set("ref", timestamp(*after));
            set("value", timestamp(*val));
        }
        Op::Del { obj, what, .. } => {
            set("obj", timestamp(*obj));
            set("what", what.iter().map(timespan).collect());
        }
        Op::Nop { len: 1, .. } => {}
        Op::Nop { len, .. } => set("len", json!(len)),
    }
    Value::Object(out)
}

/// Fails with `PATCH_EMPTY` for a patch without operations, which has no id.
pub fn encode(patch: &Patch) -> Result<Value, CrdtError> {
    let id = patch.get_id().ok_or(CrdtError::PatchEmpty)?;
    let mut out = Map::new();
    out.insert("id".into(), timestamp(id));
    if let Some(meta) = &patch.meta {
        out.insert("meta".into(), meta.to_json());
    }
    out.insert("ops".into(), patch.ops.iter().map(encode_op).collect());
    Ok(Value::Object(out))
}

fn uint(v: &Value) -> Result<u64, CrdtError> {
    v.as_u64().ok_or_else(|| CrdtError::format(format!("expected unsigned integer, got {v}")))
}

fn decode_ts(v: &Value) -> Result<Ts, CrdtError> {
    match v {
        Value::Number(_) => Ok(ts(session::SERVER, uint(v)?)),
        Value::Array(pair) if pair.len() == 2 => Ok(ts(uint(&pair[0])?, uint(&pair[1])?)),
        other => Err(CrdtError::format(format!("invalid timestamp {other}"))),
    }
}

fn decode_tss(v: &Value) -> Result<Tss, CrdtError> {
    match v.as_array().map(Vec::as_slice) {
        Some([time, span]) => Ok(tss(session::SERVER, uint(time)?, uint(span)?)),
        Some([sid, time, span]) => Ok(tss(uint(sid)?, uint(time)?, uint(span)?)),
        _ => Err(CrdtError::format(format!("invalid timespan {v}"))),
    }
}

struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn get(&self, key: &str) -> Result<&'a Value, CrdtError> {
        self.0.get(key).ok_or_else(|| CrdtError::format(format!("missing field {key:?}")))
    }

    fn ts(&self, key: &str) -> Result<Ts, CrdtError> {
        decode_ts(self.get(key)?)
    }

    fn list(&self, key: &str) -> Result<&'a [Value], CrdtError> {
        self.get(key)?
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| CrdtError::format(format!("field {key:?} must be an array")))
    }

    fn pairs(&self, key: &str) -> Result<Vec<(&'a Value, Ts)>, CrdtError> {
        self.list(key)?
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([k, v]) => Ok((k, decode_ts(v)?)),
                _ => Err(CrdtError::format(format!("invalid tuple {pair}"))),
            })
            .collect()
    }
}

fn decode_op(id: Ts, value: &Value) -> Result<Op, CrdtError> {
    let map = value.as_object().ok_or_else(|| CrdtError::format("operation must be an object"))?;
    let f = Fields(map);
    let name = f.get("op")?.as_str().unwrap_or_default();
    let opcode = opcode_from_name(name).ok_or(CrdtError::UnknownOp(u8::MAX))?;
    Ok(match opcode {
        Opcode::NewCon => {
            let val = match (map.get("timestamp"), map.get("value")) {
                (Some(Value::Bool(true)), Some(r)) => ConValue::Ref(decode_ts(r)?),
                (_, Some(v)) => ConValue::Val(PackValue::from_json_lossless(v)),
                (_, None) => ConValue::Val(PackValue::Undefined),
            };
            Op::NewCon { id, val }
        }
        Opcode::NewVal => Op::NewVal { id },
        Opcode::NewObj => Op::NewObj { id },
        Opcode::NewVec => Op::NewVec { id },
        Opcode::NewStr => Op::NewStr { id },
        Opcode::NewBin => Op::NewBin { id },
        Opcode::NewArr => Op::NewArr { id },
        Opcode::InsVal => Op::InsVal { id, obj: f.ts("obj")?, val: f.ts("value")? },
        Opcode::InsObj => Op::InsObj {
            id,
            obj: f.ts("obj")?,
            data: f
                .pairs("value")?
                .into_iter()
                .map(|(k, v)| Ok((k.as_str().ok_or(CrdtError::InvalidObj)?.to_owned(), v)))
                .collect::<Result<_, CrdtError>>()?,
        },
        Opcode::InsVec => Op::InsVec {
            id,
            obj: f.ts("obj")?,
            data: f
                .pairs("value")?
                .into_iter()
                .map(|(k, v)| {
                    let index = k.as_u64().and_then(|i| u8::try_from(i).ok()).ok_or(CrdtError::OutOfBounds)?;
                    Ok((index, v))
                })
                .collect::<Result<_, CrdtError>>()?,
        },
        Opcode::InsStr => Op::InsStr {
            id,
            obj: f.ts("obj")?,
            after: f.ts("after")?,
            data: f.get("value")?.as_str().ok_or(CrdtError::InvalidStr)?.to_owned(),
        },
        Opcode::InsBin => Op::InsBin {
            id,
            obj: f.ts("obj")?,
            after: f.ts("after")?,
            data: B64.decode(f.get("value")?.as_str().ok_or(CrdtError::InvalidBin)?)?,
        },
        Opcode::InsArr => Op::InsArr {
            id,
            obj: f.ts("obj")?,
            after: f.ts("after")?,
            data: f.list("values")?.iter().map(decode_ts).collect::<Result<_, _>>()?,
        },
        Opcode::UpdArr => Op::UpdArr {
            id,
            obj: f.ts("obj")?,
            after: f.ts("ref")?,
            val: f.ts("value")?,
        },
        Opcode::Del => Op::Del {
            id,
            obj: f.ts("obj")?,
            what: f.list("what")?.iter().map(decode_tss).collect::<Result<_, _>>()?,
        },
        Opcode::Nop => Op::Nop {
            id,
            len: map.get("len").map(uint).transpose()?.unwrap_or(1),
        },
    })
}

pub fn decode(data: &Value) -> Result<Patch, CrdtError> {
    let map = data.as_object().ok_or_else(|| CrdtError::format("patch must be an object"))?;
    let f = Fields(map);
    let ops_json = f.list("ops")?;
    debug!(ops = ops_json.len(), "decoding verbose patch");
    let mut id = f.ts("id")?;
    let meta = map.get("meta").map(PackValue::from_json_lossless);
    let mut ops = Vec::with_capacity(ops_json.len());
    for value in ops_json {
        let op = decode_op(id, value)?;
        id.time = id
            .time
            .checked_add(op.span())
            .ok_or_else(|| CrdtError::format("operation ids overflow"))?;
        ops.push(op);
    }
    Ok(Patch { ops, meta })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_operations() {
        let own = |t| ts(777, t);
        let patch = Patch {
            ops: vec![
                Op::NewCon { id: own(1), val: ConValue::Val(PackValue::Bytes(vec![9, 8])) },
                Op::NewCon { id: own(2), val: ConValue::Ref(ts(1, 4)) },
                Op::NewCon { id: own(3), val: ConValue::Val(PackValue::Undefined) },
                Op::NewObj { id: own(4) },
                Op::InsObj { id: own(5), obj: own(4), data: vec![("k".into(), own(1))] },
                Op::NewVec { id: own(6) },
                Op::InsVec { id: own(7), obj: own(6), data: vec![(1, own(2))] },
                Op::NewStr { id: own(8) },
                Op::InsStr { id: own(9), obj: own(8), after: own(8), data: "ab".into() },
                Op::NewBin { id: own(11) },
                Op::InsBin { id: own(12), obj: own(11), after: own(11), data: vec![7] },
                Op::NewArr { id: own(13) },
                Op::InsArr { id: own(14), obj: own(13), after: own(13), data: vec![own(4)] },
                Op::UpdArr { id: own(15), obj: own(13), after: own(14), val: own(6) },
                Op::Del { id: own(16), obj: own(8), what: vec![tss(777, 9, 2), tss(1, 2, 3)] },
                Op::Nop { id: own(17), len: 3 },
                Op::NewVal { id: own(20) },
                Op::InsVal { id: own(21), obj: own(20), val: own(3) },
            ],
            meta: Some(PackValue::Integer(5)),
        };
        let json = encode(&patch).unwrap();
        assert_eq!(json["id"], json!([777, 1]));
        assert_eq!(json["ops"][0]["value"], json!("data:application/octet-stream;base64,CQg="));
        assert_eq!(decode(&json).unwrap(), patch);
    }

    #[test]
    fn named_fields() {
        let patch = Patch {
            ops: vec![Op::InsStr { id: ts(1, 5), obj: ts(1, 1), after: ts(1, 2), data: "x".into() }],
            meta: None,
        };
        assert_eq!(
            encode(&patch).unwrap(),
            json!({"id": 5, "ops": [{"op": "ins_str", "obj": 1, "after": 2, "value": "x"}]})
        );
    }

    #[test]
    fn unknown_op_name_is_rejected() {
        let err = decode(&json!({"id": [1, 1], "ops": [{"op": "frobnicate"}]})).unwrap_err();
        assert!(matches!(err, CrdtError::UnknownOp(_)));
    }

    #[test]
    fn empty_patch_has_no_encoding() {
        assert_eq!(encode(&Patch::new()), Err(CrdtError::PatchEmpty));
    }

    #[test]
    fn op_ids_past_the_end_of_time_are_rejected() {
        let ops = json!([{"op": "nop", "len": u64::MAX}, {"op": "nop"}]);
        let err = decode(&json!({"id": [65536, 5], "ops": ops})).unwrap_err();
        assert!(matches!(err, CrdtError::Format(_)));
    }
}
