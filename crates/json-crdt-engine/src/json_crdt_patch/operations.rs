//! The sixteen patch operations.

use std::fmt;

use crdt_pack::PackValue;

use crate::json_crdt_patch::clock::{Ts, Tss};
use crate::json_crdt_patch::enums::Opcode;

/// Payload of a `new_con` operation: either plain data or a timestamp kept
/// as an opaque value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConValue {
    Val(PackValue),
    Ref(Ts),
}

impl Default for ConValue {
    fn default() -> Self {
        ConValue::Val(PackValue::Undefined)
    }
}

impl From<PackValue> for ConValue {
    fn from(v: PackValue) -> Self {
        ConValue::Val(v)
    }
}

impl From<Ts> for ConValue {
    fn from(id: Ts) -> Self {
        ConValue::Ref(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    NewCon { id: Ts, val: ConValue },
    NewVal { id: Ts },
    NewObj { id: Ts },
    NewVec { id: Ts },
    NewStr { id: Ts },
    NewBin { id: Ts },
    NewArr { id: Ts },
    /// Points a `val` register (or the root, when `obj` is the origin) at `val`.
    InsVal { id: Ts, obj: Ts, val: Ts },
    InsObj { id: Ts, obj: Ts, data: Vec<(String, Ts)> },
    InsVec { id: Ts, obj: Ts, data: Vec<(u8, Ts)> },
    InsStr { id: Ts, obj: Ts, after: Ts, data: String },
    InsBin { id: Ts, obj: Ts, after: Ts, data: Vec<u8> },
    InsArr { id: Ts, obj: Ts, after: Ts, data: Vec<Ts> },
    /// Replaces the value held by array element `after`.
    UpdArr { id: Ts, obj: Ts, after: Ts, val: Ts },
    Del { id: Ts, obj: Ts, what: Vec<Tss> },
    /// Burns `len` ticks.
    Nop { id: Ts, len: u64 },
}

impl Op {
    pub fn id(&self) -> Ts {
        match self {
            Op::NewCon { id, .. }
            | Op::NewVal { id }
            | Op::NewObj { id }
            | Op::NewVec { id }
            | Op::NewStr { id }
            | Op::NewBin { id }
            | Op::NewArr { id }
            | Op::InsVal { id, .. }
            | Op::InsObj { id, .. }
            | Op::InsVec { id, .. }
            | Op::InsStr { id, .. }
            | Op::InsBin { id, .. }
            | Op::InsArr { id, .. }
            | Op::UpdArr { id, .. }
            | Op::Del { id, .. }
            | Op::Nop { id, .. } => *id,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Op::NewCon { .. } => Opcode::NewCon,
            Op::NewVal { .. } => Opcode::NewVal,
            Op::NewObj { .. } => Opcode::NewObj,
            Op::NewVec { .. } => Opcode::NewVec,
            Op::NewStr { .. } => Opcode::NewStr,
            Op::NewBin { .. } => Opcode::NewBin,
            Op::NewArr { .. } => Opcode::NewArr,
            Op::InsVal { .. } => Opcode::InsVal,
            Op::InsObj { .. } => Opcode::InsObj,
            Op::InsVec { .. } => Opcode::InsVec,
            Op::InsStr { .. } => Opcode::InsStr,
            Op::InsBin { .. } => Opcode::InsBin,
            Op::InsArr { .. } => Opcode::InsArr,
            Op::UpdArr { .. } => Opcode::UpdArr,
            Op::Del { .. } => Opcode::Del,
            Op::Nop { .. } => Opcode::Nop,
        }
    }

    /// Ticks consumed: one per character, byte or element for inserts,
    /// `len` for `nop`, one for everything else.
    pub fn span(&self) -> u64 {
        match self {
            Op::InsStr { data, .. } => data.chars().count() as u64,
            Op::InsBin { data, .. } => data.len() as u64,
            Op::InsArr { data, .. } => data.len() as u64,
            Op::Nop { len, .. } => *len,
            _ => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        opcode_name(self.opcode())
    }

    /// Applies `f` to every timestamp the operation carries: its own id,
    /// target, anchor, value pointers and deleted spans.
    pub fn map_ids(&mut self, mut f: impl FnMut(Ts) -> Ts) {
        match self {
            Op::NewCon { id, val } => {
                *id = f(*id);
                if let ConValue::Ref(r) = val {
                    *r = f(*r);
                }
            }
            Op::NewVal { id }
            | Op::NewObj { id }
            | Op::NewVec { id }
            | Op::NewStr { id }
            | Op::NewBin { id }
            | Op::NewArr { id }
            | Op::Nop { id, .. } => *id = f(*id),
            Op::InsVal { id, obj, val } => {
                *id = f(*id);
                *obj = f(*obj);
                *val = f(*val);
            }
            Op::InsObj { id, obj, data } => {
                *id = f(*id);
                *obj = f(*obj);
                for (_, v) in data.iter_mut() {
                    *v = f(*v);
                }
            }
            Op::InsVec { id, obj, data } => {
                *id = f(*id);
                *obj = f(*obj);
                for (_, v) in data.iter_mut() {
                    *v = f(*v);
                }
            }
            Op::InsStr { id, obj, after, .. } | Op::InsBin { id, obj, after, .. } => {
                *id = f(*id);
                *obj = f(*obj);
                *after = f(*after);
            }
            Op::InsArr { id, obj, after, data } => {
                *id = f(*id);
                *obj = f(*obj);
                *after = f(*after);
                for v in data.iter_mut() {
                    *v = f(*v);
                }
            }
            Op::UpdArr { id, obj, after, val } => {
                *id = f(*id);
                *obj = f(*obj);
                *after = f(*after);
                *val = f(*val);
            }
            Op::Del { id, obj, what } => {
                *id = f(*id);
                *obj = f(*obj);
                for span in what.iter_mut() {
                    let moved = f(span.ts());
                    span.sid = moved.sid;
                    span.time = moved.time;
                }
            }
        }
    }
}

pub fn opcode_name(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::NewCon => "new_con",
        Opcode::NewVal => "new_val",
        Opcode::NewObj => "new_obj",
        Opcode::NewVec => "new_vec",
        Opcode::NewStr => "new_str",
        Opcode::NewBin => "new_bin",
        Opcode::NewArr => "new_arr",
        Opcode::InsVal => "ins_val",
        Opcode::InsObj => "ins_obj",
        Opcode::InsVec => "ins_vec",
        Opcode::InsStr => "ins_str",
        Opcode::InsBin => "ins_bin",
        Opcode::InsArr => "ins_arr",
        Opcode::UpdArr => "upd_arr",
        Opcode::Del => "del",
        Opcode::Nop => "nop",
    }
}

pub fn opcode_from_name(name: &str) -> Option<Opcode> {
    Some(match name {
        "new_con" => Opcode::NewCon,
        "new_val" => Opcode::NewVal,
        "new_obj" => Opcode::NewObj,
        "new_vec" => Opcode::NewVec,
        "new_str" => Opcode::NewStr,
        "new_bin" => Opcode::NewBin,
        "new_arr" => Opcode::NewArr,
        "ins_val" => Opcode::InsVal,
        "ins_obj" => Opcode::InsObj,
        "ins_vec" => Opcode::InsVec,
        "ins_str" => Opcode::InsStr,
        "ins_bin" => Opcode::InsBin,
        "ins_arr" => Opcode::InsArr,
        "upd_arr" => Opcode::UpdArr,
        "del" => Opcode::Del,
        "nop" => Opcode::Nop,
        _ => return None,
    })
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let span = self.span();
        write!(f, "{} {}", self.name(), self.id())?;
        if span > 1 {
            write!(f, "!{span}")?;
        }
        match self {
            Op::NewCon { val: ConValue::Ref(r), .. } => write!(f, " {{ {r} }}"),
            Op::NewCon { val: ConValue::Val(v), .. } => write!(f, " {{ {} }}", v.to_json()),
            Op::InsVal { obj, val, .. } => write!(f, ", obj = {obj}, val = {val}"),
            Op::InsObj { obj, data, .. } => {
                write!(f, ", obj = {obj}")?;
                for (key, val) in data {
                    write!(f, "\n    {key:?}: {val}")?;
                }
                Ok(())
            }
            Op::InsVec { obj, data, .. } => {
                write!(f, ", obj = {obj}")?;
                for (index, val) in data {
                    write!(f, "\n    {index}: {val}")?;
                }
                Ok(())
            }
            Op::InsStr { obj, after, data, .. } => {
                write!(f, ", obj = {obj} {{ {after} ← {data:?} }}")
            }
            Op::InsBin { obj, after, data, .. } => {
                write!(f, ", obj = {obj} {{ {after} ← {data:?} }}")
            }
            Op::InsArr { obj, after, data, .. } => {
                let items: Vec<String> = data.iter().map(Ts::to_string).collect();
                write!(f, ", obj = {obj} {{ {after} ← {} }}", items.join(", "))
            }
            Op::UpdArr { obj, after, val, .. } => {
                write!(f, ", obj = {obj} {{ {after} ← {val} }}")
            }
            Op::Del { obj, what, .. } => {
                let spans: Vec<String> = what.iter().map(Tss::to_string).collect();
                write!(f, ", obj = {obj} {{ {} }}", spans.join(", "))
            }
            _ => Ok(()),
        }
    }
}
