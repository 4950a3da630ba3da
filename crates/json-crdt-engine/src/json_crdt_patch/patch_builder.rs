//! [`PatchBuilder`]: allocates ids from a clock and records operations.

use crdt_pack::PackValue;

use crate::json_crdt_patch::clock::{ts, ClockVector, LogicalClock, ServerClockVector, Ts, Tss};
use crate::json_crdt_patch::constants::ORIGIN;
use crate::json_crdt_patch::operations::{ConValue, Op};
use crate::json_crdt_patch::patch::Patch;

/// Clock a builder draws ids from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderClock {
    Logical(LogicalClock),
    Server(ServerClockVector),
}

impl BuilderClock {
    pub fn sid(&self) -> u64 {
        match self {
            BuilderClock::Logical(c) => c.sid,
            BuilderClock::Server(c) => c.sid(),
        }
    }

    pub fn time(&self) -> u64 {
        match self {
            BuilderClock::Logical(c) => c.time,
            BuilderClock::Server(c) => c.time,
        }
    }

    pub fn tick(&mut self, cycles: u64) -> Ts {
        match self {
            BuilderClock::Logical(c) => c.tick(cycles),
            BuilderClock::Server(c) => c.tick(cycles),
        }
    }
}

impl From<&ClockVector> for BuilderClock {
    fn from(clock: &ClockVector) -> Self {
        BuilderClock::Logical(LogicalClock::new(clock.sid, clock.time))
    }
}

impl From<&ServerClockVector> for BuilderClock {
    fn from(clock: &ServerClockVector) -> Self {
        BuilderClock::Server(clock.fork())
    }
}

/// Records operations into a [`Patch`], ticking its clock once per op (or
/// once per character, byte or element for inserts).
///
/// Inserts with an empty payload are not recorded; they return the id the
/// operation would have received without consuming it.
#[derive(Debug, Clone)]
pub struct PatchBuilder {
    pub clock: BuilderClock,
    pub patch: Patch,
}

impl PatchBuilder {
    pub fn new(sid: u64, time: u64) -> Self {
        Self::with_clock(BuilderClock::Logical(LogicalClock::new(sid, time)))
    }

    pub fn server(time: u64) -> Self {
        Self::with_clock(BuilderClock::Server(ServerClockVector::new(time)))
    }

    pub fn with_clock(clock: BuilderClock) -> Self {
        Self {
            clock,
            patch: Patch::new(),
        }
    }

    /// Time the next operation will be stamped with.
    pub fn next_time(&self) -> u64 {
        match self.patch.next_time() {
            0 => self.clock.time(),
            t => t,
        }
    }

    /// Hands out the accumulated patch and starts a fresh one.
    pub fn flush(&mut self) -> Patch {
        std::mem::take(&mut self.patch)
    }

    /// Closes a gap between the last recorded op and the clock with a `nop`,
    /// so that the patch stays contiguous after the clock was advanced from
    /// outside.
    pub fn pad(&mut self) {
        let next = self.patch.next_time();
        if next == 0 {
            return;
        }
        let drift = self.clock.time().saturating_sub(next);
        if drift > 0 {
            self.patch.ops.push(Op::Nop {
                id: ts(self.clock.sid(), next),
                len: drift,
            });
        }
    }

    fn push(&mut self, make: impl FnOnce(Ts) -> Op) -> Ts {
        self.pad();
        let id = self.clock.ts_peek();
        let op = make(id);
        self.clock.tick(op.span());
        self.patch.ops.push(op);
        id
    }

    pub fn con(&mut self, val: PackValue) -> Ts {
        self.push(|id| Op::NewCon { id, val: ConValue::Val(val) })
    }

    pub fn con_val(&mut self, val: ConValue) -> Ts {
        self.push(|id| Op::NewCon { id, val })
    }

    /// A constant holding a timestamp as opaque data.
    pub fn con_ref(&mut self, reference: Ts) -> Ts {
        self.push(|id| Op::NewCon { id, val: ConValue::Ref(reference) })
    }

    pub fn val(&mut self) -> Ts {
        self.push(|id| Op::NewVal { id })
    }

    pub fn obj(&mut self) -> Ts {
        self.push(|id| Op::NewObj { id })
    }

    pub fn vec(&mut self) -> Ts {
        self.push(|id| Op::NewVec { id })
    }

    pub fn str_node(&mut self) -> Ts {
        self.push(|id| Op::NewStr { id })
    }

    pub fn bin(&mut self) -> Ts {
        self.push(|id| Op::NewBin { id })
    }

    pub fn arr(&mut self) -> Ts {
        self.push(|id| Op::NewArr { id })
    }

    /// Points the document root at `val`.
    pub fn root(&mut self, val: Ts) -> Ts {
        self.set_val(ORIGIN, val)
    }

    pub fn set_val(&mut self, obj: Ts, val: Ts) -> Ts {
        self.push(|id| Op::InsVal { id, obj, val })
    }

    pub fn ins_obj(&mut self, obj: Ts, data: Vec<(String, Ts)>) -> Ts {
        if data.is_empty() {
            return self.clock.ts_peek();
        }
        self.push(|id| Op::InsObj { id, obj, data })
    }

    pub fn ins_vec(&mut self, obj: Ts, data: Vec<(u8, Ts)>) -> Ts {
        if data.is_empty() {
            return self.clock.ts_peek();
        }
        self.push(|id| Op::InsVec { id, obj, data })
    }

    pub fn ins_str(&mut self, obj: Ts, after: Ts, data: impl Into<String>) -> Ts {
        let data = data.into();
        if data.is_empty() {
            return self.clock.ts_peek();
        }
        self.push(|id| Op::InsStr { id, obj, after, data })
    }

    pub fn ins_bin(&mut self, obj: Ts, after: Ts, data: Vec<u8>) -> Ts {
        if data.is_empty() {
            return self.clock.ts_peek();
        }
        self.push(|id| Op::InsBin { id, obj, after, data })
    }

    pub fn ins_arr(&mut self, obj: Ts, after: Ts, data: Vec<Ts>) -> Ts {
        if data.is_empty() {
            return self.clock.ts_peek();
        }
        self.push(|id| Op::InsArr { id, obj, after, data })
    }

    pub fn upd_arr(&mut self, obj: Ts, after: Ts, val: Ts) -> Ts {
        self.push(|id| Op::UpdArr { id, obj, after, val })
    }

    pub fn del(&mut self, obj: Ts, what: Vec<Tss>) -> Ts {
        self.push(|id| Op::Del { id, obj, what })
    }

    pub fn nop(&mut self, len: u64) -> Ts {
        self.push(|id| Op::Nop { id, len })
    }

    /// Builds an extension node: a two-slot `vec` whose first slot is a
    /// constant tagging it with `ext_id` and whose second slot holds the
    /// data built by `data`.
    pub fn ext(&mut self, ext_id: u8, data: impl FnOnce(&mut PatchBuilder) -> Ts) -> Ts {
        let vec = self.vec();
        let tag = self.con(PackValue::Bytes(vec![
            ext_id,
            (vec.sid % 256) as u8,
            (vec.time % 256) as u8,
        ]));
        let data = data(self);
        self.ins_vec(vec, vec![(0, tag), (1, data)]);
        vec
    }

    /// Builds a node tree for `value`: objects become `obj`, arrays `arr`,
    /// strings `str`, bytes `bin`, and scalars a `val` holding a `con`.
    pub fn json(&mut self, value: &PackValue) -> Ts {
        match value {
            PackValue::Object(_) => self.json_obj(value),
            PackValue::Array(items) => self.json_arr(items),
            PackValue::Str(s) => self.json_str(s),
            PackValue::Bytes(b) => self.json_bin(b),
            scalar => self.json_val(scalar.clone()),
        }
    }

    /// Like [`PatchBuilder::json`] but scalars become a bare `con`.
    pub fn const_or_json(&mut self, value: &PackValue) -> Ts {
        if is_scalar(value) {
            self.con(value.clone())
        } else {
            self.json(value)
        }
    }

    /// A `val` register initialised with a constant.
    pub fn json_val(&mut self, value: PackValue) -> Ts {
        let val = self.val();
        let con = self.con(value);
        self.set_val(val, con);
        val
    }

    pub fn json_obj(&mut self, value: &PackValue) -> Ts {
        let obj = self.obj();
        if let Some(fields) = value.as_object() {
            let mut tuples = Vec::with_capacity(fields.len());
            for (key, field) in fields {
                tuples.push((key.clone(), self.const_or_json(field)));
            }
            self.ins_obj(obj, tuples);
        }
        obj
    }

    pub fn json_arr(&mut self, items: &[PackValue]) -> Ts {
        let arr = self.arr();
        let values: Vec<Ts> = items.iter().map(|item| self.json(item)).collect();
        self.ins_arr(arr, arr, values);
        arr
    }

    pub fn json_str(&mut self, s: &str) -> Ts {
        let node = self.str_node();
        self.ins_str(node, node, s);
        node
    }

    pub fn json_bin(&mut self, data: &[u8]) -> Ts {
        let node = self.bin();
        self.ins_bin(node, node, data.to_vec());
        node
    }
}

impl BuilderClock {
    fn ts_peek(&self) -> Ts {
        ts(self.sid(), self.time())
    }
}

fn is_scalar(value: &PackValue) -> bool {
    matches!(
        value,
        PackValue::Null
            | PackValue::Undefined
            | PackValue::Bool(_)
            | PackValue::Integer(_)
            | PackValue::UInteger(_)
            | PackValue::Float(_)
    )
}
