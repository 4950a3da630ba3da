//! The JSON CRDT document.
//!
//! A [`Model`] owns every node of a document in an index keyed by node id,
//! the root register and the clock that has observed all applied
//! operations. Patches are applied with [`Model::apply_patch`], which is
//! commutative and idempotent for causally delivered patches: replicas that
//! applied the same set of patches render the same [`Model::view`].
//!
//! Views are computed on demand from the index.

pub mod api;
pub mod util;

use std::fmt;

use crdt_pack::PackValue;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::CrdtError;
use crate::json_crdt::codec::structural::binary;
use crate::json_crdt::extensions::Extensions;
use crate::json_crdt::nodes::{
    ArrNode, BinNode, ConNode, JsonNode, NodeIndex, ObjNode, StrNode, ValNode, VecNode,
};
use crate::json_crdt::options::ModelOptions;
use crate::json_crdt_patch::clock::{ClockVector, ServerClockVector, Ts};
use crate::json_crdt_patch::constants::{ORIGIN, UNDEFINED};
use crate::json_crdt_patch::enums::session;
use crate::json_crdt_patch::operations::Op;
use crate::json_crdt_patch::patch::Patch;
use crate::json_crdt_patch::patch_builder::{BuilderClock, PatchBuilder};
use api::ModelApi;
use util::random_session_id;

// ── ModelClock ────────────────────────────────────────────────────────────

/// Clock of a document: a vector clock for peer-to-peer editing, or a single
/// server-issued sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelClock {
    Logical(ClockVector),
    Server(ServerClockVector),
}

impl ModelClock {
    pub fn sid(&self) -> u64 {
        match self {
            ModelClock::Logical(c) => c.sid,
            ModelClock::Server(c) => c.sid(),
        }
    }

    /// Next time this clock will issue.
    pub fn time(&self) -> u64 {
        match self {
            ModelClock::Logical(c) => c.time,
            ModelClock::Server(c) => c.time,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, ModelClock::Server(_))
    }

    /// Records an operation of `span` ticks starting at `id`. Only a server
    /// clock can refuse an id.
    pub fn observe(&mut self, id: Ts, span: u64) -> Result<(), CrdtError> {
        match self {
            ModelClock::Logical(c) => {
                c.observe(id, span);
                Ok(())
            }
            ModelClock::Server(c) => c.observe(id, span),
        }
    }

    /// Clock for a [`PatchBuilder`] that continues where this one is.
    pub fn builder_clock(&self) -> BuilderClock {
        match self {
            ModelClock::Logical(c) => BuilderClock::from(c),
            ModelClock::Server(c) => BuilderClock::from(c),
        }
    }

    /// Copy issuing ids under `sid`. A server clock has one session only
    /// and is copied as is.
    pub fn fork(&self, sid: u64) -> ModelClock {
        match self {
            ModelClock::Logical(c) => ModelClock::Logical(c.fork(sid)),
            ModelClock::Server(c) => ModelClock::Server(c.fork()),
        }
    }

    pub fn as_logical(&self) -> Option<&ClockVector> {
        match self {
            ModelClock::Logical(c) => Some(c),
            ModelClock::Server(_) => None,
        }
    }
}

impl fmt::Display for ModelClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelClock::Logical(c) => c.fmt(f),
            ModelClock::Server(c) => c.fmt(f),
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Model {
    /// Root register, id `ORIGIN`. Points at `UNDEFINED` in a new document.
    pub root: ValNode,
    pub index: NodeIndex,
    pub clock: ModelClock,
    pub ext: Extensions,
    /// Bumped once per applied patch and on [`Model::reset`].
    pub tick: u64,
}

impl Model {
    /// Empty document edited by session `sid`. The clock starts at time 1;
    /// time 0 of every session is never issued.
    pub fn new(sid: u64) -> Self {
        Self::from_clock(ModelClock::Logical(ClockVector::new(sid, 1)))
    }

    /// Empty document with a random session id.
    pub fn create() -> Self {
        Self::new(random_session_id())
    }

    pub fn with_server_clock(time: u64) -> Self {
        Self::from_clock(ModelClock::Server(ServerClockVector::new(time)))
    }

    pub fn from_clock(clock: ModelClock) -> Self {
        Self {
            root: ValNode::new(ORIGIN, UNDEFINED),
            index: NodeIndex::new(),
            clock,
            ext: Extensions::builtin(),
            tick: 0,
        }
    }

    pub fn with_options(opts: ModelOptions) -> Self {
        let mut model = match opts.server_time {
            Some(time) => Self::with_server_clock(time),
            None => Self::new(opts.sid.unwrap_or_else(random_session_id)),
        };
        if !opts.extensions {
            model.ext = Extensions::new();
        }
        model
    }

    // ── patch application ─────────────────────────────────────────────────

    pub fn apply_patch(&mut self, patch: &Patch) {
        debug!(id = ?patch.get_id(), ops = patch.ops.len(), "applying patch");
        for op in &patch.ops {
            self.apply_operation(op);
        }
        self.tick += 1;
    }

    pub fn apply_batch(&mut self, patches: &[Patch]) {
        for patch in patches {
            self.apply_patch(patch);
        }
    }

    pub fn apply_operation(&mut self, op: &Op) {
        let id = op.id();
        if let Err(err) = self.clock.observe(id, op.span()) {
            warn!(%id, op = op.name(), error = %err, "clock rejected operation");
            return;
        }
        match op {
            Op::NewCon { id, val } => self.insert_node(*id, || JsonNode::Con(ConNode::new(*id, val.clone()))),
            Op::NewVal { id } => self.insert_node(*id, || JsonNode::Val(ValNode::new(*id, UNDEFINED))),
            Op::NewObj { id } => self.insert_node(*id, || JsonNode::Obj(ObjNode::new(*id))),
            Op::NewVec { id } => self.insert_node(*id, || JsonNode::Vec(VecNode::new(*id))),
            Op::NewStr { id } => self.insert_node(*id, || JsonNode::Str(StrNode::new(*id))),
            Op::NewBin { id } => self.insert_node(*id, || JsonNode::Bin(BinNode::new(*id))),
            Op::NewArr { id } => self.insert_node(*id, || JsonNode::Arr(ArrNode::new(*id))),
            Op::InsVal { obj, val, .. } => {
                if !self.index.contains_key(val) {
                    trace!(%id, %val, "ins_val: unknown value");
                    return;
                }
                let old = if *obj == ORIGIN {
                    self.root.set(*val)
                } else if let Some(JsonNode::Val(node)) = self.index.get_mut(obj) {
                    node.set(*val)
                } else {
                    trace!(%id, %obj, "ins_val: target is not a val");
                    return;
                };
                match old {
                    Some(old) => self.delete_node_tree(old),
                    None => trace!(%id, "ins_val: stale write"),
                }
            }
            Op::InsObj { obj, data, .. } => {
                let known: Vec<(&str, Ts)> = data
                    .iter()
                    .filter(|(_, v)| self.index.contains_key(v))
                    .map(|(k, v)| (k.as_str(), *v))
                    .collect();
                let Some(JsonNode::Obj(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "ins_obj: target is not an obj");
                    return;
                };
                let mut replaced = Vec::new();
                for (key, val) in known {
                    if node.id.time >= val.time {
                        continue;
                    }
                    if let Some(old) = node.put(key, val) {
                        replaced.push(old);
                    }
                }
                for old in replaced {
                    self.delete_node_tree(old);
                }
            }
            Op::InsVec { obj, data, .. } => {
                let known: Vec<(u8, Ts)> = data
                    .iter()
                    .filter(|(_, v)| self.index.contains_key(v))
                    .copied()
                    .collect();
                let Some(JsonNode::Vec(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "ins_vec: target is not a vec");
                    return;
                };
                let mut replaced = Vec::new();
                for (index, val) in known {
                    if node.id.time >= val.time {
                        continue;
                    }
                    match node.put(index as usize, val) {
                        Ok(Some(old)) => replaced.push(old),
                        Ok(None) => {}
                        Err(err) => trace!(%id, index, error = %err, "ins_vec: slot rejected"),
                    }
                }
                for old in replaced {
                    self.delete_node_tree(old);
                }
            }
            Op::InsStr { obj, after, data, .. } => {
                let Some(JsonNode::Str(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "ins_str: target is not a str");
                    return;
                };
                if !node.ins(*after, id, data.clone()) {
                    trace!(%id, %after, "ins_str: dropped");
                }
            }
            Op::InsBin { obj, after, data, .. } => {
                let Some(JsonNode::Bin(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "ins_bin: target is not a bin");
                    return;
                };
                if !node.ins(*after, id, data.clone()) {
                    trace!(%id, %after, "ins_bin: dropped");
                }
            }
            Op::InsArr { obj, after, data, .. } => {
                let known: Vec<Ts> = data
                    .iter()
                    .copied()
                    .filter(|v| self.index.contains_key(v))
                    .collect();
                let Some(JsonNode::Arr(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "ins_arr: target is not an arr");
                    return;
                };
                let values: Vec<Ts> = known.into_iter().filter(|v| node.id.time < v.time).collect();
                if values.is_empty() || !node.ins(*after, id, values) {
                    trace!(%id, %after, "ins_arr: dropped");
                }
            }
            Op::UpdArr { obj, after, val, .. } => {
                if !self.index.contains_key(val) {
                    trace!(%id, %val, "upd_arr: unknown value");
                    return;
                }
                let Some(JsonNode::Arr(node)) = self.index.get_mut(obj) else {
                    trace!(%id, %obj, "upd_arr: target is not an arr");
                    return;
                };
                if node.id.time >= val.time {
                    return;
                }
                match node.upd(*after, *val) {
                    Some(old) => self.delete_node_tree(old),
                    None => trace!(%id, %after, "upd_arr: stale write"),
                }
            }
            Op::Del { obj, what, .. } => {
                let removed = match self.index.get_mut(obj) {
                    Some(JsonNode::Str(node)) => {
                        node.delete(what);
                        Vec::new()
                    }
                    Some(JsonNode::Bin(node)) => {
                        node.delete(what);
                        Vec::new()
                    }
                    Some(JsonNode::Arr(node)) => node.delete(what),
                    _ => {
                        trace!(%id, %obj, "del: target is not a sequence");
                        return;
                    }
                };
                for value in removed {
                    self.delete_node_tree(value);
                }
            }
            Op::Nop { .. } => {}
        }
    }

    fn insert_node(&mut self, id: Ts, make: impl FnOnce() -> JsonNode) {
        if id.sid == session::SYSTEM {
            trace!(%id, "refusing to create a system node");
            return;
        }
        if self.index.contains_key(&id) {
            trace!(%id, "node already exists");
            return;
        }
        self.index.insert(id, make());
    }

    /// Removes the node `id` and everything reachable from it.
    fn delete_node_tree(&mut self, id: Ts) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if id.sid == session::SYSTEM {
                continue;
            }
            if let Some(node) = self.index.remove(&id) {
                stack.extend(node.children());
            }
        }
    }

    // ── reading ───────────────────────────────────────────────────────────

    /// JSON view of the document. Binary data shows up as a base64 data
    /// URI; use [`Model::view_pack`] to keep it as bytes.
    pub fn view(&self) -> Value {
        self.view_pack().to_json()
    }

    pub fn view_pack(&self) -> PackValue {
        self.view_of(self.root.val)
    }

    /// View of the node `id`; `Undefined` for an unknown id.
    pub fn view_of(&self, id: Ts) -> PackValue {
        let Some(node) = self.index.get(&id) else {
            return PackValue::Undefined;
        };
        match node {
            JsonNode::Con(n) => n.view(),
            JsonNode::Val(n) => self.view_of(n.val),
            JsonNode::Obj(n) => n.view(|child| self.view_of(child)),
            JsonNode::Vec(n) => {
                if let Some(ext) = n.ext_id(&self.index).and_then(|e| self.ext.get(e)) {
                    return match n.ext_data() {
                        Some(data) => ext.view(self, data),
                        None => PackValue::Undefined,
                    };
                }
                n.view(|child| self.view_of(child))
            }
            JsonNode::Str(n) => PackValue::Str(n.view()),
            JsonNode::Bin(n) => PackValue::Bytes(n.view()),
            JsonNode::Arr(n) => n.view(|child| self.view_of(child)),
        }
    }

    pub fn node(&self, id: Ts) -> Option<&JsonNode> {
        self.index.get(&id)
    }

    /// Node at `path` from the root; `val` registers on the way are looked
    /// through.
    pub fn get(&self, path: &[Value]) -> Option<&JsonNode> {
        let id = api::find_path(self, self.root.val, path).ok()?;
        self.index.get(&id)
    }

    // ── replicas ──────────────────────────────────────────────────────────

    /// Independent replica that edits as session `sid`.
    pub fn fork(&self, sid: u64) -> Model {
        let mut copy = self.clone();
        copy.clock = self.clock.fork(sid);
        copy.tick = 0;
        copy
    }

    pub fn fork_random(&self) -> Model {
        self.fork(random_session_id())
    }

    /// Replaces this document's state with `other`'s. A logical clock keeps
    /// issuing ids under this model's own session.
    pub fn reset(&mut self, other: &Model) {
        self.root = other.root.clone();
        self.index = other.index.clone();
        self.ext = other.ext.clone();
        let sid = self.clock.sid();
        self.clock = match &other.clock {
            ModelClock::Logical(c) if c.sid != sid => ModelClock::Logical(c.fork(sid)),
            clock => clock.clone(),
        };
        self.tick += 1;
    }

    // ── editing and encoding ──────────────────────────────────────────────

    pub fn api(&mut self) -> ModelApi<'_> {
        ModelApi::new(self)
    }

    /// Builder drawing ids from this model's clock.
    pub fn builder(&self) -> PatchBuilder {
        PatchBuilder::with_clock(self.clock.builder_clock())
    }

    /// Structural binary snapshot.
    pub fn to_binary(&self) -> Result<Vec<u8>, CrdtError> {
        binary::encode(self)
    }

    pub fn from_binary(data: &[u8]) -> Result<Model, CrdtError> {
        binary::decode(data)
    }
}
