//! `cnt`: a grow-and-shrink counter.
//!
//! The data node is an `obj` with one entry per session that ever changed
//! the counter, keyed by the base-36 session id and holding that session's
//! running total. Every session only writes its own key, so concurrent
//! increments never overwrite each other and the value is the sum of all
//! entries.

use crdt_pack::PackValue;

use super::{ExtId, Extension};
use crate::json_crdt::model::api::{ApiError, ModelApi};
use crate::json_crdt::model::util::to_base36;
use crate::json_crdt::model::Model;
use crate::json_crdt::nodes::{JsonNode, ObjNode};
use crate::json_crdt_patch::clock::Ts;
use crate::json_crdt_patch::patch_builder::PatchBuilder;

pub const ID: ExtId = 0;

pub struct Cnt;

impl Extension for Cnt {
    fn id(&self) -> ExtId {
        ID
    }

    fn name(&self) -> &str {
        "cnt"
    }

    fn view(&self, model: &Model, data: Ts) -> PackValue {
        match model.node(data) {
            Some(JsonNode::Obj(obj)) => PackValue::Integer(total(model, obj)),
            _ => PackValue::Undefined,
        }
    }
}

fn total(model: &Model, obj: &ObjNode) -> i64 {
    obj.keys
        .values()
        .filter_map(|id| model.view_of(*id).as_i64())
        .fold(0, i64::saturating_add)
}

/// Records a new counter starting at `value` and returns its id.
pub fn new_cnt(builder: &mut PatchBuilder, value: i64) -> Ts {
    let key = to_base36(builder.clock.sid());
    builder.ext(ID, |b| {
        let obj = b.obj();
        if value != 0 {
            let con = b.con(PackValue::Integer(value));
            b.ins_obj(obj, vec![(key, con)]);
        }
        obj
    })
}

/// Editing handle for one counter, from [`ModelApi::cnt`].
pub struct CntApi<'m, 'a> {
    api: &'m mut ModelApi<'a>,
    id: Ts,
}

impl<'m, 'a> CntApi<'m, 'a> {
    pub(crate) fn new(api: &'m mut ModelApi<'a>, id: Ts) -> Self {
        Self { api, id }
    }

    pub fn id(&self) -> Ts {
        self.id
    }

    pub fn view(&self) -> i64 {
        self.api.model.view_of(self.id).as_i64().unwrap_or(0)
    }

    /// Adds `delta` (which may be negative) to this session's share.
    pub fn inc(&mut self, delta: i64) -> Result<(), ApiError> {
        let data = self.api.ext_data(self.id, ID)?;
        let key = to_base36(self.api.builder.clock.sid());
        let current = match self.api.model.node(data) {
            Some(JsonNode::Obj(obj)) => obj
                .get(&key)
                .and_then(|v| self.api.model.view_of(v).as_i64())
                .unwrap_or(0),
            _ => return Err(ApiError::WrongType),
        };
        let con = self.api.builder.con(PackValue::Integer(current.saturating_add(delta)));
        self.api.builder.ins_obj(data, vec![(key, con)]);
        self.api.apply();
        Ok(())
    }
}
