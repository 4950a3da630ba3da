//! `mval`: a multi-value register.
//!
//! The data node is an `arr`. A write replaces every value the writer has
//! seen with a single new one; writes made concurrently all survive, so the
//! view is the list of values no writer has overwritten yet.

use crdt_pack::PackValue;
use serde_json::Value;

use super::{ExtId, Extension};
use crate::json_crdt::model::api::{ApiError, ModelApi};
use crate::json_crdt::model::Model;
use crate::json_crdt::nodes::JsonNode;
use crate::json_crdt_patch::clock::Ts;
use crate::json_crdt_patch::patch_builder::PatchBuilder;

pub const ID: ExtId = 1;

pub struct Mval;

impl Extension for Mval {
    fn id(&self) -> ExtId {
        ID
    }

    fn name(&self) -> &str {
        "mval"
    }

    fn view(&self, model: &Model, data: Ts) -> PackValue {
        match model.node(data) {
            Some(JsonNode::Arr(arr)) => arr.view(|v| model.view_of(v)),
            _ => PackValue::Undefined,
        }
    }
}

/// Records a new register holding `value` and returns its id.
pub fn new_mval(builder: &mut PatchBuilder, value: &PackValue) -> Ts {
    builder.ext(ID, |b| {
        let arr = b.arr();
        let val = b.const_or_json(value);
        b.ins_arr(arr, arr, vec![val]);
        arr
    })
}

/// Editing handle for one register, from [`ModelApi::mval`].
pub struct MvalApi<'m, 'a> {
    api: &'m mut ModelApi<'a>,
    id: Ts,
}

impl<'m, 'a> MvalApi<'m, 'a> {
    pub(crate) fn new(api: &'m mut ModelApi<'a>, id: Ts) -> Self {
        Self { api, id }
    }

    pub fn id(&self) -> Ts {
        self.id
    }

    pub fn view(&self) -> PackValue {
        self.api.model.view_of(self.id)
    }

    /// Replaces all current values with `value`.
    pub fn set(&mut self, value: &Value) -> Result<(), ApiError> {
        let data = self.api.ext_data(self.id, ID)?;
        let spans = match self.api.model.node(data) {
            Some(JsonNode::Arr(arr)) => arr.rga.find_interval(0, arr.length()),
            _ => return Err(ApiError::WrongType),
        };
        let val = self.api.builder.const_or_json(&PackValue::from(value));
        self.api.builder.ins_arr(data, data, vec![val]);
        if !spans.is_empty() {
            self.api.builder.del(data, spans);
        }
        self.api.apply();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn register(sid: u64) -> (Model, Ts) {
        let mut model = Model::new(sid);
        let mut api = model.api();
        let id = new_mval(&mut api.builder, &PackValue::Integer(1));
        api.set_root_id(id);
        (model, id)
    }

    #[test]
    fn set_replaces_the_value() {
        let (mut model, id) = register(100);
        let mut api = model.api();
        api.mval(id).unwrap().set(&json!(2)).unwrap();
        api.mval(id).unwrap().set(&json!({"x": [3]})).unwrap();
        assert_eq!(api.mval(id).unwrap().view().to_json(), json!([{"x": [3]}]));
        api.flush();
        assert_eq!(model.view(), json!([{"x": [3]}]));
    }

    #[test]
    fn concurrent_writes_both_survive() {
        let (mut a, id) = register(100);
        let mut b = a.fork(200);
        let mut api = a.api();
        api.mval(id).unwrap().set(&json!("a")).unwrap();
        let from_a = api.flush();
        let mut api = b.api();
        api.mval(id).unwrap().set(&json!("b")).unwrap();
        let from_b = api.flush();
        a.apply_patch(&from_b);
        b.apply_patch(&from_a);
        assert_eq!(a.view(), b.view());
        let mut values: Vec<String> = a
            .view()
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect();
        values.sort();
        assert_eq!(values, vec!["a", "b"]);

        let mut api = a.api();
        api.mval(id).unwrap().set(&json!("c")).unwrap();
        api.flush();
        assert_eq!(a.view(), json!(["c"]));
    }
}
