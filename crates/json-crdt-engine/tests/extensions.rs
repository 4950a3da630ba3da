mod common;

use common::{init_tracing, node_at};
use crdt_pack::PackValue;
use json_crdt_engine::json_crdt::extensions::cnt::new_cnt;
use json_crdt_engine::json_crdt::extensions::mval::new_mval;
use json_crdt_engine::{Model, Patch};
use serde_json::json;

/// `{"likes": cnt(start), "title": mval("draft")}` edited by session `sid`.
fn document(sid: u64, start: i64) -> (Model, Patch) {
    let mut model = Model::new(sid);
    let mut api = model.api();
    api.set_root(&json!({})).unwrap();
    let root = api.find(&[]).unwrap();
    let likes = new_cnt(&mut api.builder, start);
    let title = new_mval(&mut api.builder, &PackValue::Str("draft".into()));
    api.builder
        .ins_obj(root, vec![("likes".into(), likes), ("title".into(), title)]);
    let patch = api.flush();
    (model, patch)
}

#[test]
fn counters_sum_across_three_replicas() {
    init_tracing();
    let (mut a, init) = document(100_000, 10);
    let mut b = Model::new(200_000);
    b.apply_patch(&init);
    let mut c = Model::new(300_000);
    c.apply_patch(&init);
    let likes = node_at(&a, &[json!("likes")]);

    let mut patches = Vec::new();
    for (model, delta) in [(&mut a, 1), (&mut b, 5), (&mut c, -3)] {
        let mut api = model.api();
        api.cnt(likes).unwrap().inc(delta).unwrap();
        api.cnt(likes).unwrap().inc(delta).unwrap();
        patches.push(api.flush());
    }
    for model in [&mut a, &mut b, &mut c] {
        for patch in &patches {
            model.apply_patch(patch);
        }
    }
    for model in [&a, &b, &c] {
        assert_eq!(model.view()["likes"], json!(16));
    }
}

#[test]
fn concurrent_register_writes_all_survive() {
    let (mut a, init) = document(100_000, 0);
    let mut b = Model::new(200_000);
    b.apply_patch(&init);
    let title = node_at(&a, &[json!("title")]);

    let from_a = {
        let mut api = a.api();
        api.mval(title).unwrap().set(&json!("alpha")).unwrap();
        api.flush()
    };
    let from_b = {
        let mut api = b.api();
        api.mval(title).unwrap().set(&json!("beta")).unwrap();
        api.flush()
    };
    a.apply_patch(&from_b);
    b.apply_patch(&from_a);
    assert_eq!(a.view(), b.view());
    let mut values: Vec<String> = a.view()["title"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_owned())
        .collect();
    values.sort();
    assert_eq!(values, ["alpha", "beta"]);

    // A write that has seen both values replaces them.
    let resolve = {
        let mut api = a.api();
        api.mval(title).unwrap().set(&json!("final")).unwrap();
        api.flush()
    };
    b.apply_patch(&resolve);
    assert_eq!(a.view()["title"], json!(["final"]));
    assert_eq!(b.view(), a.view());
}

#[test]
fn extension_nodes_survive_the_binary_snapshot() {
    let (mut model, _) = document(100_000, 7);
    let likes = node_at(&model, &[json!("likes")]);
    {
        let mut api = model.api();
        api.cnt(likes).unwrap().inc(2).unwrap();
        api.flush();
    }
    let mut decoded = Model::from_binary(&model.to_binary().unwrap()).unwrap();
    assert_eq!(decoded.view(), json!({"likes": 9, "title": ["draft"]}));

    let mut replica = decoded.fork(400_000);
    let mut api = replica.api();
    api.cnt(likes).unwrap().inc(1).unwrap();
    let patch = api.flush();
    decoded.apply_patch(&patch);
    assert_eq!(decoded.view()["likes"], json!(10));
}

#[test]
fn extension_handles_check_the_node_kind() {
    let (mut model, _) = document(100_000, 0);
    let likes = node_at(&model, &[json!("likes")]);
    let title = node_at(&model, &[json!("title")]);
    let mut api = model.api();
    assert!(api.mval(likes).is_err());
    assert!(api.cnt(title).is_err());
}
