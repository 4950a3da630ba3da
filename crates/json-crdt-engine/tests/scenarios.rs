mod common;

use common::{elements, init_tracing, node_at};
use crdt_pack::PackValue;
use json_crdt_engine::json_crdt::nodes::JsonNode;
use json_crdt_engine::json_crdt_patch::clock::ts;
use json_crdt_engine::json_crdt_patch::operations::ConValue;
use json_crdt_engine::{Model, PatchBuilder};
use serde_json::json;

fn text_doc(sid: u64, text: &str) -> Model {
    let mut model = Model::new(sid);
    let mut api = model.api();
    api.set_root(&json!({"text": text})).unwrap();
    api.flush();
    model
}

#[test]
fn concurrent_inserts_into_one_word() {
    init_tracing();
    let mut a = text_doc(100_000, "Helo");
    let mut b = a.fork(200_000);
    let text = node_at(&a, &[json!("text")]);

    let from_a = {
        let mut api = a.api();
        api.str_ins(text, 2, "l").unwrap();
        api.flush()
    };
    let from_b = {
        let mut api = b.api();
        // After the "o" at index 3.
        api.str_ins(text, 4, "!").unwrap();
        api.flush()
    };
    a.apply_patch(&from_b);
    b.apply_patch(&from_a);
    assert_eq!(a.view(), json!({"text": "Hello!"}));
    assert_eq!(b.view(), a.view());
    assert_eq!(elements(&a, text), elements(&b, text));
}

#[test]
fn concurrent_inserts_at_one_anchor_order_by_id() {
    // Equal times: the higher session id wins the spot next to the anchor.
    let base = text_doc(50_000, "abc");
    let mut a = base.fork(200_000);
    let mut b = base.fork(100_000);
    let text = node_at(&base, &[json!("text")]);

    let from_a = {
        let mut api = a.api();
        api.str_ins(text, 1, "xy").unwrap();
        api.flush()
    };
    let from_b = {
        let mut api = b.api();
        api.str_ins(text, 1, "pq").unwrap();
        api.flush()
    };
    assert_eq!(from_a.get_id().unwrap().time, from_b.get_id().unwrap().time);

    let mut ab = base.clone();
    ab.apply_patch(&from_a);
    ab.apply_patch(&from_b);
    let mut ba = base.clone();
    ba.apply_patch(&from_b);
    ba.apply_patch(&from_a);
    assert_eq!(ab.view(), json!({"text": "axypqbc"}));
    assert_eq!(ba.view(), ab.view());
}

#[test]
fn rebased_patch_applies_the_same() {
    let mut builder = PatchBuilder::new(123_456, 5);
    let obj = builder.obj();
    let text = builder.str_node();
    let first = builder.ins_str(text, text, "ab");
    builder.ins_str(text, ts(123_456, first.time + 1), "c");
    builder.ins_obj(obj, vec![("t".into(), text)]);
    let list = builder.arr();
    let one = builder.con(PackValue::Integer(1));
    let head = builder.ins_arr(list, list, vec![one]);
    let two = builder.con(PackValue::Integer(2));
    builder.ins_arr(list, head, vec![two]);
    builder.ins_obj(obj, vec![("l".into(), list)]);
    let foreign = builder.con_ref(ts(7, 3));
    builder.ins_obj(obj, vec![("r".into(), foreign)]);
    builder.root(obj);
    let patch = builder.flush();

    let rebased = patch.rebase(1000, None).unwrap();
    assert_eq!(rebased.get_id(), Some(ts(123_456, 1000)));
    assert_eq!(rebased.span(), patch.span());

    let mut original = Model::new(99_999);
    original.apply_patch(&patch);
    let mut moved = Model::new(99_999);
    moved.apply_patch(&rebased);
    assert_eq!(original.view(), json!({"t": "abc", "l": [1, 2], "r": [7, 3]}));
    assert_eq!(moved.view(), original.view());
    assert_eq!(moved.root.val, ts(123_456, 1000));
    let Some(JsonNode::Con(reference)) = moved.get(&[json!("r")]) else {
        panic!("r is not a con");
    };
    assert_eq!(reference.val, ConValue::Ref(ts(7, 3)));
}

#[test]
fn structural_binary_keeps_ids() {
    for mut model in [Model::new(65_536), Model::with_server_clock(1)] {
        {
            let mut api = model.api();
            api.set_root(&json!({"num": 123, "bools": [true, false]})).unwrap();
            api.flush();
        }
        let decoded = Model::from_binary(&model.to_binary().unwrap()).unwrap();
        assert_eq!(decoded.view(), json!({"num": 123, "bools": [true, false]}));
        assert_eq!(common::snapshot(&decoded), common::snapshot(&model));
        assert_eq!(decoded.clock.is_server(), model.clock.is_server());
        for path in [json!("num"), json!("bools")] {
            assert_eq!(node_at(&decoded, &[path.clone()]), node_at(&model, &[path]));
        }
    }
}

#[test]
fn binary_delete_across_chunks_then_insert_at_the_seam() {
    let mut model = Model::new(65_536);
    let mut api = model.api();
    let root = api.builder.obj();
    let bin = api.builder.bin();
    api.builder.ins_obj(root, vec![("b".into(), bin)]);
    api.builder.root(root);
    api.apply();
    api.bin_ins(bin, 0, &[1, 2, 3]).unwrap();
    api.bin_ins(bin, 3, &[4, 5, 6]).unwrap();
    api.bin_del(bin, 2, 2).unwrap();
    api.bin_ins(bin, 2, &[9]).unwrap();
    api.flush();

    let Some(JsonNode::Bin(node)) = model.node(bin) else {
        panic!("missing bin node");
    };
    assert_eq!(node.view(), vec![1, 2, 9, 5, 6]);
    for chunk in node.rga.iter() {
        match &chunk.data {
            Some(data) => {
                assert!(!chunk.del);
                assert!(chunk.span > 0);
                assert_eq!(data.len() as u64, chunk.span);
            }
            None => assert!(chunk.del),
        }
    }
    let deleted: u64 = node.rga.iter().filter(|c| c.del).map(|c| c.span).sum();
    assert_eq!(deleted, 2);
}
