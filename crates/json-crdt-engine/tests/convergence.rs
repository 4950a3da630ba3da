mod common;

use common::fuzzer::{base_document, random_edit, Fuzzer};
use common::{assert_converged, init_tracing};
use json_crdt_engine::json_crdt_patch::clock::Ts;
use json_crdt_engine::{Model, Patch};
use proptest::prelude::*;
use serde_json::json;

const EDITS: u64 = 12;

fn edits(fuzzer: &mut Fuzzer, model: &mut Model) -> Vec<Patch> {
    let count = fuzzer.int(1, EDITS);
    (0..count).map(|_| random_edit(fuzzer, model)).collect()
}

fn apply_all(model: &mut Model, patches: &[Patch]) {
    for patch in patches {
        model.apply_patch(patch);
    }
}

/// Merges `a` and `b` in a random order that keeps each list's own order.
fn interleave(fuzzer: &mut Fuzzer, a: &[Patch], b: &[Patch]) -> Vec<Patch> {
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::with_capacity(a.len() + b.len());
    while i < a.len() || j < b.len() {
        let take_a = j == b.len() || (i < a.len() && fuzzer.chance(0.5));
        if take_a {
            out.push(a[i].clone());
            i += 1;
        } else {
            out.push(b[j].clone());
            j += 1;
        }
    }
    out
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn two_sites_converge_after_exchanging_patches(seed in any::<u64>()) {
        let mut fuzzer = Fuzzer::new(seed);
        let base = base_document(100_000);
        let mut a = base.fork(200_000);
        let mut b = base.fork(300_000);
        for _ in 0..3 {
            let from_a = edits(&mut fuzzer, &mut a);
            let from_b = edits(&mut fuzzer, &mut b);
            apply_all(&mut a, &from_b);
            apply_all(&mut b, &from_a);
            assert_converged(&a, &b);
        }
    }

    #[test]
    fn any_causal_interleaving_gives_the_same_document(seed in any::<u64>()) {
        let mut fuzzer = Fuzzer::new(seed);
        let base = base_document(100_000);
        let mut a = base.fork(200_000);
        let mut b = base.fork(300_000);
        let from_a = edits(&mut fuzzer, &mut a);
        let from_b = edits(&mut fuzzer, &mut b);
        apply_all(&mut a, &from_b);

        let mut c = base.fork(400_000);
        apply_all(&mut c, &interleave(&mut fuzzer, &from_a, &from_b));
        assert_converged(&a, &c);
    }

    #[test]
    fn reapplying_patches_changes_nothing(seed in any::<u64>()) {
        let mut fuzzer = Fuzzer::new(seed);
        let base = base_document(100_000);
        let mut a = base.fork(200_000);
        let mut b = base.fork(300_000);
        let from_a = edits(&mut fuzzer, &mut a);
        let from_b = edits(&mut fuzzer, &mut b);
        apply_all(&mut a, &from_b);
        let merged = a.clone();

        apply_all(&mut a, &from_a);
        apply_all(&mut a, &from_b);
        assert_converged(&a, &merged);
    }
}

#[test]
fn fixed_seed_session_replays() {
    init_tracing();
    let run = || {
        let mut fuzzer = Fuzzer::new(7);
        let mut model = base_document(100_000).fork(200_000);
        let patches = edits(&mut fuzzer, &mut model);
        (model.view(), patches)
    };
    let (first_view, first_patches) = run();
    let (second_view, second_patches) = run();
    assert_eq!(first_view, second_view);
    assert_eq!(first_patches, second_patches);
}

#[test]
fn concurrent_writes_to_one_key_pick_the_same_winner() {
    let mut base = Model::new(100_000);
    {
        let mut api = base.api();
        api.set_root(&json!({"k": "start"})).unwrap();
        api.flush();
    }
    let mut a = base.fork(200_000);
    let mut b = base.fork(300_000);
    let root = common::node_at(&base, &[]);
    let from_a = {
        let mut api = a.api();
        api.obj_set(root, &[("k".into(), json!("from a"))]).unwrap();
        api.flush()
    };
    let from_b = {
        let mut api = b.api();
        api.obj_set(root, &[("k".into(), json!("from b"))]).unwrap();
        api.flush()
    };
    assert_eq!(from_a.get_id().unwrap().time, from_b.get_id().unwrap().time);

    a.apply_patch(&from_b);
    b.apply_patch(&from_a);
    // Same time: the higher session id wins.
    assert_eq!(a.view(), json!({"k": "from b"}));
    assert_eq!(b.view(), a.view());

    // A later write wins regardless of session.
    let late = {
        let mut api = a.api();
        api.obj_set(root, &[("k".into(), json!("late"))]).unwrap();
        api.flush()
    };
    b.apply_patch(&late);
    assert_eq!(b.view(), json!({"k": "late"}));
}

/// `{"v": val("start"), "t": vec[0]}` with the ids of the register and the
/// tuple.
fn registers() -> (Model, Ts, Ts) {
    let mut base = Model::new(100_000);
    let (val, tuple) = {
        let mut api = base.api();
        api.set_root(&json!({})).unwrap();
        let root = api.find(&[]).unwrap();
        let val = api.builder.val();
        let tuple = api.builder.vec();
        api.builder.ins_obj(root, vec![("v".into(), val), ("t".into(), tuple)]);
        api.apply();
        api.val_set(val, &json!("start")).unwrap();
        api.vec_set(tuple, &[(0, json!(0))]).unwrap();
        api.flush();
        (val, tuple)
    };
    assert_eq!(base.view(), json!({"v": "start", "t": [0]}));
    (base, val, tuple)
}

fn set_both(model: &mut Model, val: Ts, tuple: Ts, text: &str) -> Patch {
    let mut api = model.api();
    api.val_set(val, &json!(text)).unwrap();
    api.vec_set(tuple, &[(0, json!(text))]).unwrap();
    api.flush()
}

#[test]
fn concurrent_register_and_slot_writes_pick_the_same_winner() {
    let (base, val, tuple) = registers();
    let mut a = base.fork(200_000);
    let mut b = base.fork(300_000);
    let from_a = set_both(&mut a, val, tuple, "a");
    let from_b = set_both(&mut b, val, tuple, "b");
    assert_eq!(from_a.get_id().unwrap().time, from_b.get_id().unwrap().time);

    // Same time: the higher session id wins, whatever the delivery order.
    for (first, second) in [(&from_a, &from_b), (&from_b, &from_a)] {
        let mut replica = base.clone();
        replica.apply_patch(first);
        replica.apply_patch(second);
        assert_eq!(replica.view(), json!({"v": "b", "t": ["b"]}));
    }
    a.apply_patch(&from_b);
    b.apply_patch(&from_a);
    assert_converged(&a, &b);
}

#[test]
fn later_register_and_slot_writes_beat_higher_sessions() {
    let (base, val, tuple) = registers();
    let mut low = base.fork(150_000);
    let mut high = base.fork(300_000);
    let from_low = {
        let mut api = low.api();
        api.val_set(val, &json!("draft")).unwrap();
        api.vec_set(tuple, &[(0, json!("draft"))]).unwrap();
        api.val_set(val, &json!("low")).unwrap();
        api.vec_set(tuple, &[(0, json!("low"))]).unwrap();
        api.flush()
    };
    let from_high = set_both(&mut high, val, tuple, "high");

    for (first, second) in [(&from_low, &from_high), (&from_high, &from_low)] {
        let mut replica = base.clone();
        replica.apply_patch(first);
        replica.apply_patch(second);
        assert_eq!(replica.view(), json!({"v": "low", "t": ["low"]}));
    }
}
