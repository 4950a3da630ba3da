#![allow(dead_code)]

pub mod fuzzer;

use json_crdt_engine::json_crdt::nodes::JsonNode;
use json_crdt_engine::json_crdt_patch::clock::Ts;
use json_crdt_engine::Model;
use serde_json::{json, Value};

/// Installs a `fmt` subscriber once per test binary; `RUST_LOG` picks the
/// level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Element-level layout of a sequence node: every element id with its
/// tombstone flag. Chunk boundaries are not part of it.
pub fn elements(model: &Model, id: Ts) -> Vec<(Ts, bool)> {
    match model.node(id) {
        Some(JsonNode::Str(n)) => n.rga.elements(),
        Some(JsonNode::Bin(n)) => n.rga.elements(),
        Some(JsonNode::Arr(n)) => n.rga.elements(),
        other => panic!("not a sequence node: {other:?}"),
    }
}

/// Node id at `path`, panicking when missing.
pub fn node_at(model: &Model, path: &[Value]) -> Ts {
    model
        .get(path)
        .map(JsonNode::id)
        .unwrap_or_else(|| panic!("nothing at {path:?}"))
}

/// Asserts equal views and equal element layout of the fuzzed sequences.
pub fn assert_converged(a: &Model, b: &Model) {
    assert_eq!(a.view(), b.view());
    for key in ["s", "b", "a"] {
        let id = node_at(a, &[json!(key)]);
        assert_eq!(id, node_at(b, &[json!(key)]));
        assert_eq!(elements(a, id), elements(b, id), "layout of {key:?}");
    }
}

/// Every node id reachable from the root together with a description of its
/// state, sorted. Codecs that preserve ids produce equal snapshots.
pub fn snapshot(model: &Model) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack = vec![model.root.val];
    while let Some(id) = stack.pop() {
        let Some(node) = model.node(id) else {
            continue;
        };
        stack.extend(node.children());
        let line = match node {
            JsonNode::Str(n) => format!("{id:?} str {:?}", chunk_list(n.rga.iter().map(|c| (c.id, c.span, c.del)))),
            JsonNode::Bin(n) => format!("{id:?} bin {:?}", chunk_list(n.rga.iter().map(|c| (c.id, c.span, c.del)))),
            JsonNode::Arr(n) => format!("{id:?} arr {:?}", chunk_list(n.rga.iter().map(|c| (c.id, c.span, c.del)))),
            other => format!("{other:?}"),
        };
        out.push(line);
    }
    out.sort();
    out
}

fn chunk_list(chunks: impl Iterator<Item = (Ts, u64, bool)>) -> Vec<(Ts, u64, bool)> {
    chunks.collect()
}
