use ciborium::value::Value as CiboriumValue;
use crdt_pack::{CborDecoder, CborEncoder, PackValue};
use proptest::prelude::*;
use serde_json::json;

fn decode_with_ciborium(bytes: &[u8]) -> CiboriumValue {
    ciborium::de::from_reader(bytes).expect("ciborium accepts our output")
}

#[test]
fn ciborium_reads_nested_documents() {
    let value = PackValue::from(json!({
        "num": 123,
        "bools": [true, false],
        "text": "ünïcödé",
        "neg": -100000,
        "pi": 3.141592653589793
    }));
    let bytes = CborEncoder::new().encode(&value);
    let decoded = decode_with_ciborium(&bytes);
    let map = decoded.as_map().expect("map");
    assert_eq!(map.len(), 5);
    assert_eq!(map[0].0, CiboriumValue::Text("num".into()));
    assert_eq!(map[0].1, CiboriumValue::Integer(123i64.into()));
    assert_eq!(map[2].1, CiboriumValue::Text("ünïcödé".into()));
    assert_eq!(map[3].1, CiboriumValue::Integer((-100000i64).into()));
    assert_eq!(map[4].1, CiboriumValue::Float(3.141592653589793));
}

#[test]
fn we_read_ciborium_output() {
    let mut bytes = Vec::new();
    let source = CiboriumValue::Array(vec![
        CiboriumValue::Bytes(vec![1, 2, 3]),
        CiboriumValue::Null,
        CiboriumValue::Text("x".repeat(300)),
    ]);
    ciborium::ser::into_writer(&source, &mut bytes).unwrap();
    let value = CborDecoder::new().decode(&bytes).unwrap();
    assert_eq!(
        value,
        PackValue::Array(vec![
            PackValue::Bytes(vec![1, 2, 3]),
            PackValue::Null,
            PackValue::Str("x".repeat(300)),
        ])
    );
}

proptest! {
    #[test]
    fn integers_round_trip(n in any::<i64>()) {
        let bytes = CborEncoder::new().encode(&PackValue::Integer(n));
        prop_assert_eq!(CborDecoder::new().decode(&bytes).unwrap(), PackValue::Integer(n));
        let via_ciborium = decode_with_ciborium(&bytes);
        prop_assert_eq!(via_ciborium, CiboriumValue::Integer(n.into()));
    }

    #[test]
    fn strings_round_trip(s in ".{0,80}") {
        let bytes = CborEncoder::new().encode(&PackValue::Str(s.clone()));
        prop_assert_eq!(CborDecoder::new().decode(&bytes).unwrap(), PackValue::Str(s));
    }

    #[test]
    fn finite_floats_round_trip(f in proptest::num::f64::NORMAL) {
        let bytes = CborEncoder::new().encode(&PackValue::Float(f));
        prop_assert_eq!(CborDecoder::new().decode(&bytes).unwrap(), PackValue::Float(f));
    }
}
