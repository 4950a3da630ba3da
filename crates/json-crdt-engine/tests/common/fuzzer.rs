use json_crdt_engine::{Model, Patch};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde_json::json;

/// Seeded source of random edits; the same seed replays the same session.
pub struct Fuzzer {
    pub seed: u64,
    rng: Xoshiro256StarStar,
}

impl Fuzzer {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        }
    }

    /// Integer in `[min, max]`.
    pub fn int(&mut self, min: u64, max: u64) -> u64 {
        self.rng.gen_range(min..=max)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.rng.gen_range(0..items.len())]
    }

    /// One to `max` characters, sometimes outside ASCII.
    pub fn text(&mut self, max: u64) -> String {
        const ALPHABET: &[char] = &['a', 'b', 'c', 'x', 'y', 'z', ' ', 'é', 'ж', '😀'];
        (0..self.int(1, max)).map(|_| *self.pick(ALPHABET)).collect()
    }

    pub fn bytes(&mut self, max: u64) -> Vec<u8> {
        (0..self.int(1, max)).map(|_| self.rng.gen()).collect()
    }
}

/// The document every fuzz session starts from: a string, a binary blob
/// and an array under one object.
pub fn base_document(sid: u64) -> Model {
    with_base_layout(Model::new(sid))
}

/// Writes the [`base_document`] layout into `model`, whatever its clock.
pub fn with_base_layout(mut model: Model) -> Model {
    let mut api = model.api();
    api.set_root(&json!({"s": "", "a": []})).unwrap();
    let root = api.find(&[]).unwrap();
    let bin = api.builder.bin();
    api.builder.ins_obj(root, vec![("b".into(), bin)]);
    api.flush();
    model
}

/// Performs one random edit on the string, blob or array of a
/// [`base_document`] and returns the patch describing it.
pub fn random_edit(fuzzer: &mut Fuzzer, model: &mut Model) -> Patch {
    let mut api = model.api();
    let s = api.find(&[json!("s")]).unwrap();
    let b = api.find(&[json!("b")]).unwrap();
    let a = api.find(&[json!("a")]).unwrap();
    match fuzzer.int(0, 6) {
        0 => {
            let len = api.str_len(s).unwrap();
            let pos = fuzzer.int(0, len);
            let text = fuzzer.text(5);
            api.str_ins(s, pos, &text).unwrap();
        }
        1 => {
            let len = api.str_len(s).unwrap();
            if len > 0 {
                let pos = fuzzer.int(0, len - 1);
                let count = fuzzer.int(1, len - pos);
                api.str_del(s, pos, count).unwrap();
            }
        }
        2 => {
            let len = api.bin_len(b).unwrap();
            let pos = fuzzer.int(0, len);
            let data = fuzzer.bytes(4);
            api.bin_ins(b, pos, &data).unwrap();
        }
        3 => {
            let len = api.bin_len(b).unwrap();
            if len > 0 {
                let pos = fuzzer.int(0, len - 1);
                let count = fuzzer.int(1, len - pos);
                api.bin_del(b, pos, count).unwrap();
            }
        }
        4 => {
            let len = api.arr_len(a).unwrap();
            let pos = fuzzer.int(0, len);
            let value = if fuzzer.chance(0.3) { json!({"n": fuzzer.int(0, 9)}) } else { json!(fuzzer.int(0, 99)) };
            api.arr_ins(a, pos, &[value]).unwrap();
        }
        5 => {
            let len = api.arr_len(a).unwrap();
            if len > 0 {
                let pos = fuzzer.int(0, len - 1);
                let count = fuzzer.int(1, (len - pos).min(3));
                api.arr_del(a, pos, count).unwrap();
            }
        }
        _ => {
            let len = api.arr_len(a).unwrap();
            if len > 0 {
                let pos = fuzzer.int(0, len - 1);
                api.arr_upd(a, pos, &json!(fuzzer.text(3))).unwrap();
            }
        }
    }
    api.flush()
}
