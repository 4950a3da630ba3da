//! Variable-length integer framing shared by the binary codecs.
//!
//! `vu57`: up to eight bytes, seven payload bits per byte with the high bit
//! as continuation flag, least significant group first; the eighth byte
//! carries eight payload bits.
//!
//! `b1vu56`: like `vu57`, but the first byte is `|f c zzzzzz|`: a caller
//! supplied flag bit, the continuation bit and six payload bits.
//!
//! `id(x, y)`: one byte `|0xxxyyyy|` when `x <= 7` and `y <= 15`, otherwise
//! `b1vu56(1, x)` followed by `vu57(y)`.

mod crdt_reader;
mod crdt_writer;

pub use crdt_reader::CrdtReader;
pub use crdt_writer::CrdtWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use crdt_pack::{Reader, Writer};
    use proptest::prelude::*;

    const MAX57: u64 = (1 << 57) - 1;
    const MAX56: u64 = (1 << 56) - 1;

    #[test]
    fn vu57_byte_lengths() {
        let cases = [(0u64, 1usize), (127, 1), (128, 2), (0x3fff, 2), (0x4000, 3), (MAX57, 8)];
        for (num, len) in cases {
            let mut w = Writer::new();
            w.vu57(num);
            assert_eq!(w.x(), len, "vu57({num})");
        }
    }

    #[test]
    fn b1vu56_packs_flag_into_first_byte() {
        let mut w = Writer::new();
        w.b1vu56(1, 5);
        w.b1vu56(0, 64);
        assert_eq!(w.flush(), vec![0b1000_0101, 0b0100_0000, 0b0000_0001]);
    }

    #[test]
    fn short_ids_take_one_byte() {
        let mut w = Writer::new();
        w.id(7, 15);
        w.id(8, 0);
        let bytes = w.flush();
        assert_eq!(bytes[0], 0x7f);
        assert_eq!(bytes.len(), 3);
        let mut r = Reader::new(&bytes);
        assert_eq!(r.id().unwrap(), (7, 15));
        assert_eq!(r.id().unwrap(), (8, 0));
    }

    #[test]
    fn truncated_varint_is_eof() {
        let mut r = Reader::new(&[0x80, 0x80]);
        assert!(r.vu57().is_err());
    }

    proptest! {
        #[test]
        fn vu57_round_trips(num in 0..=MAX57) {
            let mut w = Writer::new();
            w.vu57(num);
            let bytes = w.flush();
            let mut r = Reader::new(&bytes);
            prop_assert_eq!(r.vu57().unwrap(), num);
            prop_assert_eq!(r.size(), 0);
        }

        #[test]
        fn b1vu56_round_trips(flag in 0u8..2, num in 0..=MAX56) {
            let mut w = Writer::new();
            w.b1vu56(flag, num);
            let bytes = w.flush();
            let mut r = Reader::new(&bytes);
            prop_assert_eq!(r.b1vu56().unwrap(), (flag, num));
            prop_assert_eq!(r.size(), 0);
        }
    }
}
