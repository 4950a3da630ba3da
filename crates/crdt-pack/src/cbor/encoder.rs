//! `CborEncoder`: CBOR encoder for [`PackValue`].

use crate::buffers::Writer;
use crate::PackValue;

use super::constants::*;

/// How floating point numbers are written.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FloatMode {
    /// `f32` when the value fits losslessly, `f64` otherwise.
    #[default]
    Full,
    /// Always `f64`.
    Fast,
}

/// CBOR encoder writing into an owned [`Writer`].
///
/// The writer is public so that framing formats can interleave their own
/// bytes with embedded CBOR values.
#[derive(Debug, Default, Clone)]
pub struct CborEncoder {
    pub writer: Writer,
    pub float_mode: FloatMode,
}

impl CborEncoder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new(),
            float_mode: FloatMode::Full,
        }
    }

    pub fn fast() -> Self {
        Self {
            writer: Writer::new(),
            float_mode: FloatMode::Fast,
        }
    }

    pub fn encode(&mut self, value: &PackValue) -> Vec<u8> {
        self.writer.reset();
        self.write_any(value);
        self.writer.flush()
    }

    pub fn encode_json(&mut self, value: &serde_json::Value) -> Vec<u8> {
        self.encode(&PackValue::from(value))
    }

    pub fn write_any(&mut self, value: &PackValue) {
        match value {
            PackValue::Null => self.write_null(),
            PackValue::Undefined => self.write_undef(),
            PackValue::Bool(b) => self.write_boolean(*b),
            PackValue::Integer(i) => self.write_integer(*i),
            PackValue::UInteger(u) => self.write_u_integer(*u),
            PackValue::Float(f) => self.write_float(*f),
            PackValue::Bytes(b) => self.write_bin(b),
            PackValue::Str(s) => self.write_str(s),
            PackValue::Array(arr) => {
                self.write_arr_hdr(arr.len());
                for item in arr {
                    self.write_any(item);
                }
            }
            PackValue::Object(obj) => {
                self.write_obj_hdr(obj.len());
                for (key, value) in obj {
                    self.write_str(key);
                    self.write_any(value);
                }
            }
        }
    }

    pub fn write_null(&mut self) {
        self.writer.u8(NULL);
    }

    pub fn write_undef(&mut self) {
        self.writer.u8(UNDEFINED);
    }

    pub fn write_boolean(&mut self, b: bool) {
        self.writer.u8(if b { TRUE } else { FALSE });
    }

    pub fn write_integer(&mut self, int: i64) {
        if int >= 0 {
            self.write_u_integer(int as u64);
        } else {
            self.write_hdr(OVERLAY_NIN, (-1i64 - int) as u64);
        }
    }

    pub fn write_u_integer(&mut self, uint: u64) {
        self.write_hdr(OVERLAY_UIN, uint);
    }

    pub fn write_float(&mut self, float: f64) {
        if self.float_mode == FloatMode::Full && is_f32_roundtrip(float) {
            self.writer.u8(FLOAT32);
            self.writer.f32(float as f32);
        } else {
            self.writer.u8(FLOAT64);
            self.writer.f64(float);
        }
    }

    pub fn write_bin(&mut self, buf: &[u8]) {
        self.write_hdr(OVERLAY_BIN, buf.len() as u64);
        self.writer.buf(buf);
    }

    /// Writes a text string. The header width is chosen from the worst-case
    /// encoded size (four bytes per character) and the real UTF-8 length is
    /// stored in it, so short strings with multi-byte characters may use a
    /// wider header than strictly necessary.
    pub fn write_str(&mut self, s: &str) {
        let max_size = s.chars().count() * 4;
        let byte_len = s.len() as u64;
        let w = &mut self.writer;
        if max_size <= 23 {
            w.u8(OVERLAY_STR | byte_len as u8);
        } else if max_size <= 0xff {
            w.u8(OVERLAY_STR | 24);
            w.u8(byte_len as u8);
        } else if max_size <= 0xffff {
            w.u8(OVERLAY_STR | 25);
            w.u16(byte_len as u16);
        } else {
            w.u8(OVERLAY_STR | 26);
            w.u32(byte_len as u32);
        }
        w.utf8(s);
    }

    pub fn write_str_hdr(&mut self, length: usize) {
        self.write_hdr(OVERLAY_STR, length as u64);
    }

    pub fn write_arr_hdr(&mut self, length: usize) {
        self.write_hdr(OVERLAY_ARR, length as u64);
    }

    pub fn write_obj_hdr(&mut self, length: usize) {
        self.write_hdr(OVERLAY_MAP, length as u64);
    }

    /// Writes a major-type header with the shortest length encoding.
    pub fn write_hdr(&mut self, overlay: u8, length: u64) {
        let w = &mut self.writer;
        if length <= 23 {
            w.u8(overlay | length as u8);
        } else if length <= 0xff {
            w.u8(overlay | 24);
            w.u8(length as u8);
        } else if length <= 0xffff {
            w.u8(overlay | 25);
            w.u16(length as u16);
        } else if length <= 0xffff_ffff {
            w.u8(overlay | 26);
            w.u32(length as u32);
        } else {
            w.u8(overlay | 27);
            w.u64(length);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn enc(v: PackValue) -> Vec<u8> {
        CborEncoder::new().encode(&v)
    }

    #[test]
    fn small_integers_are_one_byte() {
        assert_eq!(enc(PackValue::Integer(0)), vec![0x00]);
        assert_eq!(enc(PackValue::Integer(23)), vec![0x17]);
        assert_eq!(enc(PackValue::Integer(24)), vec![0x18, 24]);
        assert_eq!(enc(PackValue::Integer(-1)), vec![0x20]);
        assert_eq!(enc(PackValue::Integer(-500)), vec![0x39, 0x01, 0xf3]);
    }

    #[test]
    fn float_modes() {
        assert_eq!(enc(PackValue::Float(1.5)), vec![0xfa, 0x3f, 0xc0, 0x00, 0x00]);
        let fast = CborEncoder::fast().encode(&PackValue::Float(1.5));
        assert_eq!(fast[0], 0xfb);
        assert_eq!(fast.len(), 9);
        assert_eq!(enc(PackValue::Float(0.1))[0], 0xfb);
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(PackValue::Null), vec![0xf6]);
        assert_eq!(enc(PackValue::Undefined), vec![0xf7]);
        assert_eq!(enc(PackValue::Bool(true)), vec![0xf5]);
        assert_eq!(enc(PackValue::Bool(false)), vec![0xf4]);
    }

    #[test]
    fn string_header_uses_worst_case_width() {
        assert_eq!(enc(PackValue::from("abc")), vec![0x63, b'a', b'b', b'c']);
        let six = enc(PackValue::from("abcdef"));
        assert_eq!(&six[..2], &[0x78, 6]);
    }

    #[test]
    fn containers() {
        let bytes = CborEncoder::new().encode_json(&json!({"a": [1, 2]}));
        assert_eq!(bytes, vec![0xa1, 0x61, b'a', 0x82, 0x01, 0x02]);
    }
}
