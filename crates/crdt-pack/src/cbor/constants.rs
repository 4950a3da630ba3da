pub const MAJOR_UIN: u8 = 0;
pub const MAJOR_NIN: u8 = 1;
pub const MAJOR_BIN: u8 = 2;
pub const MAJOR_STR: u8 = 3;
pub const MAJOR_ARR: u8 = 4;
pub const MAJOR_MAP: u8 = 5;
pub const MAJOR_TAG: u8 = 6;
pub const MAJOR_TKN: u8 = 7;

pub const OVERLAY_UIN: u8 = MAJOR_UIN << 5;
pub const OVERLAY_NIN: u8 = MAJOR_NIN << 5;
pub const OVERLAY_BIN: u8 = MAJOR_BIN << 5;
pub const OVERLAY_STR: u8 = MAJOR_STR << 5;
pub const OVERLAY_ARR: u8 = MAJOR_ARR << 5;
pub const OVERLAY_MAP: u8 = MAJOR_MAP << 5;
pub const OVERLAY_TAG: u8 = MAJOR_TAG << 5;
pub const OVERLAY_TKN: u8 = MAJOR_TKN << 5;

pub const MINOR_MASK: u8 = 0b11111;

pub const FALSE: u8 = 0xf4;
pub const TRUE: u8 = 0xf5;
pub const NULL: u8 = 0xf6;
pub const UNDEFINED: u8 = 0xf7;
pub const FLOAT16: u8 = 0xf9;
pub const FLOAT32: u8 = 0xfa;
pub const FLOAT64: u8 = 0xfb;

/// Returns `true` when `value` survives a trip through `f32`.
pub fn is_f32_roundtrip(value: f64) -> bool {
    (value as f32) as f64 == value
}
