//! `CborDecoder`: decodes CBOR into [`PackValue`].

use crate::buffers::Reader;
use crate::PackValue;

use super::constants::*;
use super::error::CborError;

/// CBOR decoder. Definite-length items only; tags are read and discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct CborDecoder;

impl CborDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes exactly one value occupying the whole of `data`.
    pub fn decode(&self, data: &[u8]) -> Result<PackValue, CborError> {
        let mut reader = Reader::new(data);
        let value = self.read_any(&mut reader)?;
        if reader.size() != 0 {
            return Err(CborError::InvalidPayload);
        }
        Ok(value)
    }

    pub fn read_any(&self, r: &mut Reader<'_>) -> Result<PackValue, CborError> {
        let octet = r.u8()?;
        let major = octet >> 5;
        let minor = octet & MINOR_MASK;
        match major {
            MAJOR_UIN => Ok(PackValue::uint(self.read_len(r, minor)?)),
            MAJOR_NIN => {
                let n = self.read_len(r, minor)?;
                match i64::try_from(n) {
                    Ok(n) => Ok(PackValue::Integer(-1 - n)),
                    Err(_) => Ok(PackValue::Float(-1.0 - n as f64)),
                }
            }
            MAJOR_BIN => {
                let len = self.read_len(r, minor)? as usize;
                Ok(PackValue::Bytes(r.buf(len)?.to_vec()))
            }
            MAJOR_STR => {
                let len = self.read_len(r, minor)? as usize;
                Ok(PackValue::Str(r.utf8(len)?.to_owned()))
            }
            MAJOR_ARR => {
                let len = self.read_len(r, minor)? as usize;
                let mut arr = Vec::with_capacity(len.min(r.size()));
                for _ in 0..len {
                    arr.push(self.read_any(r)?);
                }
                Ok(PackValue::Array(arr))
            }
            MAJOR_MAP => {
                let len = self.read_len(r, minor)? as usize;
                let mut obj = Vec::with_capacity(len.min(r.size()));
                for _ in 0..len {
                    let key = self.read_str(r)?;
                    let value = self.read_any(r)?;
                    obj.push((key, value));
                }
                Ok(PackValue::Object(obj))
            }
            MAJOR_TAG => {
                self.read_len(r, minor)?;
                self.read_any(r)
            }
            _ => self.read_token(r, minor),
        }
    }

    /// Reads a text string item.
    pub fn read_str(&self, r: &mut Reader<'_>) -> Result<String, CborError> {
        let octet = r.u8()?;
        if octet >> 5 != MAJOR_STR {
            return Err(CborError::ExpectedString);
        }
        let len = self.read_len(r, octet & MINOR_MASK)? as usize;
        Ok(r.utf8(len)?.to_owned())
    }

    /// Reads the length/argument following a header with the given minor.
    pub fn read_len(&self, r: &mut Reader<'_>, minor: u8) -> Result<u64, CborError> {
        match minor {
            0..=23 => Ok(minor as u64),
            24 => Ok(r.u8()? as u64),
            25 => Ok(r.u16()? as u64),
            26 => Ok(r.u32()? as u64),
            27 => Ok(r.u64()?),
            _ => Err(CborError::InvalidPayload),
        }
    }

    fn read_token(&self, r: &mut Reader<'_>, minor: u8) -> Result<PackValue, CborError> {
        match minor {
            20 => Ok(PackValue::Bool(false)),
            21 => Ok(PackValue::Bool(true)),
            22 => Ok(PackValue::Null),
            23 => Ok(PackValue::Undefined),
            25 => Ok(PackValue::Float(decode_f16(r.u16()?))),
            26 => Ok(PackValue::Float(r.f32()? as f64)),
            27 => Ok(PackValue::Float(r.f64()?)),
            _ => Err(CborError::Unsupported(MAJOR_TKN)),
        }
    }
}

/// Decodes an IEEE 754 half-precision float.
fn decode_f16(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1f) as i32;
    let frac = (bits & 0x3ff) as f64;
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        0x1f if frac == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}
