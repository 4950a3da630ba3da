//! Byte buffers: a growable [`Writer`] and a bounds-checked [`Reader`].

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("unexpected end of input")]
    Eof,
    #[error("invalid utf-8 sequence")]
    Utf8,
}

/// Growable big-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    pub uint8: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            uint8: Vec::with_capacity(capacity),
        }
    }

    /// Current write position.
    #[inline]
    pub fn x(&self) -> usize {
        self.uint8.len()
    }

    pub fn reset(&mut self) {
        self.uint8.clear();
    }

    /// Returns everything written so far and empties the buffer.
    pub fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.uint8)
    }

    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.uint8.push(val);
    }

    #[inline]
    pub fn u16(&mut self, val: u16) {
        self.uint8.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn u32(&mut self, val: u32) {
        self.uint8.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn u64(&mut self, val: u64) {
        self.uint8.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn f32(&mut self, val: f32) {
        self.uint8.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn f64(&mut self, val: f64) {
        self.uint8.extend_from_slice(&val.to_be_bytes());
    }

    #[inline]
    pub fn buf(&mut self, data: &[u8]) {
        self.uint8.extend_from_slice(data);
    }

    /// Writes a UTF-8 string and returns its byte length.
    #[inline]
    pub fn utf8(&mut self, s: &str) -> usize {
        self.uint8.extend_from_slice(s.as_bytes());
        s.len()
    }

    /// Overwrites four bytes at `pos` with a big-endian `u32`.
    pub fn set_u32(&mut self, pos: usize, val: u32) {
        self.uint8[pos..pos + 4].copy_from_slice(&val.to_be_bytes());
    }
}

/// Cursor over a byte slice. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    pub uint8: &'a [u8],
    pub x: usize,
}

impl<'a> Reader<'a> {
    pub fn new(uint8: &'a [u8]) -> Self {
        Self { uint8, x: 0 }
    }

    pub fn reset(&mut self, uint8: &'a [u8]) {
        self.uint8 = uint8;
        self.x = 0;
    }

    /// Number of unread bytes.
    pub fn size(&self) -> usize {
        self.uint8.len().saturating_sub(self.x)
    }

    pub fn peek(&self) -> Result<u8, BufferError> {
        self.uint8.get(self.x).copied().ok_or(BufferError::Eof)
    }

    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        if length > self.size() {
            return Err(BufferError::Eof);
        }
        self.x += length;
        Ok(())
    }

    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        let end = self.x.checked_add(size).ok_or(BufferError::Eof)?;
        let bin = self.uint8.get(self.x..end).ok_or(BufferError::Eof)?;
        self.x = end;
        Ok(bin)
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        let val = self.peek()?;
        self.x += 1;
        Ok(val)
    }

    pub fn u16(&mut self) -> Result<u16, BufferError> {
        let b = self.buf(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, BufferError> {
        let b = self.buf(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, BufferError> {
        let b = self.buf(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn f32(&mut self) -> Result<f32, BufferError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn f64(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_bits(self.u64()?))
    }

    pub fn utf8(&mut self, size: usize) -> Result<&'a str, BufferError> {
        let bytes = self.buf(size)?;
        std::str::from_utf8(bytes).map_err(|_| BufferError::Utf8)
    }
}
