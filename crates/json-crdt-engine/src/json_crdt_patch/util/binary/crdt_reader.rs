use crdt_pack::buffers::BufferError;
use crdt_pack::Reader;

/// Decoding counterpart of [`super::CrdtWriter`].
pub trait CrdtReader {
    fn vu57(&mut self) -> Result<u64, BufferError>;
    fn b1vu56(&mut self) -> Result<(u8, u64), BufferError>;
    fn id(&mut self) -> Result<(u64, u64), BufferError>;
}

impl CrdtReader for Reader<'_> {
    fn vu57(&mut self) -> Result<u64, BufferError> {
        let mut num = 0u64;
        for i in 0..7 {
            let octet = self.u8()? as u64;
            num |= (octet & 0x7f) << (7 * i);
            if octet <= 0x7f {
                return Ok(num);
            }
        }
        Ok(num | (self.u8()? as u64) << 49)
    }

    fn b1vu56(&mut self) -> Result<(u8, u64), BufferError> {
        let first = self.u8()?;
        let flag = first >> 7;
        let mut num = (first & 0x3f) as u64;
        if first & 0x40 == 0 {
            return Ok((flag, num));
        }
        for i in 0..6 {
            let octet = self.u8()? as u64;
            num |= (octet & 0x7f) << (6 + 7 * i);
            if octet <= 0x7f {
                return Ok((flag, num));
            }
        }
        Ok((flag, num | (self.u8()? as u64) << 48))
    }

    fn id(&mut self) -> Result<(u64, u64), BufferError> {
        let octet = self.peek()?;
        if octet <= 0x7f {
            self.skip(1)?;
            return Ok(((octet >> 4) as u64, (octet & 0x0f) as u64));
        }
        let (_, x) = self.b1vu56()?;
        let y = self.vu57()?;
        Ok((x, y))
    }
}
