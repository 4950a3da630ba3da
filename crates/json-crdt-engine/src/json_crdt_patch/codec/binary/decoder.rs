use crdt_pack::{CborDecoder, PackValue, Reader};
use tracing::debug;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{ts, tss, Ts};
use crate::json_crdt_patch::enums::Opcode;
use crate::json_crdt_patch::operations::{ConValue, Op};
use crate::json_crdt_patch::patch::Patch;
use crate::json_crdt_patch::util::binary::CrdtReader;

const CBOR_UNDEFINED: u8 = 0xf7;
const CBOR_ARR_1: u8 = 0x81;

/// Binary patch decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder {
    cbor: CborDecoder,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&self, data: &[u8]) -> Result<Patch, CrdtError> {
        debug!(bytes = data.len(), "decoding binary patch");
        let mut r = Reader::new(data);
        let sid = r.vu57()?;
        let mut time = r.vu57()?;
        let meta = match r.u8()? {
            CBOR_UNDEFINED => None,
            CBOR_ARR_1 => Some(self.cbor.read_any(&mut r)?),
            other => return Err(CrdtError::format(format!("unexpected meta header {other:#04x}"))),
        };
        let count = r.vu57()?;
        let mut ops = Vec::with_capacity((count as usize).min(r.size()));
        for _ in 0..count {
            let op = self.read_op(&mut r, sid, ts(sid, time))?;
            time = time
                .checked_add(op.span())
                .ok_or_else(|| CrdtError::format("operation ids overflow"))?;
            ops.push(op);
        }
        if r.size() != 0 {
            return Err(CrdtError::format("trailing bytes after patch"));
        }
        Ok(Patch { ops, meta })
    }

    fn id(&self, r: &mut Reader<'_>, patch_sid: u64) -> Result<Ts, CrdtError> {
        let (foreign, time) = r.b1vu56()?;
        if foreign == 0 {
            Ok(ts(patch_sid, time))
        } else {
            Ok(ts(r.vu57()?, time))
        }
    }

    fn len(&self, r: &mut Reader<'_>, inline: u8) -> Result<u64, CrdtError> {
        if inline != 0 {
            return Ok(inline as u64);
        }
        Ok(r.vu57()?)
    }

    fn read_op(&self, r: &mut Reader<'_>, sid: u64, id: Ts) -> Result<Op, CrdtError> {
        let octet = r.u8()?;
        let inline = octet & 0b111;
        let op = match Opcode::try_from(octet >> 3)? {
            Opcode::NewCon if inline == 0 => Op::NewCon {
                id,
                val: ConValue::Val(self.cbor.read_any(r)?),
            },
            Opcode::NewCon => Op::NewCon {
                id,
                val: ConValue::Ref(self.id(r, sid)?),
            },
            Opcode::NewVal => Op::NewVal { id },
            Opcode::NewObj => Op::NewObj { id },
            Opcode::NewVec => Op::NewVec { id },
            Opcode::NewStr => Op::NewStr { id },
            Opcode::NewBin => Op::NewBin { id },
            Opcode::NewArr => Op::NewArr { id },
            Opcode::InsVal => Op::InsVal {
                id,
                obj: self.id(r, sid)?,
                val: self.id(r, sid)?,
            },
            Opcode::InsObj => {
                let len = self.len(r, inline)?;
                let obj = self.id(r, sid)?;
                let mut data = Vec::new();
                for _ in 0..len {
                    let key = match self.cbor.read_any(r)? {
                        PackValue::Str(key) => key,
                        _ => return Err(CrdtError::InvalidObj),
                    };
                    data.push((key, self.id(r, sid)?));
                }
                Op::InsObj { id, obj, data }
            }
            Opcode::InsVec => {
                let len = self.len(r, inline)?;
                let obj = self.id(r, sid)?;
                let mut data = Vec::new();
                for _ in 0..len {
                    let index = r.u8()?;
                    data.push((index, self.id(r, sid)?));
                }
                Op::InsVec { id, obj, data }
            }
            Opcode::InsStr => {
                let len = self.len(r, inline)? as usize;
                let obj = self.id(r, sid)?;
                let after = self.id(r, sid)?;
                let data = r.utf8(len)?.to_owned();
                Op::InsStr { id, obj, after, data }
            }
            Opcode::InsBin => {
                let len = self.len(r, inline)? as usize;
                let obj = self.id(r, sid)?;
                let after = self.id(r, sid)?;
                let data = r.buf(len)?.to_vec();
                Op::InsBin { id, obj, after, data }
            }
            Opcode::InsArr => {
                let len = self.len(r, inline)?;
                let obj = self.id(r, sid)?;
                let after = self.id(r, sid)?;
                let mut data = Vec::new();
                for _ in 0..len {
                    data.push(self.id(r, sid)?);
                }
                Op::InsArr { id, obj, after, data }
            }
            Opcode::UpdArr => Op::UpdArr {
                id,
                obj: self.id(r, sid)?,
                after: self.id(r, sid)?,
                val: self.id(r, sid)?,
            },
            Opcode::Del => {
                let len = self.len(r, inline)?;
                let obj = self.id(r, sid)?;
                let mut what = Vec::new();
                for _ in 0..len {
                    let start = self.id(r, sid)?;
                    let span = r.vu57()?;
                    what.push(tss(start.sid, start.time, span));
                }
                Op::Del { id, obj, what }
            }
            Opcode::Nop => Op::Nop {
                id,
                len: self.len(r, inline)?,
            },
        };
        Ok(op)
    }
}
