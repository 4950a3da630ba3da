use crdt_pack::CborEncoder;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::Ts;
use crate::json_crdt_patch::enums::Opcode;
use crate::json_crdt_patch::operations::{ConValue, Op};
use crate::json_crdt_patch::patch::Patch;
use crate::json_crdt_patch::util::binary::CrdtWriter;

/// Reusable binary patch encoder.
#[derive(Debug, Default)]
pub struct Encoder {
    cbor: CborEncoder,
    patch_sid: u64,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with `PATCH_EMPTY` for a patch without operations, which has no
    /// id to write in the header.
    pub fn encode(&mut self, patch: &Patch) -> Result<Vec<u8>, CrdtError> {
        let id = patch.get_id().ok_or(CrdtError::PatchEmpty)?;
        self.cbor.writer.reset();
        self.patch_sid = id.sid;
        let w = &mut self.cbor.writer;
        w.vu57(id.sid);
        w.vu57(id.time);
        match &patch.meta {
            None => self.cbor.write_undef(),
            Some(meta) => {
                self.cbor.write_arr_hdr(1);
                self.cbor.write_any(meta);
            }
        }
        self.cbor.writer.vu57(patch.ops.len() as u64);
        for op in &patch.ops {
            self.write_op(op);
        }
        Ok(self.cbor.writer.flush())
    }

    fn id(&mut self, id: Ts) {
        let w = &mut self.cbor.writer;
        if id.sid == self.patch_sid {
            w.b1vu56(0, id.time);
        } else {
            w.b1vu56(1, id.time);
            w.vu57(id.sid);
        }
    }

    fn header(&mut self, opcode: Opcode, len: usize) {
        let w = &mut self.cbor.writer;
        if (1..=7).contains(&len) {
            w.u8(opcode.overlay() | len as u8);
        } else {
            w.u8(opcode.overlay());
            w.vu57(len as u64);
        }
    }

    fn write_op(&mut self, op: &Op) {
        match op {
            Op::NewCon { val: ConValue::Val(value), .. } => {
                self.cbor.writer.u8(Opcode::NewCon.overlay());
                self.cbor.write_any(value);
            }
            Op::NewCon { val: ConValue::Ref(reference), .. } => {
                self.cbor.writer.u8(Opcode::NewCon.overlay() | 1);
                self.id(*reference);
            }
            Op::NewVal { .. }
            | Op::NewObj { .. }
            | Op::NewVec { .. }
            | Op::NewStr { .. }
            | Op::NewBin { .. }
            | Op::NewArr { .. } => self.cbor.writer.u8(op.opcode().overlay()),
            Op::InsVal { obj, val, .. } => {
                self.cbor.writer.u8(Opcode::InsVal.overlay());
                self.id(*obj);
                self.id(*val);
            }
            Op::InsObj { obj, data, .. } => {
                self.header(Opcode::InsObj, data.len());
                self.id(*obj);
                for (key, val) in data {
                    self.cbor.write_str(key);
                    self.id(*val);
                }
            }
            Op::InsVec { obj, data, .. } => {
                self.header(Opcode::InsVec, data.len());
                self.id(*obj);
                for (index, val) in data {
                    self.cbor.writer.u8(*index);
                    self.id(*val);
                }
            }
            Op::InsStr { obj, after, data, .. } => {
                self.header(Opcode::InsStr, data.len());
                self.id(*obj);
                self.id(*after);
                self.cbor.writer.utf8(data);
            }
            Op::InsBin { obj, after, data, .. } => {
                self.header(Opcode::InsBin, data.len());
                self.id(*obj);
                self.id(*after);
                self.cbor.writer.buf(data);
            }
            Op::InsArr { obj, after, data, .. } => {
                self.header(Opcode::InsArr, data.len());
                self.id(*obj);
                self.id(*after);
                for item in data {
                    self.id(*item);
                }
            }
            Op::UpdArr { obj, after, val, .. } => {
                self.cbor.writer.u8(Opcode::UpdArr.overlay());
                self.id(*obj);
                self.id(*after);
                self.id(*val);
            }
            Op::Del { obj, what, .. } => {
                self.header(Opcode::Del, what.len());
                self.id(*obj);
                for span in what {
                    self.id(span.ts());
                    self.cbor.writer.vu57(span.span);
                }
            }
            Op::Nop { len, .. } => self.header(Opcode::Nop, *len as usize),
        }
    }

}
