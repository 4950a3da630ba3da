//! Protocol enumerations: reserved sessions, node data types and opcodes.

use crate::error::CrdtError;

/// Reserved session ids.
pub mod session {
    /// Protocol-owned ids such as the document origin.
    pub const SYSTEM: u64 = 0;
    /// The only session of a server-clock document.
    pub const SERVER: u64 = 1;
    /// Schema patches applied identically on every replica.
    pub const GLOBAL: u64 = 2;
    /// Replica-local state that is never shared.
    pub const LOCAL: u64 = 3;
    /// Largest session id, `2^53 - 1`.
    pub const MAX: u64 = 9_007_199_254_740_991;
}

/// Well-known times of the system session.
pub mod system_time {
    pub const ORIGIN: u64 = 0;
    pub const UNDEFINED: u64 = 1;
}

/// Three-bit node type tag shared by opcodes and model codecs.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Con = 0,
    Val = 1,
    Obj = 2,
    Vec = 3,
    Str = 4,
    Bin = 5,
    Arr = 6,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Con => "con",
            DataType::Val => "val",
            DataType::Obj => "obj",
            DataType::Vec => "vec",
            DataType::Str => "str",
            DataType::Bin => "bin",
            DataType::Arr => "arr",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "con" => DataType::Con,
            "val" => DataType::Val,
            "obj" => DataType::Obj,
            "vec" => DataType::Vec,
            "str" => DataType::Str,
            "bin" => DataType::Bin,
            "arr" => DataType::Arr,
            _ => return None,
        })
    }
}

impl TryFrom<u8> for DataType {
    type Error = CrdtError;

    fn try_from(v: u8) -> Result<Self, CrdtError> {
        Ok(match v {
            0 => DataType::Con,
            1 => DataType::Val,
            2 => DataType::Obj,
            3 => DataType::Vec,
            4 => DataType::Str,
            5 => DataType::Bin,
            6 => DataType::Arr,
            _ => return Err(CrdtError::UnknownNode),
        })
    }
}

/// Five-bit operation code: creation ops carry the bare data type, insert
/// ops set bit 3, `del` and `nop` live above.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    NewCon = 0,
    NewVal = 1,
    NewObj = 2,
    NewVec = 3,
    NewStr = 4,
    NewBin = 5,
    NewArr = 6,
    InsVal = 9,
    InsObj = 10,
    InsVec = 11,
    InsStr = 12,
    InsBin = 13,
    InsArr = 14,
    UpdArr = 15,
    Del = 16,
    Nop = 17,
}

impl Opcode {
    /// The opcode shifted into the high five bits of an op octet.
    #[inline]
    pub fn overlay(self) -> u8 {
        (self as u8) << 3
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CrdtError;

    fn try_from(v: u8) -> Result<Self, CrdtError> {
        Ok(match v {
            0 => Opcode::NewCon,
            1 => Opcode::NewVal,
            2 => Opcode::NewObj,
            3 => Opcode::NewVec,
            4 => Opcode::NewStr,
            5 => Opcode::NewBin,
            6 => Opcode::NewArr,
            9 => Opcode::InsVal,
            10 => Opcode::InsObj,
            11 => Opcode::InsVec,
            12 => Opcode::InsStr,
            13 => Opcode::InsBin,
            14 => Opcode::InsArr,
            15 => Opcode::UpdArr,
            16 => Opcode::Del,
            17 => Opcode::Nop,
            other => return Err(CrdtError::UnknownOp(other)),
        })
    }
}
