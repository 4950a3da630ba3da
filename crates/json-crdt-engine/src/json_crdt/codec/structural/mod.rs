//! Whole-document snapshot formats.

pub mod binary;
pub mod compact;
pub mod verbose;
