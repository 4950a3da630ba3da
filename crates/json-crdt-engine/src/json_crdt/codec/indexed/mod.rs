//! One binary field per node.

pub mod binary;
