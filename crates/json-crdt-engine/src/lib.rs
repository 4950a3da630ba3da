//! JSON CRDT document engine.
//!
//! [`json_crdt_patch`] holds the logical clock, the operation set, patches and
//! their wire codecs. [`json_crdt`] holds the replicated document: node types,
//! the RGA list algorithm, the [`json_crdt::Model`] and the model codecs.

pub mod error;
pub mod json_crdt;
pub mod json_crdt_patch;

pub use error::CrdtError;
pub use json_crdt::{Model, ModelOptions};
pub use json_crdt_patch::{Patch, PatchBuilder};
