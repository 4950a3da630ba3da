//! Plain view plus a metadata blob.

pub mod binary;
