//! Arena-based splay tree utilities.
//!
//! Nodes live in a caller-owned slice and refer to each other through
//! `Option<u32>` slot indices. A single node may take part in several trees at
//! once (the RGA keeps every chunk in a position tree and in an id tree); each
//! tree is described by a [`Links`] implementation which tells the algorithms
//! which fields to read and write, and how to refresh subtree aggregates after
//! a rotation.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`types`] | the [`Links`] trait |
//! | [`splay`] | zig, zig-zig and zig-zag rotations, [`splay()`] |
//! | [`util`]  | traversal, neighbour insertion, ordered insertion, removal |

pub mod splay;
pub mod types;
pub mod util;

pub use splay::{l_splay, ll_splay, lr_splay, r_splay, rl_splay, rr_splay, splay};
pub use types::Links;
pub use util::{
    first, insert, insert_left, insert_right, last, next, prev, remove, update_path,
};
