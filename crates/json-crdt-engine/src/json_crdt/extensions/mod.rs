//! Extension node types.
//!
//! An extension node is a two-slot `vec`:
//!
//! ```text
//! vec
//! ├─ 0: con bytes [ext_id, sid % 256, time % 256]
//! └─ 1: any (extension data)
//! ```
//!
//! The sentinel ties the tag to the vec it sits in, so a plain tuple that
//! happens to start with three bytes is not mistaken for an extension. A
//! model renders a recognised extension node through the [`Extension`]
//! registered for its id; unknown ids render as the plain tuple.

pub mod cnt;
pub mod mval;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crdt_pack::PackValue;

use crate::json_crdt::model::Model;
use crate::json_crdt_patch::clock::Ts;

pub use cnt::{CntApi, Cnt};
pub use mval::{Mval, MvalApi};

/// Extension id, the first byte of the sentinel.
pub type ExtId = u8;

pub trait Extension: Send + Sync {
    fn id(&self) -> ExtId;
    fn name(&self) -> &str;
    /// View of an extension node whose data slot holds `data`.
    fn view(&self, model: &Model, data: Ts) -> PackValue;
}

/// Registered extensions by id.
#[derive(Clone, Default)]
pub struct Extensions {
    by_id: BTreeMap<ExtId, Arc<dyn Extension>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `cnt` and `mval`.
    pub fn builtin() -> Self {
        let mut ext = Self::new();
        ext.register(Cnt);
        ext.register(Mval);
        ext
    }

    /// Adds `ext`, returning the extension it displaced, if any.
    pub fn register<E: Extension + 'static>(&mut self, ext: E) -> Option<Arc<dyn Extension>> {
        self.by_id.insert(ext.id(), Arc::new(ext))
    }

    pub fn get(&self, id: ExtId) -> Option<&Arc<dyn Extension>> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ExtId> + '_ {
        self.by_id.keys().copied()
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.by_id.iter().map(|(id, ext)| (id, ext.name())))
            .finish()
    }
}
