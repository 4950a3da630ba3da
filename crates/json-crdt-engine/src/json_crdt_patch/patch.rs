//! [`Patch`]: an atomic, ordered batch of operations.

use std::fmt;

use crdt_pack::PackValue;

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::{ts, Ts};
use crate::json_crdt_patch::codec::binary;
use crate::json_crdt_patch::operations::Op;

/// Operations plus optional user metadata. The patch id is the id of its
/// first operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Patch {
    pub ops: Vec<Op>,
    pub meta: Option<PackValue>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_id(&self) -> Option<Ts> {
        self.ops.first().map(Op::id)
    }

    /// Total ticks consumed by all operations.
    pub fn span(&self) -> u64 {
        self.ops.iter().map(Op::span).sum()
    }

    /// Time the next appended operation would receive; `0` when empty.
    pub fn next_time(&self) -> u64 {
        self.ops.last().map_or(0, |op| op.id().time + op.span())
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns a copy with every timestamp passed through `f`.
    pub fn rewrite_time(&self, mut f: impl FnMut(Ts) -> Ts) -> Patch {
        let mut patch = self.clone();
        for op in patch.ops.iter_mut() {
            op.map_ids(&mut f);
        }
        patch
    }

    /// Moves the patch so that it starts at `new_time`.
    ///
    /// Only ids of the patch's own session at or after `transform_after`
    /// (the patch's first time by default) are shifted; references to older
    /// state stay where they are.
    pub fn rebase(&self, new_time: u64, transform_after: Option<u64>) -> Result<Patch, CrdtError> {
        let id = self.get_id().ok_or(CrdtError::PatchEmpty)?;
        if id.time == new_time {
            return Ok(self.clone());
        }
        let sid = id.sid;
        let horizon = transform_after.unwrap_or(id.time);
        Ok(self.rewrite_time(|stamp| {
            if stamp.sid != sid || stamp.time < horizon {
                return stamp;
            }
            ts(sid, stamp.time + new_time - id.time)
        }))
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, CrdtError> {
        binary::encode(self)
    }

    pub fn from_binary(data: &[u8]) -> Result<Patch, CrdtError> {
        binary::decode(data)
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_id() {
            Some(id) => write!(f, "Patch {}!{}", id, self.span())?,
            None => write!(f, "Patch (nil)!0")?,
        }
        let last = self.ops.len().saturating_sub(1);
        for (i, op) in self.ops.iter().enumerate() {
            let branch = if i == last { "└─" } else { "├─" };
            write!(f, "\n{branch} {op}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::operations::ConValue;

    fn sample() -> Patch {
        Patch {
            ops: vec![
                Op::NewStr { id: ts(9, 5) },
                Op::InsStr {
                    id: ts(9, 6),
                    obj: ts(9, 5),
                    after: ts(9, 5),
                    data: "hi".into(),
                },
                Op::InsVal {
                    id: ts(9, 8),
                    obj: ts(0, 0),
                    val: ts(9, 5),
                },
                Op::NewCon {
                    id: ts(9, 9),
                    val: ConValue::Ref(ts(4, 2)),
                },
            ],
            meta: None,
        }
    }

    #[test]
    fn id_span_and_next_time() {
        let patch = sample();
        assert_eq!(patch.get_id(), Some(ts(9, 5)));
        assert_eq!(patch.span(), 5);
        assert_eq!(patch.next_time(), 10);
        assert_eq!(Patch::new().next_time(), 0);
    }

    #[test]
    fn rebase_shifts_only_own_session_ids() {
        let rebased = sample().rebase(1000, None).unwrap();
        assert_eq!(rebased.get_id(), Some(ts(9, 1000)));
        match &rebased.ops[1] {
            Op::InsStr { id, obj, after, .. } => {
                assert_eq!(*id, ts(9, 1001));
                assert_eq!(*obj, ts(9, 1000));
                assert_eq!(*after, ts(9, 1000));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &rebased.ops[2] {
            Op::InsVal { obj, .. } => assert_eq!(*obj, ts(0, 0)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(rebased.ops[3], Op::NewCon { id: ts(9, 1004), val: ConValue::Ref(ts(4, 2)) });
    }

    #[test]
    fn rebase_respects_transform_horizon() {
        let mut patch = sample();
        patch.ops.push(Op::InsVal {
            id: ts(9, 10),
            obj: ts(9, 1),
            val: ts(9, 9),
        });
        let rebased = patch.rebase(20, None).unwrap();
        match rebased.ops.last() {
            Some(Op::InsVal { obj, val, .. }) => {
                assert_eq!(*obj, ts(9, 1));
                assert_eq!(*val, ts(9, 24));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rebase_of_empty_patch_fails() {
        assert_eq!(Patch::new().rebase(10, None), Err(CrdtError::PatchEmpty));
    }

    #[test]
    fn display_is_a_tree() {
        let text = sample().to_string();
        assert!(text.starts_with("Patch 9.5!5\n├─ new_str 9.5"));
        assert!(text.ends_with("└─ new_con 9.9 { 4.2 }"));
    }
}
