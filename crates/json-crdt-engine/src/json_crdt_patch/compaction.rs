//! Patch compaction: joining patches of one session and merging runs of
//! string appends.

use crate::error::CrdtError;
use crate::json_crdt_patch::clock::ts;
use crate::json_crdt_patch::operations::Op;
use crate::json_crdt_patch::patch::Patch;

/// Concatenates patches of a single session in time order. Gaps between
/// consecutive patches are filled with `nop`; overlapping patches are
/// rejected with `TIME_TRAVEL`. Empty patches are skipped and the meta of the
/// first patch is kept.
pub fn combine(patches: Vec<Patch>) -> Result<Patch, CrdtError> {
    let mut iter = patches.into_iter();
    let mut combined = iter.next().unwrap_or_default();
    for patch in iter {
        let Some(next) = patch.get_id() else {
            continue;
        };
        let Some(first) = combined.get_id() else {
            combined.ops = patch.ops;
            continue;
        };
        if first.sid != next.sid {
            return Err(CrdtError::format("SID_MISMATCH"));
        }
        let expected = combined.next_time();
        if next.time < expected {
            return Err(CrdtError::TimeTravel);
        }
        if next.time > expected {
            combined.ops.push(Op::Nop {
                id: ts(first.sid, expected),
                len: next.time - expected,
            });
        }
        combined.ops.extend(patch.ops);
    }
    Ok(combined)
}

/// Merges consecutive `ins_str` operations that type into the same string
/// one after another, as produced by character-by-character editing.
pub fn compact(patch: &mut Patch) {
    let ops = std::mem::take(&mut patch.ops);
    let mut out: Vec<Op> = Vec::with_capacity(ops.len());
    for op in ops {
        if let (
            Some(Op::InsStr { id: prev_id, obj: prev_obj, data: prev_data, .. }),
            Op::InsStr { id, obj, after, data },
        ) = (out.last_mut(), &op)
        {
            let next_time = prev_id.time + prev_data.chars().count() as u64;
            let appends = *after == ts(prev_id.sid, next_time - 1);
            if prev_obj == obj && id.sid == prev_id.sid && id.time == next_time && appends {
                prev_data.push_str(data);
                continue;
            }
        }
        out.push(op);
    }
    patch.ops = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::patch_builder::PatchBuilder;

    #[test]
    fn combine_pads_gaps() {
        let mut b = PatchBuilder::new(4, 1);
        b.obj();
        let first = b.flush();
        b.clock.tick(3);
        b.str_node();
        let second = b.flush();
        let combined = combine(vec![first, second]).unwrap();
        assert_eq!(combined.ops.len(), 3);
        assert_eq!(combined.ops[1], Op::Nop { id: ts(4, 2), len: 3 });
        assert_eq!(combined.span(), 5);
    }

    #[test]
    fn combine_rejects_overlap_and_foreign_sessions() {
        let mut a = PatchBuilder::new(4, 1);
        a.obj();
        a.obj();
        let mut b = PatchBuilder::new(4, 2);
        b.obj();
        assert_eq!(combine(vec![a.flush(), b.flush()]), Err(CrdtError::TimeTravel));

        let mut a = PatchBuilder::new(4, 1);
        a.obj();
        let mut b = PatchBuilder::new(5, 2);
        b.obj();
        assert!(combine(vec![a.flush(), b.flush()]).is_err());
    }

    #[test]
    fn compact_merges_sequential_typing() {
        let mut b = PatchBuilder::new(9, 1);
        let s = b.str_node();
        let h = b.ins_str(s, s, "hé");
        let l = b.ins_str(s, ts(9, h.time + 1), "l");
        b.ins_str(s, l, "lo");
        b.ins_str(s, s, "!");
        let mut patch = b.flush();
        compact(&mut patch);
        assert_eq!(patch.ops.len(), 3);
        assert_eq!(
            patch.ops[1],
            Op::InsStr { id: ts(9, 2), obj: s, after: s, data: "héllo".into() }
        );
        assert_eq!(patch.span(), 7);
    }
}
