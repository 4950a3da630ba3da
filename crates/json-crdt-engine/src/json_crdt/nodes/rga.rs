//! Replicated Growable Array.
//!
//! A sequence is stored as chunks, each a run of consecutive ticks of one
//! session inserted together. Every chunk lives in two splay trees at once:
//!
//! - the *position* tree (`p`/`l`/`r`), in document order, where every node
//!   carries `len`, the number of visible items in its subtree;
//! - the *id* tree (`p2`/`l2`/`r2`), ordered by `(sid, time)`, used to find
//!   the chunk holding a given element id.
//!
//! Chunks are kept in an arena and addressed by `u32` slot index. When a
//! chunk is split, the right part is linked from the left part through `s`.

use std::cmp::Ordering;
use std::collections::HashSet;

use splay_forest::{self as tree, Links};

use crate::json_crdt_patch::clock::{compare, ts, Ts, Tss};

// ── ChunkData ─────────────────────────────────────────────────────────────

/// Payload of a live chunk.
///
/// `span` is measured in items: characters for strings, bytes for binary
/// data and element slots for arrays.
pub trait ChunkData: Clone {
    fn span(&self) -> u64;
    /// Keeps items `[0, at)` in `self` and returns `[at, span)`.
    fn cut(&mut self, at: u64) -> Self;
    /// Appends `other` to the end of `self`.
    fn extend_with(&mut self, other: Self);
}

impl ChunkData for String {
    fn span(&self) -> u64 {
        self.chars().count() as u64
    }

    fn cut(&mut self, at: u64) -> Self {
        let byte = self
            .char_indices()
            .nth(at as usize)
            .map_or(self.len(), |(i, _)| i);
        self.split_off(byte)
    }

    fn extend_with(&mut self, other: Self) {
        self.push_str(&other);
    }
}

impl<V: Clone> ChunkData for Vec<V> {
    fn span(&self) -> u64 {
        self.len() as u64
    }

    fn cut(&mut self, at: u64) -> Self {
        self.split_off(at as usize)
    }

    fn extend_with(&mut self, mut other: Self) {
        self.append(&mut other);
    }
}

// ── Chunk ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Chunk<T> {
    /// Id of the first item.
    pub id: Ts,
    /// Number of items, deleted ones included.
    pub span: u64,
    pub del: bool,
    /// `None` once deleted.
    pub data: Option<T>,
    len: u64,
    p: Option<u32>,
    l: Option<u32>,
    r: Option<u32>,
    p2: Option<u32>,
    l2: Option<u32>,
    r2: Option<u32>,
    s: Option<u32>,
}

impl<T> Chunk<T> {
    fn new(id: Ts, span: u64, data: Option<T>) -> Self {
        Self {
            id,
            span,
            del: data.is_none(),
            data,
            len: 0,
            p: None,
            l: None,
            r: None,
            p2: None,
            l2: None,
            r2: None,
            s: None,
        }
    }

    /// Visible item count of this chunk alone.
    #[inline]
    pub fn visible(&self) -> u64 {
        if self.del {
            0
        } else {
            self.span
        }
    }

    /// Whether the element `id` belongs to this chunk.
    #[inline]
    pub fn contains(&self, id: Ts) -> bool {
        self.id.sid == id.sid && self.id.time <= id.time && id.time < self.id.time + self.span
    }

    /// The chunk split off the right end of this one, if any.
    pub fn split_successor(&self) -> Option<u32> {
        self.s
    }
}

/// Position tree links.
pub struct ByPos;

/// Id tree links.
pub struct ById;

impl<T> Links<Chunk<T>> for ByPos {
    fn p(n: &Chunk<T>) -> Option<u32> {
        n.p
    }
    fn l(n: &Chunk<T>) -> Option<u32> {
        n.l
    }
    fn r(n: &Chunk<T>) -> Option<u32> {
        n.r
    }
    fn set_p(n: &mut Chunk<T>, v: Option<u32>) {
        n.p = v;
    }
    fn set_l(n: &mut Chunk<T>, v: Option<u32>) {
        n.l = v;
    }
    fn set_r(n: &mut Chunk<T>, v: Option<u32>) {
        n.r = v;
    }

    fn update(arena: &mut [Chunk<T>], idx: u32) {
        let c = &arena[idx as usize];
        let l = c.l.map_or(0, |i| arena[i as usize].len);
        let r = c.r.map_or(0, |i| arena[i as usize].len);
        let own = c.visible();
        arena[idx as usize].len = own + l + r;
    }
}

impl<T> Links<Chunk<T>> for ById {
    fn p(n: &Chunk<T>) -> Option<u32> {
        n.p2
    }
    fn l(n: &Chunk<T>) -> Option<u32> {
        n.l2
    }
    fn r(n: &Chunk<T>) -> Option<u32> {
        n.r2
    }
    fn set_p(n: &mut Chunk<T>, v: Option<u32>) {
        n.p2 = v;
    }
    fn set_l(n: &mut Chunk<T>, v: Option<u32>) {
        n.l2 = v;
    }
    fn set_r(n: &mut Chunk<T>, v: Option<u32>) {
        n.r2 = v;
    }
}

// ── Rga ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Rga<T> {
    /// Id of the owning node; inserting "after" it means at the front.
    pub id: Ts,
    chunks: Vec<Chunk<T>>,
    free: Vec<u32>,
    root: Option<u32>,
    ids: Option<u32>,
    count: usize,
}

impl<T: ChunkData> Rga<T> {
    pub fn new(id: Ts) -> Self {
        Self {
            id,
            chunks: Vec::new(),
            free: Vec::new(),
            root: None,
            ids: None,
            count: 0,
        }
    }

    #[inline]
    pub fn chunk(&self, idx: u32) -> &Chunk<T> {
        &self.chunks[idx as usize]
    }

    /// Mutable access to a live chunk's payload. The payload must keep its
    /// span.
    pub(crate) fn data_mut(&mut self, idx: u32) -> Option<&mut T> {
        self.chunks.get_mut(idx as usize)?.data.as_mut()
    }

    /// Number of visible items.
    pub fn length(&self) -> u64 {
        self.root.map_or(0, |r| self.chunks[r as usize].len)
    }

    /// Number of chunks, tombstones included.
    pub fn size(&self) -> usize {
        self.count
    }

    pub fn first(&self) -> Option<u32> {
        tree::first::<ByPos, _>(&self.chunks, self.root)
    }

    pub fn last(&self) -> Option<u32> {
        tree::last::<ByPos, _>(&self.chunks, self.root)
    }

    pub fn next(&self, idx: u32) -> Option<u32> {
        tree::next::<ByPos, _>(&self.chunks, idx)
    }

    pub fn prev(&self, idx: u32) -> Option<u32> {
        tree::prev::<ByPos, _>(&self.chunks, idx)
    }

    /// Chunks in document order.
    pub fn iter(&self) -> RgaIter<'_, T> {
        RgaIter {
            rga: self,
            curr: self.first(),
        }
    }

    /// Chunks in `(sid, time)` order.
    pub fn iter_by_id(&self) -> impl Iterator<Item = &Chunk<T>> + '_ {
        let mut curr = tree::first::<ById, _>(&self.chunks, self.ids);
        std::iter::from_fn(move || {
            let idx = curr?;
            curr = tree::next::<ById, _>(&self.chunks, idx);
            Some(&self.chunks[idx as usize])
        })
    }

    // ── lookup ────────────────────────────────────────────────────────────

    /// Chunk with the greatest `(sid, time)` key not above `id`.
    fn floor_by_id(&self, id: Ts) -> Option<u32> {
        let mut curr = self.ids;
        let mut best = None;
        while let Some(idx) = curr {
            let c = &self.chunks[idx as usize];
            match c.id.cmp_by_session(&id) {
                Ordering::Greater => curr = c.l2,
                Ordering::Equal => return Some(idx),
                Ordering::Less => {
                    best = Some(idx);
                    curr = c.r2;
                }
            }
        }
        best
    }

    /// Chunk containing the element `id`.
    pub fn find_by_id(&self, id: Ts) -> Option<u32> {
        self.floor_by_id(id)
            .filter(|&idx| self.chunks[idx as usize].contains(id))
    }

    /// Chunk and in-chunk offset of the visible item at `pos`.
    pub fn find_chunk(&self, pos: u64) -> Option<(u32, u64)> {
        let mut curr = self.root;
        let mut pos = pos;
        while let Some(idx) = curr {
            let c = &self.chunks[idx as usize];
            let left = c.l.map_or(0, |i| self.chunks[i as usize].len);
            if pos < left {
                curr = c.l;
                continue;
            }
            pos -= left;
            let own = c.visible();
            if pos < own {
                return Some((idx, pos));
            }
            pos -= own;
            curr = c.r;
        }
        None
    }

    /// Id of the visible item at `pos`.
    pub fn find(&self, pos: u64) -> Option<Ts> {
        let (idx, offset) = self.find_chunk(pos)?;
        let c = &self.chunks[idx as usize];
        Some(ts(c.id.sid, c.id.time + offset))
    }

    /// Id spans covering `len` visible items starting at `pos`. Adjacent
    /// spans that continue each other are merged.
    pub fn find_interval(&self, pos: u64, len: u64) -> Vec<Tss> {
        let mut out: Vec<Tss> = Vec::new();
        let Some((start, offset)) = self.find_chunk(pos) else {
            return out;
        };
        let mut remaining = len;
        let mut offset = offset;
        let mut curr = Some(start);
        while let Some(idx) = curr {
            if remaining == 0 {
                break;
            }
            let c = &self.chunks[idx as usize];
            if !c.del {
                let take = (c.span - offset).min(remaining);
                let time = c.id.time + offset;
                match out.last_mut() {
                    Some(last) if last.sid == c.id.sid && last.time + last.span == time => {
                        last.span += take;
                    }
                    _ => out.push(Tss::new(c.id.sid, time, take)),
                }
                remaining -= take;
            }
            offset = 0;
            curr = self.next(idx);
        }
        out
    }

    /// Visible position of the first item of chunk `idx`.
    pub fn pos(&self, idx: u32) -> u64 {
        let c = &self.chunks[idx as usize];
        let mut pos = c.l.map_or(0, |i| self.chunks[i as usize].len);
        let mut curr = idx;
        while let Some(parent) = self.chunks[curr as usize].p {
            let pc = &self.chunks[parent as usize];
            if pc.r == Some(curr) {
                pos += pc.l.map_or(0, |i| self.chunks[i as usize].len) + pc.visible();
            }
            curr = parent;
        }
        pos
    }

    // ── mutation ──────────────────────────────────────────────────────────

    fn alloc(&mut self, chunk: Chunk<T>) -> u32 {
        self.count += 1;
        match self.free.pop() {
            Some(idx) => {
                self.chunks[idx as usize] = chunk;
                idx
            }
            None => {
                self.chunks.push(chunk);
                (self.chunks.len() - 1) as u32
            }
        }
    }

    fn release(&mut self, idx: u32) {
        self.count -= 1;
        let c = &mut self.chunks[idx as usize];
        *c = Chunk::new(c.id, 0, None);
        self.free.push(idx);
    }

    /// Splits chunk `idx` so that it keeps `at` items; returns the new right
    /// part, which follows it in both trees.
    fn split(&mut self, idx: u32, at: u64) -> u32 {
        let c = &mut self.chunks[idx as usize];
        let right_data = c.data.as_mut().map(|d| d.cut(at));
        let mut right = Chunk::new(ts(c.id.sid, c.id.time + at), c.span - at, right_data);
        right.del = c.del;
        right.s = c.s;
        c.span = at;
        let new = self.alloc(right);
        self.chunks[idx as usize].s = Some(new);
        tree::insert_right::<ByPos, _>(&mut self.chunks, new, idx);
        tree::insert_right::<ById, _>(&mut self.chunks, new, idx);
        new
    }

    /// Inserts `content` with first id `id` right after the element
    /// `after`. Concurrent inserts at the same anchor are ordered by
    /// descending id. Returns `false` when nothing was inserted: the id is
    /// already known, the content is empty or the anchor is missing.
    pub fn ins(&mut self, after: Ts, id: Ts, content: T) -> bool {
        let span = content.span();
        if span == 0 || self.find_by_id(id).is_some() {
            return false;
        }
        let mut cursor = None;
        if after != self.id {
            let Some(anchor) = self.find_by_id(after) else {
                return false;
            };
            let (start, chunk_span) = {
                let c = &self.chunks[anchor as usize];
                (c.id.time, c.span)
            };
            let offset = after.time - start;
            if offset + 1 < chunk_span {
                let next_item = ts(after.sid, after.time + 1);
                if compare(id, next_item) == Ordering::Greater {
                    self.split(anchor, offset + 1);
                    self.link_after(Some(anchor), id, span, content);
                    return true;
                }
            }
            cursor = Some(anchor);
        }
        loop {
            let next = match cursor {
                Some(c) => self.next(c),
                None => self.first(),
            };
            match next {
                Some(n) if compare(self.chunks[n as usize].id, id) == Ordering::Greater => {
                    cursor = Some(n);
                }
                _ => break,
            }
        }
        if let Some(c) = cursor {
            let chunk = &mut self.chunks[c as usize];
            if !chunk.del
                && chunk.id.sid == id.sid
                && chunk.id.time + chunk.span == id.time
                && chunk.s.is_none()
            {
                chunk.span += span;
                if let Some(data) = chunk.data.as_mut() {
                    data.extend_with(content);
                }
                tree::update_path::<ByPos, _>(&mut self.chunks, c);
                self.root = tree::splay::<ByPos, _>(&mut self.chunks, self.root, c);
                return true;
            }
        }
        self.link_after(cursor, id, span, content);
        true
    }

    /// Inserts `content` so that it starts at visible position `pos`.
    /// Returns the anchor the insert was made after.
    pub fn ins_at(&mut self, pos: u64, id: Ts, content: T) -> Option<Ts> {
        let after = if pos == 0 { self.id } else { self.find(pos - 1)? };
        self.ins(after, id, content);
        Some(after)
    }

    /// Appends a chunk at the end of the sequence as-is. Decoders use this
    /// to rebuild a node from its encoded chunk list; `None` data makes a
    /// tombstone of `span` items.
    pub fn push_chunk(&mut self, id: Ts, span: u64, data: Option<T>) {
        if span == 0 {
            return;
        }
        let last = self.last();
        let new = self.alloc(Chunk::new(id, span, data));
        match last {
            Some(l) => tree::insert_right::<ByPos, _>(&mut self.chunks, new, l),
            None => {
                <ByPos as Links<Chunk<T>>>::update(&mut self.chunks, new);
                self.root = Some(new);
            }
        }
        self.root = tree::splay::<ByPos, _>(&mut self.chunks, self.root, new);
        self.index_id(new);
    }

    fn index_id(&mut self, new: u32) {
        self.ids = tree::insert::<ById, _, _>(&mut self.chunks, self.ids, new, |a, b| {
            a.id.cmp_by_session(&b.id)
        });
        self.ids = tree::splay::<ById, _>(&mut self.chunks, self.ids, new);
    }

    fn link_after(&mut self, cursor: Option<u32>, id: Ts, span: u64, content: T) {
        let new = self.alloc(Chunk::new(id, span, Some(content)));
        match cursor {
            Some(c) => tree::insert_right::<ByPos, _>(&mut self.chunks, new, c),
            None => match self.first() {
                Some(f) => tree::insert_left::<ByPos, _>(&mut self.chunks, new, f),
                None => {
                    <ByPos as Links<Chunk<T>>>::update(&mut self.chunks, new);
                    self.root = Some(new);
                }
            },
        }
        self.root = tree::splay::<ByPos, _>(&mut self.chunks, self.root, new);
        self.index_id(new);
    }

    /// Marks every known element inside `spans` as deleted. Unknown ticks are
    /// ignored. Returns the payloads that were removed, in id order.
    pub fn delete(&mut self, spans: &[Tss]) -> Vec<T> {
        let mut removed = Vec::new();
        let mut touched = Vec::new();
        for span in spans {
            let end = span.time + span.span;
            let mut t = span.time;
            while t < end {
                let at = ts(span.sid, t);
                let idx = match self.floor_by_id(at) {
                    Some(i) if self.chunks[i as usize].contains(at) => i,
                    Some(i) => match tree::next::<ById, _>(&self.chunks, i) {
                        Some(n) => n,
                        None => break,
                    },
                    None => match tree::first::<ById, _>(&self.chunks, self.ids) {
                        Some(n) => n,
                        None => break,
                    },
                };
                let start = self.chunks[idx as usize].id;
                if start.sid != span.sid || start.time >= end {
                    break;
                }
                let mut target = idx;
                if start.time < t {
                    target = self.split(idx, t - start.time);
                }
                let (from, len) = {
                    let c = &self.chunks[target as usize];
                    (c.id.time, c.span)
                };
                if from + len > end {
                    self.split(target, end - from);
                }
                let c = &mut self.chunks[target as usize];
                t = c.id.time + c.span;
                if !c.del {
                    c.del = true;
                    if let Some(data) = c.data.take() {
                        removed.push(data);
                    }
                    tree::update_path::<ByPos, _>(&mut self.chunks, target);
                }
                touched.push(target);
            }
        }
        self.merge_tombstones(&touched);
        removed
    }

    /// Joins each touched tombstone with deleted neighbours that continue
    /// its id range.
    fn merge_tombstones(&mut self, touched: &[u32]) {
        let mut gone: HashSet<u32> = HashSet::new();
        for &idx in touched {
            if gone.contains(&idx) {
                continue;
            }
            let mut head = idx;
            while let Some(p) = self.prev(head) {
                if !self.continues(p, head) {
                    break;
                }
                head = p;
            }
            while let Some(n) = self.next(head) {
                if !self.continues(head, n) {
                    break;
                }
                self.absorb(head, n);
                gone.insert(n);
            }
        }
    }

    fn continues(&self, a: u32, b: u32) -> bool {
        let (ca, cb) = (&self.chunks[a as usize], &self.chunks[b as usize]);
        ca.del && cb.del && ca.id.sid == cb.id.sid && ca.id.time + ca.span == cb.id.time
    }

    /// Folds tombstone `b` into the preceding tombstone `a`.
    fn absorb(&mut self, a: u32, b: u32) {
        let (b_span, b_s) = {
            let cb = &self.chunks[b as usize];
            (cb.span, cb.s)
        };
        let ca = &mut self.chunks[a as usize];
        ca.span += b_span;
        if ca.s == Some(b) {
            ca.s = b_s;
        }
        self.root = tree::remove::<ByPos, _>(&mut self.chunks, self.root, b);
        self.ids = tree::remove::<ById, _>(&mut self.chunks, self.ids, b);
        self.release(b);
    }

    /// Drops every tombstone. Elements deleted afterwards by id are no longer
    /// found, so this is only safe once all peers have seen the deletes.
    pub fn rm_tombstones(&mut self) {
        let dead: Vec<u32> = self.iter_idx().filter(|&i| self.chunks[i as usize].del).collect();
        if dead.is_empty() {
            return;
        }
        let dead_set: HashSet<u32> = dead.iter().copied().collect();
        for &idx in &dead {
            self.root = tree::remove::<ByPos, _>(&mut self.chunks, self.root, idx);
            self.ids = tree::remove::<ById, _>(&mut self.chunks, self.ids, idx);
        }
        for &idx in &dead {
            self.release(idx);
        }
        for c in self.chunks.iter_mut() {
            if c.s.is_some_and(|s| dead_set.contains(&s)) {
                c.s = None;
            }
        }
    }

    /// Isolates the live element `id` into a chunk of its own and returns
    /// that chunk.
    pub(crate) fn isolate(&mut self, id: Ts) -> Option<u32> {
        let idx = self.find_by_id(id)?;
        if self.chunks[idx as usize].del {
            return None;
        }
        let start = self.chunks[idx as usize].id.time;
        let mut target = idx;
        if start < id.time {
            target = self.split(idx, id.time - start);
        }
        if self.chunks[target as usize].span > 1 {
            self.split(target, 1);
        }
        Some(target)
    }

    fn iter_idx(&self) -> impl Iterator<Item = u32> + '_ {
        let mut curr = self.first();
        std::iter::from_fn(move || {
            let idx = curr?;
            curr = self.next(idx);
            Some(idx)
        })
    }

    /// Every element in document order as `(id, deleted)`.
    pub fn elements(&self) -> Vec<(Ts, bool)> {
        self.iter()
            .flat_map(|c| (0..c.span).map(move |i| (ts(c.id.sid, c.id.time + i), c.del)))
            .collect()
    }
}

pub struct RgaIter<'a, T> {
    rga: &'a Rga<T>,
    curr: Option<u32>,
}

impl<'a, T: ChunkData> Iterator for RgaIter<'a, T> {
    type Item = &'a Chunk<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.curr?;
        self.curr = self.rga.next(idx);
        Some(self.rga.chunk(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_crdt_patch::clock::tss;

    fn text(rga: &Rga<String>) -> String {
        rga.iter().filter_map(|c| c.data.as_deref()).collect()
    }

    fn node() -> Rga<String> {
        Rga::new(ts(1, 1))
    }

    /// Walks both trees and checks links, aggregates and ordering.
    fn assert_consistent(rga: &Rga<String>) {
        let mut by_pos = 0;
        let mut visible = 0;
        for c in rga.iter() {
            by_pos += 1;
            visible += c.visible();
        }
        assert_eq!(by_pos, rga.size());
        assert_eq!(visible, rga.length());
        let ids: Vec<Ts> = rga.iter_by_id().map(|c| c.id).collect();
        assert_eq!(ids.len(), rga.size());
        for w in ids.windows(2) {
            assert_eq!(w[0].cmp_by_session(&w[1]), Ordering::Less);
        }
    }

    #[test]
    fn appends_merge_into_one_chunk() {
        let mut rga = node();
        assert!(rga.ins(ts(1, 1), ts(1, 2), "ab".into()));
        assert!(rga.ins(ts(1, 3), ts(1, 4), "cd".into()));
        assert_eq!(text(&rga), "abcd");
        assert_eq!(rga.size(), 1);
        assert_consistent(&rga);
    }

    #[test]
    fn insert_in_the_middle_splits() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "abc".into());
        rga.ins(ts(1, 2), ts(1, 10), "X".into());
        assert_eq!(text(&rga), "aXbc");
        assert_eq!(rga.size(), 3);
        assert_eq!(rga.chunk(rga.first().unwrap()).split_successor().map(|i| rga.chunk(i).id), Some(ts(1, 3)));
        assert_consistent(&rga);
    }

    #[test]
    fn concurrent_inserts_order_by_descending_id() {
        let mut a = node();
        a.ins(ts(1, 1), ts(1, 2), "x".into());
        let mut b = a.clone();
        a.ins(ts(1, 2), ts(5, 3), "A".into());
        a.ins(ts(1, 2), ts(6, 3), "B".into());
        b.ins(ts(1, 2), ts(6, 3), "B".into());
        b.ins(ts(1, 2), ts(5, 3), "A".into());
        assert_eq!(text(&a), "xBA");
        assert_eq!(text(&a), text(&b));
        assert_eq!(a.elements(), b.elements());
    }

    #[test]
    fn insert_skips_descendants_of_newer_siblings() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(2, 5), "B".into());
        rga.ins(ts(2, 5), ts(2, 6), "b".into());
        rga.ins(ts(1, 1), ts(3, 4), "A".into());
        assert_eq!(text(&rga), "BbA");
        assert_consistent(&rga);
    }

    #[test]
    fn duplicate_and_orphan_inserts_are_ignored() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "ab".into());
        assert!(!rga.ins(ts(1, 1), ts(1, 2), "ab".into()));
        assert!(!rga.ins(ts(9, 9), ts(1, 5), "zz".into()));
        assert!(!rga.ins(ts(1, 1), ts(1, 7), String::new()));
        assert_eq!(text(&rga), "ab");
    }

    #[test]
    fn delete_splits_partial_overlaps() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "hello".into());
        let removed = rga.delete(&[tss(1, 3, 2)]);
        assert_eq!(removed, vec!["el".to_string()]);
        assert_eq!(text(&rga), "hlo");
        assert_eq!(rga.size(), 3);
        assert_eq!(rga.length(), 3);
        assert_consistent(&rga);
    }

    #[test]
    fn delete_of_unknown_ticks_is_harmless() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "abc".into());
        rga.delete(&[tss(7, 1, 10), tss(1, 40, 2)]);
        assert_eq!(text(&rga), "abc");
        rga.delete(&[tss(1, 0, 3)]);
        assert_eq!(text(&rga), "bc");
    }

    #[test]
    fn adjacent_tombstones_merge() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "abcdef".into());
        rga.delete(&[tss(1, 3, 1)]);
        rga.delete(&[tss(1, 4, 1)]);
        rga.delete(&[tss(1, 5, 1)]);
        assert_eq!(text(&rga), "aef");
        assert_eq!(rga.size(), 3);
        assert_consistent(&rga);
        rga.delete(&[tss(1, 2, 1), tss(1, 6, 2)]);
        assert_eq!(text(&rga), "");
        assert_eq!(rga.size(), 1);
        assert_consistent(&rga);
    }

    #[test]
    fn positions_and_intervals() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "abc".into());
        rga.ins(ts(1, 4), ts(2, 10), "XY".into());
        assert_eq!(text(&rga), "abcXY");
        assert_eq!(rga.find(3), Some(ts(2, 10)));
        assert_eq!(rga.find(5), None);
        assert_eq!(rga.find_interval(1, 3), vec![tss(1, 3, 2), tss(2, 10, 1)]);
        rga.delete(&[tss(1, 3, 1)]);
        assert_eq!(rga.find_interval(0, 2), vec![tss(1, 2, 1), tss(1, 4, 1)]);
        let last = rga.last().unwrap();
        assert_eq!(rga.pos(last), 2);
    }

    #[test]
    fn ins_at_resolves_the_anchor() {
        let mut rga = node();
        assert_eq!(rga.ins_at(0, ts(1, 2), "ac".into()), Some(ts(1, 1)));
        assert_eq!(rga.ins_at(1, ts(1, 10), "b".into()), Some(ts(1, 2)));
        assert_eq!(text(&rga), "abc");
        assert_eq!(rga.ins_at(9, ts(1, 20), "z".into()), None);
    }

    #[test]
    fn tombstones_can_be_dropped() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "abcd".into());
        rga.delete(&[tss(1, 3, 2)]);
        rga.rm_tombstones();
        assert_eq!(text(&rga), "ad");
        assert_eq!(rga.size(), 2);
        assert_consistent(&rga);
        assert!(rga.ins(ts(1, 5), ts(1, 30), "e".into()));
        assert_eq!(text(&rga), "ade");
    }

    #[test]
    fn multibyte_characters_split_on_char_boundaries() {
        let mut rga = node();
        rga.ins(ts(1, 1), ts(1, 2), "añb".into());
        rga.delete(&[tss(1, 3, 1)]);
        assert_eq!(text(&rga), "ab");
        assert_eq!(rga.length(), 2);
    }

    #[test]
    fn pushed_chunks_keep_their_shape() {
        let mut rga = node();
        rga.push_chunk(ts(1, 2), 2, Some("ab".to_string()));
        rga.push_chunk(ts(1, 4), 3, None);
        rga.push_chunk(ts(2, 3), 1, Some("c".to_string()));
        assert_eq!(text(&rga), "abc");
        assert_eq!(rga.size(), 3);
        assert_eq!(rga.find_by_id(ts(1, 5)).map(|i| rga.chunk(i).id), Some(ts(1, 4)));
        assert_consistent(&rga);
    }

    #[test]
    fn isolate_leaves_a_single_item_chunk() {
        let mut rga: Rga<Vec<u8>> = Rga::new(ts(1, 1));
        rga.ins(ts(1, 1), ts(1, 2), vec![1, 2, 3]);
        let idx = rga.isolate(ts(1, 3)).unwrap();
        assert_eq!(rga.chunk(idx).span, 1);
        assert_eq!(rga.chunk(idx).data, Some(vec![2]));
        assert_eq!(rga.size(), 3);
    }

    #[test]
    fn many_random_edits_keep_trees_consistent() {
        let mut rga = node();
        let mut time = 2;
        let mut shadow: Vec<char> = Vec::new();
        for round in 0..200u64 {
            let len = rga.length();
            if round % 3 == 2 && len > 0 {
                let pos = (round * 7) % len;
                let spans = rga.find_interval(pos, 2);
                rga.delete(&spans);
                let end = (pos as usize + 2).min(shadow.len());
                shadow.drain(pos as usize..end);
            } else {
                let pos = if len == 0 { 0 } else { (round * 13) % (len + 1) };
                let ch = char::from(b'a' + (round % 26) as u8);
                rga.ins_at(pos, ts(1 + round % 3, time), ch.to_string());
                shadow.insert(pos as usize, ch);
                time += 1;
            }
            assert_consistent(&rga);
        }
        assert_eq!(text(&rga), shadow.into_iter().collect::<String>());
    }
}
