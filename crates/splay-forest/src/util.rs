//! Traversal, insertion and removal helpers.
//!
//! None of these functions splay; callers decide when to rebalance.

use std::cmp::Ordering;

use crate::types::{get_l, get_p, get_r, set_l, set_p, set_r, Links};

/// Leftmost node of the tree rooted at `root`.
pub fn first<L: Links<N>, N>(arena: &[N], root: Option<u32>) -> Option<u32> {
    let mut curr = root?;
    while let Some(l) = get_l::<L, N>(arena, curr) {
        curr = l;
    }
    Some(curr)
}

/// Rightmost node of the tree rooted at `root`.
pub fn last<L: Links<N>, N>(arena: &[N], root: Option<u32>) -> Option<u32> {
    let mut curr = root?;
    while let Some(r) = get_r::<L, N>(arena, curr) {
        curr = r;
    }
    Some(curr)
}

/// In-order successor of `node`.
pub fn next<L: Links<N>, N>(arena: &[N], node: u32) -> Option<u32> {
    if let Some(r) = get_r::<L, N>(arena, node) {
        return first::<L, N>(arena, Some(r));
    }
    let mut curr = node;
    let mut p = get_p::<L, N>(arena, curr);
    while let Some(parent) = p {
        if get_l::<L, N>(arena, parent) == Some(curr) {
            return Some(parent);
        }
        curr = parent;
        p = get_p::<L, N>(arena, curr);
    }
    None
}

/// In-order predecessor of `node`.
pub fn prev<L: Links<N>, N>(arena: &[N], node: u32) -> Option<u32> {
    if let Some(l) = get_l::<L, N>(arena, node) {
        return last::<L, N>(arena, Some(l));
    }
    let mut curr = node;
    let mut p = get_p::<L, N>(arena, curr);
    while let Some(parent) = p {
        if get_r::<L, N>(arena, parent) == Some(curr) {
            return Some(parent);
        }
        curr = parent;
        p = get_p::<L, N>(arena, curr);
    }
    None
}

/// Refreshes aggregates from `node` up to the root.
pub fn update_path<L: Links<N>, N>(arena: &mut [N], node: u32) {
    let mut curr = Some(node);
    while let Some(idx) = curr {
        L::update(arena, idx);
        curr = get_p::<L, N>(arena, idx);
    }
}

/// Links the detached `node` in as the in-order successor of `after`.
pub fn insert_right<L: Links<N>, N>(arena: &mut [N], node: u32, after: u32) {
    match get_r::<L, N>(arena, after) {
        None => {
            set_r::<L, N>(arena, after, Some(node));
            set_p::<L, N>(arena, node, Some(after));
        }
        Some(r) => {
            let mut m = r;
            while let Some(l) = get_l::<L, N>(arena, m) {
                m = l;
            }
            set_l::<L, N>(arena, m, Some(node));
            set_p::<L, N>(arena, node, Some(m));
        }
    }
    update_path::<L, N>(arena, node);
}

/// Links the detached `node` in as the in-order predecessor of `before`.
pub fn insert_left<L: Links<N>, N>(arena: &mut [N], node: u32, before: u32) {
    match get_l::<L, N>(arena, before) {
        None => {
            set_l::<L, N>(arena, before, Some(node));
            set_p::<L, N>(arena, node, Some(before));
        }
        Some(l) => {
            let mut m = l;
            while let Some(r) = get_r::<L, N>(arena, m) {
                m = r;
            }
            set_r::<L, N>(arena, m, Some(node));
            set_p::<L, N>(arena, node, Some(m));
        }
    }
    update_path::<L, N>(arena, node);
}

/// Inserts the detached `node` into a binary search tree ordered by `cmp`
/// and returns the (possibly new) root. Equal keys go to the right.
pub fn insert<L, N, F>(arena: &mut [N], root: Option<u32>, node: u32, cmp: F) -> Option<u32>
where
    L: Links<N>,
    F: Fn(&N, &N) -> Ordering,
{
    let Some(mut curr) = root else {
        set_p::<L, N>(arena, node, None);
        L::update(arena, node);
        return Some(node);
    };
    loop {
        let ord = cmp(&arena[node as usize], &arena[curr as usize]);
        let child = if ord == Ordering::Less {
            get_l::<L, N>(arena, curr)
        } else {
            get_r::<L, N>(arena, curr)
        };
        match child {
            Some(c) => curr = c,
            None => {
                if ord == Ordering::Less {
                    set_l::<L, N>(arena, curr, Some(node));
                } else {
                    set_r::<L, N>(arena, curr, Some(node));
                }
                set_p::<L, N>(arena, node, Some(curr));
                update_path::<L, N>(arena, node);
                return root;
            }
        }
    }
}

/// Unlinks `node` from the tree and returns the new root. The node's own
/// links are cleared.
pub fn remove<L: Links<N>, N>(arena: &mut [N], root: Option<u32>, node: u32) -> Option<u32> {
    let p = get_p::<L, N>(arena, node);
    let l = get_l::<L, N>(arena, node);
    let r = get_r::<L, N>(arena, node);
    set_p::<L, N>(arena, node, None);
    set_l::<L, N>(arena, node, None);
    set_r::<L, N>(arena, node, None);

    let mut lowest = p;
    let replacement = match (l, r) {
        (None, None) => None,
        (Some(l), None) => Some(l),
        (None, Some(r)) => Some(r),
        (Some(l), Some(r)) => {
            let mut v = l;
            while let Some(vr) = get_r::<L, N>(arena, v) {
                v = vr;
            }
            if v != l {
                let vl = get_l::<L, N>(arena, v);
                let vp = get_p::<L, N>(arena, v);
                if let Some(vp) = vp {
                    set_r::<L, N>(arena, vp, vl);
                    if let Some(vl) = vl {
                        set_p::<L, N>(arena, vl, Some(vp));
                    }
                }
                set_l::<L, N>(arena, v, Some(l));
                set_p::<L, N>(arena, l, Some(v));
                lowest = vp;
            } else {
                lowest = Some(v);
            }
            set_r::<L, N>(arena, v, Some(r));
            set_p::<L, N>(arena, r, Some(v));
            Some(v)
        }
    };

    if let Some(rep) = replacement {
        set_p::<L, N>(arena, rep, p);
        if lowest.is_none() || lowest == p {
            lowest = Some(rep);
        }
    }
    let new_root = match p {
        Some(p) => {
            if get_l::<L, N>(arena, p) == Some(node) {
                set_l::<L, N>(arena, p, replacement);
            } else {
                set_r::<L, N>(arena, p, replacement);
            }
            root
        }
        None => replacement,
    };
    if let Some(lowest) = lowest {
        update_path::<L, N>(arena, lowest);
    }
    new_root
}
