//! Splay rotations, generic over the link set.
//!
//! Naming follows the classic splay literature: `r_splay`/`l_splay` are the
//! single (zig) rotations, `ll_splay`/`rr_splay` the zig-zig and
//! `lr_splay`/`rl_splay` the zig-zag double rotations. Every rotation refreshes
//! the aggregates of the nodes it moved, lowest first.

use crate::types::{get_l, get_p, get_r, set_l, set_p, set_r, Links};

/// Promotes `c2` over the root `c1`, where `c2` is the left child of `c1`.
///
/// ```text
///   c1           c2
///  /      →        \
/// c2               c1
///   \             /
///    b           b
/// ```
pub fn r_splay<L: Links<N>, N>(arena: &mut [N], c2: u32, c1: u32) {
    let b = get_r::<L, N>(arena, c2);
    set_p::<L, N>(arena, c2, None);
    set_r::<L, N>(arena, c2, Some(c1));
    set_p::<L, N>(arena, c1, Some(c2));
    set_l::<L, N>(arena, c1, b);
    if let Some(b) = b {
        set_p::<L, N>(arena, b, Some(c1));
    }
    L::update(arena, c1);
    L::update(arena, c2);
}

/// Promotes `c2` over the root `c1`, where `c2` is the right child of `c1`.
pub fn l_splay<L: Links<N>, N>(arena: &mut [N], c2: u32, c1: u32) {
    let b = get_l::<L, N>(arena, c2);
    set_p::<L, N>(arena, c2, None);
    set_l::<L, N>(arena, c2, Some(c1));
    set_p::<L, N>(arena, c1, Some(c2));
    set_r::<L, N>(arena, c1, b);
    if let Some(b) = b {
        set_p::<L, N>(arena, b, Some(c1));
    }
    L::update(arena, c1);
    L::update(arena, c2);
}

/// Zig-zig: `c3` is the right child of `c2`, which is the right child of `c1`.
pub fn rr_splay<L: Links<N>, N>(
    arena: &mut [N],
    root: Option<u32>,
    c3: u32,
    c2: u32,
    c1: u32,
) -> Option<u32> {
    let b = get_l::<L, N>(arena, c2);
    let c = get_l::<L, N>(arena, c3);
    let p = get_p::<L, N>(arena, c1);
    set_p::<L, N>(arena, c3, p);
    set_l::<L, N>(arena, c3, Some(c2));
    set_p::<L, N>(arena, c2, Some(c3));
    set_l::<L, N>(arena, c2, Some(c1));
    set_r::<L, N>(arena, c2, c);
    set_p::<L, N>(arena, c1, Some(c2));
    set_r::<L, N>(arena, c1, b);
    if let Some(b) = b {
        set_p::<L, N>(arena, b, Some(c1));
    }
    if let Some(c) = c {
        set_p::<L, N>(arena, c, Some(c2));
    }
    L::update(arena, c1);
    L::update(arena, c2);
    L::update(arena, c3);
    update_parent::<L, N>(arena, root, p, c1, c3)
}

/// Zig-zig: `c3` is the left child of `c2`, which is the left child of `c1`.
pub fn ll_splay<L: Links<N>, N>(
    arena: &mut [N],
    root: Option<u32>,
    c3: u32,
    c2: u32,
    c1: u32,
) -> Option<u32> {
    let b = get_r::<L, N>(arena, c2);
    let c = get_r::<L, N>(arena, c3);
    let p = get_p::<L, N>(arena, c1);
    set_p::<L, N>(arena, c3, p);
    set_r::<L, N>(arena, c3, Some(c2));
    set_p::<L, N>(arena, c2, Some(c3));
    set_l::<L, N>(arena, c2, c);
    set_r::<L, N>(arena, c2, Some(c1));
    set_p::<L, N>(arena, c1, Some(c2));
    set_l::<L, N>(arena, c1, b);
    if let Some(b) = b {
        set_p::<L, N>(arena, b, Some(c1));
    }
    if let Some(c) = c {
        set_p::<L, N>(arena, c, Some(c2));
    }
    L::update(arena, c1);
    L::update(arena, c2);
    L::update(arena, c3);
    update_parent::<L, N>(arena, root, p, c1, c3)
}

/// Zig-zag: `c3` is the right child of `c2`, which is the left child of `c1`.
pub fn lr_splay<L: Links<N>, N>(
    arena: &mut [N],
    root: Option<u32>,
    c3: u32,
    c2: u32,
    c1: u32,
) -> Option<u32> {
    let c = get_l::<L, N>(arena, c3);
    let d = get_r::<L, N>(arena, c3);
    let p = get_p::<L, N>(arena, c1);
    set_p::<L, N>(arena, c3, p);
    set_l::<L, N>(arena, c3, Some(c2));
    set_r::<L, N>(arena, c3, Some(c1));
    set_p::<L, N>(arena, c2, Some(c3));
    set_r::<L, N>(arena, c2, c);
    set_p::<L, N>(arena, c1, Some(c3));
    set_l::<L, N>(arena, c1, d);
    if let Some(c) = c {
        set_p::<L, N>(arena, c, Some(c2));
    }
    if let Some(d) = d {
        set_p::<L, N>(arena, d, Some(c1));
    }
    L::update(arena, c1);
    L::update(arena, c2);
    L::update(arena, c3);
    update_parent::<L, N>(arena, root, p, c1, c3)
}

/// Zig-zag: `c3` is the left child of `c2`, which is the right child of `c1`.
pub fn rl_splay<L: Links<N>, N>(
    arena: &mut [N],
    root: Option<u32>,
    c3: u32,
    c2: u32,
    c1: u32,
) -> Option<u32> {
    let c = get_r::<L, N>(arena, c3);
    let d = get_l::<L, N>(arena, c3);
    let p = get_p::<L, N>(arena, c1);
    set_p::<L, N>(arena, c3, p);
    set_l::<L, N>(arena, c3, Some(c1));
    set_r::<L, N>(arena, c3, Some(c2));
    set_p::<L, N>(arena, c2, Some(c3));
    set_l::<L, N>(arena, c2, c);
    set_p::<L, N>(arena, c1, Some(c3));
    set_r::<L, N>(arena, c1, d);
    if let Some(c) = c {
        set_p::<L, N>(arena, c, Some(c2));
    }
    if let Some(d) = d {
        set_p::<L, N>(arena, d, Some(c1));
    }
    L::update(arena, c1);
    L::update(arena, c2);
    L::update(arena, c3);
    update_parent::<L, N>(arena, root, p, c1, c3)
}

/// Splays `node` all the way to the root and returns the new root.
pub fn splay<L: Links<N>, N>(arena: &mut [N], root: Option<u32>, node: u32) -> Option<u32> {
    let mut root = root;
    while let Some(p) = get_p::<L, N>(arena, node) {
        let is_left = get_l::<L, N>(arena, p) == Some(node);
        root = match get_p::<L, N>(arena, p) {
            Some(pp) => {
                let parent_is_left = get_l::<L, N>(arena, pp) == Some(p);
                match (parent_is_left, is_left) {
                    (true, true) => ll_splay::<L, N>(arena, root, node, p, pp),
                    (true, false) => lr_splay::<L, N>(arena, root, node, p, pp),
                    (false, true) => rl_splay::<L, N>(arena, root, node, p, pp),
                    (false, false) => rr_splay::<L, N>(arena, root, node, p, pp),
                }
            }
            None => {
                if is_left {
                    r_splay::<L, N>(arena, node, p);
                } else {
                    l_splay::<L, N>(arena, node, p);
                }
                Some(node)
            }
        };
    }
    root
}

/// Wires `c3`, which now occupies the former slot of `c1`, into `c1`'s old
/// parent `p`.
fn update_parent<L: Links<N>, N>(
    arena: &mut [N],
    root: Option<u32>,
    p: Option<u32>,
    c1: u32,
    c3: u32,
) -> Option<u32> {
    match p {
        Some(p) => {
            if get_l::<L, N>(arena, p) == Some(c1) {
                set_l::<L, N>(arena, p, Some(c3));
            } else {
                set_r::<L, N>(arena, p, Some(c3));
            }
            root
        }
        None => Some(c3),
    }
}
