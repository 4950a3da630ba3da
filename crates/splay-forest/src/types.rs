//! Link-set abstraction.
//!
//! A type implementing [`Links<N>`] is a zero-sized marker naming one tree a
//! node of type `N` belongs to. The same node type can implement several
//! link sets, e.g. `ByPos` for `p`/`l`/`r` and `ById` for `p2`/`l2`/`r2`.

/// Accessors for one set of tree links stored inside `N`.
pub trait Links<N> {
    fn p(node: &N) -> Option<u32>;
    fn l(node: &N) -> Option<u32>;
    fn r(node: &N) -> Option<u32>;
    fn set_p(node: &mut N, v: Option<u32>);
    fn set_l(node: &mut N, v: Option<u32>);
    fn set_r(node: &mut N, v: Option<u32>);

    /// Recomputes the subtree aggregate of `idx` from its own payload and its
    /// children. Called bottom-up after every structural change.
    #[inline]
    fn update(_arena: &mut [N], _idx: u32) {}
}

#[inline]
pub(crate) fn get_p<L: Links<N>, N>(arena: &[N], idx: u32) -> Option<u32> {
    L::p(&arena[idx as usize])
}

#[inline]
pub(crate) fn get_l<L: Links<N>, N>(arena: &[N], idx: u32) -> Option<u32> {
    L::l(&arena[idx as usize])
}

#[inline]
pub(crate) fn get_r<L: Links<N>, N>(arena: &[N], idx: u32) -> Option<u32> {
    L::r(&arena[idx as usize])
}

#[inline]
pub(crate) fn set_p<L: Links<N>, N>(arena: &mut [N], idx: u32, v: Option<u32>) {
    L::set_p(&mut arena[idx as usize], v);
}

#[inline]
pub(crate) fn set_l<L: Links<N>, N>(arena: &mut [N], idx: u32, v: Option<u32>) {
    L::set_l(&mut arena[idx as usize], v);
}

#[inline]
pub(crate) fn set_r<L: Links<N>, N>(arena: &mut [N], idx: u32, v: Option<u32>) {
    L::set_r(&mut arena[idx as usize], v);
}
