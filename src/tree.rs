//! Bit arithmetic for the implicit tree overlaid on the slot array.
//!
//! Index `0` is the root and covers `[0, P)`, where `P` is the smallest power of
//! two that is `>= len`. Any other index `i` with lowest set bit `L` covers
//! `[i, i + L)`. The right child of a node at descent level `bit` is `pos + bit`;
//! the left child shares the node's own index.

/// Returns the largest descent bit for a pool of `len` slots.
///
/// This is half the smallest power of two `>= len`, or 0 when `len <= 1`.
pub(crate) fn tree_half(len: usize) -> usize {
    if len <= 1 {
        0
    } else {
        len.next_power_of_two() / 2
    }
}

/// Iterates from `index` up to the root, yielding every node whose subtree
/// contains `index`, starting with `index` itself.
///
/// Each step clears the lowest set bit, so `6` yields `6, 4, 0`.
pub(crate) fn path_to_root(index: usize) -> impl Iterator<Item = usize> {
    let mut next = Some(index);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current == 0 {
            None
        } else {
            Some(current & (current - 1))
        };
        Some(current)
    })
}

/// Returns the first descent level above a node reached at level `bit`.
///
/// A leaf sits at level 0, so its parent decision was taken at level 1.
pub(crate) fn parent_level(bit: usize) -> usize {
    if bit == 0 {
        1
    } else {
        bit << 1
    }
}
