//! Buffer packing shared by every redistribution algorithm.
//!
//! All transfers are described the same way: per axis, the sorted disjoint
//! `(global_start, len)` runs a rank owns, and the intersection of a sender's
//! runs with a receiver's runs. Because each run lies inside a single block
//! on its own side, every intersected segment is contiguous in both local
//! buffers, so packing is a sequence of slice copies whatever the block
//! sizes involved.
//!
//! Packed order is canonical: row-axis segments ascending, one matrix column
//! at a time, column-axis segments ascending within it. Sender and receiver
//! both derive the enumeration from shared metadata, so no shapes travel
//! with the data.

use std::ops::{AddAssign, Mul};

use crate::dist::cyclic;

/// Placement of one axis on this rank: enough to map globals to locals.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AxisMap {
    pub shift: usize,
    pub block: usize,
    pub stride: usize,
}

impl AxisMap {
    pub(crate) fn local(&self, global: usize) -> usize {
        cyclic::global_to_local(global, self.shift, self.block, self.stride)
    }

    pub(crate) fn global(&self, local: usize) -> usize {
        cyclic::local_to_global(local, self.shift, self.block, self.stride)
    }
}

/// Intersection of two sorted disjoint run lists.
pub(crate) fn intersect_runs(
    a: impl IntoIterator<Item = (usize, usize)>,
    b: impl IntoIterator<Item = (usize, usize)>,
) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut a = a.into_iter().peekable();
    let mut b = b.into_iter().peekable();
    while let (Some(&(sa, la)), Some(&(sb, lb))) = (a.peek(), b.peek()) {
        let (ea, eb) = (sa + la, sb + lb);
        let s = sa.max(sb);
        let e = ea.min(eb);
        if s < e {
            out.push((s, e - s));
        }
        if ea <= eb {
            a.next();
        } else {
            b.next();
        }
    }
    out
}

pub(crate) fn runs_total(runs: &[(usize, usize)]) -> usize {
    runs.iter().map(|&(_, len)| len).sum()
}

/// Elements in the rectangle spanned by two axis run lists.
pub(crate) fn patch_count(col_runs: &[(usize, usize)], row_runs: &[(usize, usize)]) -> usize {
    runs_total(col_runs) * runs_total(row_runs)
}

/// Append the patch `col_runs x row_runs` of `src` to `out` in canonical
/// packed order.
pub(crate) fn pack_patch<T: Clone>(
    src: &[T],
    src_ldim: usize,
    src_col: AxisMap,
    src_row: AxisMap,
    col_runs: &[(usize, usize)],
    row_runs: &[(usize, usize)],
    out: &mut Vec<T>,
) {
    for &(gj, jlen) in row_runs {
        for jo in 0..jlen {
            let base = src_row.local(gj + jo) * src_ldim;
            for &(gi, ilen) in col_runs {
                let li = src_col.local(gi);
                out.extend_from_slice(&src[base + li..base + li + ilen]);
            }
        }
    }
}

/// Read a canonically packed patch out of `input` into `dst`; returns the
/// number of elements consumed so callers can walk a concatenated buffer.
pub(crate) fn unpack_patch<T: Clone>(
    dst: &mut [T],
    dst_ldim: usize,
    dst_col: AxisMap,
    dst_row: AxisMap,
    col_runs: &[(usize, usize)],
    row_runs: &[(usize, usize)],
    input: &[T],
) -> usize {
    let mut at = 0;
    for &(gj, jlen) in row_runs {
        for jo in 0..jlen {
            let base = dst_row.local(gj + jo) * dst_ldim;
            for &(gi, ilen) in col_runs {
                let li = dst_col.local(gi);
                dst[base + li..base + li + ilen].clone_from_slice(&input[at..at + ilen]);
                at += ilen;
            }
        }
    }
    at
}

/// Like [`unpack_patch`], but accumulate instead of overwrite: every
/// destination entry gains `alpha` times the packed value.
pub(crate) fn update_patch<T>(
    dst: &mut [T],
    dst_ldim: usize,
    dst_col: AxisMap,
    dst_row: AxisMap,
    col_runs: &[(usize, usize)],
    row_runs: &[(usize, usize)],
    alpha: T,
    input: &[T],
) -> usize
where
    T: Clone + AddAssign + Mul<Output = T>,
{
    let mut at = 0;
    for &(gj, jlen) in row_runs {
        for jo in 0..jlen {
            let base = dst_row.local(gj + jo) * dst_ldim;
            for &(gi, ilen) in col_runs {
                let li = dst_col.local(gi);
                let segment = &mut dst[base + li..base + li + ilen];
                for (slot, v) in segment.iter_mut().zip(&input[at..at + ilen]) {
                    *slot += alpha.clone() * v.clone();
                }
                at += ilen;
            }
        }
    }
    at
}

/// Copy every locally stored entry of the destination straight from the
/// source buffer on the same rank. Valid whenever the destination's owned
/// set is a subset of the source's, which holds for local copies and for
/// every filter out of a replicated axis.
#[allow(clippy::too_many_arguments)]
pub(crate) fn copy_covered<T: Clone + Send + Sync>(
    src: &[T],
    src_ldim: usize,
    src_col: AxisMap,
    src_row: AxisMap,
    dst: &mut [T],
    dst_ldim: usize,
    dst_col: AxisMap,
    dst_row: AxisMap,
    dst_col_runs: &[(usize, usize)],
    dst_width: usize,
) {
    let copy_column = |lj: usize, col: &mut [T]| {
        let base = src_row.local(dst_row.global(lj)) * src_ldim;
        for &(gi, ilen) in dst_col_runs {
            let (li_dst, li_src) = (dst_col.local(gi), src_col.local(gi));
            col[li_dst..li_dst + ilen].clone_from_slice(&src[base + li_src..base + li_src + ilen]);
        }
    };
    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        dst.par_chunks_mut(dst_ldim)
            .take(dst_width)
            .enumerate()
            .for_each(|(lj, col)| copy_column(lj, col));
    }
    #[cfg(not(feature = "rayon"))]
    for (lj, col) in dst.chunks_mut(dst_ldim).take(dst_width).enumerate() {
        copy_column(lj, col);
    }
}
