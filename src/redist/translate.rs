//! Alignment moves within one distribution scheme.
//!
//! When only alignments (or the root) differ, every rank's payload has
//! exactly one destination rank and the whole transfer is a permutation:
//! each rank swaps its entire local block with one partner in a single
//! paired exchange over the column-major vector ordering.

use num_traits::Zero;

use crate::dist::{Dist, DistPair};
use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, patch_count};
use super::{check_blocks_strict, check_same_grid, col_map, row_map, runs_at};

/// Move `src` onto `dst`'s alignments (and root) without changing the
/// scheme. Fails on anything but a same-scheme pair.
pub fn translate<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    if src.pair() != dst.pair() {
        return Err(GmError::Configuration(format!(
            "translate keeps the scheme, got {} -> {}",
            src.pair(),
            dst.pair()
        )));
    }
    check_blocks_strict(src, dst)?;
    dst.resize(src.height(), src.width())?;
    translate_into(src, dst)
}

pub(crate) fn translate_into<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    if src.col_align() == dst.col_align()
        && src.row_align() == dst.row_align()
        && src.root() == dst.root()
    {
        return super::filter::filter_local(src, dst);
    }
    let grid = src.grid();
    let to = partner(src, dst, true);
    let from = partner(src, dst, false);

    let (scol, srow) = runs_at(src, grid.row(), grid.col());
    let mut send = Vec::with_capacity(patch_count(&scol, &srow));
    pack::pack_patch(
        src.local().as_slice(),
        src.local().ldim(),
        col_map(src),
        row_map(src),
        &scol,
        &srow,
        &mut send,
    );

    let (dcol, drow) = runs_at(dst, grid.row(), grid.col());
    let mut recv = vec![T::zero(); patch_count(&dcol, &drow)];
    // Every rank enters the exchange, self-partnered ones included; the
    // backends treat a send to self as a matched pair, and skipping would
    // leave the collective ragged on the threaded backend.
    grid.vc_comm().send_recv(&send, to, &mut recv, from);

    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let consumed = pack::unpack_patch(
        dst.local_mut().as_mut_slice()?,
        dld,
        dc,
        dr,
        &dcol,
        &drow,
        &recv,
    );
    debug_assert_eq!(consumed, recv.len());
    Ok(())
}

/// The vc rank this process exchanges with: where its source data lives
/// under the destination placement (`forward`), or whose source data it
/// will hold (`!forward`). Non-participants pair with themselves and move
/// nothing.
fn partner<T, C: Comm>(src: &DistMatrix<T, C>, dst: &DistMatrix<T, C>, forward: bool) -> usize {
    let grid = src.grid();
    let me = grid.vc_rank();
    let pair = src.pair();
    let delta = |sa: usize, da: usize, stride: usize| {
        if forward {
            (da + stride - sa) % stride
        } else {
            (sa + stride - da) % stride
        }
    };

    // Root moves pair the two roots off against each other, one full
    // payload against one empty one, so the exchange stays matched.
    if pair == DistPair::CIRC_CIRC {
        if me == src.root() {
            return dst.root();
        }
        if me == dst.root() {
            return src.root();
        }
        return me;
    }

    // A vector axis determines the partner outright.
    let vector = match (pair.col(), pair.row()) {
        (t @ (Dist::Vc | Dist::Vr), _) => Some((t, src.col_align(), dst.col_align())),
        (_, t @ (Dist::Vc | Dist::Vr)) => Some((t, src.row_align(), dst.row_align())),
        _ => None,
    };
    if let Some((tag, sa, da)) = vector {
        let p = grid.size();
        let pos = match tag {
            Dist::Vc => grid.vc_rank(),
            _ => grid.vr_rank(),
        };
        let partner_pos = (pos + delta(sa, da, p)) % p;
        return match tag {
            Dist::Vc => partner_pos,
            _ => {
                let (pi, pj) = grid.coords_of_vr(partner_pos);
                grid.vc_rank_of(pi, pj)
            }
        };
    }

    // A diagonal axis moves along the path, possibly onto another path.
    let diagonal = match (pair.col(), pair.row()) {
        (Dist::Md, _) => Some((src.col_align(), dst.col_align())),
        (_, Dist::Md) => Some((src.row_align(), dst.row_align())),
        _ => None,
    };
    if let Some((sa, da)) = diagonal {
        let my_path = grid.diag_path(grid.row(), grid.col());
        let l = grid.diag_length();
        let k = grid.diag_position(grid.row(), grid.col());
        let (src_path, dst_path) = (src.root(), dst.root());
        if src_path == dst_path {
            if my_path != src_path {
                return me;
            }
            let (pi, pj) = grid.diag_coords(src_path, (k + delta(sa, da, l)) % l);
            return grid.vc_rank_of(pi, pj);
        }
        // A path change pairs the two paths position against position,
        // each pair trading one full payload for one empty one.
        let (target_path, d) = if my_path == src_path {
            (dst_path, (da + l - sa) % l)
        } else if my_path == dst_path {
            (src_path, (sa + l - da) % l)
        } else {
            return me;
        };
        let (pi, pj) = grid.diag_coords(target_path, (k + d) % l);
        return grid.vc_rank_of(pi, pj);
    }

    // Elementwise axes shift grid coordinates independently.
    let (mut pi, mut pj) = (grid.row(), grid.col());
    let axes = [
        (pair.col(), src.col_align(), dst.col_align(), src.col_stride()),
        (pair.row(), src.row_align(), dst.row_align(), src.row_stride()),
    ];
    for (tag, sa, da, stride) in axes {
        match tag {
            Dist::Mc => pi = (pi + delta(sa, da, stride)) % grid.height(),
            Dist::Mr => pj = (pj + delta(sa, da, stride)) % grid.width(),
            _ => {}
        }
    }
    grid.vc_rank_of(pi, pj)
}
