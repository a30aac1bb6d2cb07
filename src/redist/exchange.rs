//! Pairwise exchange between the two vector orderings.
//!
//! With block size 1 a vector axis position owns exactly one residue
//! class of global indices, so moving between column-major and row-major
//! vector order is a permutation of whole locals: each rank sends its
//! entire local block to the one rank owning the same residue class under
//! the destination ordering.

use num_traits::Zero;

use crate::dist::Dist;
use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, patch_count};
use super::{check_blocks_strict, check_same_grid, col_map, row_map, runs_at};

/// Swap a matrix between `[VC,*]` and `[VR,*]` (or `[*,VC]` and `[*,VR]`)
/// with one paired message per rank. Blocked vector layouts are not
/// exchanged directly; [`GmError::UnimplementedPath`] points callers at
/// the routed fallback.
pub fn exchange<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    if !super::exchange_route(src.pair(), dst.pair()) {
        return Err(GmError::Configuration(format!(
            "{} -> {} is not a vector exchange",
            src.pair(),
            dst.pair()
        )));
    }
    check_blocks_strict(src, dst)?;
    let vector_block = if matches!(src.pair().col(), Dist::Vc | Dist::Vr) {
        src.col_block()
    } else {
        src.row_block()
    };
    if vector_block != 1 {
        return Err(GmError::UnimplementedPath(format!(
            "{} -> {} with block size {vector_block}; route through [*,*] instead",
            src.pair(),
            dst.pair()
        )));
    }
    dst.resize(src.height(), src.width())?;
    exchange_into(src, dst)
}

pub(crate) fn exchange_into<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    let grid = src.grid();
    let p = grid.size();
    let col_axis = matches!(src.pair().col(), Dist::Vc | Dist::Vr);
    let (src_tag, dst_tag) = if col_axis {
        (src.pair().col(), dst.pair().col())
    } else {
        (src.pair().row(), dst.pair().row())
    };
    let (src_shift, dst_shift) = if col_axis {
        (src.col_shift(), dst.col_shift())
    } else {
        (src.row_shift(), dst.row_shift())
    };
    let (sa, da) = if col_axis {
        (src.col_align(), dst.col_align())
    } else {
        (src.row_align(), dst.row_align())
    };

    // My residue class lands on the destination position holding it; the
    // class I will hold comes from the source position holding it.
    let to = rank_of_position(grid, dst_tag, (src_shift + da) % p);
    let from = rank_of_position(grid, src_tag, (dst_shift + sa) % p);

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
    // Unconditional even for self-partners: the permutation has fixed
    // points, and a ragged entry would hang the threaded backend.
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

/// The vc rank sitting at `position` of a vector axis with tag `tag`.
fn rank_of_position<C: Comm>(grid: &crate::grid::Grid<C>, tag: Dist, position: usize) -> usize {
    match tag {
        Dist::Vc => position,
        _ => {
            let (pi, pj) = grid.coords_of_vr(position);
            grid.vc_rank_of(pi, pj)
        }
    }
}
