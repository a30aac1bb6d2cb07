//! Zero-communication selections.
//!
//! Whenever the destination's owned set is a subset of the source's on
//! both axes, redistribution is a local strided copy: out of `[*,*]` into
//! anything, out of a half-replicated scheme into its elementwise
//! refinement, or onto the aligned vector scheme on the same axis.

use num_traits::Zero;

use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::Comm;

use super::pack;
use super::{check_blocks_strict, check_same_grid, col_map, direct_aligned, row_map, runs_at};

/// Select this rank's share of `dst` out of the locally available part of
/// `src`, without communicating. Fails unless the placement pair is one
/// where the destination's entries are locally available by construction.
pub fn filter<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: Clone + Send + Sync + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    if !super::filter_route(src.pair(), dst.pair()) {
        return Err(GmError::Configuration(format!(
            "{} does not locally cover {}",
            src.pair(),
            dst.pair()
        )));
    }
    check_blocks_strict(src, dst)?;
    if !direct_aligned(src, dst) {
        return Err(GmError::Configuration(format!(
            "alignments ({},{}) -> ({},{}) leave the destination uncovered",
            src.col_align(),
            src.row_align(),
            dst.col_align(),
            dst.row_align()
        )));
    }
    dst.resize(src.height(), src.width())?;
    filter_local(src, dst)
}

/// The copy itself. Callers guarantee the subset property.
pub(crate) fn filter_local<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: Clone + Send + Sync,
    C: Comm,
{
    debug_assert_eq!((src.height(), src.width()), (dst.height(), dst.width()));
    let grid = src.grid();
    let (dcol, _drow) = runs_at(dst, grid.row(), grid.col());
    let dst_width = dst.local_width();
    if dst.local_height() == 0 || dst_width == 0 {
        return Ok(());
    }
    let (sc, sr) = (col_map(src), row_map(src));
    let (dc, dr) = (col_map(dst), row_map(dst));
    let src_local = src.local();
    let (src_ldim, dst_ldim) = (src_local.ldim(), dst.local().ldim());
    pack::copy_covered(
        src_local.as_slice(),
        src_ldim,
        sc,
        sr,
        dst.local_mut().as_mut_slice()?,
        dst_ldim,
        dc,
        dr,
        &dcol,
        dst_width,
    );
    Ok(())
}
