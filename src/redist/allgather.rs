//! All-gather redistributions: a distributed axis becomes replicated.
//!
//! One engine serves the whole family. Every member of the chosen scope
//! contributes its local patch; every member reconstructs the gathered
//! region by unpacking each contributor's patch through its own placement
//! metadata. Replicated sources are gated down to one canonical copy so
//! totals come out right whatever the scheme.

use num_traits::Zero;

use crate::dist::DistPair;
use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, patch_count};
use super::{
    canonical_contributor, check_blocks_strict, check_same_grid, col_map, direct_aligned, row_map,
    runs_at, CommScope,
};

/// Replicate a distributed axis: onto `[*,*]` from any scheme, or the
/// partial gathers that lift one axis of an elementwise or vector scheme.
/// Fails on pairs outside the all-gather family.
pub fn replicate<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    let scope = if dst.pair() == DistPair::STAR_STAR && src.pair() != DistPair::CIRC_CIRC {
        CommScope::Vc
    } else {
        match super::allgather_route(src.pair(), dst.pair()) {
            Some(scope) => scope,
            None => {
                return Err(GmError::Configuration(format!(
                    "{} -> {} is not an all-gather",
                    src.pair(),
                    dst.pair()
                )));
            }
        }
    };
    check_blocks_strict(src, dst)?;
    if !direct_aligned(src, dst) {
        return Err(GmError::Configuration(format!(
            "alignments ({},{}) -> ({},{}) do not line up for an all-gather",
            src.col_align(),
            src.row_align(),
            dst.col_align(),
            dst.row_align()
        )));
    }
    dst.resize(src.height(), src.width())?;
    allgather_scope(src, dst, scope)
}

pub(crate) fn allgather_scope<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
    scope: CommScope,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    let grid = src.grid();
    let comm = scope.comm(grid);
    let n = comm.size();
    let me = comm.rank();

    let mut counts = vec![0usize; n];
    let mut member_runs = Vec::with_capacity(n);
    for m in 0..n {
        let (mi, mj) = scope.member_coords(grid, m);
        let runs = if canonical_contributor(src.pair(), mi, mj) {
            runs_at(src, mi, mj)
        } else {
            (Vec::new(), Vec::new())
        };
        counts[m] = patch_count(&runs.0, &runs.1);
        member_runs.push(runs);
    }

    let mut send = Vec::with_capacity(counts[me]);
    if counts[me] > 0 {
        pack::pack_patch(
            src.local().as_slice(),
            src.local().ldim(),
            col_map(src),
            row_map(src),
            &member_runs[me].0,
            &member_runs[me].1,
            &mut send,
        );
    }

    let total = counts.iter().sum();
    let mut recv = vec![T::zero(); total];
    comm.all_gather_varcount(&send, &counts, &mut recv);

    if dst.local_height() == 0 || dst.local_width() == 0 {
        return Ok(());
    }
    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let buf = dst.local_mut().as_mut_slice()?;
    let mut at = 0;
    for (m, (crs, rrs)) in member_runs.iter().enumerate() {
        if counts[m] == 0 {
            continue;
        }
        at += pack::unpack_patch(buf, dld, dc, dr, crs, rrs, &recv[at..at + counts[m]]);
    }
    debug_assert_eq!(at, total);
    Ok(())
}
