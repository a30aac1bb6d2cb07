//! All-to-all redistributions between an elementwise pair and the vector
//! scheme sharing its distributed axis.
//!
//! Within the right scope every rank both scatters and gathers: the
//! segment bound for member `m` is the intersection of this rank's owned
//! runs with `m`'s destination runs, and the segment expected from `m` is
//! the mirror intersection. Both sides enumerate the same intersections,
//! so the exchange carries no headers.

use num_traits::Zero;

use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, intersect_runs, patch_count};
use super::{check_blocks_strict, check_same_grid, col_map, direct_aligned, row_map, runs_at, CommScope};

/// Exchange one distributed axis for the other within an elementwise
/// scheme, through the vector scheme that shares the kept axis. Fails on
/// pairs outside the all-to-all family.
pub fn transpose_axes<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    let scope = match super::alltoall_route(src.pair(), dst.pair()) {
        Some(scope) => scope,
        None => {
            return Err(GmError::Configuration(format!(
                "{} -> {} is not an all-to-all",
                src.pair(),
                dst.pair()
            )));
        }
    };
    check_blocks_strict(src, dst)?;
    if !direct_aligned(src, dst) {
        return Err(GmError::Configuration(format!(
            "alignments ({},{}) -> ({},{}) do not line up for an all-to-all",
            src.col_align(),
            src.row_align(),
            dst.col_align(),
            dst.row_align()
        )));
    }
    dst.resize(src.height(), src.width())?;
    transpose_scope(src, dst, scope)
}

pub(crate) fn transpose_scope<T, C>(
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

    let (my_scol, my_srow) = runs_at(src, grid.row(), grid.col());
    let (my_dcol, my_drow) = runs_at(dst, grid.row(), grid.col());
    let (sc, sr) = (col_map(src), row_map(src));

    let mut send = Vec::new();
    let mut send_counts = vec![0usize; n];
    let mut recv_counts = vec![0usize; n];
    let mut recv_segs = Vec::with_capacity(n);
    for m in 0..n {
        let (mi, mj) = scope.member_coords(grid, m);
        let (m_dcol, m_drow) = runs_at(dst, mi, mj);
        let out_cols = intersect_runs(my_scol.iter().copied(), m_dcol.iter().copied());
        let out_rows = intersect_runs(my_srow.iter().copied(), m_drow.iter().copied());
        send_counts[m] = patch_count(&out_cols, &out_rows);
        pack::pack_patch(
            src.local().as_slice(),
            src.local().ldim(),
            sc,
            sr,
            &out_cols,
            &out_rows,
            &mut send,
        );

        let (m_scol, m_srow) = runs_at(src, mi, mj);
        let in_cols = intersect_runs(m_scol.iter().copied(), my_dcol.iter().copied());
        let in_rows = intersect_runs(m_srow.iter().copied(), my_drow.iter().copied());
        recv_counts[m] = patch_count(&in_cols, &in_rows);
        recv_segs.push((in_cols, in_rows));
    }

    let total = recv_counts.iter().sum();
    let mut recv = vec![T::zero(); total];
    comm.all_to_all_varcount(&send, &send_counts, &mut recv, &recv_counts);

    if dst.local_height() == 0 || dst.local_width() == 0 {
        return Ok(());
    }
    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let buf = dst.local_mut().as_mut_slice()?;
    let mut at = 0;
    for (m, (crs, rrs)) in recv_segs.iter().enumerate() {
        if recv_counts[m] == 0 {
            continue;
        }
        at += pack::unpack_patch(buf, dld, dc, dr, crs, rrs, &recv[at..at + recv_counts[m]]);
    }
    debug_assert_eq!(at, total);
    Ok(())
}
