//! Transfers in and out of the single-owner scheme `[o,o]`.
//!
//! The root is addressed in column-major vector order, so all three
//! operations run over the vc communicator: a variable-count gather to
//! collect every rank's share, a variable-count scatter to deal shares
//! out, and a broadcast when the whole matrix is to end up replicated.

use num_traits::Zero;

use crate::dist::DistPair;
use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, patch_count};
use super::{canonical_contributor, check_same_grid, col_map, row_map, runs_at};

/// Collect the whole matrix onto `dst`'s root, which afterwards holds
/// every entry locally; all other ranks hold nothing.
pub fn gather_to_root<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    if dst.pair() != DistPair::CIRC_CIRC || src.pair() == DistPair::CIRC_CIRC {
        return Err(GmError::Configuration(format!(
            "gather-to-root moves a distributed matrix onto [o,o], got {} -> {}",
            src.pair(),
            dst.pair()
        )));
    }
    dst.resize(src.height(), src.width())?;
    gather_into(src, dst)
}

/// Deal the root's matrix out onto a distributed scheme.
pub fn scatter_from_root<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    if src.pair() != DistPair::CIRC_CIRC || dst.pair() == DistPair::CIRC_CIRC {
        return Err(GmError::Configuration(format!(
            "scatter-from-root deals [o,o] out onto a distributed scheme, got {} -> {}",
            src.pair(),
            dst.pair()
        )));
    }
    if !scatter_blocks_ok(dst) {
        return Err(GmError::UnimplementedPath(format!(
            "scatter from [o,o] onto blocked {}; route through [*,*] instead",
            dst.pair()
        )));
    }
    dst.resize(src.height(), src.width())?;
    scatter_into(src, dst)
}

pub(crate) fn scatter_blocks_ok<T, C: Comm>(dst: &DistMatrix<T, C>) -> bool {
    (dst.col_stride() == 1 || dst.col_block() == 1)
        && (dst.row_stride() == 1 || dst.row_block() == 1)
}

pub(crate) fn gather_into<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    let grid = src.grid();
    let comm = grid.vc_comm();
    let n = grid.size();
    let me = grid.vc_rank();
    let root = dst.root();

    let mut counts = vec![0usize; n];
    let mut member_runs = Vec::with_capacity(n);
    for k in 0..n {
        let (ki, kj) = grid.coords_of_vc(k);
        let runs = if canonical_contributor(src.pair(), ki, kj) {
            runs_at(src, ki, kj)
        } else {
            (Vec::new(), Vec::new())
        };
        counts[k] = patch_count(&runs.0, &runs.1);
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

    let total: usize = counts.iter().sum();
    let mut recv = if me == root { vec![T::zero(); total] } else { Vec::new() };
    comm.gather_varcount(&send, &counts, &mut recv, root);

    if me == root && total > 0 {
        let (dc, dr) = (col_map(dst), row_map(dst));
        let dld = dst.local().ldim();
        let buf = dst.local_mut().as_mut_slice()?;
        let mut at = 0;
        for (k, (crs, rrs)) in member_runs.iter().enumerate() {
            if counts[k] == 0 {
                continue;
            }
            at += pack::unpack_patch(buf, dld, dc, dr, crs, rrs, &recv[at..at + counts[k]]);
        }
        debug_assert_eq!(at, total);
    }
    Ok(())
}

pub(crate) fn scatter_into<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    let grid = src.grid();
    let comm = grid.vc_comm();
    let n = grid.size();
    let me = grid.vc_rank();
    let root = src.root();

    let mut counts = vec![0usize; n];
    let mut my_runs = (Vec::new(), Vec::new());
    let mut send = Vec::new();
    for k in 0..n {
        let (ki, kj) = grid.coords_of_vc(k);
        let (dcol, drow) = runs_at(dst, ki, kj);
        counts[k] = patch_count(&dcol, &drow);
        if me == root {
            pack::pack_patch(
                src.local().as_slice(),
                src.local().ldim(),
                col_map(src),
                row_map(src),
                &dcol,
                &drow,
                &mut send,
            );
        }
        if k == me {
            my_runs = (dcol, drow);
        }
    }

    let mut recv = vec![T::zero(); counts[me]];
    comm.scatter_varcount(&send, &counts, &mut recv, root);

    if counts[me] == 0 {
        return Ok(());
    }
    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let consumed = pack::unpack_patch(
        dst.local_mut().as_mut_slice()?,
        dld,
        dc,
        dr,
        &my_runs.0,
        &my_runs.1,
        &recv,
    );
    debug_assert_eq!(consumed, recv.len());
    Ok(())
}

/// `[o,o]` onto `[*,*]`: one broadcast of the root's dense block.
pub(crate) fn broadcast_replicate<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    debug_assert_eq!(dst.pair(), DistPair::STAR_STAR);
    debug_assert_eq!((src.height(), src.width()), (dst.height(), dst.width()));
    let grid = src.grid();
    let root = src.root();
    let me = grid.vc_rank();
    let count = src.height() * src.width();

    let mut buf;
    if me == root {
        let (scol, srow) = runs_at(src, grid.row(), grid.col());
        buf = Vec::with_capacity(count);
        pack::pack_patch(
            src.local().as_slice(),
            src.local().ldim(),
            col_map(src),
            row_map(src),
            &scol,
            &srow,
            &mut buf,
        );
    } else {
        buf = vec![T::zero(); count];
    }
    grid.vc_comm().broadcast_into(&mut buf, root);

    if count == 0 {
        return Ok(());
    }
    let (dcol, drow) = runs_at(dst, grid.row(), grid.col());
    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let consumed = pack::unpack_patch(
        dst.local_mut().as_mut_slice()?,
        dld,
        dc,
        dr,
        &dcol,
        &drow,
        &buf,
    );
    debug_assert_eq!(consumed, count);
    Ok(())
}
