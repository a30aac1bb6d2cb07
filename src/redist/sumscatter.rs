//! Summed redistributions out of partially replicated schemes.
//!
//! Unlike everything else in this module, these do not preserve content:
//! each destination entry is the sum of every replica of that entry held
//! across the reduction scope. The partner bookkeeping is the all-to-all
//! machinery's; the wire operation is a reduce-scatter. Two flavors share
//! it: [`sum_scatter`] overwrites the destination, [`sum_scatter_update`]
//! scales the folded sum and accumulates it onto what is already there.

use std::ops::{AddAssign, Mul};

use log::trace;
use num_traits::Zero;

use crate::dist::DistPair;
use crate::error::GmError;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use super::pack::{self, patch_count};
use super::{
    check_blocks_strict, check_same_grid, col_map, direct_aligned, row_map, runs_at, CommScope,
};

/// The scope whose replicas fold together, when the placement pair admits
/// a reduce-scatter at all.
fn reduction_scope(s: DistPair, d: DistPair) -> Option<CommScope> {
    use DistPair as P;
    match (s, d) {
        (P::MC_STAR, P::MC_MR) | (P::STAR_MC, P::MR_MC) => Some(CommScope::Row),
        (P::STAR_MR, P::MC_MR) | (P::MR_STAR, P::MR_MC) => Some(CommScope::Col),
        (P::STAR_STAR, P::MC_MR) | (P::STAR_STAR, P::MR_MC) => Some(CommScope::Vc),
        _ => None,
    }
}

/// Overwrite `dst` with the replica-sum of `src`. The source must be
/// replicated on every axis the destination distributes; preserved axes
/// must already be aligned, since silently translating summands would
/// hide a collective the caller did not ask for.
pub fn sum_scatter<T, C>(src: &DistMatrix<T, C>, dst: &mut DistMatrix<T, C>) -> Result<(), GmError>
where
    T: CommScalar + Zero + AddAssign,
    C: Comm,
{
    check_same_grid(src, dst)?;
    let scope = match reduction_scope(src.pair(), dst.pair()) {
        Some(scope) => scope,
        None => {
            return Err(GmError::Configuration(format!(
                "no sum-scatter from {} to {}",
                src.pair(),
                dst.pair()
            )));
        }
    };
    check_blocks_strict(src, dst)?;
    dst.adapt_alignment(&src.dist_data())?;
    if !direct_aligned(src, dst) {
        return Err(GmError::Configuration(format!(
            "sum-scatter needs aligned operands, got ({},{}) -> ({},{})",
            src.col_align(),
            src.row_align(),
            dst.col_align(),
            dst.row_align()
        )));
    }
    dst.resize(src.height(), src.width())?;
    if src.grid().size() == 1 {
        trace!("sum-scatter {} -> {}: single replica, local copy", src.pair(), dst.pair());
        return super::filter::filter_local(src, dst);
    }
    trace!("sum-scatter {} -> {} over {scope:?}", src.pair(), dst.pair());
    sum_scatter_scope(src, dst, scope)
}

/// Accumulate the scaled replica-sum of `src` onto `dst`: each destination
/// entry becomes `dst + alpha * sum(replicas)`. Placement rules are
/// [`sum_scatter`]'s, but the destination's contents survive, so its shape
/// must already match and neither its alignment nor its extents are
/// adapted.
pub fn sum_scatter_update<T, C>(
    alpha: T,
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
) -> Result<(), GmError>
where
    T: CommScalar + Zero + AddAssign + Mul<Output = T>,
    C: Comm,
{
    check_same_grid(src, dst)?;
    let scope = match reduction_scope(src.pair(), dst.pair()) {
        Some(scope) => scope,
        None => {
            return Err(GmError::Configuration(format!(
                "no sum-scatter from {} to {}",
                src.pair(),
                dst.pair()
            )));
        }
    };
    check_blocks_strict(src, dst)?;
    if (dst.height(), dst.width()) != (src.height(), src.width()) {
        return Err(GmError::DimensionMismatch(format!(
            "sum-scatter update onto a {} x {} matrix from a {} x {} source",
            dst.height(),
            dst.width(),
            src.height(),
            src.width()
        )));
    }
    if !direct_aligned(src, dst) {
        return Err(GmError::Configuration(format!(
            "sum-scatter needs aligned operands, got ({},{}) -> ({},{})",
            src.col_align(),
            src.row_align(),
            dst.col_align(),
            dst.row_align()
        )));
    }
    trace!("sum-scatter update {} -> {} over {scope:?}", src.pair(), dst.pair());
    sum_scatter_scope_update(alpha, src, dst, scope)
}

/// One packed segment per scope member, each covering that member's whole
/// destination share, plus this rank's own runs for the unpack side. The
/// aligned preserved axis guarantees every segment is locally available.
#[allow(clippy::type_complexity)]
fn pack_shares<T, C>(
    src: &DistMatrix<T, C>,
    dst: &DistMatrix<T, C>,
    scope: CommScope,
) -> (Vec<T>, Vec<usize>, (Vec<(usize, usize)>, Vec<(usize, usize)>))
where
    T: CommScalar,
    C: Comm,
{
    let grid = src.grid();
    let comm = scope.comm(grid);
    let n = comm.size();
    let me = comm.rank();

    let (sc, sr) = (col_map(src), row_map(src));
    let mut send = Vec::new();
    let mut counts = vec![0usize; n];
    let mut my_runs = (Vec::new(), Vec::new());
    for m in 0..n {
        let (mi, mj) = scope.member_coords(grid, m);
        let (dcol, drow) = runs_at(dst, mi, mj);
        counts[m] = patch_count(&dcol, &drow);
        pack::pack_patch(
            src.local().as_slice(),
            src.local().ldim(),
            sc,
            sr,
            &dcol,
            &drow,
            &mut send,
        );
        if m == me {
            my_runs = (dcol, drow);
        }
    }
    (send, counts, my_runs)
}

fn sum_scatter_scope<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
    scope: CommScope,
) -> Result<(), GmError>
where
    T: CommScalar + Zero + AddAssign,
    C: Comm,
{
    let comm = scope.comm(src.grid());
    let me = comm.rank();
    let (send, counts, my_runs) = pack_shares(src, dst, scope);

    let mut recv = vec![T::zero(); counts[me]];
    comm.reduce_scatter_sum(&send, &counts, &mut recv);

    if recv.is_empty() {
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

fn sum_scatter_scope_update<T, C>(
    alpha: T,
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
    scope: CommScope,
) -> Result<(), GmError>
where
    T: CommScalar + Zero + AddAssign + Mul<Output = T>,
    C: Comm,
{
    let comm = scope.comm(src.grid());
    let me = comm.rank();
    let (send, counts, my_runs) = pack_shares(src, dst, scope);

    let mut recv = vec![T::zero(); counts[me]];
    comm.reduce_scatter_sum(&send, &counts, &mut recv);

    if recv.is_empty() {
        return Ok(());
    }
    let (dc, dr) = (col_map(dst), row_map(dst));
    let dld = dst.local().ldim();
    let consumed = pack::update_patch(
        dst.local_mut().as_mut_slice()?,
        dld,
        dc,
        dr,
        &my_runs.0,
        &my_runs.1,
        alpha,
        &recv,
    );
    debug_assert_eq!(consumed, recv.len());
    Ok(())
}
