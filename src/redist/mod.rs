//! Movement of matrix entries between placements.
//!
//! [`redistribute`] is the general entry point: it picks the cheapest
//! algorithm for a source/destination placement pair and falls back to a
//! round trip through the fully replicated scheme when no direct algorithm
//! exists. The named operations ([`translate`], [`replicate`], [`filter`],
//! [`transpose_axes`], [`exchange`], [`sum_scatter`], [`sum_scatter_update`],
//! [`gather_to_root`], [`scatter_from_root`]) each validate strictly and
//! never reroute: they fail rather than silently do something more
//! expensive.
//!
//! All algorithms share one packing scheme (see [`pack`]), so blocked
//! layouts travel through the same code as element-cyclic ones.

pub(crate) mod pack;

mod allgather;
mod alltoall;
mod circ;
mod exchange;
mod filter;
mod sumscatter;
mod translate;

pub use allgather::replicate;
pub use alltoall::transpose_axes;
pub use circ::{gather_to_root, scatter_from_root};
pub use exchange::exchange;
pub use filter::filter;
pub use sumscatter::{sum_scatter, sum_scatter_update};
pub use translate::translate;

use log::trace;
use num_traits::Zero;

use crate::config::RedistOptions;
use crate::dist::cyclic::{self, owned_runs};
use crate::dist::{Dist, DistPair};
use crate::error::GmError;
use crate::grid::Grid;
use crate::matrix::DistMatrix;
use crate::parallel::{Comm, CommScalar};

use pack::AxisMap;

/// One of the grid's derived communicators, named so algorithms can state
/// which ranks they exchange with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommScope {
    /// Ranks sharing this process's grid row, ordered by grid column.
    Row,
    /// Ranks sharing this process's grid column, ordered by grid row.
    Col,
    /// The whole grid in column-major vector order.
    Vc,
}

impl CommScope {
    pub(crate) fn comm<'a, C: Comm>(self, grid: &'a Grid<C>) -> &'a C {
        match self {
            CommScope::Row => grid.row_comm(),
            CommScope::Col => grid.col_comm(),
            CommScope::Vc => grid.vc_comm(),
        }
    }

    /// Grid coordinates of member `member` of this scope, seen from the
    /// calling process.
    pub(crate) fn member_coords<C: Comm>(self, grid: &Grid<C>, member: usize) -> (usize, usize) {
        match self {
            CommScope::Row => (grid.row(), member),
            CommScope::Col => (member, grid.col()),
            CommScope::Vc => grid.coords_of_vc(member),
        }
    }
}

/// Position of the rank at `(row, col)` on an axis with tag `tag`, or
/// `None` when that rank holds none of the axis.
pub(crate) fn position_at<C: Comm>(
    grid: &Grid<C>,
    tag: Dist,
    root: usize,
    row: usize,
    col: usize,
) -> Option<usize> {
    match tag {
        Dist::Mc => Some(row),
        Dist::Mr => Some(col),
        Dist::Vc => Some(grid.vc_rank_of(row, col)),
        Dist::Vr => Some(grid.vr_rank_of(row, col)),
        Dist::Star => Some(0),
        Dist::Md => {
            if grid.diag_path(row, col) == root {
                Some(grid.diag_position(row, col))
            } else {
                None
            }
        }
        Dist::Circ => {
            if grid.vc_rank_of(row, col) == root {
                Some(0)
            } else {
                None
            }
        }
    }
}

/// The global index runs the rank at `(row, col)` owns under `m`'s
/// placement, per axis. Both lists are empty when that rank does not
/// participate.
pub(crate) fn runs_at<T, C: Comm>(
    m: &DistMatrix<T, C>,
    row: usize,
    col: usize,
) -> (Vec<(usize, usize)>, Vec<(usize, usize)>) {
    let grid = m.grid();
    let cpos = position_at(grid, m.pair().col(), m.root(), row, col);
    let rpos = position_at(grid, m.pair().row(), m.root(), row, col);
    match (cpos, rpos) {
        (Some(cp), Some(rp)) => {
            let cshift = cyclic::shift(cp, m.col_align(), m.col_stride());
            let rshift = cyclic::shift(rp, m.row_align(), m.row_stride());
            (
                owned_runs(m.height(), cshift, m.col_block(), m.col_stride()).collect(),
                owned_runs(m.width(), rshift, m.row_block(), m.row_stride()).collect(),
            )
        }
        _ => (Vec::new(), Vec::new()),
    }
}

pub(crate) fn col_map<T, C: Comm>(m: &DistMatrix<T, C>) -> AxisMap {
    AxisMap { shift: m.col_shift(), block: m.col_block(), stride: m.col_stride() }
}

pub(crate) fn row_map<T, C: Comm>(m: &DistMatrix<T, C>) -> AxisMap {
    AxisMap { shift: m.row_shift(), block: m.row_block(), stride: m.row_stride() }
}

/// Whether the rank at `(row, col)` is the one copy of its data that
/// collectives should read. Axes that do not consume a grid coordinate
/// leave replicas along it; the replica at coordinate 0 is canonical.
pub(crate) fn canonical_contributor(pair: DistPair, row: usize, col: usize) -> bool {
    let tags = [pair.col(), pair.row()];
    let uses_row = tags
        .iter()
        .any(|&t| matches!(t, Dist::Mc | Dist::Vc | Dist::Vr | Dist::Md | Dist::Circ));
    let uses_col = tags
        .iter()
        .any(|&t| matches!(t, Dist::Mr | Dist::Vc | Dist::Vr | Dist::Md | Dist::Circ));
    (uses_row || row == 0) && (uses_col || col == 0)
}

pub(crate) fn check_same_grid<T, C: Comm>(
    src: &DistMatrix<T, C>,
    dst: &DistMatrix<T, C>,
) -> Result<(), GmError> {
    if src.grid().id() != dst.grid().id() {
        return Err(GmError::Configuration(format!(
            "operands live on different grids (ids {} and {})",
            src.grid().id(),
            dst.grid().id()
        )));
    }
    Ok(())
}

/// Block sizes only have to agree on axes where both sides actually
/// stride; a replicated or root-held axis stores contiguously whatever
/// its nominal block.
pub(crate) fn blocks_compatible<T, C: Comm>(
    src: &DistMatrix<T, C>,
    dst: &DistMatrix<T, C>,
) -> bool {
    let (h, w) = (src.grid().height(), src.grid().width());
    let axis = |st: Dist, sb: usize, dt: Dist, db: usize| {
        st.stride(h, w) == 1 || dt.stride(h, w) == 1 || sb == db
    };
    axis(src.pair().col(), src.col_block(), dst.pair().col(), dst.col_block())
        && axis(src.pair().row(), src.row_block(), dst.pair().row(), dst.row_block())
}

pub(crate) fn check_blocks_strict<T, C: Comm>(
    src: &DistMatrix<T, C>,
    dst: &DistMatrix<T, C>,
) -> Result<(), GmError> {
    if !blocks_compatible(src, dst) {
        return Err(GmError::Configuration(format!(
            "block sizes differ: ({},{}) against ({},{})",
            src.col_block(),
            src.row_block(),
            dst.col_block(),
            dst.row_block()
        )));
    }
    Ok(())
}

/// Whether a direct algorithm can carry `src`'s axis onto `dst`'s without
/// an alignment hop. Axes that appear or disappear (`Star` on either side)
/// are unconstrained; preserved axes must line up, and a vector axis lines
/// up with its elementwise counterpart modulo the elementwise stride.
pub(crate) fn axis_compatible<C: Comm>(
    src_tag: Dist,
    src_align: usize,
    dst_tag: Dist,
    dst_align: usize,
    grid: &Grid<C>,
) -> bool {
    match (src_tag, dst_tag) {
        (Dist::Star, _) | (_, Dist::Star) => true,
        (s, d) if s == d => src_align == dst_align,
        (Dist::Vc, Dist::Mc) => src_align % grid.height() == dst_align,
        (Dist::Vr, Dist::Mr) => src_align % grid.width() == dst_align,
        (Dist::Mc, Dist::Vc) => dst_align % grid.height() == src_align,
        (Dist::Mr, Dist::Vr) => dst_align % grid.width() == src_align,
        _ => false,
    }
}

fn required_src_align<C: Comm>(
    src_tag: Dist,
    src_align: usize,
    dst_tag: Dist,
    dst_align: usize,
    grid: &Grid<C>,
) -> usize {
    match (src_tag, dst_tag) {
        (Dist::Star, _) | (_, Dist::Star) => src_align,
        (s, d) if s == d => dst_align,
        (Dist::Vc, Dist::Mc) | (Dist::Vr, Dist::Mr) => dst_align,
        (Dist::Mc, Dist::Vc) => dst_align % grid.height(),
        (Dist::Mr, Dist::Vr) => dst_align % grid.width(),
        _ => src_align,
    }
}

pub(crate) fn direct_aligned<T, C: Comm>(src: &DistMatrix<T, C>, dst: &DistMatrix<T, C>) -> bool {
    let grid = src.grid();
    axis_compatible(src.pair().col(), src.col_align(), dst.pair().col(), dst.col_align(), grid)
        && axis_compatible(src.pair().row(), src.row_align(), dst.pair().row(), dst.row_align(), grid)
}

/// Copy of `src` under the same scheme, re-aligned so a direct algorithm
/// into `dst` applies.
fn realigned<T, C>(src: &DistMatrix<T, C>, dst: &DistMatrix<T, C>) -> Result<DistMatrix<T, C>, GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    let grid = src.grid();
    let ca = required_src_align(src.pair().col(), src.col_align(), dst.pair().col(), dst.col_align(), grid);
    let ra = required_src_align(src.pair().row(), src.row_align(), dst.pair().row(), dst.row_align(), grid);
    trace!("pre-translating {} to alignment ({ca},{ra})", src.pair());
    let mut tmp = DistMatrix::with_shape(grid.clone(), src.pair(), src.height(), src.width());
    tmp.set_block_sizes(src.col_block(), src.row_block())?;
    tmp.set_root(src.root())?;
    tmp.align(ca, ra)?;
    translate::translate_into(src, &mut tmp)?;
    Ok(tmp)
}

fn allgather_route(s: DistPair, d: DistPair) -> Option<CommScope> {
    use DistPair as P;
    match (s, d) {
        (P::MC_MR, P::MC_STAR)
        | (P::MR_MC, P::STAR_MC)
        | (P::VC_STAR, P::MC_STAR)
        | (P::STAR_VC, P::STAR_MC) => Some(CommScope::Row),
        (P::MC_MR, P::STAR_MR)
        | (P::MR_MC, P::MR_STAR)
        | (P::VR_STAR, P::MR_STAR)
        | (P::STAR_VR, P::STAR_MR) => Some(CommScope::Col),
        _ => None,
    }
}

fn filter_route(s: DistPair, d: DistPair) -> bool {
    use DistPair as P;
    s == P::STAR_STAR
        || matches!(
            (s, d),
            (P::MC_STAR, P::MC_MR)
                | (P::STAR_MR, P::MC_MR)
                | (P::MR_STAR, P::MR_MC)
                | (P::STAR_MC, P::MR_MC)
                | (P::MC_STAR, P::VC_STAR)
                | (P::STAR_MR, P::STAR_VR)
                | (P::MR_STAR, P::VR_STAR)
                | (P::STAR_MC, P::STAR_VC)
        )
}

fn alltoall_route(s: DistPair, d: DistPair) -> Option<CommScope> {
    use DistPair as P;
    match (s, d) {
        (P::MC_MR, P::VC_STAR)
        | (P::VC_STAR, P::MC_MR)
        | (P::MR_MC, P::STAR_VC)
        | (P::STAR_VC, P::MR_MC) => Some(CommScope::Row),
        (P::MC_MR, P::STAR_VR)
        | (P::STAR_VR, P::MC_MR)
        | (P::MR_MC, P::VR_STAR)
        | (P::VR_STAR, P::MR_MC) => Some(CommScope::Col),
        _ => None,
    }
}

fn exchange_route(s: DistPair, d: DistPair) -> bool {
    use DistPair as P;
    matches!(
        (s, d),
        (P::VC_STAR, P::VR_STAR)
            | (P::VR_STAR, P::VC_STAR)
            | (P::STAR_VC, P::STAR_VR)
            | (P::STAR_VR, P::STAR_VC)
    )
}

/// Overwrite `dst` with the global contents of `src`, choosing an
/// algorithm from the placement pair.
///
/// `dst` keeps its scheme; unconstrained alignments adapt to `src` so the
/// transfer needs no extra hop, constrained ones are honored as they are.
/// On a single-rank grid every path degenerates to a local copy and no
/// collective is issued. Placement pairs with no direct algorithm round
/// trip through `[*,*]` unless `options` forbids it, in which case
/// [`GmError::UnimplementedPath`] is returned.
pub fn redistribute<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
    options: RedistOptions,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    check_same_grid(src, dst)?;
    dst.adapt_alignment(&src.dist_data())?;
    dst.resize(src.height(), src.width())?;

    let (s, d) = (src.pair(), dst.pair());
    let same_placement = s == d
        && src.col_align() == dst.col_align()
        && src.row_align() == dst.row_align()
        && src.root() == dst.root()
        && src.col_block() == dst.col_block()
        && src.row_block() == dst.row_block();
    if same_placement || src.grid().size() == 1 {
        trace!("redistribute {s} -> {d}: local copy");
        return filter::filter_local(src, dst);
    }
    if !blocks_compatible(src, dst) {
        return route_via_replicated(src, dst, options, "block sizes differ");
    }
    if s == d {
        trace!("redistribute {s} -> {d}: translate");
        return translate::translate_into(src, dst);
    }
    if d == DistPair::STAR_STAR {
        if s == DistPair::CIRC_CIRC {
            trace!("redistribute {s} -> {d}: broadcast from root");
            return circ::broadcast_replicate(src, dst);
        }
        trace!("redistribute {s} -> {d}: total all-gather");
        return allgather::allgather_scope(src, dst, CommScope::Vc);
    }
    if s == DistPair::STAR_STAR {
        trace!("redistribute {s} -> {d}: local filter");
        return filter::filter_local(src, dst);
    }
    if s == DistPair::CIRC_CIRC {
        if !circ::scatter_blocks_ok(dst) {
            return route_via_replicated(src, dst, options, "blocked scatter from root");
        }
        trace!("redistribute {s} -> {d}: scatter from root");
        return circ::scatter_into(src, dst);
    }
    if d == DistPair::CIRC_CIRC {
        trace!("redistribute {s} -> {d}: gather to root");
        return circ::gather_into(src, dst);
    }
    if let Some(scope) = allgather_route(s, d) {
        trace!("redistribute {s} -> {d}: all-gather over {scope:?}");
        let tmp;
        let a = if direct_aligned(src, dst) {
            src
        } else {
            tmp = realigned(src, dst)?;
            &tmp
        };
        return allgather::allgather_scope(a, dst, scope);
    }
    if filter_route(s, d) {
        trace!("redistribute {s} -> {d}: local filter");
        let tmp;
        let a = if direct_aligned(src, dst) {
            src
        } else {
            tmp = realigned(src, dst)?;
            &tmp
        };
        return filter::filter_local(a, dst);
    }
    if let Some(scope) = alltoall_route(s, d) {
        trace!("redistribute {s} -> {d}: all-to-all over {scope:?}");
        let tmp;
        let a = if direct_aligned(src, dst) {
            src
        } else {
            tmp = realigned(src, dst)?;
            &tmp
        };
        return alltoall::transpose_scope(a, dst, scope);
    }
    if exchange_route(s, d) {
        let vector_block = if matches!(s.col(), Dist::Vc | Dist::Vr) {
            src.col_block()
        } else {
            src.row_block()
        };
        if vector_block != 1 {
            return route_via_replicated(src, dst, options, "blocked vector exchange");
        }
        trace!("redistribute {s} -> {d}: pairwise vector exchange");
        return exchange::exchange_into(src, dst);
    }
    route_via_replicated(src, dst, options, "no direct algorithm")
}

fn route_via_replicated<T, C>(
    src: &DistMatrix<T, C>,
    dst: &mut DistMatrix<T, C>,
    options: RedistOptions,
    why: &str,
) -> Result<(), GmError>
where
    T: CommScalar + Zero,
    C: Comm,
{
    if !options.allow_indirect {
        return Err(GmError::UnimplementedPath(format!(
            "{} -> {}: {why}, and indirect routing is disabled",
            src.pair(),
            dst.pair()
        )));
    }
    trace!("redistribute {} -> {} via [*,*]: {why}", src.pair(), dst.pair());
    let mut mid = DistMatrix::with_shape(
        src.grid().clone(),
        DistPair::STAR_STAR,
        src.height(),
        src.width(),
    );
    if src.pair() == DistPair::CIRC_CIRC {
        circ::broadcast_replicate(src, &mut mid)?;
    } else {
        allgather::allgather_scope(src, &mut mid, CommScope::Vc)?;
    }
    filter::filter_local(&mid, dst)
}
