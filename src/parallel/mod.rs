//! Communicator seam.
//!
//! [`Comm`] is the set of collective operations the redistribution engine
//! needs, implemented by [`LocalComm`] (an in-process world of threads, used
//! by the test suite and by serial runs) and, behind the `mpi` feature, by
//! [`MpiComm`] over the `mpi` crate. Everything above this module is generic
//! over `C: Comm`, so algorithms are exercised identically on both backends.
//!
//! Counts are always element counts, never bytes, and every rank passes the
//! full per-rank count table; the engine computes those tables from
//! distribution metadata, so no size negotiation round-trips are needed.

use std::ops::AddAssign;

use num_traits::Zero;

/// Element types that can travel through a communicator.
///
/// With the `mpi` feature enabled this additionally requires an MPI datatype
/// mapping, so the same generic code compiles against both backends.
#[cfg(feature = "mpi")]
pub trait CommScalar: Clone + Send + Sync + 'static + mpi::datatype::Equivalence {}
#[cfg(feature = "mpi")]
impl<T: Clone + Send + Sync + 'static + mpi::datatype::Equivalence> CommScalar for T {}

#[cfg(not(feature = "mpi"))]
pub trait CommScalar: Clone + Send + Sync + 'static {}
#[cfg(not(feature = "mpi"))]
impl<T: Clone + Send + Sync + 'static> CommScalar for T {}

/// A communicator: an ordered set of ranks that enter collectives together.
///
/// Every method except `rank`/`size` is collective; all ranks of the
/// communicator must call it with consistent arguments, in the same order.
pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);

    /// Partition the ranks into disjoint sub-communicators, one per distinct
    /// `color`; within a part, ranks are ordered by `(key, old rank)`.
    fn split(&self, color: usize, key: usize) -> Self
    where
        Self: Sized;

    /// Overwrite `buf` on every rank with the root's copy.
    fn broadcast_into<T: CommScalar>(&self, buf: &mut [T], root: usize);

    /// Concatenate every rank's contribution in rank order into `out`.
    /// `counts[r]` is rank r's contribution length; `out` holds their sum.
    fn all_gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T]);

    /// Exchange per-destination segments: rank r receives, from each rank s,
    /// the segment of s's `send` buffer addressed to r. `send_counts[d]` is
    /// the length this rank sends to d; `recv_counts[s]` the length it
    /// expects from s.
    fn all_to_all_varcount<T: CommScalar>(
        &self,
        send: &[T],
        send_counts: &[usize],
        recv: &mut [T],
        recv_counts: &[usize],
    );

    /// Element-wise sum of `counts`-partitioned buffers across ranks; rank r
    /// keeps segment r of the total. `recv` holds `counts[rank]` entries.
    fn reduce_scatter_sum<T: CommScalar + Zero + AddAssign>(
        &self,
        send: &[T],
        counts: &[usize],
        recv: &mut [T],
    );

    /// Concatenate every rank's contribution on the root; `out` is only
    /// written (and only needs room) there.
    fn gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T], root: usize);

    /// Inverse of [`Comm::gather_varcount`]: the root's `send` buffer is cut
    /// into `counts` segments and segment r lands in rank r's `recv`.
    fn scatter_varcount<T: CommScalar>(&self, send: &[T], counts: &[usize], recv: &mut [T], root: usize);

    /// Paired exchange: send `send` to `to` while receiving `recv.len()`
    /// entries from `from`. Both partners may be this rank and either buffer
    /// may be empty; the call completes both transfers.
    fn send_recv<T: CommScalar>(&self, send: &[T], to: usize, recv: &mut [T], from: usize);
}

pub mod local_comm;
pub use local_comm::LocalComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
