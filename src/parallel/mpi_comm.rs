//! MPI-backed communicator.
//!
//! `MpiComm` implements [`Comm`](super::Comm) over the `mpi` crate, mapping
//! each collective to the corresponding MPI call. Variable-count collectives
//! use `Partition`/`PartitionMut` with the usual counts/displacements
//! encoding; the paired exchange posts a nonblocking send and a blocking
//! receive so a permutation of ranks cannot deadlock.
//!
//! Only available with the `mpi` feature. The caller keeps the
//! [`Universe`](mpi::environment::Universe) alive for as long as any
//! communicator built from it is in use.

use std::ops::AddAssign;

use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;
use num_traits::Zero;

use super::{Comm, CommScalar};

pub struct MpiComm {
    comm: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Wrap the world communicator of an initialized MPI universe.
    pub fn world(universe: &Universe) -> Self {
        Self::from_comm(universe.world())
    }

    pub fn from_comm(comm: SimpleCommunicator) -> Self {
        let rank = comm.rank() as usize;
        let size = comm.size() as usize;
        MpiComm { comm, rank, size }
    }
}

fn counts_displs(counts: &[usize]) -> (Vec<i32>, Vec<i32>) {
    let mut displs = Vec::with_capacity(counts.len());
    let mut at = 0i32;
    for &c in counts {
        displs.push(at);
        at += c as i32;
    }
    (counts.iter().map(|&c| c as i32).collect(), displs)
}

impl Comm for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn split(&self, color: usize, key: usize) -> Self {
        let sub = self
            .comm
            .split_by_color_with_key(Color::with_value(color as i32), key as i32)
            .expect("split with a valid color returns a communicator");
        Self::from_comm(sub)
    }

    fn broadcast_into<T: CommScalar>(&self, buf: &mut [T], root: usize) {
        self.comm.process_at_rank(root as i32).broadcast_into(buf);
    }

    fn all_gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T]) {
        let (counts, displs) = counts_displs(counts);
        let mut partition = PartitionMut::new(out, &counts[..], &displs[..]);
        self.comm.all_gather_varcount_into(local, &mut partition);
    }

    fn all_to_all_varcount<T: CommScalar>(
        &self,
        send: &[T],
        send_counts: &[usize],
        recv: &mut [T],
        recv_counts: &[usize],
    ) {
        let (scounts, sdispls) = counts_displs(send_counts);
        let (rcounts, rdispls) = counts_displs(recv_counts);
        let send_part = Partition::new(send, &scounts[..], &sdispls[..]);
        let mut recv_part = PartitionMut::new(recv, &rcounts[..], &rdispls[..]);
        self.comm.all_to_all_varcount_into(&send_part, &mut recv_part);
    }

    fn reduce_scatter_sum<T: CommScalar + Zero + AddAssign>(
        &self,
        send: &[T],
        counts: &[usize],
        recv: &mut [T],
    ) {
        // MPI's reduce_scatter_block wants one uniform count, so pad each
        // rank's segment to the largest. The zero padding cannot change sums.
        let max = counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return;
        }
        let mut padded = vec![T::zero(); max * self.size];
        let mut at = 0;
        for (r, &c) in counts.iter().enumerate() {
            padded[r * max..r * max + c].clone_from_slice(&send[at..at + c]);
            at += c;
        }
        let mut chunk = vec![T::zero(); max];
        self.comm
            .reduce_scatter_block_into(&padded[..], &mut chunk[..], SystemOperation::sum());
        recv.clone_from_slice(&chunk[..counts[self.rank]]);
    }

    fn gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T], root: usize) {
        let root_process = self.comm.process_at_rank(root as i32);
        if self.rank == root {
            let (counts, displs) = counts_displs(counts);
            let mut partition = PartitionMut::new(out, &counts[..], &displs[..]);
            root_process.gather_varcount_into_root(local, &mut partition);
        } else {
            root_process.gather_varcount_into(local);
        }
    }

    fn scatter_varcount<T: CommScalar>(&self, send: &[T], counts: &[usize], recv: &mut [T], root: usize) {
        let root_process = self.comm.process_at_rank(root as i32);
        if self.rank == root {
            let (counts, displs) = counts_displs(counts);
            let partition = Partition::new(send, &counts[..], &displs[..]);
            root_process.scatter_varcount_into_root(&partition, recv);
        } else {
            root_process.scatter_varcount_into(recv);
        }
    }

    fn send_recv<T: CommScalar>(&self, send: &[T], to: usize, recv: &mut [T], from: usize) {
        mpi::request::scope(|scope| {
            let sreq = self.comm.process_at_rank(to as i32).immediate_send(scope, send);
            self.comm.process_at_rank(from as i32).receive_into(recv);
            sreq.wait();
        });
    }
}
