//! In-process multi-rank world.
//!
//! `LocalComm` gives every collective of the [`Comm`] trait an exact
//! implementation over threads in one process: ranks deposit their
//! contribution on a shared slot board, meet at a barrier, and read the
//! other ranks' slots. A second barrier keeps a fast rank from overwriting
//! its slot before slow ranks have read it, which makes every collective
//! deterministic.
//!
//! A one-rank world doubles as the serial backend. The board also counts the
//! data collectives entered, so tests can assert that an operation moved no
//! data at all.

use std::any::Any;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use num_traits::Zero;

use super::{Comm, CommScalar};

struct WorldState {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
    collectives: AtomicU64,
}

impl WorldState {
    fn with_size(size: usize) -> Arc<WorldState> {
        Arc::new(WorldState {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size).map(|_| None).collect()),
            collectives: AtomicU64::new(0),
        })
    }
}

/// One rank's handle onto an in-process world.
pub struct LocalComm {
    state: Arc<WorldState>,
    rank: usize,
}

impl LocalComm {
    /// Create a fresh world and return one handle per rank, in rank order.
    /// Hand each handle to its own thread; see [`spawn_world`].
    pub fn world(size: usize) -> Vec<LocalComm> {
        assert!(size > 0, "a world needs at least one rank");
        let state = WorldState::with_size(size);
        (0..size)
            .map(|rank| LocalComm { state: Arc::clone(&state), rank })
            .collect()
    }

    /// A one-rank world: the serial backend.
    pub fn single() -> LocalComm {
        LocalComm { state: WorldState::with_size(1), rank: 0 }
    }

    /// Number of data-collective entries made by all ranks of this world so
    /// far. `split` and rank queries are not counted. Reading it between two
    /// points is only race-free on a one-rank world.
    pub fn collective_ops(&self) -> u64 {
        self.state.collectives.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.state.collectives.fetch_add(1, Ordering::Relaxed);
    }

    /// The board primitive: deposit `value`, wait for everyone, read every
    /// rank's deposit. Panics if the ranks entered different collectives.
    fn exchange<V: Any + Send + Clone>(&self, value: V) -> Vec<V> {
        {
            let mut slots = self.state.slots.lock().unwrap();
            slots[self.rank] = Some(Box::new(value));
        }
        self.state.barrier.wait();
        let gathered: Vec<V> = {
            let slots = self.state.slots.lock().unwrap();
            slots
                .iter()
                .map(|slot| {
                    slot.as_ref()
                        .and_then(|b| b.downcast_ref::<V>())
                        .expect("ranks disagree on the collective sequence")
                        .clone()
                })
                .collect()
        };
        self.state.barrier.wait();
        gathered
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn barrier(&self) {
        self.count();
        self.state.barrier.wait();
    }

    fn split(&self, color: usize, key: usize) -> LocalComm {
        let members: Vec<(usize, usize)> = self.exchange((color, key));
        let mut mine: Vec<(usize, usize)> = members
            .iter()
            .enumerate()
            .filter(|&(_, &(c, _))| c == color)
            .map(|(rank, &(_, k))| (k, rank))
            .collect();
        mine.sort_unstable();
        let my_pos = mine.iter().position(|&(_, r)| r == self.rank).unwrap();
        let leader = mine[0].1;
        // The leader of each part allocates the part's world; a second board
        // round publishes the handles.
        let allocated: Option<Arc<WorldState>> = if self.rank == leader {
            Some(WorldState::with_size(mine.len()))
        } else {
            None
        };
        let published = self.exchange(allocated);
        let state = published[leader].clone().expect("split leader published no world");
        LocalComm { state, rank: my_pos }
    }

    fn broadcast_into<T: CommScalar>(&self, buf: &mut [T], root: usize) {
        self.count();
        let all = self.exchange(if self.rank == root { buf.to_vec() } else { Vec::new() });
        if self.rank != root {
            buf.clone_from_slice(&all[root]);
        }
    }

    fn all_gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T]) {
        self.count();
        debug_assert_eq!(local.len(), counts[self.rank]);
        let all = self.exchange(local.to_vec());
        let mut at = 0;
        for (contrib, &count) in all.iter().zip(counts) {
            assert_eq!(contrib.len(), count, "all-gather counts disagree");
            out[at..at + count].clone_from_slice(contrib);
            at += count;
        }
    }

    fn all_to_all_varcount<T: CommScalar>(
        &self,
        send: &[T],
        send_counts: &[usize],
        recv: &mut [T],
        recv_counts: &[usize],
    ) {
        self.count();
        debug_assert_eq!(send.len(), send_counts.iter().sum::<usize>());
        let all: Vec<(Vec<T>, Vec<usize>)> = self.exchange((send.to_vec(), send_counts.to_vec()));
        let mut at = 0;
        for ((buf, counts), &expect) in all.iter().zip(recv_counts) {
            let offset: usize = counts[..self.rank].iter().sum();
            assert_eq!(counts[self.rank], expect, "all-to-all counts disagree");
            recv[at..at + expect].clone_from_slice(&buf[offset..offset + expect]);
            at += expect;
        }
    }

    fn reduce_scatter_sum<T: CommScalar + Zero + AddAssign>(
        &self,
        send: &[T],
        counts: &[usize],
        recv: &mut [T],
    ) {
        self.count();
        assert_eq!(send.len(), counts.iter().sum::<usize>());
        let all = self.exchange(send.to_vec());
        let offset: usize = counts[..self.rank].iter().sum();
        let mine = counts[self.rank];
        assert_eq!(recv.len(), mine);
        for x in recv.iter_mut() {
            *x = T::zero();
        }
        for contrib in &all {
            for (acc, x) in recv.iter_mut().zip(&contrib[offset..offset + mine]) {
                *acc += x.clone();
            }
        }
    }

    fn gather_varcount<T: CommScalar>(&self, local: &[T], counts: &[usize], out: &mut [T], root: usize) {
        self.count();
        let all = self.exchange(local.to_vec());
        if self.rank == root {
            let mut at = 0;
            for (contrib, &count) in all.iter().zip(counts) {
                assert_eq!(contrib.len(), count, "gather counts disagree");
                out[at..at + count].clone_from_slice(contrib);
                at += count;
            }
        }
    }

    fn scatter_varcount<T: CommScalar>(&self, send: &[T], counts: &[usize], recv: &mut [T], root: usize) {
        self.count();
        let all = self.exchange(if self.rank == root { send.to_vec() } else { Vec::new() });
        let offset: usize = counts[..self.rank].iter().sum();
        recv.clone_from_slice(&all[root][offset..offset + counts[self.rank]]);
    }

    fn send_recv<T: CommScalar>(&self, send: &[T], to: usize, recv: &mut [T], from: usize) {
        self.count();
        let all: Vec<(usize, Vec<T>)> = self.exchange((to, send.to_vec()));
        let (dest, payload) = &all[from];
        assert_eq!(*dest, self.rank, "sendrecv pairing mismatch: rank {from} sent to rank {dest}");
        recv.clone_from_slice(payload);
    }
}

/// Run `f` once per rank of a fresh `size`-rank world, one thread per rank,
/// and collect the per-rank results in rank order. A panic on any rank
/// propagates to the caller.
pub fn spawn_world<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(LocalComm) -> R + Send + Sync,
{
    std::thread::scope(|scope| {
        let f = &f;
        let handles: Vec<_> = LocalComm::world(size)
            .into_iter()
            .map(|comm| scope.spawn(move || f(comm)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(v) => v,
                Err(e) => std::panic::resume_unwind(e),
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_rank() {
        let vals = spawn_world(4, |comm| {
            let mut buf = if comm.rank() == 2 { vec![7.0, 8.0] } else { vec![0.0, 0.0] };
            comm.broadcast_into(&mut buf, 2);
            buf
        });
        assert!(vals.iter().all(|v| v == &[7.0, 8.0]));
    }

    #[test]
    fn all_gather_with_uneven_counts() {
        let vals = spawn_world(3, |comm| {
            let local: Vec<u64> = (0..comm.rank() as u64 + 1).map(|x| x + 10 * comm.rank() as u64).collect();
            let counts = [1, 2, 3];
            let mut out = vec![0u64; 6];
            comm.all_gather_varcount(&local, &counts, &mut out);
            out
        });
        for v in vals {
            assert_eq!(v, vec![0, 10, 11, 20, 21, 22]);
        }
    }

    #[test]
    fn all_to_all_routes_segments() {
        // Rank r sends the value 10*r + d to destination d.
        let vals = spawn_world(3, |comm| {
            let r = comm.rank();
            let send: Vec<i64> = (0..3).map(|d| (10 * r + d) as i64).collect();
            let counts = [1usize, 1, 1];
            let mut recv = vec![0i64; 3];
            comm.all_to_all_varcount(&send, &counts, &mut recv, &counts);
            recv
        });
        for (r, v) in vals.iter().enumerate() {
            let expect: Vec<i64> = (0..3).map(|s| (10 * s + r) as i64).collect();
            assert_eq!(v, &expect);
        }
    }

    #[test]
    fn reduce_scatter_sums_segments() {
        let vals = spawn_world(2, |comm| {
            // Both ranks contribute [1, 2, 3]; counts 2 + 1.
            let send = vec![1.0, 2.0, 3.0];
            let counts = [2usize, 1];
            let mut recv = vec![0.0; counts[comm.rank()]];
            comm.reduce_scatter_sum(&send, &counts, &mut recv);
            recv
        });
        assert_eq!(vals[0], vec![2.0, 4.0]);
        assert_eq!(vals[1], vec![6.0]);
    }

    #[test]
    fn split_reorders_by_key() {
        let vals = spawn_world(6, |comm| {
            // Two colors by parity; ranks keyed in reverse order.
            let color = comm.rank() % 2;
            let sub = comm.split(color, 5 - comm.rank());
            (comm.rank(), sub.rank(), sub.size())
        });
        // Color 0 holds old ranks {0, 2, 4}; reversed keys order them 4, 2, 0.
        assert_eq!(vals[4], (4, 0, 3));
        assert_eq!(vals[2], (2, 1, 3));
        assert_eq!(vals[0], (0, 2, 3));
        assert_eq!(vals[5], (5, 0, 3));
        assert_eq!(vals[1], (1, 2, 3));
    }

    #[test]
    fn split_worlds_are_independent() {
        spawn_world(4, |comm| {
            let sub = comm.split(comm.rank() % 2, comm.rank());
            // A collective on the sub-world must not involve the other half.
            let mut buf = vec![comm.rank()];
            sub.broadcast_into(&mut buf, 0);
            assert_eq!(buf[0], comm.rank() % 2);
        });
    }

    #[test]
    fn send_recv_cycles() {
        let vals = spawn_world(3, |comm| {
            let r = comm.rank();
            let send = vec![r as f64];
            let mut recv = vec![-1.0];
            // Shift by one: r -> r+1.
            comm.send_recv(&send, (r + 1) % 3, &mut recv, (r + 2) % 3);
            recv[0]
        });
        assert_eq!(vals, vec![2.0, 0.0, 1.0]);
    }

    #[test]
    fn send_recv_to_self() {
        spawn_world(2, |comm| {
            let send = vec![comm.rank() as i64; 2];
            let mut recv = vec![0i64; 2];
            comm.send_recv(&send, comm.rank(), &mut recv, comm.rank());
            assert_eq!(recv, send);
        });
    }

    #[test]
    fn collective_counter_tracks_data_ops() {
        let comm = LocalComm::single();
        let before = comm.collective_ops();
        comm.barrier();
        let mut buf = vec![0u8; 1];
        comm.broadcast_into(&mut buf, 0);
        assert_eq!(comm.collective_ops() - before, 2);
    }

    #[test]
    fn single_world_is_serial() {
        let comm = LocalComm::single();
        assert_eq!((comm.rank(), comm.size()), (0, 1));
        comm.barrier();
        let mut buf = vec![3.5];
        comm.broadcast_into(&mut buf, 0);
        assert_eq!(buf, vec![3.5]);
    }
}
