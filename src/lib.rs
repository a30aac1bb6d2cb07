//! gridmat: distributed dense matrices over process grids
//!
//! This crate provides the storage and movement layer for dense matrices
//! spread across a two-dimensional process grid: cyclic and block-cyclic
//! placements, alignment bookkeeping, and collective redistribution
//! between placements, over MPI or an in-process communicator for tests
//! and single-node runs.

pub mod parallel;

pub mod config;
pub mod dist;
pub mod error;
pub mod grid;
pub mod matrix;
pub mod redist;

// Re-exports for convenience
pub use config::{GridOrder, RedistOptions};
pub use dist::{Dist, DistData, DistPair};
pub use error::GmError;
pub use grid::Grid;
pub use matrix::{DistMatrix, Matrix, MatrixFlags};
pub use parallel::{Comm, CommScalar, LocalComm};
#[cfg(feature = "mpi")]
pub use parallel::MpiComm;
pub use redist::{
    exchange, filter, gather_to_root, redistribute, replicate, scatter_from_root, sum_scatter,
    sum_scatter_update, translate, transpose_axes,
};
