//! Matrix module: local storage and distributed matrices.

pub mod local;
pub use local::{Matrix, MatrixFlags};
pub mod dist;
pub use dist::DistMatrix;
