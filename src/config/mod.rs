//! Configuration module: option structs for grids and redistribution.

pub mod options;
pub use options::{GridOrder, RedistOptions};
