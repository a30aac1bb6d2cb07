use thiserror::Error;

// Unified error type for gridmat.
//
// Every variant is detected before any communication is issued, so a
// returned error never leaves a collective half-finished. The same
// arithmetic runs on every rank, so a failing redistribution fails
// identically across the process set; callers treat the error as fatal
// for the whole set because a partially executed collective cannot be
// rolled back.

#[derive(Error, Debug)]
pub enum GmError {
    /// Grid/communicator size mismatch, operands on different grids,
    /// illegal distribution pair, or block sizes that require an explicit
    /// reblock before a direct collective is legal.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The requested distribution-pair conversion has no direct algorithm
    /// and indirect routing is disabled, or no safe route exists.
    #[error("unimplemented redistribution path: {0}")]
    UnimplementedPath(String),
    /// Shape incompatible with the operation or with the other operand.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
}
