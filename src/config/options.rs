//! API options for grids and the redistribution engine.
//!
//! This module provides the small option structs consumed elsewhere in the
//! crate: `GridOrder` selects how flat ranks are folded onto the 2D grid,
//! and `RedistOptions` controls whether the engine may route a conversion
//! through the canonical replicated intermediate when it has no direct
//! algorithm for the requested pair.

/// How a communicator's flat ranks map onto (row, column) grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridOrder {
    /// rank = row + col * grid_height (the conventional ordering for dense
    /// distributions; the full-grid communicator enumerates columns first).
    #[default]
    ColumnMajor,
    /// rank = col + row * grid_width.
    RowMajor,
}

/// Redistribution engine policy.
#[derive(Debug, Clone, Copy)]
pub struct RedistOptions {
    /// When false, a pair with no direct algorithm fails with
    /// `UnimplementedPath` instead of routing through the replicated
    /// intermediate. Direct pairs are unaffected.
    pub allow_indirect: bool,
}

impl Default for RedistOptions {
    fn default() -> Self {
        Self { allow_indirect: true }
    }
}

impl RedistOptions {
    /// Refuse every conversion that would need an intermediate hop.
    pub fn direct_only() -> Self {
        Self { allow_indirect: false }
    }
}
