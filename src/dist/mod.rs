//! Distribution tags and pairs.
//!
//! A [`Dist`] names how one matrix axis is spread over the process grid; a
//! [`DistPair`] combines a column-axis and a row-axis tag and is only
//! constructible for the combinations the engine knows how to serve. The
//! block-cyclic index arithmetic shared by every tag lives in [`cyclic`].

use std::fmt;

use crate::error::GmError;

pub mod cyclic;

/// How one axis of a matrix is assigned to grid positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dist {
    /// Elementwise over grid rows; stride = grid height.
    Mc,
    /// Elementwise along a diagonal path; stride = lcm(height, width).
    Md,
    /// Elementwise over grid columns; stride = grid width.
    Mr,
    /// Column-major vector distribution over all ranks; stride = grid size.
    Vc,
    /// Row-major vector distribution over all ranks; stride = grid size.
    Vr,
    /// Replicated: every position stores the whole axis.
    Star,
    /// Stored in full by a single root rank.
    Circ,
}

impl Dist {
    /// Number of distinct positions this tag spreads an axis over, on an
    /// `height x width` grid.
    pub fn stride(self, height: usize, width: usize) -> usize {
        match self {
            Dist::Mc => height,
            Dist::Mr => width,
            Dist::Md => lcm(height, width),
            Dist::Vc | Dist::Vr => height * width,
            Dist::Star | Dist::Circ => 1,
        }
    }
}

impl fmt::Display for Dist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dist::Mc => "MC",
            Dist::Md => "MD",
            Dist::Mr => "MR",
            Dist::Vc => "VC",
            Dist::Vr => "VR",
            Dist::Star => "*",
            Dist::Circ => "o",
        };
        f.write_str(s)
    }
}

/// A validated (column-axis, row-axis) distribution pair.
///
/// Construction rejects combinations with no owner arithmetic, e.g. the two
/// vector tags on one matrix or `Circ` paired with anything but itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DistPair {
    col: Dist,
    row: Dist,
}

impl DistPair {
    pub const MC_MR: DistPair = DistPair { col: Dist::Mc, row: Dist::Mr };
    pub const MC_STAR: DistPair = DistPair { col: Dist::Mc, row: Dist::Star };
    pub const STAR_MR: DistPair = DistPair { col: Dist::Star, row: Dist::Mr };
    pub const MD_STAR: DistPair = DistPair { col: Dist::Md, row: Dist::Star };
    pub const STAR_MD: DistPair = DistPair { col: Dist::Star, row: Dist::Md };
    pub const MR_MC: DistPair = DistPair { col: Dist::Mr, row: Dist::Mc };
    pub const MR_STAR: DistPair = DistPair { col: Dist::Mr, row: Dist::Star };
    pub const STAR_MC: DistPair = DistPair { col: Dist::Star, row: Dist::Mc };
    pub const VC_STAR: DistPair = DistPair { col: Dist::Vc, row: Dist::Star };
    pub const STAR_VC: DistPair = DistPair { col: Dist::Star, row: Dist::Vc };
    pub const VR_STAR: DistPair = DistPair { col: Dist::Vr, row: Dist::Star };
    pub const STAR_VR: DistPair = DistPair { col: Dist::Star, row: Dist::Vr };
    pub const STAR_STAR: DistPair = DistPair { col: Dist::Star, row: Dist::Star };
    pub const CIRC_CIRC: DistPair = DistPair { col: Dist::Circ, row: Dist::Circ };

    /// All constructible pairs, in a fixed order convenient for tests.
    pub const ALL: [DistPair; 14] = [
        Self::MC_MR,
        Self::MC_STAR,
        Self::STAR_MR,
        Self::MD_STAR,
        Self::STAR_MD,
        Self::MR_MC,
        Self::MR_STAR,
        Self::STAR_MC,
        Self::VC_STAR,
        Self::STAR_VC,
        Self::VR_STAR,
        Self::STAR_VR,
        Self::STAR_STAR,
        Self::CIRC_CIRC,
    ];

    pub fn new(col: Dist, row: Dist) -> Result<Self, GmError> {
        let pair = DistPair { col, row };
        if Self::ALL.contains(&pair) {
            Ok(pair)
        } else {
            Err(GmError::Configuration(format!(
                "no such distribution pair: {pair}"
            )))
        }
    }

    pub fn col(&self) -> Dist {
        self.col
    }

    pub fn row(&self) -> Dist {
        self.row
    }
}

impl fmt::Display for DistPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.col, self.row)
    }
}

/// Snapshot of everything that fixes a matrix's element placement, used by
/// `align_with` and by the engine's compatibility checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistData {
    pub pair: DistPair,
    pub col_align: usize,
    pub row_align: usize,
    pub col_block: usize,
    pub row_block: usize,
    pub root: usize,
    pub grid_id: u64,
}

pub(crate) fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

pub(crate) fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_pairs_construct() {
        for pair in DistPair::ALL {
            assert_eq!(DistPair::new(pair.col(), pair.row()).unwrap(), pair);
        }
    }

    #[test]
    fn illegal_pairs_are_rejected() {
        for (col, row) in [
            (Dist::Mc, Dist::Mc),
            (Dist::Mc, Dist::Vc),
            (Dist::Vc, Dist::Vr),
            (Dist::Vc, Dist::Mr),
            (Dist::Circ, Dist::Star),
            (Dist::Star, Dist::Circ),
            (Dist::Md, Dist::Md),
            (Dist::Md, Dist::Mr),
        ] {
            assert!(DistPair::new(col, row).is_err(), "{col} {row} should be illegal");
        }
    }

    #[test]
    fn strides_on_a_2x3_grid() {
        assert_eq!(Dist::Mc.stride(2, 3), 2);
        assert_eq!(Dist::Mr.stride(2, 3), 3);
        assert_eq!(Dist::Md.stride(2, 3), 6);
        assert_eq!(Dist::Vc.stride(2, 3), 6);
        assert_eq!(Dist::Vr.stride(2, 3), 6);
        assert_eq!(Dist::Star.stride(2, 3), 1);
        assert_eq!(Dist::Circ.stride(2, 3), 1);
    }

    #[test]
    fn display_matches_conventional_names() {
        assert_eq!(DistPair::MC_MR.to_string(), "[MC,MR]");
        assert_eq!(DistPair::STAR_STAR.to_string(), "[*,*]");
        assert_eq!(DistPair::CIRC_CIRC.to_string(), "[o,o]");
        assert_eq!(DistPair::MD_STAR.to_string(), "[MD,*]");
    }

    #[test]
    fn lcm_of_grid_shapes() {
        assert_eq!(lcm(2, 3), 6);
        assert_eq!(lcm(4, 6), 12);
        assert_eq!(lcm(1, 5), 5);
        assert_eq!(gcd(12, 18), 6);
    }
}
