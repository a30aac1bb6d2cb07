//! Process grids.
//!
//! A [`Grid`] arranges the ranks of a communicator into a logical
//! `height x width` rectangle and derives, by splitting, the communicators
//! every distribution needs: one per grid column, one per grid row, the full
//! set in column-major ("vc") and row-major ("vr") vector order, and one per
//! diagonal path. All placement arithmetic in the crate is phrased in terms
//! of positions within these derived communicators, so the underlying rank
//! order only decides which physical rank sits at which grid coordinate.
//!
//! Grids carry a per-process unique id; two matrices may only take part in
//! the same collective when they were built on the same grid handle, and the
//! id makes that an identity check instead of a structural comparison.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::config::GridOrder;
use crate::dist::{gcd, lcm};
use crate::error::GmError;
use crate::parallel::Comm;

static NEXT_GRID_ID: AtomicU64 = AtomicU64::new(0);

pub struct Grid<C: Comm> {
    comm: C,
    order: GridOrder,
    height: usize,
    width: usize,
    row: usize,
    col: usize,
    col_comm: C,
    row_comm: C,
    vc_comm: C,
    vr_comm: C,
    diag_comm: C,
    id: u64,
}

impl<C: Comm> Grid<C> {
    /// Arrange `comm` as a `height x width` grid. Fails unless the
    /// communicator size is exactly `height * width`.
    pub fn new(comm: C, height: usize, width: usize, order: GridOrder) -> Result<Self, GmError> {
        if height * width != comm.size() {
            return Err(GmError::Configuration(format!(
                "a {height} x {width} grid needs {} ranks, communicator has {}",
                height * width,
                comm.size()
            )));
        }
        Ok(Self::build(comm, height, width, order))
    }

    /// The most nearly square grid for the communicator's size: the largest
    /// divisor of the size at most its square root becomes the height.
    pub fn square(comm: C) -> Self {
        let p = comm.size();
        let mut height = p.isqrt();
        while p % height != 0 {
            height -= 1;
        }
        Self::build(comm, height, p / height, GridOrder::ColumnMajor)
    }

    fn build(comm: C, height: usize, width: usize, order: GridOrder) -> Self {
        let rank = comm.rank();
        let (row, col) = match order {
            GridOrder::ColumnMajor => (rank % height, rank / height),
            GridOrder::RowMajor => (rank / width, rank % width),
        };
        let col_comm = comm.split(col, row);
        let row_comm = comm.split(row, col);
        let vc_comm = comm.split(0, row + col * height);
        let vr_comm = comm.split(0, col + row * width);
        let g = gcd(height, width);
        let path = ((col % g) + g - (row % g)) % g;
        let mut position = row;
        while (path + position) % width != col {
            position += height;
        }
        let diag_comm = comm.split(path, position);
        let id = NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed);
        debug!("grid {id}: {height} x {width}, rank {rank} at ({row}, {col}), order {order:?}");
        Grid {
            comm,
            order,
            height,
            width,
            row,
            col,
            col_comm,
            row_comm,
            vc_comm,
            vr_comm,
            diag_comm,
            id,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn size(&self) -> usize {
        self.height * self.width
    }

    pub fn order(&self) -> GridOrder {
        self.order
    }

    /// Identity of this grid handle on this process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// This process's rank in the underlying communicator.
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// This process's grid row.
    pub fn row(&self) -> usize {
        self.row
    }

    /// This process's grid column.
    pub fn col(&self) -> usize {
        self.col
    }

    /// This process's rank in column-major vector order.
    pub fn vc_rank(&self) -> usize {
        self.vc_rank_of(self.row, self.col)
    }

    /// This process's rank in row-major vector order.
    pub fn vr_rank(&self) -> usize {
        self.vr_rank_of(self.row, self.col)
    }

    pub fn vc_rank_of(&self, row: usize, col: usize) -> usize {
        row + col * self.height
    }

    pub fn vr_rank_of(&self, row: usize, col: usize) -> usize {
        col + row * self.width
    }

    pub fn coords_of_vc(&self, vc_rank: usize) -> (usize, usize) {
        (vc_rank % self.height, vc_rank / self.height)
    }

    pub fn coords_of_vr(&self, vr_rank: usize) -> (usize, usize) {
        (vr_rank / self.width, vr_rank % self.width)
    }

    /// Number of distinct diagonal paths; the paths partition the grid.
    pub fn diag_paths(&self) -> usize {
        gcd(self.height, self.width)
    }

    /// Number of positions along each diagonal path.
    pub fn diag_length(&self) -> usize {
        lcm(self.height, self.width)
    }

    /// The diagonal path through grid coordinate `(row, col)`.
    pub fn diag_path(&self, row: usize, col: usize) -> usize {
        let g = self.diag_paths();
        ((col % g) + g - (row % g)) % g
    }

    /// Position of `(row, col)` along its own diagonal path: the unique
    /// `k < diag_length()` with `k = row (mod height)` and
    /// `path + k = col (mod width)`.
    pub fn diag_position(&self, row: usize, col: usize) -> usize {
        let path = self.diag_path(row, col);
        let mut k = row;
        while (path + k) % self.width != col {
            k += self.height;
        }
        k
    }

    /// Grid coordinates of position `position` on diagonal path `path`;
    /// inverse of [`Grid::diag_path`] and [`Grid::diag_position`].
    pub fn diag_coords(&self, path: usize, position: usize) -> (usize, usize) {
        (position % self.height, (path + position) % self.width)
    }

    /// The underlying communicator.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// All ranks sharing this process's grid column, ordered by grid row.
    pub fn col_comm(&self) -> &C {
        &self.col_comm
    }

    /// All ranks sharing this process's grid row, ordered by grid column.
    pub fn row_comm(&self) -> &C {
        &self.row_comm
    }

    /// The whole grid in column-major vector order.
    pub fn vc_comm(&self) -> &C {
        &self.vc_comm
    }

    /// The whole grid in row-major vector order.
    pub fn vr_comm(&self) -> &C {
        &self.vr_comm
    }

    /// This process's diagonal path, ordered by position along the path.
    pub fn diag_comm(&self) -> &C {
        &self.diag_comm
    }
}
