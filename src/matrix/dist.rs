//! Distributed matrices.
//!
//! A `DistMatrix<T, C>` is a global `height x width` matrix whose entries are
//! spread over a [`Grid`] according to a [`DistPair`]: the column-axis tag
//! places global row indices, the row-axis tag places global column indices,
//! and per-axis alignments pick which position owns index 0. Each rank holds
//! exactly its share in a local column-major [`Matrix`].
//!
//! All placement is arithmetic: any rank can compute the owner and the local
//! coordinates of any entry from the metadata alone, which is what lets the
//! redistribution engine pre-compute every transfer size without a
//! negotiation round-trip.

use std::ops::{AddAssign, Mul};
use std::sync::Arc;

use num_traits::Zero;

use crate::config::RedistOptions;
use crate::dist::cyclic;
use crate::dist::{Dist, DistData, DistPair};
use crate::error::GmError;
use crate::grid::Grid;
use crate::matrix::local::Matrix;
use crate::parallel::{Comm, CommScalar};

pub struct DistMatrix<T, C: Comm> {
    grid: Arc<Grid<C>>,
    pair: DistPair,
    height: usize,
    width: usize,
    col_align: usize,
    row_align: usize,
    col_constrained: bool,
    row_constrained: bool,
    col_block: usize,
    row_block: usize,
    root: usize,
    local: Matrix<T>,
}

impl<T, C: Comm> DistMatrix<T, C> {
    /// An empty 0 x 0 matrix with default alignments; allocates nothing.
    pub fn new(grid: Arc<Grid<C>>, pair: DistPair) -> Self {
        DistMatrix {
            grid,
            pair,
            height: 0,
            width: 0,
            col_align: 0,
            row_align: 0,
            col_constrained: false,
            row_constrained: false,
            col_block: 1,
            row_block: 1,
            root: 0,
            local: Matrix::new(),
        }
    }

    pub fn grid(&self) -> &Arc<Grid<C>> {
        &self.grid
    }

    pub fn pair(&self) -> DistPair {
        self.pair
    }

    /// Global number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Global number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn col_align(&self) -> usize {
        self.col_align
    }

    pub fn row_align(&self) -> usize {
        self.row_align
    }

    /// Whether the column alignment was fixed explicitly. Assignment leaves
    /// constrained alignments alone and adapts unconstrained ones to the
    /// source.
    pub fn col_constrained(&self) -> bool {
        self.col_constrained
    }

    pub fn row_constrained(&self) -> bool {
        self.row_constrained
    }

    pub fn col_block(&self) -> usize {
        self.col_block
    }

    pub fn row_block(&self) -> usize {
        self.row_block
    }

    /// For a `[o,o]` matrix the owning rank in column-major vector order; for
    /// a diagonal distribution the path id; 0 otherwise.
    pub fn root(&self) -> usize {
        self.root
    }

    /// Number of positions global row indices are spread over.
    pub fn col_stride(&self) -> usize {
        self.pair.col().stride(self.grid.height(), self.grid.width())
    }

    /// Number of positions global column indices are spread over.
    pub fn row_stride(&self) -> usize {
        self.pair.row().stride(self.grid.height(), self.grid.width())
    }

    fn axis_position(&self, tag: Dist) -> Option<usize> {
        let g = &self.grid;
        match tag {
            Dist::Mc => Some(g.row()),
            Dist::Mr => Some(g.col()),
            Dist::Vc => Some(g.vc_rank()),
            Dist::Vr => Some(g.vr_rank()),
            Dist::Star => Some(0),
            Dist::Md => {
                if g.diag_path(g.row(), g.col()) == self.root {
                    Some(g.diag_position(g.row(), g.col()))
                } else {
                    None
                }
            }
            Dist::Circ => {
                if g.vc_rank() == self.root {
                    Some(0)
                } else {
                    None
                }
            }
        }
    }

    /// This rank's position on the column axis, if it holds any of it.
    pub fn col_position(&self) -> Option<usize> {
        self.axis_position(self.pair.col())
    }

    /// This rank's position on the row axis, if it holds any of it.
    pub fn row_position(&self) -> Option<usize> {
        self.axis_position(self.pair.row())
    }

    /// Whether this rank stores any part of the matrix. False only off a
    /// diagonal path and away from a `[o,o]` root.
    pub fn participating(&self) -> bool {
        self.col_position().is_some() && self.row_position().is_some()
    }

    /// First global row stored here (block granular for blocked layouts).
    pub fn col_shift(&self) -> usize {
        match self.col_position() {
            Some(p) => cyclic::shift(p, self.col_align, self.col_stride()),
            None => 0,
        }
    }

    pub fn row_shift(&self) -> usize {
        match self.row_position() {
            Some(p) => cyclic::shift(p, self.row_align, self.row_stride()),
            None => 0,
        }
    }

    /// Rows stored on this rank.
    pub fn local_height(&self) -> usize {
        if self.participating() {
            cyclic::local_length(self.height, self.col_shift(), self.col_block, self.col_stride())
        } else {
            0
        }
    }

    /// Columns stored on this rank.
    pub fn local_width(&self) -> usize {
        if self.participating() {
            cyclic::local_length(self.width, self.row_shift(), self.row_block, self.row_stride())
        } else {
            0
        }
    }

    /// Position owning global row `i`.
    pub fn owner_row(&self, i: usize) -> usize {
        cyclic::owner(i, self.col_block, self.col_align, self.col_stride())
    }

    /// Position owning global column `j`.
    pub fn owner_col(&self, j: usize) -> usize {
        cyclic::owner(j, self.row_block, self.row_align, self.row_stride())
    }

    pub fn is_local_row(&self, i: usize) -> bool {
        self.col_position() == Some(self.owner_row(i))
    }

    pub fn is_local_col(&self, j: usize) -> bool {
        self.row_position() == Some(self.owner_col(j))
    }

    pub fn is_local(&self, i: usize, j: usize) -> bool {
        self.is_local_row(i) && self.is_local_col(j)
    }

    /// Local row index of global row `i`; meaningful only when
    /// [`DistMatrix::is_local_row`] holds.
    pub fn local_row(&self, i: usize) -> usize {
        cyclic::global_to_local(i, self.col_shift(), self.col_block, self.col_stride())
    }

    pub fn local_col(&self, j: usize) -> usize {
        cyclic::global_to_local(j, self.row_shift(), self.row_block, self.row_stride())
    }

    /// Global row index of local row `i_loc`.
    pub fn global_row(&self, i_loc: usize) -> usize {
        cyclic::local_to_global(i_loc, self.col_shift(), self.col_block, self.col_stride())
    }

    pub fn global_col(&self, j_loc: usize) -> usize {
        cyclic::local_to_global(j_loc, self.row_shift(), self.row_block, self.row_stride())
    }

    /// The local storage.
    pub fn local(&self) -> &Matrix<T> {
        &self.local
    }

    /// Mutable local storage; lock enforcement happens inside [`Matrix`].
    pub fn local_mut(&mut self) -> &mut Matrix<T> {
        &mut self.local
    }

    /// Release the local buffer, consuming the matrix.
    pub fn into_local(self) -> Matrix<T> {
        self.local
    }

    /// Snapshot of everything that fixes element placement.
    pub fn dist_data(&self) -> DistData {
        DistData {
            pair: self.pair,
            col_align: self.col_align,
            row_align: self.row_align,
            col_block: self.col_block,
            row_block: self.row_block,
            root: self.root,
            grid_id: self.grid.id(),
        }
    }

    /// The entry at global `(i, j)` if this rank stores it.
    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        assert!(i < self.height && j < self.width, "index ({i}, {j}) out of bounds");
        if self.is_local(i, j) {
            Some(self.local.get(self.local_row(i), self.local_col(j)))
        } else {
            None
        }
    }

    /// Store `value` at global `(i, j)` if this rank owns it; a no-op
    /// elsewhere, so every rank can call it with the same arguments.
    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<(), GmError> {
        assert!(i < self.height && j < self.width, "index ({i}, {j}) out of bounds");
        if self.is_local(i, j) {
            let (li, lj) = (self.local_row(i), self.local_col(j));
            self.local.set(li, lj, value)?;
        }
        Ok(())
    }

    /// Entries on diagonal `offset`: 0 is the main diagonal, positive
    /// offsets sit above it, negative below.
    pub fn diagonal_length(&self, offset: isize) -> usize {
        let (i0, j0) = diagonal_start(offset);
        self.height.saturating_sub(i0).min(self.width.saturating_sub(j0))
    }

    /// Where diagonal `offset` lives: the path through the owner of its
    /// first entry, and that owner's position along the path. Stepping down
    /// the diagonal advances the owner by one grid row and one grid column,
    /// so entry `k` sits `k` positions further along the same path.
    fn diagonal_placement(&self, offset: isize) -> Result<(usize, usize), GmError> {
        if self.col_block != 1 || self.row_block != 1 {
            return Err(GmError::UnimplementedPath(format!(
                "diagonal of {} with block sizes ({},{})",
                self.pair, self.col_block, self.row_block
            )));
        }
        let (i0, j0) = diagonal_start(offset);
        let (grow, gcol) = match self.pair {
            DistPair::MC_MR => (self.owner_row(i0), self.owner_col(j0)),
            DistPair::MR_MC => (self.owner_col(j0), self.owner_row(i0)),
            _ => {
                return Err(GmError::Configuration(format!(
                    "diagonals live on [Mc, Mr] or [Mr, Mc] matrices, not {}",
                    self.pair
                )));
            }
        };
        Ok((self.grid.diag_path(grow, gcol), self.grid.diag_position(grow, gcol)))
    }

    fn check_align(&self, tag: Dist, align: usize) -> Result<(), GmError> {
        let stride = tag.stride(self.grid.height(), self.grid.width());
        if align >= stride {
            return Err(GmError::Configuration(format!(
                "alignment {align} out of range for {tag} (stride {stride})"
            )));
        }
        Ok(())
    }
}

impl<T: Zero + Clone, C: Comm> DistMatrix<T, C> {
    /// A zero-filled matrix with default alignments.
    pub fn with_shape(grid: Arc<Grid<C>>, pair: DistPair, height: usize, width: usize) -> Self {
        let mut m = Self::new(grid, pair);
        m.height = height;
        m.width = width;
        let (h, w) = (m.local_height(), m.local_width());
        m.local = Matrix::zeros(h, w);
        m
    }

    /// A fresh local buffer after any metadata change; contents are not
    /// kept. An attached buffer survives only if its extents are unchanged.
    fn resize_local(&mut self) -> Result<(), GmError> {
        let (h, w) = (self.local_height(), self.local_width());
        if self.local.is_locked() {
            return Err(GmError::Configuration(
                "cannot discard the contents of a locked matrix".into(),
            ));
        }
        if self.local.is_attached() {
            if self.local.height() == h && self.local.width() == w {
                return Ok(());
            }
            return Err(GmError::DimensionMismatch(
                "placement change would reshape an attached buffer".into(),
            ));
        }
        self.local = Matrix::zeros(h, w);
        Ok(())
    }

    /// Change the global shape, discarding contents. A no-op when the shape
    /// already matches.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<(), GmError> {
        if height == self.height && width == self.width {
            return Ok(());
        }
        self.height = height;
        self.width = width;
        self.resize_local()
    }

    /// Fix both alignments, marking them constrained. Discards contents.
    pub fn align(&mut self, col_align: usize, row_align: usize) -> Result<(), GmError> {
        self.check_align(self.pair.col(), col_align)?;
        self.check_align(self.pair.row(), row_align)?;
        self.col_align = col_align;
        self.row_align = row_align;
        self.col_constrained = true;
        self.row_constrained = true;
        self.resize_local()
    }

    pub fn align_cols(&mut self, align: usize) -> Result<(), GmError> {
        self.check_align(self.pair.col(), align)?;
        self.col_align = align;
        self.col_constrained = true;
        self.resize_local()
    }

    pub fn align_rows(&mut self, align: usize) -> Result<(), GmError> {
        self.check_align(self.pair.row(), align)?;
        self.row_align = align;
        self.row_constrained = true;
        self.resize_local()
    }

    /// Choose the owning rank (in column-major vector order) of a `[o,o]`
    /// matrix, or the path of a diagonal distribution.
    pub fn set_root(&mut self, root: usize) -> Result<(), GmError> {
        let limit = if self.pair == DistPair::CIRC_CIRC {
            self.grid.size()
        } else if self.pair.col() == Dist::Md || self.pair.row() == Dist::Md {
            self.grid.diag_paths()
        } else if root == 0 {
            return Ok(());
        } else {
            return Err(GmError::Configuration(format!(
                "distribution {} has a fixed root",
                self.pair
            )));
        };
        if root >= limit {
            return Err(GmError::Configuration(format!(
                "root {root} out of range (limit {limit}) for {}",
                self.pair
            )));
        }
        self.root = root;
        self.resize_local()
    }

    /// Set the block sizes of a block-cyclic layout. Discards contents.
    pub fn set_block_sizes(&mut self, col_block: usize, row_block: usize) -> Result<(), GmError> {
        if col_block == 0 || row_block == 0 {
            return Err(GmError::Configuration("block sizes must be at least 1".into()));
        }
        self.col_block = col_block;
        self.row_block = row_block;
        self.resize_local()
    }

    /// Copy alignments (and the constrained marks) from another matrix's
    /// placement metadata, axis by axis, without moving any data. Axes with
    /// no compatible tag in `data` are left as they are.
    pub fn align_with(&mut self, data: &DistData) -> Result<(), GmError> {
        self.align_axis_with(data, true)?;
        self.align_axis_with(data, false)
    }

    pub fn align_cols_with(&mut self, data: &DistData) -> Result<(), GmError> {
        self.align_axis_with(data, true)
    }

    pub fn align_rows_with(&mut self, data: &DistData) -> Result<(), GmError> {
        self.align_axis_with(data, false)
    }

    fn align_axis_with(&mut self, data: &DistData, col_axis: bool) -> Result<(), GmError> {
        if data.grid_id != self.grid.id() {
            return Err(GmError::Configuration(
                "cannot align with a matrix from a different grid".into(),
            ));
        }
        let my_tag = if col_axis { self.pair.col() } else { self.pair.row() };
        let adopted = adopt_align(my_tag, data, self.grid.height(), self.grid.width());
        if let Some(align) = adopted {
            if col_axis {
                self.col_align = align;
                self.col_constrained = true;
            } else {
                self.row_align = align;
                self.row_constrained = true;
            }
            self.resize_local()?;
        }
        Ok(())
    }

    /// Assignment-time adoption: unconstrained axes take a compatible
    /// alignment from the source so the transfer needs no extra hop.
    /// Constrained axes are left alone and never re-marked.
    pub(crate) fn adapt_alignment(&mut self, data: &DistData) -> Result<(), GmError> {
        debug_assert_eq!(data.grid_id, self.grid.id());
        let mut changed = false;
        if !self.col_constrained {
            if let Some(a) = adopt_align(self.pair.col(), data, self.grid.height(), self.grid.width()) {
                changed |= a != self.col_align;
                self.col_align = a;
            }
        }
        if !self.row_constrained {
            if let Some(a) = adopt_align(self.pair.row(), data, self.grid.height(), self.grid.width()) {
                changed |= a != self.row_align;
                self.row_align = a;
            }
        }
        if changed {
            self.resize_local()?;
        }
        Ok(())
    }

    /// Adopt an external column-major buffer as the local storage of a
    /// matrix with the given placement. The buffer length and leading
    /// dimension must cover this rank's share; block sizes are fixed at 1.
    #[allow(clippy::too_many_arguments)]
    pub fn attach(
        grid: Arc<Grid<C>>,
        pair: DistPair,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        root: usize,
        data: Vec<T>,
        ldim: usize,
    ) -> Result<Self, GmError> {
        Self::attach_impl(grid, pair, height, width, col_align, row_align, root, data, ldim, false)
    }

    /// Like [`DistMatrix::attach`], but the result refuses mutable access.
    #[allow(clippy::too_many_arguments)]
    pub fn locked_attach(
        grid: Arc<Grid<C>>,
        pair: DistPair,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        root: usize,
        data: Vec<T>,
        ldim: usize,
    ) -> Result<Self, GmError> {
        Self::attach_impl(grid, pair, height, width, col_align, row_align, root, data, ldim, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn attach_impl(
        grid: Arc<Grid<C>>,
        pair: DistPair,
        height: usize,
        width: usize,
        col_align: usize,
        row_align: usize,
        root: usize,
        data: Vec<T>,
        ldim: usize,
        locked: bool,
    ) -> Result<Self, GmError> {
        let mut m = Self::new(grid, pair);
        m.height = height;
        m.width = width;
        m.set_root(root)?;
        m.check_align(pair.col(), col_align)?;
        m.check_align(pair.row(), row_align)?;
        m.col_align = col_align;
        m.row_align = row_align;
        m.col_constrained = true;
        m.row_constrained = true;
        let (h, w) = (m.local_height(), m.local_width());
        m.local = if locked {
            Matrix::locked_attach(h, w, data, ldim)?
        } else {
            Matrix::attach(h, w, data, ldim)?
        };
        Ok(m)
    }

    /// Fill every locally stored entry from a function of the global
    /// indices. Collectively consistent when every rank uses the same `f`.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize, usize) -> T) -> Result<(), GmError> {
        let col = (self.col_shift(), self.col_block, self.col_stride());
        let row = (self.row_shift(), self.row_block, self.row_stride());
        self.local.fill_with(|i_loc, j_loc| {
            f(
                cyclic::local_to_global(i_loc, col.0, col.1, col.2),
                cyclic::local_to_global(j_loc, row.0, row.1, row.2),
            )
        })
    }

    /// Extract diagonal `offset` as an `[Md, o]` column vector whose path
    /// and alignment track this matrix, so every entry is copied on the rank
    /// that already owns it and no communication happens.
    pub fn get_diagonal(&self, offset: isize) -> Result<DistMatrix<T, C>, GmError> {
        let (path, position) = self.diagonal_placement(offset)?;
        let (i0, j0) = diagonal_start(offset);
        let mut d = DistMatrix::new(self.grid.clone(), DistPair::MD_STAR);
        d.set_root(path)?;
        d.align_cols(position)?;
        d.resize(self.diagonal_length(offset), 1)?;
        for k_loc in 0..d.local_height() {
            let k = d.global_row(k_loc);
            debug_assert!(self.is_local(i0 + k, j0 + k));
            let value = self.local.get(self.local_row(i0 + k), self.local_col(j0 + k)).clone();
            d.local.set(k_loc, 0, value)?;
        }
        Ok(d)
    }

    /// Write a column vector produced by [`DistMatrix::get_diagonal`] back
    /// over diagonal `offset`; the other entries are untouched. `d` must
    /// already carry the placement `get_diagonal` would choose here, so a
    /// diagonal computed elsewhere needs a redistribution hop first.
    pub fn set_diagonal(&mut self, d: &DistMatrix<T, C>, offset: isize) -> Result<(), GmError> {
        crate::redist::check_same_grid(d, self)?;
        let (path, position) = self.diagonal_placement(offset)?;
        let length = self.diagonal_length(offset);
        if d.pair != DistPair::MD_STAR {
            return Err(GmError::Configuration(format!(
                "diagonal must be [Md, o], got {}",
                d.pair
            )));
        }
        if (d.height, d.width) != (length, 1) {
            return Err(GmError::DimensionMismatch(format!(
                "diagonal is {} x {}, expected {length} x 1",
                d.height, d.width
            )));
        }
        if d.root != path || d.col_align != position || d.col_block != 1 {
            return Err(GmError::Configuration(format!(
                "diagonal placement (path {}, align {}) does not match this \
                 matrix (path {path}, align {position})",
                d.root, d.col_align
            )));
        }
        let (i0, j0) = diagonal_start(offset);
        for k_loc in 0..d.local_height() {
            let k = d.global_row(k_loc);
            debug_assert!(self.is_local(i0 + k, j0 + k));
            let (li, lj) = (self.local_row(i0 + k), self.local_col(j0 + k));
            self.local.set(li, lj, d.local.get(k_loc, 0).clone())?;
        }
        Ok(())
    }
}

impl<T: CommScalar + Zero, C: Comm> DistMatrix<T, C> {
    /// Assignment-style redistribution: overwrite this matrix (keeping its
    /// placement) with the global contents of `src`. Routes through the
    /// replicated intermediate when no direct algorithm applies.
    pub fn redistribute_from(&mut self, src: &DistMatrix<T, C>) -> Result<(), GmError> {
        crate::redist::redistribute(src, self, RedistOptions::default())
    }

    /// Sum partial contributions from a replicated distribution onto this
    /// matrix; see [`crate::redist::sum_scatter`].
    pub fn sum_scatter_from(&mut self, src: &DistMatrix<T, C>) -> Result<(), GmError>
    where
        T: AddAssign,
    {
        crate::redist::sum_scatter(src, self)
    }

    /// Fold scaled partial contributions onto this matrix, keeping its
    /// current contents; see [`crate::redist::sum_scatter_update`].
    pub fn sum_scatter_update_from(
        &mut self,
        alpha: T,
        src: &DistMatrix<T, C>,
    ) -> Result<(), GmError>
    where
        T: AddAssign + Mul<Output = T>,
    {
        crate::redist::sum_scatter_update(alpha, src, self)
    }
}

/// First global entry of a diagonal: `(0, offset)` above the main diagonal,
/// `(|offset|, 0)` below.
fn diagonal_start(offset: isize) -> (usize, usize) {
    if offset >= 0 {
        (0, offset as usize)
    } else {
        (offset.unsigned_abs(), 0)
    }
}

/// Alignment a `my_tag` axis adopts from another matrix's metadata: the
/// same-tag axis first, then the swapped axis, then the vector/elementwise
/// compatibility pairs (a vector axis adopts an elementwise alignment as-is;
/// an elementwise axis reduces a vector alignment modulo its own stride).
fn adopt_align(my_tag: Dist, data: &DistData, grid_height: usize, grid_width: usize) -> Option<usize> {
    let axes = [
        (data.pair.col(), data.col_align),
        (data.pair.row(), data.row_align),
    ];
    for (tag, align) in axes {
        if tag == my_tag && tag != Dist::Star && tag != Dist::Circ {
            return Some(align);
        }
    }
    for (tag, align) in axes {
        let adopted = match (my_tag, tag) {
            (Dist::Vc, Dist::Mc) => Some(align),
            (Dist::Mc, Dist::Vc) => Some(align % grid_height),
            (Dist::Vr, Dist::Mr) => Some(align),
            (Dist::Mr, Dist::Vr) => Some(align % grid_width),
            _ => None,
        };
        if adopted.is_some() {
            return adopted;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOrder;
    use crate::parallel::local_comm::spawn_world;
    use crate::parallel::LocalComm;

    fn grid_2x3(comm: LocalComm) -> Arc<Grid<LocalComm>> {
        Arc::new(Grid::new(comm, 2, 3, GridOrder::ColumnMajor).unwrap())
    }

    #[test]
    fn local_extents_cover_the_global_matrix() {
        for pair in DistPair::ALL {
            let sizes = spawn_world(6, move |comm| {
                let grid = grid_2x3(comm);
                let a = DistMatrix::<f64, _>::with_shape(grid, pair, 7, 5);
                a.local_height() * a.local_width()
            });
            let total: usize = sizes.iter().sum();
            let replicas = match pair {
                DistPair::STAR_STAR => 6,
                DistPair::MC_STAR | DistPair::STAR_MC => 3,
                DistPair::MR_STAR | DistPair::STAR_MR => 2,
                _ => 1,
            };
            assert_eq!(total, 35 * replicas, "{pair}");
        }
    }

    #[test]
    fn owner_arithmetic_agrees_with_storage() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 7, 5);
            for i in 0..7 {
                for j in 0..5 {
                    let mine = a.is_local(i, j);
                    let computed = a.col_position() == Some(a.owner_row(i))
                        && a.row_position() == Some(a.owner_col(j));
                    assert_eq!(mine, computed);
                    if mine {
                        assert_eq!(a.global_row(a.local_row(i)), i);
                        assert_eq!(a.global_col(a.local_col(j)), j);
                    }
                }
            }
        });
    }

    #[test]
    fn fill_and_get_owner_semantics() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 7, 5);
            a.fill_with(|i, j| (10 * i + j) as f64).unwrap();
            let mut seen = 0;
            for i in 0..7 {
                for j in 0..5 {
                    if let Some(&v) = a.get(i, j) {
                        assert_eq!(v, (10 * i + j) as f64);
                        seen += 1;
                    }
                }
            }
            assert_eq!(seen, a.local_height() * a.local_width());
        });
    }

    #[test]
    fn set_is_a_no_op_off_owner() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 4, 4);
            a.set(2, 3, 9.0).unwrap();
            if let Some(&v) = a.get(2, 3) {
                assert_eq!(v, 9.0);
            }
        });
    }

    #[test]
    fn diagonal_participation() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            // gcd(2,3) = 1: every rank lies on path 0.
            let a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MD_STAR, 10, 3);
            assert!(a.participating());
            assert_eq!(a.col_stride(), 6);
        });
        spawn_world(4, |comm| {
            let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
            let mut a = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MD_STAR, 8, 2);
            // Path 0 holds the two ranks with row == col.
            assert_eq!(a.participating(), grid.row() == grid.col());
            a.set_root(1).unwrap();
            assert_eq!(a.participating(), grid.row() != grid.col());
            if a.participating() {
                assert_eq!(a.local_height(), 4);
            } else {
                assert_eq!(a.local_height(), 0);
            }
        });
    }

    #[test]
    fn diagonal_length_follows_the_shape() {
        spawn_world(1, |comm| {
            let grid = Arc::new(Grid::new(comm, 1, 1, GridOrder::ColumnMajor).unwrap());
            let a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 5, 3);
            assert_eq!(a.diagonal_length(0), 3);
            assert_eq!(a.diagonal_length(1), 2);
            assert_eq!(a.diagonal_length(2), 1);
            assert_eq!(a.diagonal_length(3), 0);
            assert_eq!(a.diagonal_length(-2), 3);
            assert_eq!(a.diagonal_length(-4), 1);
            assert_eq!(a.diagonal_length(-5), 0);
        });
    }

    #[test]
    fn diagonals_come_out_aligned_and_local() {
        for pair in [DistPair::MC_MR, DistPair::MR_MC] {
            spawn_world(4, move |comm| {
                let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
                let mut a = DistMatrix::<f64, _>::with_shape(grid.clone(), pair, 5, 4);
                a.fill_with(|i, j| (10 * i + j) as f64).unwrap();
                for offset in [-2, 0, 1] {
                    let d = a.get_diagonal(offset).unwrap();
                    assert_eq!(d.pair(), DistPair::MD_STAR);
                    assert_eq!((d.height(), d.width()), (a.diagonal_length(offset), 1));
                    let on_path = grid.diag_path(grid.row(), grid.col()) == d.root();
                    assert_eq!(d.participating(), on_path);
                    let (i0, j0) = diagonal_start(offset);
                    for k_loc in 0..d.local_height() {
                        let k = d.global_row(k_loc);
                        let expect = (10 * (i0 + k) + (j0 + k)) as f64;
                        assert_eq!(*d.local().get(k_loc, 0), expect, "{pair} offset {offset}");
                    }
                }
            });
        }
    }

    #[test]
    fn diagonal_round_trip() {
        spawn_world(4, |comm| {
            let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
            let mut a = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 5, 4);
            a.align(1, 1).unwrap();
            a.fill_with(|i, j| (10 * i + j) as f64).unwrap();
            for offset in [-3, -1, 0, 2, 3] {
                let d = a.get_diagonal(offset).unwrap();
                let mut b = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 5, 4);
                b.align(1, 1).unwrap();
                b.set_diagonal(&d, offset).unwrap();
                for i in 0..5 {
                    for j in 0..4 {
                        if let Some(&v) = b.get(i, j) {
                            let on_diag = j as isize - i as isize == offset;
                            let expect = if on_diag { (10 * i + j) as f64 } else { 0.0 };
                            assert_eq!(v, expect, "offset {offset} at ({i}, {j})");
                        }
                    }
                }
            }
        });
    }

    #[test]
    fn diagonal_placement_is_checked() {
        spawn_world(4, |comm| {
            let grid = Arc::new(Grid::new(comm, 2, 2, GridOrder::ColumnMajor).unwrap());
            let a = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_STAR, 4, 4);
            assert!(a.get_diagonal(0).is_err());

            let src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 4, 4);
            let d = src.get_diagonal(0).unwrap();

            // Shifting the column alignment moves the diagonal to the other
            // of the 2 x 2 grid's two paths.
            let mut shifted = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 4, 4);
            shifted.align(1, 0).unwrap();
            assert!(shifted.set_diagonal(&d, 0).is_err());

            let mut b = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 4, 4);
            assert!(b.set_diagonal(&d, 1).is_err());

            let mut blocked = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 4, 4);
            blocked.set_block_sizes(2, 2).unwrap();
            assert!(blocked.get_diagonal(0).is_err());
        });
    }

    #[test]
    fn circ_owns_everything_at_root() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::CIRC_CIRC, 3, 4);
            a.set_root(5).unwrap();
            if grid.vc_rank() == 5 {
                assert_eq!((a.local_height(), a.local_width()), (3, 4));
            } else {
                assert_eq!((a.local_height(), a.local_width()), (0, 0));
            }
            assert!(a.set_root(6).is_err());
        });
    }

    #[test]
    fn alignment_shifts_ownership() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 6, 6);
            a.align(1, 2).unwrap();
            // Row 0 now belongs to grid row 1, column 0 to grid column 2.
            assert_eq!(a.owner_row(0), 1);
            assert_eq!(a.owner_col(0), 2);
            assert_eq!(a.local_height(), 3);
            assert_eq!(a.local_width(), 2);
            assert!(a.align(2, 0).is_err());
        });
    }

    #[test]
    fn align_with_adoption_rules() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut src = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 6, 6);
            src.align(1, 2).unwrap();
            let data = src.dist_data();

            // Same tags adopt directly.
            let mut a = DistMatrix::<f64, _>::new(grid.clone(), DistPair::MC_MR);
            a.align_with(&data).unwrap();
            assert_eq!((a.col_align(), a.row_align()), (1, 2));

            // Swapped tags adopt crosswise.
            let mut b = DistMatrix::<f64, _>::new(grid.clone(), DistPair::MR_MC);
            b.align_with(&data).unwrap();
            assert_eq!((b.col_align(), b.row_align()), (2, 1));

            // A vector axis adopts an elementwise alignment as-is.
            let mut c = DistMatrix::<f64, _>::new(grid.clone(), DistPair::VC_STAR);
            c.align_cols_with(&data).unwrap();
            assert_eq!(c.col_align(), 1);

            // An elementwise axis reduces a vector alignment mod its stride.
            let mut v = DistMatrix::<f64, _>::new(grid.clone(), DistPair::VC_STAR);
            v.align_cols(5).unwrap();
            let mut d = DistMatrix::<f64, _>::new(grid.clone(), DistPair::MC_MR);
            d.align_cols_with(&v.dist_data()).unwrap();
            assert_eq!(d.col_align(), 1);

            // Star axes adopt nothing.
            let mut e = DistMatrix::<f64, _>::new(grid, DistPair::STAR_STAR);
            e.align_with(&data).unwrap();
            assert_eq!((e.col_align(), e.row_align()), (0, 0));
        });
    }

    #[test]
    fn attach_and_release() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let template = DistMatrix::<f64, _>::with_shape(grid.clone(), DistPair::MC_MR, 7, 5);
            let (h, w) = (template.local_height(), template.local_width());
            let buf: Vec<f64> = (0..h.max(1) * w).map(|x| x as f64).collect();
            let a = DistMatrix::attach(
                grid,
                DistPair::MC_MR,
                7,
                5,
                0,
                0,
                0,
                buf.clone(),
                h.max(1),
            )
            .unwrap();
            assert!(a.local().is_attached());
            assert_eq!(a.local().height(), h);
            let released = a.into_local().into_vec();
            assert_eq!(released, buf);
        });
    }

    #[test]
    fn blocked_layout_changes_local_extents() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid, DistPair::MC_MR, 7, 5);
            a.set_block_sizes(2, 2).unwrap();
            // Row blocks [0,1],[2,3],[4,5],[6] alternate between grid rows.
            let expect_h = if a.col_position() == Some(0) { 4 } else { 3 };
            assert_eq!(a.local_height(), expect_h);
            assert!(a.set_block_sizes(0, 1).is_err());
        });
    }

    #[test]
    fn resize_discards_and_reallocates() {
        spawn_world(6, |comm| {
            let grid = grid_2x3(comm);
            let mut a = DistMatrix::<f64, _>::with_shape(grid, DistPair::VC_STAR, 6, 2);
            assert_eq!(a.local_height(), 1);
            a.resize(12, 3).unwrap();
            assert_eq!(a.local_height(), 2);
            assert_eq!(a.local_width(), 3);
        });
    }
}
