//! Local column-major matrix storage.
//!
//! `Matrix<T>` is the per-rank buffer behind every distributed matrix: a
//! column-major `Vec<T>` with an explicit leading dimension, either owned or
//! adopted from the caller via [`Matrix::attach`]. Numerical kernels borrow
//! the storage as `faer` views ([`Matrix::as_faer`] / [`Matrix::as_faer_mut`]);
//! [`Matrix::to_faer`] / [`Matrix::from_faer`] copy instead.

use bitflags::bitflags;
use faer::{Mat, MatMut, MatRef};
use num_traits::Zero;

use crate::error::GmError;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct MatrixFlags: u8 {
        /// Mutable access is refused.
        const LOCKED   = 0b01;
        /// The buffer was adopted from the caller, not allocated here.
        const ATTACHED = 0b10;
    }
}

/// Column-major storage with leading dimension `ldim >= max(height, 1)`.
///
/// Entry `(i, j)` lives at `data[i + j * ldim]`. The rows between `height`
/// and `ldim` of each column are padding and never read.
#[derive(Debug, Clone)]
pub struct Matrix<T> {
    data: Vec<T>,
    height: usize,
    width: usize,
    ldim: usize,
    flags: MatrixFlags,
}

impl<T> Matrix<T> {
    /// An empty 0 x 0 matrix; allocates nothing.
    pub fn new() -> Self {
        Matrix { data: Vec::new(), height: 0, width: 0, ldim: 1, flags: MatrixFlags::empty() }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Leading dimension of the buffer; the stride between columns.
    pub fn ldim(&self) -> usize {
        self.ldim
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    pub fn is_locked(&self) -> bool {
        self.flags.contains(MatrixFlags::LOCKED)
    }

    pub fn is_attached(&self) -> bool {
        self.flags.contains(MatrixFlags::ATTACHED)
    }

    /// Adopt a caller-provided column-major buffer without copying.
    ///
    /// The buffer must hold at least `ldim * width` entries with
    /// `ldim >= max(height, 1)`.
    pub fn attach(height: usize, width: usize, data: Vec<T>, ldim: usize) -> Result<Self, GmError> {
        if ldim < height.max(1) {
            return Err(GmError::Configuration(format!(
                "leading dimension {ldim} is smaller than the height {height}"
            )));
        }
        if data.len() < ldim * width {
            return Err(GmError::Configuration(format!(
                "buffer of {} entries cannot back a {height} x {width} matrix with leading dimension {ldim}",
                data.len()
            )));
        }
        Ok(Matrix { data, height, width, ldim, flags: MatrixFlags::ATTACHED })
    }

    /// Like [`Matrix::attach`], but the result refuses all mutable access.
    pub fn locked_attach(
        height: usize,
        width: usize,
        data: Vec<T>,
        ldim: usize,
    ) -> Result<Self, GmError> {
        let mut m = Self::attach(height, width, data, ldim)?;
        m.flags |= MatrixFlags::LOCKED;
        Ok(m)
    }

    /// Release the underlying buffer. Column `j` starts at `j * ldim()`.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, i: usize, j: usize) -> &T {
        assert!(i < self.height && j < self.width, "index ({i}, {j}) out of bounds");
        &self.data[i + j * self.ldim]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) -> Result<(), GmError> {
        if self.is_locked() {
            return Err(GmError::Configuration("matrix is locked".into()));
        }
        assert!(i < self.height && j < self.width, "index ({i}, {j}) out of bounds");
        self.data[i + j * self.ldim] = value;
        Ok(())
    }

    /// Column `j` as a contiguous slice of `height` entries.
    pub fn col(&self, j: usize) -> &[T] {
        assert!(j < self.width, "column {j} out of bounds");
        &self.data[j * self.ldim..j * self.ldim + self.height]
    }

    /// The whole buffer, padding included.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the whole buffer; fails on a locked matrix so that
    /// the lock check happens once, before any bulk write.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T], GmError> {
        if self.is_locked() {
            return Err(GmError::Configuration("matrix is locked".into()));
        }
        Ok(&mut self.data)
    }

    /// Borrow the storage as a `faer` view; the padding rows between `height`
    /// and `ldim` stay outside it.
    pub fn as_faer(&self) -> MatRef<'_, T> {
        MatRef::from_column_major_slice_with_stride(&self.data, self.height, self.width, self.ldim)
    }

    /// Mutable `faer` view over the same storage, so kernels can write results
    /// in place; fails on a locked matrix.
    pub fn as_faer_mut(&mut self) -> Result<MatMut<'_, T>, GmError> {
        if self.is_locked() {
            return Err(GmError::Configuration("matrix is locked".into()));
        }
        Ok(MatMut::from_column_major_slice_with_stride_mut(
            &mut self.data,
            self.height,
            self.width,
            self.ldim,
        ))
    }
}

impl<T: Zero + Clone> Matrix<T> {
    /// A zero-filled `height x width` matrix with a tight leading dimension.
    pub fn zeros(height: usize, width: usize) -> Self {
        let ldim = height.max(1);
        Matrix {
            data: vec![T::zero(); ldim * width],
            height,
            width,
            ldim,
            flags: MatrixFlags::empty(),
        }
    }

    /// Reshape to `height x width`, discarding the current contents.
    pub fn resize(&mut self, height: usize, width: usize) -> Result<(), GmError> {
        if self.is_locked() {
            return Err(GmError::Configuration("cannot resize a locked matrix".into()));
        }
        if height == self.height && width == self.width {
            return Ok(());
        }
        *self = Self::zeros(height, width);
        Ok(())
    }
}

impl<T: Clone> Matrix<T> {
    /// Fill entry-by-entry from a function of the (local) indices.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize, usize) -> T) -> Result<(), GmError> {
        if self.is_locked() {
            return Err(GmError::Configuration("matrix is locked".into()));
        }
        for j in 0..self.width {
            for i in 0..self.height {
                self.data[i + j * self.ldim] = f(i, j);
            }
        }
        Ok(())
    }

    /// Copy into a `faer` matrix for use by numerical kernels.
    pub fn to_faer(&self) -> Mat<T> {
        Mat::from_fn(self.height, self.width, |i, j| self.data[i + j * self.ldim].clone())
    }
}

impl<T: Zero + Clone> Matrix<T> {
    /// Copy out of a `faer` matrix.
    pub fn from_faer(m: &Mat<T>) -> Self {
        let mut out = Self::zeros(m.nrows(), m.ncols());
        for j in 0..out.width {
            for i in 0..out.height {
                out.data[i + j * out.ldim] = m[(i, j)].clone();
            }
        }
        out
    }
}

impl<T> Default for Matrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> PartialEq for Matrix<T> {
    /// Logical equality: same shape and entries; padding and flags ignored.
    fn eq(&self, other: &Self) -> bool {
        if self.height != other.height || self.width != other.width {
            return false;
        }
        for j in 0..self.width {
            if self.col(j) != other.col(j) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_and_set_get() {
        let mut m = Matrix::<f64>::zeros(3, 2);
        assert_eq!((m.height(), m.width(), m.ldim()), (3, 2, 3));
        m.set(2, 1, 5.0).unwrap();
        assert_eq!(*m.get(2, 1), 5.0);
        assert_eq!(m.col(1), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn attach_respects_leading_dimension() {
        // 2 x 2 logical matrix inside a buffer with ldim 3.
        let buf = vec![1.0, 2.0, -1.0, 3.0, 4.0, -1.0];
        let m = Matrix::attach(2, 2, buf, 3).unwrap();
        assert!(m.is_attached());
        assert_eq!(*m.get(0, 1), 3.0);
        assert_eq!(m.col(1), &[3.0, 4.0]);
        assert_eq!(m.into_vec().len(), 6);
    }

    #[test]
    fn attach_rejects_short_buffers() {
        assert!(Matrix::attach(3, 2, vec![0.0; 5], 3).is_err());
        assert!(Matrix::attach(3, 2, vec![0.0; 6], 2).is_err());
    }

    #[test]
    fn locked_refuses_mutation() {
        let mut m = Matrix::locked_attach(2, 1, vec![1.0, 2.0], 2).unwrap();
        assert!(m.is_locked());
        assert!(m.set(0, 0, 9.0).is_err());
        assert!(m.as_mut_slice().is_err());
        assert!(m.as_faer_mut().is_err());
        assert!(m.resize(3, 3).is_err());
        assert_eq!(*m.get(1, 0), 2.0);
        assert_eq!(m.as_faer()[(1, 0)], 2.0);
    }

    #[test]
    fn faer_round_trip() {
        let mut m = Matrix::<f64>::zeros(3, 4);
        m.fill_with(|i, j| (i * 10 + j) as f64).unwrap();
        let f = m.to_faer();
        assert_eq!(f[(2, 3)], 23.0);
        let back = Matrix::from_faer(&f);
        assert_eq!(back, m);
    }

    #[test]
    fn faer_views_borrow_the_storage() {
        let mut m = Matrix::<f64>::zeros(3, 2);
        m.set(2, 1, 8.0).unwrap();
        assert_eq!(m.as_faer()[(2, 1)], 8.0);

        let mut v = m.as_faer_mut().unwrap();
        v[(0, 1)] = 5.0;
        v[(2, 0)] = -1.0;
        assert_eq!(*m.get(0, 1), 5.0);
        assert_eq!(*m.get(2, 0), -1.0);
    }

    #[test]
    fn faer_views_respect_leading_dimension() {
        // 2 x 2 window inside a buffer with one padding row per column.
        let buf = vec![1.0, 2.0, -9.0, 3.0, 4.0, -9.0];
        let mut m = Matrix::attach(2, 2, buf, 3).unwrap();
        let v = m.as_faer();
        assert_eq!((v.nrows(), v.ncols()), (2, 2));
        assert_eq!(v[(1, 1)], 4.0);

        m.as_faer_mut().unwrap()[(0, 1)] = 30.0;
        assert_eq!(*m.get(0, 1), 30.0);
        assert_eq!(m.as_slice()[2], -9.0);
        assert_eq!(m.as_slice()[5], -9.0);
    }

    #[test]
    fn equality_ignores_padding() {
        let a = Matrix::attach(2, 2, vec![1.0, 2.0, 99.0, 3.0, 4.0, -99.0], 3).unwrap();
        let mut b = Matrix::<f64>::zeros(2, 2);
        b.fill_with(|i, j| [[1.0, 3.0], [2.0, 4.0]][i][j]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_matrices() {
        let m = Matrix::<f64>::new();
        assert!(m.is_empty());
        let z = Matrix::<f64>::zeros(0, 5);
        assert!(z.is_empty());
        assert_eq!(z.ldim(), 1);
    }
}
