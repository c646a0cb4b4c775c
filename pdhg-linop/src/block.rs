use std::fmt::Debug;
use std::ops::Range;

use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, PdhgCoreError, Real};

/// One tile of a block-structured linear operator.
///
/// A block occupies rows `[row, row + nrows)` and columns `[col, col + ncols)`
/// of the composite matrix. Forward evaluation reads only its column range and
/// *adds* into its row range; the adjoint reads the row range and adds into the
/// column range. Blocks never overwrite, so several blocks may accumulate into
/// the same output rows.
///
/// Range sizes are checked by the owning [`LinearOperator`](crate::LinearOperator);
/// implementations may assume `res`/`rhs` match their extents.
pub trait Block<T: Real>: Debug + Send + Sync {
    /// Global row offset.
    fn row(&self) -> usize;
    /// Global column offset.
    fn col(&self) -> usize;
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;

    fn rows(&self) -> Range<usize> {
        self.row()..self.row() + self.nrows()
    }

    fn cols(&self) -> Range<usize> {
        self.col()..self.col() + self.ncols()
    }

    /// Auxiliary device memory in bytes, beyond the input and output ranges.
    fn gpu_mem_amount(&self) -> usize {
        0
    }

    /// `Σ_j |A[row, j]|^alpha` for a row local to this block.
    fn row_sum_local(&self, row: usize, alpha: T) -> T;

    /// `Σ_i |A[i, col]|^alpha` for a column local to this block.
    fn col_sum_local(&self, col: usize, alpha: T) -> T;

    /// Row norm for a global row; zero outside this block's rows.
    fn row_sum(&self, row: usize, alpha: T) -> T {
        if self.rows().contains(&row) {
            self.row_sum_local(row - self.row(), alpha)
        } else {
            T::zero()
        }
    }

    /// Column norm for a global column; zero outside this block's columns.
    fn col_sum(&self, col: usize, alpha: T) -> T {
        if self.cols().contains(&col) {
            self.col_sum_local(col - self.col(), alpha)
        } else {
            T::zero()
        }
    }

    /// `res += A_block * rhs` on host slices (`res.len() == nrows`, `rhs.len() == ncols`).
    fn eval_local_add_host(&self, res: &mut [T], rhs: &[T]);

    /// `res += A_blockᵗ * rhs` on host slices (`res.len() == ncols`, `rhs.len() == nrows`).
    fn eval_adjoint_local_add_host(&self, res: &mut [T], rhs: &[T]);

    /// Records `res += A_block * rhs` on `encoder`.
    fn eval_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError>;

    /// Records `res += A_blockᵗ * rhs` on `encoder`.
    fn eval_adjoint_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError>;

    /// Compiles the block's kernels ahead of the first evaluation.
    fn prepare(&self, _device: &GpuDevice) -> Result<(), PdhgCoreError> {
        Ok(())
    }
}

/// Converts a buffer index into the `u32` the kernels address with.
pub(crate) fn kernel_index(value: usize, what: &str) -> Result<u32, PdhgCoreError> {
    u32::try_from(value).map_err(|_| {
        PdhgCoreError::InvalidDimensions(format!(
            "{} ({}) exceeds the kernel index range",
            what, value
        ))
    })
}
