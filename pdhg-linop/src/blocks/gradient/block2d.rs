use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, PdhgCoreError, Real};

use super::Grid;
use crate::block::Block;

/// Spatial gradient over `nx × ny` for each of `nl` labels, channels `(dx, dy)`.
///
/// Labels are independent slices; no difference is taken across them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGradient2D {
    row: usize,
    col: usize,
    grid: Grid,
}

impl BlockGradient2D {
    pub fn new(
        row: usize,
        col: usize,
        nx: usize,
        ny: usize,
        nl: usize,
        label_first: bool,
    ) -> Result<Self, PdhgCoreError> {
        let grid = Grid::new(nx, ny, nl, label_first, 2)?;
        log::debug!(
            "BlockGradient2D at ({}, {}): {}x{} with {} labels, label_first={}",
            row,
            col,
            nx,
            ny,
            nl,
            label_first
        );
        Ok(Self { row, col, grid })
    }

    pub fn nx(&self) -> usize {
        self.grid.nx()
    }

    pub fn ny(&self) -> usize {
        self.grid.ny()
    }

    pub fn nl(&self) -> usize {
        self.grid.nl()
    }

    pub fn label_first(&self) -> bool {
        self.grid.label_first()
    }
}

impl<T: Real> Block<T> for BlockGradient2D {
    fn row(&self) -> usize {
        self.row
    }

    fn col(&self) -> usize {
        self.col
    }

    fn nrows(&self) -> usize {
        self.grid.outputs()
    }

    fn ncols(&self) -> usize {
        self.grid.voxels()
    }

    fn row_sum_local(&self, row: usize, _alpha: T) -> T {
        self.grid.row_sum(row)
    }

    fn col_sum_local(&self, col: usize, _alpha: T) -> T {
        self.grid.col_sum(col)
    }

    fn eval_local_add_host(&self, res: &mut [T], rhs: &[T]) {
        self.grid.forward_add(res, rhs);
    }

    fn eval_adjoint_local_add_host(&self, res: &mut [T], rhs: &[T]) {
        self.grid.adjoint_add(res, rhs);
    }

    fn eval_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.grid.encode_forward(device, encoder, res, rhs)
    }

    fn eval_adjoint_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.grid.encode_adjoint(device, encoder, res, rhs)
    }

    fn prepare(&self, device: &GpuDevice) -> Result<(), PdhgCoreError> {
        self.grid.prepare::<T>(device)
    }
}
