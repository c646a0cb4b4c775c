use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, PdhgCoreError, Real};

use super::Grid;
use crate::block::Block;

/// Gradient over `nx × ny × nl` with channels `(dx, dy, dl)`.
///
/// Occupies `3·nx·ny·nl` rows and `nx·ny·nl` columns. The label axis is
/// differenced like a third spatial axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGradient3D {
    row: usize,
    col: usize,
    grid: Grid,
}

impl BlockGradient3D {
    pub fn new(
        row: usize,
        col: usize,
        nx: usize,
        ny: usize,
        nl: usize,
        label_first: bool,
    ) -> Result<Self, PdhgCoreError> {
        let grid = Grid::new(nx, ny, nl, label_first, 3)?;
        log::debug!(
            "BlockGradient3D at ({}, {}): {}x{}x{}, label_first={}",
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

impl<T: Real> Block<T> for BlockGradient3D {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::gradient::test_util::{assert_adjoint, assert_norms_match_dense};

    fn forward(block: &BlockGradient3D, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; Block::<f64>::nrows(block)];
        block.eval_local_add_host(&mut y, x);
        y
    }

    #[test]
    fn test_line_forward_and_adjoint() {
        let block = BlockGradient3D::new(0, 0, 3, 1, 1, false).unwrap();
        assert_eq!(
            forward(&block, &[1.0, 2.0, 5.0]),
            vec![1.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        );

        let mut x = vec![0.0f64; 3];
        block.eval_adjoint_local_add_host(&mut x, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(x, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_forward_accumulates() {
        let block = BlockGradient3D::new(0, 0, 3, 1, 1, false).unwrap();
        let mut y = vec![1.0f64; 9];
        block.eval_local_add_host(&mut y, &[1.0, 2.0, 5.0]);
        assert_eq!(y, vec![2.0, 1.0, 1.0, 4.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_neumann_faces_are_zero() {
        let (nx, ny, nl) = (3, 4, 2);
        let block = BlockGradient3D::new(0, 0, nx, ny, nl, false).unwrap();
        let mut rng = fastrand::Rng::with_seed(7);
        let x: Vec<f64> = (0..nx * ny * nl).map(|_| rng.f64() + 1.0).collect();
        let y = forward(&block, &x);
        for il in 0..nl {
            for iy in 0..ny {
                for ix in 0..nx {
                    let v = (il * ny + iy) * nx + ix;
                    if ix + 1 == nx {
                        assert_eq!(y[3 * v], 0.0);
                    }
                    if iy + 1 == ny {
                        assert_eq!(y[3 * v + 1], 0.0);
                    }
                    if il + 1 == nl {
                        assert_eq!(y[3 * v + 2], 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_layouts_agree_on_permuted_input() {
        let (nx, ny, nl) = (3, 2, 4);
        let pixel_first = BlockGradient3D::new(0, 0, nx, ny, nl, false).unwrap();
        let label_first = BlockGradient3D::new(0, 0, nx, ny, nl, true).unwrap();

        let mut rng = fastrand::Rng::with_seed(11);
        let x: Vec<f64> = (0..nx * ny * nl).map(|_| rng.f64()).collect();
        let mut permuted = vec![0.0; x.len()];
        for il in 0..nl {
            for iy in 0..ny {
                for ix in 0..nx {
                    permuted[(ix * ny + iy) * nl + il] = x[(il * ny + iy) * nx + ix];
                }
            }
        }
        assert_eq!(forward(&pixel_first, &x), forward(&label_first, &permuted));

        let v: Vec<f64> = (0..3 * nx * ny * nl).map(|_| rng.f64()).collect();
        let mut back = vec![0.0; x.len()];
        pixel_first.eval_adjoint_local_add_host(&mut back, &v);
        let mut back_permuted = vec![0.0; x.len()];
        label_first.eval_adjoint_local_add_host(&mut back_permuted, &v);
        for il in 0..nl {
            for iy in 0..ny {
                for ix in 0..nx {
                    assert_eq!(
                        back[(il * ny + iy) * nx + ix],
                        back_permuted[(ix * ny + iy) * nl + il]
                    );
                }
            }
        }
    }

    #[test]
    fn test_adjoint_law() {
        for label_first in [false, true] {
            assert_adjoint(&BlockGradient3D::new(0, 0, 4, 3, 2, label_first).unwrap(), 1);
            assert_adjoint(&BlockGradient3D::new(0, 0, 1, 5, 3, label_first).unwrap(), 2);
        }
    }

    #[test]
    fn test_norms_match_dense_matrix() {
        assert_norms_match_dense(&BlockGradient3D::new(0, 0, 2, 2, 1, false).unwrap());
        assert_norms_match_dense(&BlockGradient3D::new(0, 0, 3, 2, 3, false).unwrap());
        assert_norms_match_dense(&BlockGradient3D::new(0, 0, 3, 2, 3, true).unwrap());
    }

    #[test]
    fn test_line_norms() {
        let block = BlockGradient3D::new(5, 2, 3, 1, 1, false).unwrap();
        let rows: Vec<f32> = (5..14).map(|r| Block::<f32>::row_sum(&block, r, 1.0)).collect();
        assert_eq!(rows, vec![2.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let cols: Vec<f32> = (2..5).map(|c| Block::<f32>::col_sum(&block, c, 2.0)).collect();
        assert_eq!(cols, vec![1.0, 2.0, 1.0]);
        assert_eq!(Block::<f32>::row_sum(&block, 4, 1.0), 0.0);
        assert_eq!(Block::<f32>::col_sum(&block, 5, 1.0), 0.0);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            BlockGradient3D::new(0, 0, 3, 0, 1, false),
            Err(PdhgCoreError::InvalidDimensions(_))
        ));
    }
}
