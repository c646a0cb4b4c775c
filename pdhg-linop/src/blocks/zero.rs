use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, PdhgCoreError, Real};

use crate::block::Block;

/// An all-zero tile. Declares extent without contributing to any product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockZero {
    row: usize,
    col: usize,
    nrows: usize,
    ncols: usize,
}

impl BlockZero {
    pub fn new(row: usize, col: usize, nrows: usize, ncols: usize) -> Result<Self, PdhgCoreError> {
        if nrows == 0 || ncols == 0 {
            return Err(PdhgCoreError::InvalidDimensions(format!(
                "Zero block needs a positive extent, got {}x{}",
                nrows, ncols
            )));
        }
        Ok(Self {
            row,
            col,
            nrows,
            ncols,
        })
    }
}

impl<T: Real> Block<T> for BlockZero {
    fn row(&self) -> usize {
        self.row
    }

    fn col(&self) -> usize {
        self.col
    }

    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn row_sum_local(&self, _row: usize, _alpha: T) -> T {
        T::zero()
    }

    fn col_sum_local(&self, _col: usize, _alpha: T) -> T {
        T::zero()
    }

    fn eval_local_add_host(&self, _res: &mut [T], _rhs: &[T]) {}

    fn eval_adjoint_local_add_host(&self, _res: &mut [T], _rhs: &[T]) {}

    fn eval_local_add(
        &self,
        _device: &GpuDevice,
        _encoder: &mut wgpu::CommandEncoder,
        _res: GpuRangeMut<'_, T>,
        _rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        Ok(())
    }

    fn eval_adjoint_local_add(
        &self,
        _device: &GpuDevice,
        _encoder: &mut wgpu::CommandEncoder,
        _res: GpuRangeMut<'_, T>,
        _rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_block_contributes_nothing() {
        let block = BlockZero::new(2, 0, 3, 4).unwrap();
        let mut res = vec![1.0f32; 3];
        Block::<f32>::eval_local_add_host(&block, &mut res, &[5.0; 4]);
        assert_eq!(res, vec![1.0; 3]);
        assert_eq!(Block::<f32>::row_sum(&block, 3, 1.0), 0.0);
        assert_eq!(Block::<f32>::col_sum(&block, 3, 2.0), 0.0);
    }

    #[test]
    fn test_zero_block_rejects_empty_extent() {
        assert!(matches!(
            BlockZero::new(0, 0, 0, 4),
            Err(PdhgCoreError::InvalidDimensions(_))
        ));
    }
}
