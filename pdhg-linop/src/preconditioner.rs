use pdhg_core::{GpuDevice, GpuVector, PdhgCoreError, Real};

use crate::linear_operator::LinearOperator;

/// Diagonal step sizes for the primal-dual iteration.
///
/// With `Σ = diag(left)` and `T = diag(right)`, the choice
/// `left[i] = 1 / Σ_j |A_ij|^alpha`, `right[j] = 1 / Σ_i |A_ij|^(2 - alpha)`
/// keeps `‖Σ^½ A T^½‖ ≤ 1` for any `alpha ∈ [0, 2]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalPreconditioner<T: Real> {
    /// Dual step sizes, one per operator row.
    pub left: Vec<T>,
    /// Primal step sizes, one per operator column.
    pub right: Vec<T>,
}

impl<T: Real> DiagonalPreconditioner<T> {
    pub fn compute(op: &LinearOperator<T>, alpha: T) -> Result<Self, PdhgCoreError> {
        let two = T::one() + T::one();
        if !(alpha >= T::zero() && alpha <= two) {
            return Err(PdhgCoreError::InvalidParameter(format!(
                "Preconditioner alpha must lie in [0, 2], got {:?}",
                alpha
            )));
        }
        let left = (0..op.nrows())
            .map(|i| step_size(op.row_sum(i, alpha)))
            .collect();
        let right = (0..op.ncols())
            .map(|j| step_size(op.col_sum(j, two - alpha)))
            .collect();
        log::debug!(
            "Diagonal preconditioner for {}x{} operator, alpha = {:?}",
            op.nrows(),
            op.ncols(),
            alpha
        );
        Ok(Self { left, right })
    }

    /// Uploads `(left, right)` to the device.
    pub fn upload(&self, device: &GpuDevice) -> Result<(GpuVector<T>, GpuVector<T>), PdhgCoreError> {
        let left = device.create_vector("preconditioner_left", &self.left)?;
        let right = device.create_vector("preconditioner_right", &self.right)?;
        Ok((left, right))
    }
}

// A row or column with no coupling gets a unit step.
fn step_size<T: Real>(sum: T) -> T {
    if sum > T::zero() {
        T::one() / sum
    } else {
        T::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_size() {
        assert_eq!(step_size(4.0f32), 0.25);
        assert_eq!(step_size(0.0f32), 1.0);
    }
}
