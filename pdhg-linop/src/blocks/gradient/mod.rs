//! Forward-difference gradients with Neumann boundaries.
//!
//! The domain is `nx × ny × nl` (`nl` labels). Outputs are pixel-major with the
//! channels of one voxel interleaved: voxel `v = (il·ny + iy)·nx + ix` owns
//! rows `channels·v .. channels·v + channels`. The input layout depends on
//! `label_first`:
//!
//! - `false`: `(il·ny + iy)·nx + ix`
//! - `true`:  `(ix·ny + iy)·nl + il`
//!
//! A difference that would step past the last index of its axis is zero.

mod block2d;
mod block3d;
mod shader;

pub use block2d::BlockGradient2D;
pub use block3d::BlockGradient3D;

use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, Kernel, PdhgCoreError, Real};

use crate::block::kernel_index;
use shader::{GradientParams, GRADIENT_ADJOINT, GRADIENT_FORWARD};

/// Domain shape shared by the 2D and 3D gradient blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Grid {
    nx: usize,
    ny: usize,
    nl: usize,
    label_first: bool,
    /// 2 for `(dx, dy)`, 3 for `(dx, dy, dl)`.
    channels: usize,
}

impl Grid {
    pub(crate) fn new(
        nx: usize,
        ny: usize,
        nl: usize,
        label_first: bool,
        channels: usize,
    ) -> Result<Self, PdhgCoreError> {
        if nx == 0 || ny == 0 || nl == 0 {
            return Err(PdhgCoreError::InvalidDimensions(format!(
                "Gradient domain must be non-empty, got {}x{}x{}",
                nx, ny, nl
            )));
        }
        let outputs = nx
            .checked_mul(ny)
            .and_then(|n| n.checked_mul(nl))
            .and_then(|n| n.checked_mul(channels));
        if outputs.is_none() {
            return Err(PdhgCoreError::InvalidDimensions(format!(
                "Gradient domain {}x{}x{} overflows the index range",
                nx, ny, nl
            )));
        }
        Ok(Self {
            nx,
            ny,
            nl,
            label_first,
            channels,
        })
    }

    pub(crate) fn nx(&self) -> usize {
        self.nx
    }

    pub(crate) fn ny(&self) -> usize {
        self.ny
    }

    pub(crate) fn nl(&self) -> usize {
        self.nl
    }

    pub(crate) fn label_first(&self) -> bool {
        self.label_first
    }

    pub(crate) fn voxels(&self) -> usize {
        self.nx * self.ny * self.nl
    }

    pub(crate) fn outputs(&self) -> usize {
        self.voxels() * self.channels
    }

    fn input_index(&self, ix: usize, iy: usize, il: usize) -> usize {
        if self.label_first {
            (ix * self.ny + iy) * self.nl + il
        } else {
            (il * self.ny + iy) * self.nx + ix
        }
    }

    /// Coordinates of output voxel `v`.
    fn voxel_coords(&self, v: usize) -> [usize; 3] {
        [v % self.nx, (v / self.nx) % self.ny, v / (self.nx * self.ny)]
    }

    /// Coordinates of input element `idx` under the configured layout.
    fn input_coords(&self, idx: usize) -> [usize; 3] {
        if self.label_first {
            [idx / (self.nl * self.ny), (idx / self.nl) % self.ny, idx % self.nl]
        } else {
            self.voxel_coords(idx)
        }
    }

    fn extents(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nl]
    }

    pub(crate) fn forward_add<T: Real>(&self, res: &mut [T], rhs: &[T]) {
        for il in 0..self.nl {
            for iy in 0..self.ny {
                for ix in 0..self.nx {
                    let v = (il * self.ny + iy) * self.nx + ix;
                    let out = v * self.channels;
                    let center = rhs[self.input_index(ix, iy, il)];
                    if ix + 1 < self.nx {
                        res[out] = res[out] + (rhs[self.input_index(ix + 1, iy, il)] - center);
                    }
                    if iy + 1 < self.ny {
                        res[out + 1] =
                            res[out + 1] + (rhs[self.input_index(ix, iy + 1, il)] - center);
                    }
                    if self.channels == 3 && il + 1 < self.nl {
                        res[out + 2] =
                            res[out + 2] + (rhs[self.input_index(ix, iy, il + 1)] - center);
                    }
                }
            }
        }
    }

    pub(crate) fn adjoint_add<T: Real>(&self, res: &mut [T], rhs: &[T]) {
        let c = self.channels;
        let plane = self.nx * self.ny;
        for il in 0..self.nl {
            for iy in 0..self.ny {
                for ix in 0..self.nx {
                    let v = (il * self.ny + iy) * self.nx + ix;
                    let mut acc = T::zero();
                    if ix + 1 < self.nx {
                        acc = acc - rhs[v * c];
                    }
                    if ix > 0 {
                        acc = acc + rhs[(v - 1) * c];
                    }
                    if iy + 1 < self.ny {
                        acc = acc - rhs[v * c + 1];
                    }
                    if iy > 0 {
                        acc = acc + rhs[(v - self.nx) * c + 1];
                    }
                    if c == 3 {
                        if il + 1 < self.nl {
                            acc = acc - rhs[v * c + 2];
                        }
                        if il > 0 {
                            acc = acc + rhs[(v - plane) * c + 2];
                        }
                    }
                    let i = self.input_index(ix, iy, il);
                    res[i] = res[i] + acc;
                }
            }
        }
    }

    /// Nonzeros in output row `row`: two unless the row sits on its axis' last index.
    pub(crate) fn row_nonzeros(&self, row: usize) -> usize {
        let axis = row % self.channels;
        let coords = self.voxel_coords(row / self.channels);
        if coords[axis] + 1 < self.extents()[axis] {
            2
        } else {
            0
        }
    }

    /// Nonzeros in input column `col`.
    pub(crate) fn col_nonzeros(&self, col: usize) -> usize {
        let coords = self.input_coords(col);
        let extents = self.extents();
        (0..self.channels)
            .map(|axis| {
                usize::from(coords[axis] + 1 < extents[axis]) + usize::from(coords[axis] > 0)
            })
            .sum()
    }

    /// `Σ_j |A_ij|^alpha` for output row `row`; every entry is ±1.
    pub(crate) fn row_sum<T: Real>(&self, row: usize) -> T {
        count(self.row_nonzeros(row))
    }

    /// `Σ_i |A_ij|^alpha` for input column `col`.
    pub(crate) fn col_sum<T: Real>(&self, col: usize) -> T {
        count(self.col_nonzeros(col))
    }

    fn params(&self, res_offset: usize, rhs_offset: usize) -> Result<GradientParams, PdhgCoreError> {
        Ok(GradientParams {
            res_offset: kernel_index(res_offset, "gradient result offset")?,
            rhs_offset: kernel_index(rhs_offset, "gradient input offset")?,
            nx: kernel_index(self.nx, "nx")?,
            ny: kernel_index(self.ny, "ny")?,
            nl: kernel_index(self.nl, "nl")?,
            label_first: u32::from(self.label_first),
            channels: kernel_index(self.channels, "channels")?,
            _padding: 0,
        })
    }

    fn encode<T: Real>(
        &self,
        kernel: &Kernel,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        mut res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        kernel_index(self.outputs(), "gradient output size")?;
        let params = self.params(res.offset(), rhs.offset())?;
        device.encode_kernel(
            encoder,
            kernel,
            bytemuck::bytes_of(&params),
            &rhs,
            &mut res,
            self.voxels(),
        )
    }

    pub(crate) fn encode_forward<T: Real>(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.encode(&GRADIENT_FORWARD, device, encoder, res, rhs)
    }

    pub(crate) fn encode_adjoint<T: Real>(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.encode(&GRADIENT_ADJOINT, device, encoder, res, rhs)
    }

    pub(crate) fn prepare<T: Real>(&self, device: &GpuDevice) -> Result<(), PdhgCoreError> {
        device.prepare_kernel::<T>(&GRADIENT_FORWARD)?;
        device.prepare_kernel::<T>(&GRADIENT_ADJOINT)
    }
}

fn count<T: Real>(n: usize) -> T {
    num_traits::cast(n).unwrap_or_else(T::max_value)
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::block::Block;

    /// Enumerates the block as a dense `nrows × ncols` matrix via unit vectors.
    pub(crate) fn dense(block: &dyn Block<f64>) -> Vec<Vec<f64>> {
        let mut columns = Vec::with_capacity(block.ncols());
        for j in 0..block.ncols() {
            let mut e = vec![0.0; block.ncols()];
            e[j] = 1.0;
            let mut out = vec![0.0; block.nrows()];
            block.eval_local_add_host(&mut out, &e);
            columns.push(out);
        }
        (0..block.nrows())
            .map(|i| columns.iter().map(|c| c[i]).collect())
            .collect()
    }

    pub(crate) fn random_vec(rng: &mut fastrand::Rng, n: usize) -> Vec<f64> {
        (0..n).map(|_| rng.f64() * 2.0 - 1.0).collect()
    }

    pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    /// Checks `⟨A u, v⟩ == ⟨u, Aᵗ v⟩` for a few random pairs.
    pub(crate) fn assert_adjoint(block: &dyn Block<f64>, seed: u64) {
        let mut rng = fastrand::Rng::with_seed(seed);
        for _ in 0..5 {
            let u = random_vec(&mut rng, block.ncols());
            let v = random_vec(&mut rng, block.nrows());
            let mut au = vec![0.0; block.nrows()];
            block.eval_local_add_host(&mut au, &u);
            let mut atv = vec![0.0; block.ncols()];
            block.eval_adjoint_local_add_host(&mut atv, &v);
            let lhs = dot(&au, &v);
            let rhs = dot(&u, &atv);
            assert!(
                (lhs - rhs).abs() <= 1e-10 * (1.0 + lhs.abs()),
                "adjoint mismatch: {} vs {}",
                lhs,
                rhs
            );
        }
    }

    /// Compares the closed-form norms with direct summation over the dense matrix.
    pub(crate) fn assert_norms_match_dense(block: &dyn Block<f64>) {
        let a = dense(block);
        for alpha in [1.0, 2.0] {
            for (i, row) in a.iter().enumerate() {
                let expected: f64 = row.iter().map(|x| x.abs().powf(alpha)).sum();
                assert_eq!(block.row_sum_local(i, alpha), expected, "row {}", i);
            }
            for j in 0..block.ncols() {
                let expected: f64 = a.iter().map(|row| row[j].abs().powf(alpha)).sum();
                assert_eq!(block.col_sum_local(j, alpha), expected, "col {}", j);
            }
        }
    }
}
