use bytemuck::{Pod, Zeroable};
use pdhg_core::kernel::{kernel_bindings, KERNEL_INDEX_FN};
use pdhg_core::wgpu;
use pdhg_core::{GpuDevice, GpuRange, GpuRangeMut, Kernel, PdhgCoreError, Real};

use crate::block::{kernel_index, Block};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct IdentityParams {
    res_offset: u32,
    rhs_offset: u32,
    len: u32,
    _padding: u32,
}

const IDENTITY_WGSL: &str = r#"
struct IdentityParams {
    res_offset: u32,
    rhs_offset: u32,
    len: u32,
    _padding: u32,
};

@compute @workgroup_size(256)
fn accumulate(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let i = linear_index(gid, nwg);
    if (i >= params.len) {
        return;
    }
    res[params.res_offset + i] += rhs[params.rhs_offset + i];
}
"#;

fn identity_source(scalar: &str) -> String {
    format!(
        "{}{}{}",
        kernel_bindings("IdentityParams", scalar),
        KERNEL_INDEX_FN,
        IDENTITY_WGSL
    )
}

const IDENTITY_ACCUMULATE: Kernel = Kernel {
    shader: "identity",
    entry_point: "accumulate",
    source: identity_source,
};

/// The `n × n` identity tile: `y[row + i] += x[col + i]`. Self-adjoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIdentity {
    row: usize,
    col: usize,
    n: usize,
}

impl BlockIdentity {
    pub fn new(row: usize, col: usize, n: usize) -> Result<Self, PdhgCoreError> {
        if n == 0 {
            return Err(PdhgCoreError::InvalidDimensions(
                "Identity block needs a positive size".to_string(),
            ));
        }
        Ok(Self { row, col, n })
    }

    fn encode<T: Real>(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        mut res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        let params = IdentityParams {
            res_offset: kernel_index(res.offset(), "identity result offset")?,
            rhs_offset: kernel_index(rhs.offset(), "identity input offset")?,
            len: kernel_index(self.n, "identity size")?,
            _padding: 0,
        };
        device.encode_kernel(
            encoder,
            &IDENTITY_ACCUMULATE,
            bytemuck::bytes_of(&params),
            &rhs,
            &mut res,
            self.n,
        )
    }
}

impl<T: Real> Block<T> for BlockIdentity {
    fn row(&self) -> usize {
        self.row
    }

    fn col(&self) -> usize {
        self.col
    }

    fn nrows(&self) -> usize {
        self.n
    }

    fn ncols(&self) -> usize {
        self.n
    }

    fn row_sum_local(&self, _row: usize, _alpha: T) -> T {
        T::one()
    }

    fn col_sum_local(&self, _col: usize, _alpha: T) -> T {
        T::one()
    }

    fn eval_local_add_host(&self, res: &mut [T], rhs: &[T]) {
        for (r, &x) in res.iter_mut().zip(rhs) {
            *r = *r + x;
        }
    }

    fn eval_adjoint_local_add_host(&self, res: &mut [T], rhs: &[T]) {
        Block::<T>::eval_local_add_host(self, res, rhs);
    }

    fn eval_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.encode(device, encoder, res, rhs)
    }

    fn eval_adjoint_local_add(
        &self,
        device: &GpuDevice,
        encoder: &mut wgpu::CommandEncoder,
        res: GpuRangeMut<'_, T>,
        rhs: GpuRange<'_, T>,
    ) -> Result<(), PdhgCoreError> {
        self.encode(device, encoder, res, rhs)
    }

    fn prepare(&self, device: &GpuDevice) -> Result<(), PdhgCoreError> {
        device.prepare_kernel::<T>(&IDENTITY_ACCUMULATE)
    }
}
