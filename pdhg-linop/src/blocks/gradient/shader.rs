use bytemuck::{Pod, Zeroable};
use pdhg_core::kernel::{kernel_bindings, KERNEL_INDEX_FN};
use pdhg_core::Kernel;

/// Uniform block of the gradient kernels. Layout must match `GradientParams` in WGSL.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct GradientParams {
    pub res_offset: u32,
    pub rhs_offset: u32,
    pub nx: u32,
    pub ny: u32,
    pub nl: u32,
    pub label_first: u32,
    pub channels: u32,
    pub _padding: u32,
}

// One invocation per voxel. The forward kernel scatters into the voxel's own
// output channels; the adjoint gathers the neighbouring differences, so every
// output element has a single writer.
const GRADIENT_WGSL: &str = r#"
struct GradientParams {
    res_offset: u32,
    rhs_offset: u32,
    nx: u32,
    ny: u32,
    nl: u32,
    label_first: u32,
    channels: u32,
    _padding: u32,
};

fn input_index(ix: u32, iy: u32, il: u32) -> u32 {
    if (params.label_first != 0u) {
        return (ix * params.ny + iy) * params.nl + il;
    }
    return (il * params.ny + iy) * params.nx + ix;
}

fn input_at(ix: u32, iy: u32, il: u32) -> SCALAR {
    return rhs[params.rhs_offset + input_index(ix, iy, il)];
}

fn dual_at(voxel: u32, channel: u32) -> SCALAR {
    return rhs[params.rhs_offset + voxel * params.channels + channel];
}

@compute @workgroup_size(256)
fn forward(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let v = linear_index(gid, nwg);
    let plane = params.nx * params.ny;
    if (v >= plane * params.nl) {
        return;
    }
    let ix = v % params.nx;
    let iy = (v / params.nx) % params.ny;
    let il = v / plane;

    let center = input_at(ix, iy, il);
    let out = params.res_offset + v * params.channels;
    if (ix + 1u < params.nx) {
        res[out] += input_at(ix + 1u, iy, il) - center;
    }
    if (iy + 1u < params.ny) {
        res[out + 1u] += input_at(ix, iy + 1u, il) - center;
    }
    if (params.channels == 3u && il + 1u < params.nl) {
        res[out + 2u] += input_at(ix, iy, il + 1u) - center;
    }
}

@compute @workgroup_size(256)
fn adjoint(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let v = linear_index(gid, nwg);
    let plane = params.nx * params.ny;
    if (v >= plane * params.nl) {
        return;
    }
    let ix = v % params.nx;
    let iy = (v / params.nx) % params.ny;
    let il = v / plane;

    var acc = SCALAR(0.0);
    if (ix + 1u < params.nx) {
        acc -= dual_at(v, 0u);
    }
    if (ix > 0u) {
        acc += dual_at(v - 1u, 0u);
    }
    if (iy + 1u < params.ny) {
        acc -= dual_at(v, 1u);
    }
    if (iy > 0u) {
        acc += dual_at(v - params.nx, 1u);
    }
    if (params.channels == 3u) {
        if (il + 1u < params.nl) {
            acc -= dual_at(v, 2u);
        }
        if (il > 0u) {
            acc += dual_at(v - plane, 2u);
        }
    }
    res[params.res_offset + input_index(ix, iy, il)] += acc;
}
"#;

pub(crate) fn gradient_source(scalar: &str) -> String {
    format!(
        "{}{}{}",
        kernel_bindings("GradientParams", scalar),
        KERNEL_INDEX_FN,
        GRADIENT_WGSL.replace("SCALAR", scalar)
    )
}

pub(crate) const GRADIENT_FORWARD: Kernel = Kernel {
    shader: "gradient",
    entry_point: "forward",
    source: gradient_source,
};

pub(crate) const GRADIENT_ADJOINT: Kernel = Kernel {
    shader: "gradient",
    entry_point: "adjoint",
    source: gradient_source,
};
