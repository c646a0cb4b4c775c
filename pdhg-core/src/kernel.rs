//! Compute-kernel plumbing shared by every operator block.
//!
//! All operator kernels use one bind group layout:
//!
//! | binding | resource |
//! |---|---|
//! | 0 | `var<uniform> params` (kernel specific, `Pod` struct) |
//! | 1 | `var<storage, read> rhs: array<T>` |
//! | 2 | `var<storage, read_write> res: array<T>` |
//!
//! Kernels run `WORKGROUP_SIZE` invocations per workgroup and recover their
//! linear index with [`KERNEL_INDEX_FN`], since large launches are spread over
//! a 2D grid of workgroups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::PdhgCoreError;

/// Invocations per workgroup. Must match `@workgroup_size` in every kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// Maximum workgroups per dispatch dimension guaranteed by WebGPU.
pub const MAX_WORKGROUPS_PER_DIM: u32 = 65535;

/// WGSL helper computing the linear invocation index for a 2D dispatch grid.
pub const KERNEL_INDEX_FN: &str = r#"
fn linear_index(gid: vec3<u32>, nwg: vec3<u32>) -> u32 {
    return gid.x + gid.y * nwg.x * 256u;
}
"#;

/// Returns the WGSL bindings every operator kernel declares.
///
/// `params_type` is the name of the kernel's uniform struct, which the
/// kernel source must define itself.
pub fn kernel_bindings(params_type: &str, scalar: &str) -> String {
    format!(
        r#"
@group(0) @binding(0) var<uniform> params: {params_type};
@group(0) @binding(1) var<storage, read> rhs: array<{scalar}>;
@group(0) @binding(2) var<storage, read_write> res: array<{scalar}>;
"#
    )
}

/// Workgroup grid covering `invocations` linear invocations.
pub fn dispatch_size(invocations: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIM {
        (groups, 1)
    } else {
        (MAX_WORKGROUPS_PER_DIM, groups.div_ceil(MAX_WORKGROUPS_PER_DIM))
    }
}

/// A compute kernel: one entry point of a generated shader.
///
/// `source` renders the complete WGSL module for a scalar type. Entry points
/// sharing a `shader` name must share the same `source`.
#[derive(Clone, Copy)]
pub struct Kernel {
    pub shader: &'static str,
    pub entry_point: &'static str,
    pub source: fn(&str) -> String,
}

impl Kernel {
    pub(crate) fn key(&self, scalar: &'static str) -> KernelKey {
        KernelKey {
            shader: self.shader,
            entry_point: self.entry_point,
            scalar,
        }
    }
}

/// Identifies a compiled kernel: shader name, entry point and scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub shader: &'static str,
    pub entry_point: &'static str,
    pub scalar: &'static str,
}

/// Caches shader modules and compute pipelines per device.
#[derive(Debug)]
pub(crate) struct PipelineCache {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    modules: Mutex<HashMap<(&'static str, &'static str), Arc<wgpu::ShaderModule>>>,
    pipelines: Mutex<HashMap<KernelKey, Arc<wgpu::ComputePipeline>>>,
}

impl PipelineCache {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Operator Kernel Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    // params
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // rhs
                storage(1, true),
                // res
                storage(2, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Operator Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            bind_group_layout,
            pipeline_layout,
            modules: Mutex::new(HashMap::new()),
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Returns the pipeline for `key`, compiling the shader from `source` on first use.
    pub(crate) fn get_or_create<F>(
        &self,
        device: &wgpu::Device,
        key: KernelKey,
        source: F,
    ) -> Result<Arc<wgpu::ComputePipeline>, PdhgCoreError>
    where
        F: FnOnce() -> String,
    {
        let mut pipelines = self
            .pipelines
            .lock()
            .map_err(|_| PdhgCoreError::Internal("Pipeline cache lock poisoned".to_string()))?;
        if let Some(pipeline) = pipelines.get(&key) {
            return Ok(Arc::clone(pipeline));
        }

        let module = {
            let mut modules = self
                .modules
                .lock()
                .map_err(|_| PdhgCoreError::Internal("Module cache lock poisoned".to_string()))?;
            let module_key = (key.shader, key.scalar);
            match modules.get(&module_key) {
                Some(module) => Arc::clone(module),
                None => {
                    log::debug!("Compiling shader '{}' for {}", key.shader, key.scalar);
                    let module = Arc::new(device.create_shader_module(
                        wgpu::ShaderModuleDescriptor {
                            label: Some(key.shader),
                            source: wgpu::ShaderSource::Wgsl(source().into()),
                        },
                    ));
                    modules.insert(module_key, Arc::clone(&module));
                    module
                }
            }
        };

        let label = format!("{}_{}_{}", key.shader, key.entry_point, key.scalar);
        let pipeline = Arc::new(device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: Some(key.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            },
        ));
        pipelines.insert(key, Arc::clone(&pipeline));
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_size_small() {
        assert_eq!(dispatch_size(0), (1, 1));
        assert_eq!(dispatch_size(1), (1, 1));
        assert_eq!(dispatch_size(256), (1, 1));
        assert_eq!(dispatch_size(257), (2, 1));
    }

    #[test]
    fn test_dispatch_size_splits_into_grid() {
        let invocations = WORKGROUP_SIZE * MAX_WORKGROUPS_PER_DIM + 1;
        let (x, y) = dispatch_size(invocations);
        assert_eq!(x, MAX_WORKGROUPS_PER_DIM);
        assert_eq!(y, 2);
        assert!(x as u64 * y as u64 * WORKGROUP_SIZE as u64 >= invocations as u64);
    }

    #[test]
    fn test_kernel_bindings_names_scalar() {
        let src = kernel_bindings("GradientParams", "f64");
        assert!(src.contains("var<uniform> params: GradientParams"));
        assert!(src.contains("array<f64>"));
    }
}
