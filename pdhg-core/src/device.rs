use crate::context::GpuContext;
use crate::error::PdhgCoreError;
use crate::kernel::{dispatch_size, Kernel, PipelineCache};
use crate::traits::Real;
use crate::vector::{GpuRange, GpuRangeMut, GpuVector};
use serde::{Deserialize, Serialize};
use std::{mem, sync::Arc};

/// Which kind of adapter to ask wgpu for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl From<AdapterPreference> for wgpu::PowerPreference {
    fn from(value: AdapterPreference) -> Self {
        match value {
            AdapterPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            AdapterPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Options used when opening a [`GpuDevice`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub power_preference: AdapterPreference,
    /// Use the software fallback adapter (e.g. for headless CI).
    pub force_fallback_adapter: bool,
    /// Cap on auxiliary operator memory. Defaults to the adapter's `max_buffer_size`.
    pub memory_budget_bytes: Option<u64>,
}

/// Represents a GPU execution device, holding the WGPU context.
#[derive(Debug, Clone)]
pub struct GpuDevice {
    pub(crate) context: Arc<GpuContext>,
    pipelines: Arc<PipelineCache>,
}

impl GpuDevice {
    /// Creates a new GpuDevice, initializing the underlying WGPU context asynchronously.
    pub async fn new(options: &DeviceOptions) -> Result<Self, PdhgCoreError> {
        let context = GpuContext::new(options).await?;
        let pipelines = PipelineCache::new(&context.device);
        log::info!(
            "GpuDevice created successfully (memory budget {} bytes)",
            context.memory_budget
        );
        Ok(Self {
            context: Arc::new(context),
            pipelines: Arc::new(pipelines),
        })
    }

    /// Opens a device with [`DeviceOptions::default`].
    pub async fn new_default() -> Result<Self, PdhgCoreError> {
        Self::new(&DeviceOptions::default()).await
    }

    /// Blocking variant of [`GpuDevice::new`] for native callers.
    #[cfg(feature = "native")]
    pub fn new_blocking(options: &DeviceOptions) -> Result<Self, PdhgCoreError> {
        pollster::block_on(Self::new(options))
    }

    // --- Capabilities ---

    /// Whether kernels over scalar `T` can run on this device.
    pub fn supports<T: Real>(&self) -> bool {
        self.context.features.contains(T::required_features())
    }

    /// Bytes of auxiliary device memory operators may claim.
    pub fn memory_budget(&self) -> u64 {
        self.context.memory_budget
    }

    /// Fails with `OutOfDeviceMemory` when `bytes` exceeds the memory budget.
    pub fn check_memory(&self, bytes: u64) -> Result<(), PdhgCoreError> {
        let budget = self.memory_budget();
        if bytes > budget {
            return Err(PdhgCoreError::OutOfDeviceMemory {
                requested: bytes,
                budget,
            });
        }
        Ok(())
    }

    // --- Resource Creation ---

    /// Creates a GpuVector initialized with data from a CPU slice.
    pub fn create_vector<T: Real>(
        &self,
        label: &str,
        data: &[T],
    ) -> Result<GpuVector<T>, PdhgCoreError> {
        if data.is_empty() {
            return Err(PdhgCoreError::InvalidDimensions(
                "Cannot create GPU vector from empty slice".to_string(),
            ));
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_DST
            | wgpu::BufferUsages::COPY_SRC;
        let buffer =
            self.context
                .create_gpu_buffer_with_data(label, bytemuck::cast_slice(data), usage);
        Ok(GpuVector::new_internal(
            buffer,
            data.len(),
            usage,
            String::from(label),
            Arc::clone(&self.context),
        ))
    }

    /// Creates a zero-filled GpuVector with a specified size.
    pub fn create_zeroed_vector<T: Real>(
        &self,
        label: &str,
        size: usize,
    ) -> Result<GpuVector<T>, PdhgCoreError> {
        if size == 0 {
            return Err(PdhgCoreError::InvalidDimensions(
                "Cannot create GPU vector with size 0".to_string(),
            ));
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let byte_size = (size * mem::size_of::<T>()) as u64;
        let buffer = self.context.create_empty_buffer(label, byte_size, usage);
        Ok(GpuVector::new_internal(
            buffer,
            size,
            usage,
            String::from(label),
            Arc::clone(&self.context),
        ))
    }

    // --- Command Recording ---

    pub fn create_command_encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Records a zero fill of the whole vector.
    pub fn clear_vector<T: Real>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        vector: &mut GpuVector<T>,
    ) -> Result<(), PdhgCoreError> {
        self.check_owned(vector)?;
        encoder.clear_buffer(vector.inner(), 0, None);
        Ok(())
    }

    /// Compiles `kernel` for scalar `T` ahead of its first launch.
    pub fn prepare_kernel<T: Real>(&self, kernel: &Kernel) -> Result<(), PdhgCoreError> {
        self.check_scalar::<T>()?;
        let source = kernel.source;
        self.pipelines
            .get_or_create(&self.context.device, kernel.key(T::WGSL_TYPE), || {
                source(T::WGSL_TYPE)
            })
            .map(|_| ())
    }

    /// Records one dispatch of `kernel` over `invocations` linear invocations.
    ///
    /// The kernel reads `rhs` and accumulates into `res`; `params` is uploaded
    /// as the uniform at binding 0 and must carry any range offsets the kernel
    /// needs, since both vectors are bound whole.
    pub fn encode_kernel<T: Real>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &Kernel,
        params: &[u8],
        rhs: &GpuRange<'_, T>,
        res: &mut GpuRangeMut<'_, T>,
        invocations: usize,
    ) -> Result<(), PdhgCoreError> {
        self.check_scalar::<T>()?;
        self.check_owned(rhs.vector())?;
        self.check_owned(res.vector())?;
        let invocations = u32::try_from(invocations).map_err(|_| {
            PdhgCoreError::InvalidDimensions(format!(
                "Kernel '{}' needs {} invocations, more than a single dispatch can index",
                kernel.shader, invocations
            ))
        })?;
        for (offset, len) in [(rhs.offset(), rhs.len()), (res.offset(), res.len())] {
            if u32::try_from(offset + len).is_err() {
                return Err(PdhgCoreError::InvalidDimensions(format!(
                    "Range end {} is not addressable by kernel '{}'",
                    offset + len,
                    kernel.shader
                )));
            }
        }
        if invocations == 0 {
            return Ok(());
        }

        let source = kernel.source;
        let pipeline = self.pipelines.get_or_create(
            &self.context.device,
            kernel.key(T::WGSL_TYPE),
            || source(T::WGSL_TYPE),
        )?;

        let params_buffer = self.context.create_uniform_buffer(kernel.shader, params);
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.entry_point),
                layout: self.pipelines.bind_group_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: rhs.vector().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: res.vector().as_entire_binding(),
                    },
                ],
            });

        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            let (groups_x, groups_y) = dispatch_size(invocations);
            compute_pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        log::trace!(
            "Recorded {}::{} over {} invocations",
            kernel.shader,
            kernel.entry_point,
            invocations
        );
        Ok(())
    }

    /// Submits recorded work to the queue. Completion is observed by the next readback.
    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.context.queue.submit(Some(encoder.finish()));
    }

    fn check_scalar<T: Real>(&self) -> Result<(), PdhgCoreError> {
        if !self.supports::<T>() {
            return Err(PdhgCoreError::UnsupportedOperation(format!(
                "{} kernels need device features {:?}",
                T::WGSL_TYPE,
                T::required_features()
            )));
        }
        Ok(())
    }

    fn check_owned<T: Real>(&self, vector: &GpuVector<T>) -> Result<(), PdhgCoreError> {
        if !Arc::ptr_eq(&vector.context.device, &self.context.device) {
            return Err(PdhgCoreError::UnsupportedOperation(format!(
                "Vector '{}' belongs to a different device",
                vector.label()
            )));
        }
        Ok(())
    }

    // --- Utility ---

    /// Returns the current GPU transfer statistics (bytes_to_gpu, bytes_from_gpu).
    pub fn get_transfer_stats(&self) -> TransferStats {
        let (bytes_to_gpu, bytes_from_gpu) = self.context.get_transfer_stats();
        TransferStats {
            bytes_to_gpu,
            bytes_from_gpu,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}
