use crate::device::DeviceOptions;
use crate::error::PdhgCoreError;
use bytemuck::{Pod, Zeroable};
use cfg_if::cfg_if;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use wgpu::{util::DeviceExt, PollType};

/// Wrapper for WGPU device and queue, including transfer counters.
/// This is internal to the pdhg-core crate.
#[derive(Debug, Clone)]
pub(crate) struct GpuContext {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
    /// Features actually granted by the device.
    pub(crate) features: wgpu::Features,
    /// Upper bound for operator auxiliary memory.
    pub(crate) memory_budget: u64,
    /// Tracks bytes transferred from CPU to GPU via instrumented methods.
    pub(crate) bytes_to_gpu: Arc<AtomicU64>,
    /// Tracks bytes transferred from GPU to CPU via instrumented methods.
    pub(crate) bytes_from_gpu: Arc<AtomicU64>,
}

impl GpuContext {
    /// Initializes the WGPU context asynchronously.
    pub(crate) async fn new(options: &DeviceOptions) -> Result<Self, PdhgCoreError> {
        log::info!("Initializing WGPU context");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY, // Vulkan, Metal, DX12
            ..Default::default()
        });

        log::debug!("Requesting adapter ({:?})", options.power_preference);
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference.into(),
                compatible_surface: None, // No surface needed for compute
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .map_err(|_| PdhgCoreError::WgpuInitError("No suitable adapter found".to_string()))?;

        log::info!("Selected Adapter: {:?}", adapter.get_info());
        log::debug!("Adapter Features: {:?}", adapter.features());

        let adapter_limits = adapter.limits();
        let mut limits = wgpu::Limits::default().using_resolution(adapter_limits.clone());
        limits.max_storage_buffer_binding_size = adapter_limits.max_storage_buffer_binding_size;
        limits.max_buffer_size = adapter_limits.max_buffer_size;
        log::debug!("Adjusted limits: {:?}", limits);

        // f64 kernels are only possible where the adapter offers them.
        let required_features = adapter.features() & wgpu::Features::SHADER_F64;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pdhg_core device"),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                required_features,
                required_limits: limits.clone(),
            })
            .await
            .map_err(|e| PdhgCoreError::WgpuInitError(format!("Failed to request device: {}", e)))?;

        let features = device.features();
        log::info!("Device and queue obtained successfully");
        if !features.contains(wgpu::Features::SHADER_F64) {
            log::warn!("SHADER_F64 is not available, only f32 kernels can run on this device");
        }

        let memory_budget = options
            .memory_budget_bytes
            .unwrap_or(limits.max_buffer_size);

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            features,
            memory_budget,
            bytes_to_gpu: Arc::new(AtomicU64::new(0)),
            bytes_from_gpu: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Helper to create a GPU buffer with initial data and track the transfer size.
    pub(crate) fn create_gpu_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage,
            });
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {}, now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
        buffer
    }

    /// Uniform buffer for kernel parameters. Not counted as a transfer.
    pub(crate) fn create_uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Writes `data` from the CPU into an existing GPU `buffer`.
    /// Tracks the transfer size.
    pub(crate) async fn write_buffer<T: Pod>(
        &self,
        buffer: &wgpu::Buffer,
        data: &[T],
    ) -> Result<(), PdhgCoreError> {
        let byte_len = std::mem::size_of_val(data) as u64;
        if byte_len == 0 {
            log::debug!("Skipping write for 0 bytes");
            return Ok(());
        }
        if buffer.size() < byte_len {
            return Err(PdhgCoreError::Internal(format!(
                "Target buffer size ({}) is smaller than data size ({})",
                buffer.size(),
                byte_len
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(PdhgCoreError::UnsupportedOperation(
                "Target buffer must have COPY_DST usage".to_string(),
            ));
        }

        log::debug!("Writing {} bytes to buffer", byte_len);
        self.queue
            .write_buffer(buffer, 0, bytemuck::cast_slice(data));

        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {} (write_buffer), now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
        Ok(())
    }

    /// Helper to create an empty GPU buffer. wgpu zero-initializes it.
    /// Does not count towards `bytes_to_gpu` as no data is transferred.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Reads `element_count` elements of type `T` from a GPU buffer back to the CPU.
    ///
    /// The buffer must have `COPY_SRC` usage. Work already submitted to the queue
    /// is completed before the copy is read.
    pub(crate) async fn read_buffer_to_cpu<T: Pod + Zeroable>(
        &self,
        buffer: &wgpu::Buffer,
        element_count: usize,
    ) -> Result<Vec<T>, PdhgCoreError> {
        let element_size = std::mem::size_of::<T>();
        let size_bytes = (element_count * element_size) as u64;

        if size_bytes == 0 {
            log::debug!("Skipping readback for 0 bytes");
            return Ok(Vec::new());
        }
        if buffer.size() < size_bytes {
            return Err(PdhgCoreError::Internal(format!(
                "GPU buffer size ({}) is smaller than expected size based on element count ({})",
                buffer.size(),
                size_bytes
            )));
        }

        let staging_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer_for_readback"),
            size: size_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("read_buffer_encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size_bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = staging_buffer.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            if let Err(e) = sender.send(result) {
                log::error!("Failed to send map result back: {:?}", e);
            }
        });

        self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);
        log::trace!(
            "bytes_from_gpu incremented by {}, now: {}",
            size_bytes,
            self.bytes_from_gpu.load(Ordering::Relaxed)
        );

        cfg_if! {
            if #[cfg(not(target_arch = "wasm32"))] {
                self.device
                    .poll(PollType::Wait)
                    .map_err(|e| PdhgCoreError::WgpuError(format!("Device poll failed: {}", e)))?;
            }
        }

        match receiver.await {
            Ok(Ok(())) => {
                let result = {
                    let data = buffer_slice.get_mapped_range();
                    if data.len() != size_bytes as usize {
                        let mapped_len = data.len();
                        drop(data);
                        staging_buffer.unmap();
                        return Err(PdhgCoreError::Internal(format!(
                            "Mapped data size ({}) does not match expected byte size ({})",
                            mapped_len, size_bytes
                        )));
                    }
                    bytemuck::cast_slice::<u8, T>(&data).to_vec()
                };
                staging_buffer.unmap();
                log::debug!("Buffer readback complete ({} bytes)", size_bytes);
                Ok(result)
            }
            Ok(Err(e)) => {
                log::error!("Failed to map buffer: {:?}", e);
                Err(PdhgCoreError::WgpuError(format!(
                    "Buffer mapping failed: {}",
                    e
                )))
            }
            Err(_) => Err(PdhgCoreError::Internal(
                "Channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    /// Returns the current transfer statistics.
    pub(crate) fn get_transfer_stats(&self) -> (u64, u64) {
        (
            self.bytes_to_gpu.load(Ordering::Relaxed),
            self.bytes_from_gpu.load(Ordering::Relaxed),
        )
    }
}
