use crate::context::GpuContext;
use crate::error::PdhgCoreError;
use crate::traits::Real;
use std::marker::PhantomData;
use std::{mem, sync::Arc};

/// A typed wrapper around a `wgpu::Buffer` holding vector data on the GPU.
#[derive(Debug)]
pub struct GpuVector<T: Real> {
    buffer: wgpu::Buffer,
    size: usize, // Number of elements of type T
    size_bytes: u64,
    usage: wgpu::BufferUsages,
    label: String,
    pub(crate) context: Arc<GpuContext>,
    _scalar: PhantomData<T>,
}

impl<T: Real> GpuVector<T> {
    /// Internal constructor used by GpuDevice.
    pub(crate) fn new_internal(
        buffer: wgpu::Buffer,
        size: usize,
        usage: wgpu::BufferUsages,
        label: String,
        context: Arc<GpuContext>,
    ) -> Self {
        let size_bytes = (size * mem::size_of::<T>()) as u64;
        Self {
            buffer,
            size,
            size_bytes,
            usage,
            label,
            context,
            _scalar: PhantomData,
        }
    }

    /// Returns the underlying `wgpu::Buffer`.
    pub(crate) fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Returns the number of elements the vector holds.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the size of the vector's buffer in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Returns a `BindingResource` for the entire buffer.
    pub fn as_entire_binding(&self) -> wgpu::BindingResource {
        self.buffer.as_entire_binding()
    }

    /// Read-only view of `len` elements starting at `offset`.
    pub fn range(&self, offset: usize, len: usize) -> Result<GpuRange<'_, T>, PdhgCoreError> {
        check_range(self, offset, len)?;
        Ok(GpuRange {
            vector: self,
            offset,
            len,
        })
    }

    /// Writable view of `len` elements starting at `offset`.
    pub fn range_mut(
        &mut self,
        offset: usize,
        len: usize,
    ) -> Result<GpuRangeMut<'_, T>, PdhgCoreError> {
        check_range(self, offset, len)?;
        Ok(GpuRangeMut {
            vector: self,
            offset,
            len,
        })
    }

    /// Reads the vector's contents back to the CPU.
    /// Waits for all work already submitted to the device.
    pub async fn read_contents(&self) -> Result<Vec<T>, PdhgCoreError> {
        self.context
            .read_buffer_to_cpu(self.inner(), self.size())
            .await
    }

    /// Blocking variant of [`GpuVector::read_contents`].
    #[cfg(feature = "native")]
    pub fn read_contents_blocking(&self) -> Result<Vec<T>, PdhgCoreError> {
        pollster::block_on(self.read_contents())
    }

    /// Writes data from a CPU slice into this GPU vector.
    pub async fn write_contents(&self, data: &[T]) -> Result<(), PdhgCoreError> {
        if data.len() != self.size {
            return Err(PdhgCoreError::InvalidDimensions(format!(
                "Data length ({}) does not match GpuVector size ({})",
                data.len(),
                self.size
            )));
        }
        self.context.write_buffer(self.inner(), data).await
    }
}

fn check_range<T: Real>(vector: &GpuVector<T>, offset: usize, len: usize) -> Result<(), PdhgCoreError> {
    match offset.checked_add(len) {
        Some(end) if end <= vector.size => Ok(()),
        _ => Err(PdhgCoreError::InvalidDimensions(format!(
            "Range [{}, {}+{}) exceeds vector '{}' of size {}",
            offset,
            offset,
            len,
            vector.label(),
            vector.size
        ))),
    }
}

/// Read-only window `[offset, offset + len)` into a [`GpuVector`].
#[derive(Debug, Clone, Copy)]
pub struct GpuRange<'a, T: Real> {
    vector: &'a GpuVector<T>,
    offset: usize,
    len: usize,
}

impl<'a, T: Real> GpuRange<'a, T> {
    pub fn vector(&self) -> &'a GpuVector<T> {
        self.vector
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Writable window `[offset, offset + len)` into a [`GpuVector`].
/// Kernels recorded through it may only add into the window.
#[derive(Debug)]
pub struct GpuRangeMut<'a, T: Real> {
    vector: &'a mut GpuVector<T>,
    offset: usize,
    len: usize,
}

impl<T: Real> GpuRangeMut<'_, T> {
    pub fn vector(&self) -> &GpuVector<T> {
        self.vector
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
