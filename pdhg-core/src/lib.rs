//! # PDHG Core Library
//!
//! GPU plumbing for the primal-dual operator layer: the wgpu device, typed
//! device vectors and ranges, and the compute-kernel launcher that operator
//! blocks record their dispatches through.

mod context;
pub mod device;
pub mod error;
pub mod kernel;
pub mod traits;
pub mod vector;

pub use device::{AdapterPreference, DeviceOptions, GpuDevice, TransferStats};
pub use error::PdhgCoreError;
pub use kernel::{Kernel, KernelKey, WORKGROUP_SIZE};
pub use traits::{Matrix, Real};
pub use vector::{GpuRange, GpuRangeMut, GpuVector};

// wgpu types appear in the block API (command encoders).
pub use wgpu;
