//! `pdhg-linop`: block-structured linear operators for a GPU primal-dual solver.
//!
//! An operator is a virtual composite matrix made of [`Block`]s, each placed at
//! a row/column offset. Evaluation fans out to every block, which accumulates
//! its local product into the shared result, either on the device (wgpu
//! compute dispatches) or on host slices.

pub mod block;
pub mod blocks;
pub mod linear_operator;
pub mod preconditioner;

pub use block::Block;
pub use blocks::{BlockGradient2D, BlockGradient3D, BlockIdentity, BlockZero};
pub use linear_operator::LinearOperator;
pub use preconditioner::DiagonalPreconditioner;

// Re-export from pdhg_core
pub use pdhg_core::{
    DeviceOptions, GpuDevice, GpuRange, GpuRangeMut, GpuVector, Matrix, PdhgCoreError, Real,
};
