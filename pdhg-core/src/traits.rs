use bytemuck::{Pod, Zeroable};
use num_traits::Float;
use std::fmt::Debug;

/// Real scalar type that can live in a device buffer and be named in WGSL.
pub trait Real: Float + Pod + Zeroable + Debug + Default + Send + Sync + 'static {
    /// WGSL spelling of the scalar (`f32`, `f64`).
    const WGSL_TYPE: &'static str;

    /// Device features a shader over this scalar requires.
    fn required_features() -> wgpu::Features;
}

impl Real for f32 {
    const WGSL_TYPE: &'static str = "f32";

    fn required_features() -> wgpu::Features {
        wgpu::Features::empty()
    }
}

impl Real for f64 {
    const WGSL_TYPE: &'static str = "f64";

    fn required_features() -> wgpu::Features {
        wgpu::Features::SHADER_F64
    }
}

/// Generic trait representing a matrix or linear operator.
pub trait Matrix: Debug {
    /// The underlying numeric type of the matrix elements.
    type Value: Copy + Debug + Default + Pod + Zeroable;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Returns the number of rows.
    fn rows(&self) -> usize {
        self.dims().0
    }

    /// Returns the number of columns.
    fn cols(&self) -> usize {
        self.dims().1
    }

    /// Checks if the matrix is square.
    fn is_square(&self) -> bool {
        let (rows, cols) = self.dims();
        rows == cols
    }
}
