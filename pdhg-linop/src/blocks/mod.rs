//! Concrete operator blocks.

pub mod gradient;
mod identity;
mod zero;

pub use gradient::{BlockGradient2D, BlockGradient3D};
pub use identity::BlockIdentity;
pub use zero::BlockZero;
