//! Mathematical utilities: response kernels, convolution, and least squares.

pub mod convolve;
pub mod glm;
pub mod hrf;

pub use convolve::*;
pub use glm::*;
pub use hrf::*;
