//! GLM fitting orchestration.
//!
//! Responsibilities:
//!
//! - extract the masked voxel time-series matrix from a 4-D series
//! - rescale to percent signal change when requested
//! - fit the design (shared SVD for spherical residuals, per-voxel AR(1)
//!   prewhitening in parallel)
//! - expand per-voxel results back into volumes

pub mod voxels;

pub use voxels::*;
