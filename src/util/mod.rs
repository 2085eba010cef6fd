//! Utility types shared by every part of the renderer.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Extent`] - Image dimensions
//! - Hash-based random numbers mirrored by the WGSL shading stages

mod error;
mod math;

pub use error::*;
pub use math::*;
