//! # raygl
//!
//! Progressive multi-bounce path tracer built from render passes.
//!
//! Each frame generates one jittered camera ray per pixel, traces it through a
//! fixed number of bounce passes that ping-pong between two ray buffers, folds
//! the per-bounce attenuation and emission layers into a one-sample estimate,
//! and blends that estimate into a running mean. Accumulation stops once a
//! target sample count is reached and restarts on resize or camera change.
//!
//! ## Modules
//!
//! - [`util`] - Errors, extents and the per-pixel random stream
//! - [`scene`] - Sphere primitives, demo scene and pinhole camera
//! - [`pipeline`] - Pass scheduling, pass images and the progressive sampler
//! - [`cpu`] - Software device (rayon) running the same passes
//! - [`gpu`] - wgpu device with WGSL shading stages
//! - [`present`] - Tonemapping and image export
//! - [`offline`] - Headless render to a file
//!
//! ## Example
//!
//! ```ignore
//! use raygl::cpu::CpuDevice;
//! use raygl::pipeline::{PipelineConfig, RenderPipeline};
//! use raygl::scene::Scene;
//!
//! let mut pipeline = RenderPipeline::new(CpuDevice::new(), PipelineConfig::default())?;
//! pipeline.upload_scene(&Scene::demo())?;
//! pipeline.resize(320, 180)?;
//! while !pipeline.is_converged() {
//!     pipeline.advance()?;
//! }
//! ```

pub mod cpu;
pub mod offline;
pub mod pipeline;
pub mod present;
pub mod scene;
pub mod util;

// wgpu backend (optional, enabled with "gpu" feature)
#[cfg(feature = "gpu")]
pub mod gpu;

// Interactive viewer (optional, enabled with "viewer" feature)
#[cfg(feature = "viewer")]
pub mod viewer;

// Re-export commonly used types
pub use util::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cpu::CpuDevice;
    pub use crate::pipeline::{FrameStatus, PipelineConfig, RenderDevice, RenderImage, RenderPipeline};
    pub use crate::scene::{Camera, Primitive, Scene};
    pub use crate::util::{Error, Extent, Result};
}
