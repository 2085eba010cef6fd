//! Execution seam between the pass scheduler and a rendering backend.
//!
//! The scheduler decides *which* pass runs with *which* images bound; a
//! [`RenderDevice`] only knows how to run one pass. Uniform structs are
//! `#[repr(C)]` and match the WGSL declarations in `common.wgsl`.

use bytemuck::{Pod, Zeroable};

use super::resources::ImageDesc;
use crate::scene::{Camera, Primitive};
use crate::util::{Error, Extent, Result};

/// Camera pass inputs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// World from camera.
    pub view: [[f32; 4]; 4],
    /// Image plane half-extents at unit distance.
    pub fov_factor: [f32; 2],
    pub resolution: [u32; 2],
    pub sample_index: u32,
    pub num_samples: u32,
    pub _pad: [u32; 2],
}

impl CameraUniform {
    pub fn new(camera: &Camera, extent: Extent, sample_index: u32, num_samples: u32) -> Self {
        Self {
            view: camera.transform.to_cols_array_2d(),
            fov_factor: camera.fov_factor(extent.aspect()).to_array(),
            resolution: extent.as_array(),
            sample_index,
            num_samples,
            _pad: [0; 2],
        }
    }
}

/// Bounce pass inputs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BounceUniform {
    pub sample_index: u32,
    pub num_samples: u32,
    pub bounce: u32,
    pub primitive_count: u32,
}

/// Accumulate pass inputs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct AccumulateUniform {
    pub layers: u32,
    pub _pad: [u32; 3],
}

impl AccumulateUniform {
    pub fn new(layers: u32) -> Self {
        Self { layers, _pad: [0; 3] }
    }
}

/// Origin and direction images of one ping-pong slot.
#[derive(Debug)]
pub struct RayPair<'a, I> {
    pub origin: &'a I,
    pub direction: &'a I,
}

impl<I> Clone for RayPair<'_, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for RayPair<'_, I> {}

/// Everything one bounce pass reads and writes.
#[derive(Debug)]
pub struct BounceBindings<'a, I> {
    /// Layer of `attenuation` / `emission` written by this bounce.
    pub layer: u32,
    pub source: RayPair<'a, I>,
    pub target: RayPair<'a, I>,
    pub attenuation: &'a I,
    pub emission: &'a I,
}

/// Read-only view of a device image.
pub trait RenderImage {
    fn label(&self) -> &'static str;
    fn extent(&self) -> Extent;
    /// Array layers, 1 for plain 2D images.
    fn layers(&self) -> u32;
}

/// Fail if any image is bound twice in one pass.
pub fn ensure_distinct<I: RenderImage>(images: &[&I], pass: &str) -> Result<()> {
    for (i, a) in images.iter().enumerate() {
        if images[i + 1..].iter().any(|b| std::ptr::eq(*a, *b)) {
            return Err(Error::binding(format!("{pass} binds {} twice", a.label())));
        }
    }
    Ok(())
}

/// Fail unless every image has the extent of the first; returns it.
pub fn ensure_same_extent<I: RenderImage>(images: &[&I], pass: &str) -> Result<Extent> {
    let Some(first) = images.first() else {
        return Err(Error::binding(format!("{pass} has no images bound")));
    };
    let extent = first.extent();
    if let Some(bad) = images.iter().find(|i| i.extent() != extent) {
        return Err(Error::binding(format!(
            "{pass}: {} is {} but {} is {extent}",
            bad.label(),
            bad.extent(),
            first.label()
        )));
    }
    Ok(extent)
}

/// Backend that allocates pass images and runs the shading stages.
///
/// Passes are issued in program order on a single thread. Within one
/// `begin_frame` / `end_frame` bracket, every pass observes the writes of
/// the passes before it.
pub trait RenderDevice {
    type Image: RenderImage;
    type Scene;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Allocate backing storage for one image. Fails with `Error::Resize`.
    fn create_image(&mut self, desc: &ImageDesc, extent: Extent, layers: u32) -> Result<Self::Image>;

    /// Upload the primitive array. Fails with `Error::Upload`; nothing is
    /// returned on failure.
    fn upload_scene(&mut self, primitives: &[Primitive]) -> Result<Self::Scene>;

    fn begin_frame(&mut self) {}

    /// RAY_INIT: write primary rays into `target`.
    fn generate_rays(&mut self, target: RayPair<'_, Self::Image>, camera: &CameraUniform) -> Result<()>;

    /// BOUNCE(k): trace `bindings.source` against the scene.
    fn shade_bounce(
        &mut self,
        bindings: BounceBindings<'_, Self::Image>,
        scene: &Self::Scene,
        params: &BounceUniform,
    ) -> Result<()>;

    /// ACCUMULATE: compose the bounce layers into a one-sample estimate.
    fn accumulate(
        &mut self,
        attenuation: &Self::Image,
        emission: &Self::Image,
        estimate: &Self::Image,
        params: &AccumulateUniform,
    ) -> Result<()>;

    /// `accumulated = accumulated * (1 - weight) + estimate * weight`
    fn blend(&mut self, estimate: &Self::Image, accumulated: &Self::Image, weight: f32) -> Result<()>;

    /// Submit everything issued since `begin_frame`.
    fn end_frame(&mut self) -> Result<()> {
        Ok(())
    }

    /// Discard everything issued since `begin_frame` after a pass failed.
    fn abort_frame(&mut self) {}
}
