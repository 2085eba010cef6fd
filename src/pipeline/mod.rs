//! Progressive multi-bounce rendering pipeline.
//!
//! ## Architecture
//! ```text
//! ProgressiveSampler ── should advance? ──┐
//!                                         v
//! RayInit -> Bounce(0..n) -> Accumulate -> blend(w = 1/(n+1)) -> accumulated
//!     \__________ ResourceSet (ping-pong rays, layered buffers) ________/
//! ```
//!
//! [`RenderPipeline`] owns the device, the scene handle, the pass images and
//! the sample counter. One call to [`RenderPipeline::advance`] adds one
//! sample (or `samples_per_frame` samples) to the accumulated image.

pub mod device;
pub mod resources;
pub mod sampler;
pub mod schedule;

pub use device::{
    ensure_distinct, ensure_same_extent, AccumulateUniform, BounceBindings, BounceUniform, CameraUniform,
    RayPair, RenderDevice, RenderImage,
};
pub use resources::{ImageDesc, ImageRole, ResourceSet, IMAGE_DESCS};
pub use sampler::{running_mean, ProgressiveSampler};
pub use schedule::{BouncePass, FramePlan, Pass, PingPong};

use crate::scene::{Camera, Scene};
use crate::util::{Error, Extent, Result};

/// Upper bound on bounces per sample.
pub const MAX_BOUNCES: u32 = 16;

/// Pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Bounce passes per sample.
    pub bounces: u32,
    /// Samples after which rendering goes idle.
    pub target_samples: u32,
    /// Samples folded per call to `advance`.
    pub samples_per_frame: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bounces: 4,
            target_samples: 1024,
            samples_per_frame: 1,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_BOUNCES).contains(&self.bounces) {
            return Err(Error::config(format!(
                "bounces must be in 1..={MAX_BOUNCES}, got {}",
                self.bounces
            )));
        }
        if self.target_samples == 0 {
            return Err(Error::config("target_samples must be at least 1"));
        }
        if self.samples_per_frame == 0 {
            return Err(Error::config("samples_per_frame must be at least 1"));
        }
        Ok(())
    }
}

/// Why a frame issued no passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Images are `0x0` (before the first resize or while minimized).
    Unsized,
    /// No scene uploaded.
    NoScene,
}

/// Outcome of [`RenderPipeline::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// New samples were blended; `samples` is the new total.
    Rendered { samples: u32 },
    /// Target reached, nothing issued.
    Converged,
    Skipped(SkipReason),
}

struct SceneBinding<S> {
    handle: S,
    count: u32,
}

/// Explicit owner of every handle and counter of the renderer.
pub struct RenderPipeline<D: RenderDevice> {
    device: D,
    config: PipelineConfig,
    plan: FramePlan,
    resources: ResourceSet<D::Image>,
    sampler: ProgressiveSampler,
    scene: Option<SceneBinding<D::Scene>>,
    camera: Camera,
}

impl<D: RenderDevice> RenderPipeline<D> {
    pub fn new(device: D, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "pipeline on {}: {} bounces, {} target samples",
            device.name(),
            config.bounces,
            config.target_samples
        );
        Ok(Self {
            device,
            plan: FramePlan::new(config.bounces),
            resources: ResourceSet::initialize(config.bounces),
            sampler: ProgressiveSampler::new(config.target_samples),
            scene: None,
            camera: Camera::default(),
            config,
        })
    }

    /// Replace the scene buffer. The previous scene stays bound if the upload fails.
    #[tracing::instrument(skip_all, fields(primitives = scene.len()))]
    pub fn upload_scene(&mut self, scene: &Scene) -> Result<()> {
        let handle = self.device.upload_scene(&scene.primitives)?;
        self.scene = Some(SceneBinding {
            handle,
            count: scene.len() as u32,
        });
        self.sampler.reset();
        log::info!("scene uploaded: {} primitives", scene.len());
        Ok(())
    }

    /// Resize every pass image; any change discards accumulated history.
    #[tracing::instrument(skip(self))]
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if self.resources.resize(&mut self.device, width, height)? {
            log::debug!("resized to {}", self.resources.extent());
        }
        self.sampler.sync_generation(self.resources.generation());
        Ok(())
    }

    /// Change the bounce count (reallocates the layered images).
    pub fn set_bounces(&mut self, bounces: u32) -> Result<()> {
        let config = PipelineConfig { bounces, ..self.config };
        config.validate()?;
        self.resources.set_layer_count(&mut self.device, bounces)?;
        self.config = config;
        self.plan = FramePlan::new(bounces);
        self.sampler.sync_generation(self.resources.generation());
        // same extent, new path length: old samples are a different estimator
        self.sampler.reset();
        Ok(())
    }

    pub fn set_target_samples(&mut self, target: u32) -> Result<()> {
        let config = PipelineConfig { target_samples: target, ..self.config };
        config.validate()?;
        self.config = config;
        self.sampler.set_target(target);
        Ok(())
    }

    pub fn set_samples_per_frame(&mut self, samples: u32) -> Result<()> {
        let config = PipelineConfig { samples_per_frame: samples, ..self.config };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Move the camera; restarts accumulation if it changed.
    pub fn set_camera(&mut self, camera: Camera) {
        if camera != self.camera {
            self.camera = camera;
            self.sampler.reset();
        }
    }

    /// Discard accumulated samples.
    pub fn restart(&mut self) {
        self.sampler.reset();
    }

    /// Render the next sample(s) if the image has not converged.
    #[tracing::instrument(skip_all)]
    pub fn advance(&mut self) -> Result<FrameStatus> {
        self.sampler.sync_generation(self.resources.generation());
        if !self.sampler.should_advance() {
            return Ok(FrameStatus::Converged);
        }
        if !self.resources.is_sized() {
            return Ok(FrameStatus::Skipped(SkipReason::Unsized));
        }
        if self.scene.is_none() {
            return Ok(FrameStatus::Skipped(SkipReason::NoScene));
        }

        for _ in 0..self.config.samples_per_frame {
            if !self.sampler.should_advance() {
                break;
            }
            self.render_sample()?;
        }
        Ok(FrameStatus::Rendered {
            samples: self.sampler.sample_count(),
        })
    }

    fn render_sample(&mut self) -> Result<()> {
        self.device.begin_frame();
        match self.record_sample() {
            Ok(()) => self.device.end_frame(),
            Err(e) => {
                self.device.abort_frame();
                Err(e)
            }
        }
    }

    fn record_sample(&mut self) -> Result<()> {
        let scene = self
            .scene
            .as_ref()
            .ok_or_else(|| Error::binding("bounce pass without a scene"))?;
        let extent = self.resources.extent();
        let sample_index = self.sampler.sample_count();
        let num_samples = self.sampler.target();

        for pass in self.plan.passes() {
            match *pass {
                Pass::RayInit { write } => {
                    let camera = CameraUniform::new(&self.camera, extent, sample_index, num_samples);
                    self.device.generate_rays(self.resources.ray_pair(write)?, &camera)?;
                }
                Pass::Bounce(bounce) => {
                    let params = BounceUniform {
                        sample_index,
                        num_samples,
                        bounce: bounce.index,
                        primitive_count: scene.count,
                    };
                    let bindings = self.resources.bounce_bindings(&bounce)?;
                    self.device.shade_bounce(bindings, &scene.handle, &params)?;
                }
                Pass::Accumulate { layers } => {
                    self.device.accumulate(
                        self.resources.image(ImageRole::Attenuation)?,
                        self.resources.image(ImageRole::Emission)?,
                        self.resources.image(ImageRole::Estimate)?,
                        &AccumulateUniform::new(layers),
                    )?;
                }
            }
        }

        let estimate = self.resources.image(ImageRole::Estimate)?;
        let accumulated = self.resources.image(ImageRole::Accumulated)?;
        let device = &mut self.device;
        self.sampler
            .try_blend_with(|weight| device.blend(estimate, accumulated, weight))
    }

    /// Samples in the accumulated image.
    pub fn sample_count(&self) -> u32 {
        self.sampler.sample_count()
    }

    pub fn sampler(&self) -> &ProgressiveSampler {
        &self.sampler
    }

    pub fn is_converged(&self) -> bool {
        self.sampler.is_converged()
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn extent(&self) -> Extent {
        self.resources.extent()
    }

    pub fn generation(&self) -> u64 {
        self.resources.generation()
    }

    pub fn resources(&self) -> &ResourceSet<D::Image> {
        &self.resources
    }

    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }

    /// The accumulated image for presentation.
    pub fn output(&self) -> Option<&D::Image> {
        self.resources.accumulated()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable device access for work outside the pass sequence
    /// (program reloads, presentation).
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuDevice;

    fn pipeline(config: PipelineConfig) -> RenderPipeline<CpuDevice> {
        let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
        p.upload_scene(&Scene::demo()).unwrap();
        p
    }

    #[test]
    fn test_config_validation() {
        assert!(PipelineConfig::default().validate().is_ok());
        let bad = PipelineConfig { bounces: 0, ..Default::default() };
        assert!(matches!(bad.validate(), Err(Error::InvalidConfig(_))));
        let bad = PipelineConfig { bounces: MAX_BOUNCES + 1, ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = PipelineConfig { target_samples: 0, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_skips_until_sized() {
        let mut p = pipeline(PipelineConfig::default());
        assert_eq!(p.advance().unwrap(), FrameStatus::Skipped(SkipReason::Unsized));
        assert_eq!(p.device().stats().passes(), 0);
        p.resize(4, 4).unwrap();
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 1 });
    }

    #[test]
    fn test_skips_without_scene() {
        let mut p = RenderPipeline::new(CpuDevice::new(), PipelineConfig::default()).unwrap();
        p.resize(4, 4).unwrap();
        assert_eq!(p.advance().unwrap(), FrameStatus::Skipped(SkipReason::NoScene));
    }

    #[test]
    fn test_resize_resets_sample_count() {
        let mut p = pipeline(PipelineConfig { bounces: 2, ..Default::default() });
        p.resize(8, 6).unwrap();
        for _ in 0..5 {
            p.advance().unwrap();
        }
        assert_eq!(p.sample_count(), 5);
        p.resize(6, 4).unwrap();
        assert_eq!(p.sample_count(), 0);
        assert_eq!(p.sampler().weight(), 1.0);
    }

    #[test]
    fn test_camera_change_restarts() {
        let mut p = pipeline(PipelineConfig { bounces: 1, ..Default::default() });
        p.resize(2, 2).unwrap();
        p.advance().unwrap();
        p.set_camera(*p.camera());
        assert_eq!(p.sample_count(), 1);
        let moved = Camera::look_at(crate::util::Vec3::Z * 3.0, crate::util::Vec3::ZERO, crate::util::Vec3::Y, 60.0);
        p.set_camera(moved);
        assert_eq!(p.sample_count(), 0);
    }

    #[test]
    fn test_samples_per_frame_batches() {
        let mut p = pipeline(PipelineConfig {
            bounces: 1,
            target_samples: 5,
            samples_per_frame: 2,
        });
        p.resize(2, 2).unwrap();
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 2 });
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 4 });
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 5 });
        assert_eq!(p.advance().unwrap(), FrameStatus::Converged);
    }

    #[test]
    fn test_set_bounces_rebuilds_plan() {
        let mut p = pipeline(PipelineConfig { bounces: 2, ..Default::default() });
        p.resize(2, 2).unwrap();
        p.advance().unwrap();
        p.set_bounces(3).unwrap();
        assert_eq!(p.plan().bounces().count(), 3);
        assert_eq!(p.sample_count(), 0);
        assert!(p.set_bounces(0).is_err());
        assert_eq!(p.config().bounces, 3);
        p.advance().unwrap();
        assert_eq!(p.sample_count(), 1);
    }

    #[test]
    fn test_largest_target_renders() {
        let mut p = pipeline(PipelineConfig {
            bounces: 1,
            target_samples: u32::MAX,
            samples_per_frame: 1,
        });
        p.resize(2, 2).unwrap();
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 1 });
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 2 });
    }

    /// CPU device whose bounce pass can be made to fail.
    #[derive(Default)]
    struct FailingBounce {
        inner: CpuDevice,
        fail: bool,
        open: bool,
        aborted: u32,
        submitted: u32,
    }

    impl RenderDevice for FailingBounce {
        type Image = crate::cpu::CpuImage;
        type Scene = crate::cpu::CpuScene;

        fn name(&self) -> &'static str {
            "failing"
        }

        fn create_image(&mut self, desc: &ImageDesc, extent: Extent, layers: u32) -> Result<Self::Image> {
            self.inner.create_image(desc, extent, layers)
        }

        fn upload_scene(&mut self, primitives: &[crate::scene::Primitive]) -> Result<Self::Scene> {
            self.inner.upload_scene(primitives)
        }

        fn begin_frame(&mut self) {
            assert!(!self.open, "frame begun while another is open");
            self.open = true;
        }

        fn generate_rays(&mut self, target: RayPair<'_, Self::Image>, camera: &CameraUniform) -> Result<()> {
            self.inner.generate_rays(target, camera)
        }

        fn shade_bounce(
            &mut self,
            bindings: device::BounceBindings<'_, Self::Image>,
            scene: &Self::Scene,
            params: &BounceUniform,
        ) -> Result<()> {
            if self.fail {
                return Err(Error::binding("bounce target lost"));
            }
            self.inner.shade_bounce(bindings, scene, params)
        }

        fn accumulate(
            &mut self,
            attenuation: &Self::Image,
            emission: &Self::Image,
            estimate: &Self::Image,
            params: &AccumulateUniform,
        ) -> Result<()> {
            self.inner.accumulate(attenuation, emission, estimate, params)
        }

        fn blend(&mut self, estimate: &Self::Image, accumulated: &Self::Image, weight: f32) -> Result<()> {
            self.inner.blend(estimate, accumulated, weight)
        }

        fn end_frame(&mut self) -> Result<()> {
            self.open = false;
            self.submitted += 1;
            Ok(())
        }

        fn abort_frame(&mut self) {
            self.open = false;
            self.aborted += 1;
        }
    }

    #[test]
    fn test_failed_pass_aborts_frame() {
        let device = FailingBounce {
            fail: true,
            ..Default::default()
        };
        let mut p = RenderPipeline::new(device, PipelineConfig { bounces: 2, ..Default::default() }).unwrap();
        p.upload_scene(&Scene::demo()).unwrap();
        p.resize(2, 2).unwrap();

        assert!(matches!(p.advance(), Err(Error::BindingContract(_))));
        assert_eq!(p.device().aborted, 1);
        assert_eq!(p.device().submitted, 0);
        assert!(!p.device().open);
        assert_eq!(p.sample_count(), 0);

        // the next frame starts clean
        p.device_mut().fail = false;
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 1 });
        assert_eq!(p.device().aborted, 1);
        assert_eq!(p.device().submitted, 1);
    }
}
