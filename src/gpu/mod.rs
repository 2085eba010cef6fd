//! wgpu backend.
//!
//! Every pass is a fullscreen-triangle render pass. Bounce passes write four
//! color attachments at once (next ray origin and direction, plus one layer
//! of the attenuation and emission arrays), so the device must allow 64 bytes
//! of color attachments per sample. All pass images are `Rgba32Float`, which
//! wgpu cannot blend, so the running mean is computed in the blend shader
//! from a copy of the previous accumulated image.
//!
//! ## Usage
//! ```ignore
//! let device = GpuDevice::new(wgpu_device, queue)?;
//! let mut pipeline = RenderPipeline::new(device, PipelineConfig::default())?;
//! pipeline.upload_scene(&Scene::demo())?;
//! pipeline.resize(1280, 720)?;
//! pipeline.advance()?; // one sample, one submission
//! ```

pub mod present;
pub mod programs;

pub use present::Presenter;
pub use programs::{ShaderSources, Stage};

use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use crate::pipeline::{
    ensure_distinct, ensure_same_extent, AccumulateUniform, BounceBindings, BounceUniform, CameraUniform,
    ImageDesc, RayPair, RenderDevice, RenderImage, MAX_BOUNCES,
};
use crate::scene::Primitive;
use crate::util::{Error, Extent, Result, Vec4};

use programs::Programs;

/// Format of every pass image.
pub const RAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Color attachment bytes per sample of a bounce pass (4 x Rgba32Float).
pub const BOUNCE_ATTACHMENT_BYTES: u32 = 64;
/// Color attachments of a bounce pass.
pub const BOUNCE_ATTACHMENTS: u32 = 4;

/// Stride of the per-bounce uniform slots (dynamic offset alignment).
const UNIFORM_STRIDE: u64 = 256;

const TEXEL_BYTES: u32 = 16;

pub(crate) const FLOAT_TARGET: wgpu::ColorTargetState = wgpu::ColorTargetState {
    format: RAY_FORMAT,
    blend: None,
    write_mask: wgpu::ColorWrites::ALL,
};

/// Usages of every pass image. Copies feed the blend history, uploads and
/// readback.
pub const IMAGE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Blend pass inputs, matches `BlendUniform` in `blend.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct BlendUniform {
    weight: f32,
    _pad: [f32; 3],
}

/// Limits to request from `adapter` for this backend.
///
/// Starts from the backend defaults and raises the attachment, texture and
/// fragment storage limits to what the adapter supports.
pub fn device_requirements(adapter: &wgpu::Adapter) -> (wgpu::Features, wgpu::Limits) {
    let supported = adapter.limits();
    let base = if adapter.get_info().backend == wgpu::Backend::Gl {
        wgpu::Limits::downlevel_webgl2_defaults()
    } else {
        wgpu::Limits::default()
    };
    let limits = wgpu::Limits {
        max_color_attachment_bytes_per_sample: supported.max_color_attachment_bytes_per_sample,
        max_color_attachments: supported.max_color_attachments,
        max_texture_dimension_2d: supported.max_texture_dimension_2d,
        max_storage_buffers_per_shader_stage: supported.max_storage_buffers_per_shader_stage,
        max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
        ..base
    };
    (wgpu::Features::empty(), limits)
}

/// Check that `limits` allow a bounce pass.
pub fn check_limits(limits: &wgpu::Limits) -> Result<()> {
    if limits.max_color_attachments < BOUNCE_ATTACHMENTS {
        return Err(Error::Unsupported(format!(
            "{} color attachments available, bounce pass needs {BOUNCE_ATTACHMENTS}",
            limits.max_color_attachments
        )));
    }
    if limits.max_color_attachment_bytes_per_sample < BOUNCE_ATTACHMENT_BYTES {
        return Err(Error::Unsupported(format!(
            "{} color attachment bytes per sample, bounce pass needs {BOUNCE_ATTACHMENT_BYTES}",
            limits.max_color_attachment_bytes_per_sample
        )));
    }
    if limits.max_storage_buffers_per_shader_stage < 1 {
        return Err(Error::Unsupported(
            "no storage buffers in the fragment stage, bounce pass reads the scene from one".into(),
        ));
    }
    Ok(())
}

/// Check that [`RAY_FORMAT`] can be rendered to, sampled and copied.
pub fn check_format_features(features: &wgpu::TextureFormatFeatures) -> Result<()> {
    if !features.allowed_usages.contains(IMAGE_USAGE) {
        return Err(Error::Unsupported(format!(
            "{RAY_FORMAT:?} allows {:?}, pass images need {IMAGE_USAGE:?}",
            features.allowed_usages
        )));
    }
    Ok(())
}

/// Reject adapters that cannot run the pass programs, before a device is
/// requested.
pub fn check_adapter(adapter: &wgpu::Adapter) -> Result<()> {
    check_limits(&adapter.limits())?;
    check_format_features(&adapter.get_texture_format_features(RAY_FORMAT))
}

/// A pass image on the GPU.
#[derive(Debug)]
pub struct GpuImage {
    label: &'static str,
    texture: wgpu::Texture,
    /// Whole image: `D2Array` for layered images, `D2` otherwise.
    view: wgpu::TextureView,
    /// One `D2` attachment view per layer.
    layer_views: Vec<wgpu::TextureView>,
    extent: Extent,
    layers: u32,
}

impl GpuImage {
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    /// View used when the image is read by a pass.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Attachment view of `layer`.
    pub fn layer_view(&self, layer: u32) -> Result<&wgpu::TextureView> {
        self.layer_views.get(layer as usize).ok_or_else(|| {
            Error::binding(format!("{} has no layer {layer} (layers: {})", self.label, self.layers))
        })
    }

    /// Read-only view for presentation: usage is restricted to sampling, so
    /// the view cannot be bound as a render target.
    pub fn sampled_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("presentation_view"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            usage: Some(wgpu::TextureUsages::TEXTURE_BINDING),
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

impl RenderImage for GpuImage {
    fn label(&self) -> &'static str {
        self.label
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn layers(&self) -> u32 {
        self.layers
    }
}

/// Primitive storage buffer.
#[derive(Debug)]
pub struct GpuScene {
    buffer: wgpu::Buffer,
}

impl GpuScene {
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// [`RenderDevice`] on a wgpu device and queue.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    programs: Programs,
    sources: ShaderSources,
    camera_buffer: wgpu::Buffer,
    bounce_buffer: wgpu::Buffer,
    accumulate_buffer: wgpu::Buffer,
    blend_buffer: wgpu::Buffer,
    /// Previous accumulated image, read by the blend pass.
    history: Option<GpuImage>,
    encoder: Option<wgpu::CommandEncoder>,
    submissions: u64,
}

impl GpuDevice {
    /// Wrap a device with the embedded shaders.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        Self::with_sources(device, queue, ShaderSources::embedded())
    }

    /// Wrap a device; fails with `Unsupported`, `Compile` or `Link`.
    pub fn with_sources(device: wgpu::Device, queue: wgpu::Queue, sources: ShaderSources) -> Result<Self> {
        check_limits(&device.limits())?;
        device.on_uncaptured_error(Arc::new(|err: wgpu::Error| {
            log::error!("wgpu: {err}");
        }));

        let programs = Programs::build(&device, &sources)?;

        let uniform = |label: &'static str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let camera_buffer = uniform("camera_uniform", std::mem::size_of::<CameraUniform>() as u64);
        let bounce_buffer = uniform("bounce_uniforms", UNIFORM_STRIDE * MAX_BOUNCES as u64);
        let accumulate_buffer = uniform("accumulate_uniform", std::mem::size_of::<AccumulateUniform>() as u64);
        let blend_buffer = uniform("blend_uniform", std::mem::size_of::<BlendUniform>() as u64);

        log::info!("gpu device ready");
        Ok(Self {
            device,
            queue,
            programs,
            sources,
            camera_buffer,
            bounce_buffer,
            accumulate_buffer,
            blend_buffer,
            history: None,
            encoder: None,
            submissions: 0,
        })
    }

    /// Create a device without a window, for offline rendering and tests.
    pub fn request_headless() -> Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| Error::Unsupported(format!("no adapter: {e}")))?;
            let info = adapter.get_info();
            check_adapter(&adapter)
                .map_err(|e| Error::Unsupported(format!("{} ({:?}): {e}", info.name, info.backend)))?;
            let (required_features, required_limits) = device_requirements(&adapter);
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("raygl headless device"),
                    required_features,
                    required_limits,
                    ..Default::default()
                })
                .await
                .map_err(|e| Error::Unsupported(format!("device request failed: {e}")))?;
            Self::new(device, queue)
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn sources(&self) -> &ShaderSources {
        &self.sources
    }

    /// Command buffers submitted so far.
    pub fn submissions(&self) -> u64 {
        self.submissions
    }

    /// Rebuild the pass programs from `sources`. On failure the current
    /// programs stay in use.
    pub fn reload(&mut self, sources: ShaderSources) -> Result<()> {
        let programs = Programs::build(&self.device, &sources)?;
        self.programs = programs;
        self.sources = sources;
        log::info!("pass programs reloaded");
        Ok(())
    }

    /// Copy one layer of `image` to host memory, row-major.
    ///
    /// Blocks until the GPU has finished every submitted frame.
    pub fn read_image(&self, image: &GpuImage, layer: u32) -> Result<Vec<Vec4>> {
        let _span = tracing::debug_span!("read_image", image = image.label).entered();
        if layer >= image.layers {
            return Err(Error::binding(format!(
                "{} has no layer {layer} (layers: {})",
                image.label, image.layers
            )));
        }
        let Extent { width, height } = image.extent;
        let row_bytes = width * TEXEL_BYTES;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row = row_bytes.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = new_encoder(&self.device, "readback_encoder");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| Error::Readback(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| Error::Readback(e.to_string()))?
            .map_err(|e| Error::Readback(e.to_string()))?;

        let mut texels = Vec::with_capacity(image.extent.pixel_count());
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(bytes_per_row as usize) {
                let rgba: Vec<[f32; 4]> = bytemuck::pod_collect_to_vec(&row[..row_bytes as usize]);
                texels.extend(rgba.into_iter().map(Vec4::from_array));
            }
        }
        buffer.unmap();
        Ok(texels)
    }

    /// Allocate a 2D (or 2D array) texture with per-layer attachment views.
    fn allocate(
        &self,
        label: &'static str,
        layered: bool,
        usage: wgpu::TextureUsages,
        extent: Extent,
        layers: u32,
    ) -> Result<GpuImage> {
        let fail = |reason: String| Error::Resize {
            width: extent.width,
            height: extent.height,
            reason,
        };
        let limits = self.device.limits();
        if extent.width > limits.max_texture_dimension_2d || extent.height > limits.max_texture_dimension_2d {
            return Err(fail(format!(
                "{label} exceeds max texture dimension {}",
                limits.max_texture_dimension_2d
            )));
        }
        if layers == 0 || layers > limits.max_texture_array_layers {
            return Err(fail(format!(
                "{label} needs {layers} layers, device allows {}",
                limits.max_texture_array_layers
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: RAY_FORMAT,
            usage,
            view_formats: &[],
        });
        let layer_views: Vec<_> = (0..layers)
            .map(|k| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(label),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: k,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        let view = if layered {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(label),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            })
        } else {
            layer_views[0].clone()
        };
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(err) = validation.or(oom) {
            return Err(fail(format!("{label}: {err}")));
        }

        Ok(GpuImage {
            label,
            texture,
            view,
            layer_views,
            extent,
            layers,
        })
    }

    /// Make sure the blend history matches `extent`.
    fn ensure_history(&mut self, extent: Extent) -> Result<()> {
        if self.history.as_ref().map(|h| h.extent) != Some(extent) {
            self.history = None;
            let usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
            self.history = Some(self.allocate("accumulated_history", false, usage, extent, 1)?);
        }
        Ok(())
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder
            .get_or_insert_with(|| new_encoder(device, "frame_encoder"))
    }
}

fn new_encoder(device: &wgpu::Device, label: &'static str) -> wgpu::CommandEncoder {
    device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
}

fn attachment(view: &wgpu::TextureView, load: wgpu::LoadOp<wgpu::Color>) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        depth_slice: None,
        resolve_target: None,
        ops: wgpu::Operations {
            load,
            store: wgpu::StoreOp::Store,
        },
    })
}

fn clear(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    attachment(view, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT))
}

/// Record one fullscreen draw into `targets`.
fn fullscreen_pass(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    offsets: &[u32],
    targets: &[Option<wgpu::RenderPassColorAttachment<'_>>],
) {
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: targets,
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, bind_group, offsets);
    pass.draw(0..3, 0..1); // fullscreen triangle
}

impl RenderDevice for GpuDevice {
    type Image = GpuImage;
    type Scene = GpuScene;

    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_image(&mut self, desc: &ImageDesc, extent: Extent, layers: u32) -> Result<GpuImage> {
        self.allocate(desc.label, desc.role.is_layered(), IMAGE_USAGE, extent, layers)
    }

    fn upload_scene(&mut self, primitives: &[Primitive]) -> Result<GpuScene> {
        let fail = |reason: String| Error::Upload {
            count: primitives.len(),
            reason,
        };
        let bytes: &[u8] = bytemuck::cast_slice(primitives);
        // wgpu rejects zero-sized bindings; an empty scene binds one zeroed slot
        let size = (bytes.len() as u64).max(std::mem::size_of::<Primitive>() as u64);
        let max = self.device.limits().max_storage_buffer_binding_size as u64;
        if size > max {
            return Err(fail(format!("{size} bytes exceeds storage binding limit {max}")));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scene_primitives"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(fail(err.to_string()));
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&buffer, 0, bytes);
        }
        Ok(GpuScene { buffer })
    }

    fn begin_frame(&mut self) {
        self.encoder();
    }

    fn generate_rays(&mut self, target: RayPair<'_, GpuImage>, camera: &CameraUniform) -> Result<()> {
        ensure_distinct(&[target.origin, target.direction], "ray_init")?;
        ensure_same_extent(&[target.origin, target.direction], "ray_init")?;
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(camera));

        let program = &self.programs.camera;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera_bg"),
            layout: &program.layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: self.camera_buffer.as_entire_binding(),
            }],
        });
        let targets = [clear(target.origin.layer_view(0)?), clear(target.direction.layer_view(0)?)];
        let pipeline = program.pipeline.clone();
        fullscreen_pass(self.encoder(), "ray_init", &pipeline, &bind_group, &[], &targets);
        Ok(())
    }

    fn shade_bounce(
        &mut self,
        bindings: BounceBindings<'_, GpuImage>,
        scene: &GpuScene,
        params: &BounceUniform,
    ) -> Result<()> {
        let BounceBindings {
            layer,
            source,
            target,
            attenuation,
            emission,
        } = bindings;
        let all = [source.origin, source.direction, target.origin, target.direction, attenuation, emission];
        ensure_distinct(&all, "bounce")?;
        ensure_same_extent(&all, "bounce")?;
        if params.bounce >= MAX_BOUNCES {
            return Err(Error::binding(format!("bounce {} has no uniform slot", params.bounce)));
        }

        let offset = params.bounce as u64 * UNIFORM_STRIDE;
        self.queue
            .write_buffer(&self.bounce_buffer, offset, bytemuck::bytes_of(params));

        let program = &self.programs.bounce;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bounce_bg"),
            layout: &program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.bounce_buffer,
                        offset: 0,
                        size: NonZeroU64::new(std::mem::size_of::<BounceUniform>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: scene.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(source.origin.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(source.direction.view()),
                },
            ],
        });
        let targets = [
            clear(target.origin.layer_view(0)?),
            clear(target.direction.layer_view(0)?),
            clear(attenuation.layer_view(layer)?),
            clear(emission.layer_view(layer)?),
        ];
        let pipeline = program.pipeline.clone();
        fullscreen_pass(
            self.encoder(),
            "bounce",
            &pipeline,
            &bind_group,
            &[offset as u32],
            &targets,
        );
        Ok(())
    }

    fn accumulate(
        &mut self,
        attenuation: &GpuImage,
        emission: &GpuImage,
        estimate: &GpuImage,
        params: &AccumulateUniform,
    ) -> Result<()> {
        ensure_distinct(&[attenuation, emission, estimate], "accumulate")?;
        ensure_same_extent(&[attenuation, emission, estimate], "accumulate")?;
        self.queue
            .write_buffer(&self.accumulate_buffer, 0, bytemuck::bytes_of(params));

        let program = &self.programs.accumulate;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("accumulate_bg"),
            layout: &program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.accumulate_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(attenuation.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(emission.view()),
                },
            ],
        });
        let targets = [clear(estimate.layer_view(0)?)];
        let pipeline = program.pipeline.clone();
        fullscreen_pass(self.encoder(), "accumulate", &pipeline, &bind_group, &[], &targets);
        Ok(())
    }

    fn blend(&mut self, estimate: &GpuImage, accumulated: &GpuImage, weight: f32) -> Result<()> {
        ensure_distinct(&[estimate, accumulated], "blend")?;
        let extent = ensure_same_extent(&[estimate, accumulated], "blend")?;
        self.ensure_history(extent)?;
        let history = self
            .history
            .as_ref()
            .ok_or_else(|| Error::binding("blend history missing"))?;

        let uniform = BlendUniform {
            weight,
            _pad: [0.0; 3],
        };
        self.queue
            .write_buffer(&self.blend_buffer, 0, bytemuck::bytes_of(&uniform));

        let program = &self.programs.blend;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blend_bg"),
            layout: &program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.blend_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(estimate.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(history.view()),
                },
            ],
        });

        let device = &self.device;
        let encoder = self
            .encoder
            .get_or_insert_with(|| new_encoder(device, "frame_encoder"));
        // the first sample replaces whatever the image held, history is not read
        if weight < 1.0 {
            encoder.copy_texture_to_texture(
                accumulated.texture.as_image_copy(),
                history.texture.as_image_copy(),
                history.texture.size(),
            );
        }
        let targets = [clear(accumulated.layer_view(0)?)];
        fullscreen_pass(encoder, "blend", &program.pipeline, &bind_group, &[], &targets);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
            self.submissions += 1;
        }
        Ok(())
    }

    fn abort_frame(&mut self) {
        if self.encoder.take().is_some() {
            log::warn!("dropping partially recorded frame");
        }
    }
}
