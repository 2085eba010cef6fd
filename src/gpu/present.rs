//! Display pass: tonemaps the accumulated image onto a target texture.
//!
//! The presenter only ever binds [`GpuImage::sampled_view`], so it cannot
//! write to the accumulated image.

use bytemuck::{Pod, Zeroable};

use super::programs::{compile_stage, link_program, texture_entry, uniform_entry, Program, ShaderSources, Stage};
use super::GpuImage;
use crate::util::Result;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PresentUniform {
    exposure: f32,
    encode_srgb: u32,
    _pad: [u32; 2],
}

/// Fullscreen tonemap pass for one target format.
pub struct Presenter {
    program: Program,
    uniform: wgpu::Buffer,
    target_format: wgpu::TextureFormat,
}

impl Presenter {
    pub fn new(device: &wgpu::Device, sources: &ShaderSources, target_format: wgpu::TextureFormat) -> Result<Self> {
        let program = Self::link(device, sources, target_format)?;
        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("present_uniform"),
            size: std::mem::size_of::<PresentUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self {
            program,
            uniform,
            target_format,
        })
    }

    fn link(device: &wgpu::Device, sources: &ShaderSources, target_format: wgpu::TextureFormat) -> Result<Program> {
        link_program(
            device,
            "present",
            &compile_stage(device, sources, Stage::Present)?,
            Stage::Present.entry_point(),
            &[
                uniform_entry(0, false, std::mem::size_of::<PresentUniform>() as u64),
                texture_entry(1, wgpu::TextureViewDimension::D2),
            ],
            &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        )
    }

    /// Relink from new sources; keeps the current program on failure.
    pub fn reload(&mut self, device: &wgpu::Device, sources: &ShaderSources) -> Result<()> {
        self.program = Self::link(device, sources, self.target_format)?;
        Ok(())
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Record the tonemap of `image` into `target`.
    pub fn present(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        image: &GpuImage,
        target: &wgpu::TextureView,
        exposure: f32,
    ) {
        let uniform = PresentUniform {
            exposure,
            // sRGB targets encode on store
            encode_srgb: u32::from(!self.target_format.is_srgb()),
            _pad: [0; 2],
        };
        queue.write_buffer(&self.uniform, 0, bytemuck::bytes_of(&uniform));

        let source = image.sampled_view();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present_bg"),
            layout: &self.program.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&source),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("present_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.program.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
