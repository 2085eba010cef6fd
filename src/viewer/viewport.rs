//! Viewport widget: drives the pipeline at the widget's pixel size and shows
//! the tonemapped accumulated image.

use egui::{Response, Sense, Ui, Vec2};

use super::camera::OrbitCamera;
use crate::gpu::{GpuDevice, Presenter};
use crate::pipeline::{FrameStatus, RenderPipeline};
use crate::util::Result;

/// Viewport state
pub struct Viewport {
    pub camera: OrbitCamera,
    texture_id: Option<egui::TextureId>,
    display: Option<DisplayTexture>,
}

struct DisplayTexture {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl Viewport {
    pub fn new(camera: OrbitCamera) -> Self {
        Self {
            camera,
            texture_id: None,
            display: None,
        }
    }

    /// Show the viewport, advance the pipeline by one frame and present it.
    pub fn show(
        &mut self,
        ui: &mut Ui,
        render_state: &egui_wgpu::RenderState,
        pipeline: &mut RenderPipeline<GpuDevice>,
        presenter: &Presenter,
        exposure: f32,
    ) -> Result<(Response, FrameStatus)> {
        let _span = tracing::info_span!("viewport_show").entered();
        let available = ui.available_size();
        let size = Vec2::new(available.x.max(16.0), available.y.max(16.0));
        let (rect, response) = ui.allocate_exact_size(size, Sense::click_and_drag());

        self.handle_input(ui, &response);
        self.camera.update(ui.input(|i| i.stable_dt));
        pipeline.set_camera(self.camera.camera());

        // render at physical pixels
        let ppp = ui.ctx().pixels_per_point();
        let width = (size.x * ppp).round() as u32;
        let height = (size.y * ppp).round() as u32;
        pipeline.resize(width, height)?;
        let status = pipeline.advance()?;

        if let Some(image) = pipeline.output() {
            self.ensure_display_texture(render_state, width, height);
            if let Some(display) = &self.display {
                let device = &render_state.device;
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("present_encoder"),
                });
                presenter.present(device, &render_state.queue, &mut encoder, image, &display.view, exposure);
                render_state.queue.submit(Some(encoder.finish()));
            }
        }

        if let Some(tex_id) = self.texture_id {
            ui.painter().image(
                tex_id,
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
        Ok((response, status))
    }

    fn ensure_display_texture(&mut self, render_state: &egui_wgpu::RenderState, width: u32, height: u32) {
        if self.display.as_ref().is_some_and(|d| d.size == (width, height)) {
            return;
        }

        let device = &render_state.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("viewport_display_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: render_state.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Register with egui
        let tex_id = render_state
            .renderer
            .write()
            .register_native_texture(device, &view, wgpu::FilterMode::Linear);
        if let Some(old_id) = self.texture_id.take() {
            render_state.renderer.write().free_texture(&old_id);
        }

        self.texture_id = Some(tex_id);
        self.display = Some(DisplayTexture {
            texture,
            view,
            size: (width, height),
        });
    }

    fn handle_input(&mut self, ui: &Ui, response: &Response) {
        if response.dragged_by(egui::PointerButton::Primary) {
            let delta = response.drag_delta();
            self.camera.orbit(delta.x, delta.y);
        }
        if response.dragged_by(egui::PointerButton::Middle) {
            let delta = response.drag_delta();
            self.camera.pan(delta.x, delta.y);
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll.abs() > 0.0 {
                self.camera.zoom(scroll);
            }
        }
    }
}
