//! Main viewer application

use anyhow::Context as _;
use egui::{CentralPanel, Color32, RichText, SidePanel, TopBottomPanel};

use super::camera::OrbitCamera;
use super::settings::Settings;
use super::viewport::Viewport;
use crate::gpu::{GpuDevice, Presenter, ShaderSources};
use crate::pipeline::{FrameStatus, RenderPipeline, SkipReason, MAX_BOUNCES};
use crate::scene::Scene;
use crate::util::Vec3;

pub struct RayglApp {
    settings: Settings,
    viewport: Viewport,
    pipeline: RenderPipeline<GpuDevice>,
    presenter: Presenter,
    last_status: FrameStatus,
    status_message: String,
    error_message: Option<String>,
    reload_requested: bool,
    _trace_guard: Option<tracing_chrome::FlushGuard>,
}

impl RayglApp {
    /// Build the pipeline on eframe's device. Shader errors here are fatal.
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        trace_guard: Option<tracing_chrome::FlushGuard>,
    ) -> anyhow::Result<Self> {
        let settings = Settings::load();
        let render_state = cc
            .wgpu_render_state
            .as_ref()
            .context("viewer requires the wgpu renderer")?;
        crate::gpu::check_adapter(&render_state.adapter)?;

        let sources = match settings.shader_dir() {
            Some(dir) => ShaderSources::load(&dir)?,
            None => ShaderSources::embedded(),
        };
        let device = GpuDevice::with_sources(render_state.device.clone(), render_state.queue.clone(), sources)?;
        let presenter = Presenter::new(&render_state.device, device.sources(), render_state.target_format)?;

        let mut pipeline = RenderPipeline::new(device, settings.pipeline_config())?;
        pipeline.upload_scene(&Scene::demo())?;

        let mut camera = OrbitCamera::new(
            Vec3::new(0.0, 0.5, 0.0),
            settings.camera_distance,
            settings.camera_yaw,
            settings.camera_pitch,
        );
        camera.fov = settings.fov;

        Ok(Self {
            settings,
            viewport: Viewport::new(camera),
            pipeline,
            presenter,
            last_status: FrameStatus::Skipped(SkipReason::Unsized),
            status_message: "Ready".into(),
            error_message: None,
            reload_requested: false,
            _trace_guard: trace_guard,
        })
    }

    /// Rebuild every program from the shader directory. The running programs
    /// stay active if anything fails.
    fn reload_shaders(&mut self, render_state: Option<&egui_wgpu::RenderState>) {
        let Some(dir) = self.settings.shader_dir() else {
            self.status_message = "No shader directory set (RAYGL_SHADER_DIR)".into();
            return;
        };
        let result = ShaderSources::load(&dir).and_then(|sources| {
            // link the present stage first so a failure leaves both untouched
            let presenter = match render_state {
                Some(rs) => Some(Presenter::new(&rs.device, &sources, self.presenter.target_format())?),
                None => None,
            };
            self.pipeline.device_mut().reload(sources)?;
            if let Some(presenter) = presenter {
                self.presenter = presenter;
            }
            Ok(())
        });
        match result {
            Ok(()) => {
                self.pipeline.restart();
                self.error_message = None;
                self.status_message = format!("Shaders reloaded from {}", dir.display());
            }
            Err(e) => {
                log::error!("shader reload failed: {e}");
                self.error_message = Some(e.to_string());
                self.status_message = "Shader reload failed, keeping previous programs".into();
            }
        }
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Render");
        ui.add_space(4.0);

        let sampler = self.pipeline.sampler();
        ui.add(
            egui::ProgressBar::new(sampler.progress())
                .text(format!("{} / {} samples", sampler.sample_count(), sampler.target())),
        );
        ui.label(format!("Resolution: {}", self.pipeline.extent()));
        ui.separator();

        let mut bounces = self.settings.bounces;
        if ui
            .add(egui::Slider::new(&mut bounces, 1..=MAX_BOUNCES).text("Bounces"))
            .changed()
        {
            match self.pipeline.set_bounces(bounces) {
                Ok(()) => self.settings.bounces = bounces,
                Err(e) => self.error_message = Some(e.to_string()),
            }
        }

        let mut target = self.settings.target_samples;
        if ui
            .add(egui::DragValue::new(&mut target).range(1..=1 << 20).prefix("Target: "))
            .changed()
        {
            match self.pipeline.set_target_samples(target) {
                Ok(()) => self.settings.target_samples = target,
                Err(e) => self.error_message = Some(e.to_string()),
            }
        }

        let mut per_frame = self.settings.samples_per_frame;
        if ui
            .add(egui::Slider::new(&mut per_frame, 1..=64).text("Samples / frame"))
            .changed()
        {
            match self.pipeline.set_samples_per_frame(per_frame) {
                Ok(()) => self.settings.samples_per_frame = per_frame,
                Err(e) => self.error_message = Some(e.to_string()),
            }
        }

        ui.separator();
        ui.add(egui::Slider::new(&mut self.settings.exposure, 0.05..=8.0).logarithmic(true).text("Exposure"));
        if ui
            .add(egui::Slider::new(&mut self.viewport.camera.fov, 10.0..=120.0).text("FOV"))
            .changed()
        {
            self.settings.fov = self.viewport.camera.fov;
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Restart").clicked() {
                self.pipeline.restart();
            }
            if ui.button("Reload shaders").clicked() {
                self.reload_requested = true;
            }
        });
        ui.add_space(8.0);
        ui.label(RichText::new("Esc quit · R reload · Space restart").small().weak());
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let state = match self.last_status {
                FrameStatus::Rendered { .. } => "rendering",
                FrameStatus::Converged => "converged",
                FrameStatus::Skipped(SkipReason::Unsized) => "minimized",
                FrameStatus::Skipped(SkipReason::NoScene) => "no scene",
            };
            ui.label(state);
            ui.separator();
            ui.label(&self.status_message);
            if let Some(err) = &self.error_message {
                ui.separator();
                ui.label(RichText::new(err.lines().next().unwrap_or_default()).color(Color32::LIGHT_RED))
                    .on_hover_text(err);
            }
        });
    }
}

impl eframe::App for RayglApp {
    fn on_exit(&mut self) {
        self.settings.camera_distance = self.viewport.camera.distance();
        let (yaw, pitch) = self.viewport.camera.angles();
        self.settings.camera_yaw = yaw;
        self.settings.camera_pitch = pitch;
        self.settings.save();
    }

    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let _span = tracing::info_span!("viewer_update").entered();

        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
        if ctx.input(|i| i.key_pressed(egui::Key::R)) {
            self.reload_requested = true;
        }
        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.pipeline.restart();
            self.status_message = "Accumulation restarted".into();
        }

        TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        let response = SidePanel::right("side_panel")
            .default_width(self.settings.side_panel_width)
            .min_width(150.0)
            .max_width(400.0)
            .resizable(true)
            .show(ctx, |ui| {
                self.side_panel(ui);
            });
        self.settings.side_panel_width = response.response.rect.width();

        if std::mem::take(&mut self.reload_requested) {
            self.reload_shaders(frame.wgpu_render_state());
        }

        CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let Some(render_state) = frame.wgpu_render_state() else {
                    ui.label("wgpu renderer unavailable");
                    return;
                };
                match self.viewport.show(
                    ui,
                    render_state,
                    &mut self.pipeline,
                    &self.presenter,
                    self.settings.exposure,
                ) {
                    Ok((_, status)) => self.last_status = status,
                    Err(e) => {
                        log::error!("frame failed: {e}");
                        self.error_message = Some(e.to_string());
                    }
                }
            });

        ctx.input(|i| {
            if let Some(rect) = i.viewport().inner_rect {
                self.settings.window_width = rect.width();
                self.settings.window_height = rect.height();
            }
        });

        // idle once converged
        if !self.pipeline.is_converged() {
            ctx.request_repaint();
        }
    }
}
