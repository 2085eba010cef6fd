//! Interactive viewer: progressive rendering of the demo scene in an egui window

mod app;
mod camera;
mod settings;
mod viewport;

pub use settings::Settings;

use anyhow::Result;

type AppError = Box<dyn std::error::Error + Send + Sync>;

/// Run the viewer. Logging must already be initialised; `trace_guard` is
/// kept alive until the window closes.
pub fn run(trace_guard: Option<tracing_chrome::FlushGuard>) -> Result<()> {
    let settings = Settings::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([settings.window_width, settings.window_height])
            .with_title("raygl"),
        renderer: eframe::Renderer::Wgpu,
        wgpu_options: egui_wgpu::WgpuConfiguration {
            wgpu_setup: egui_wgpu::WgpuSetup::CreateNew(egui_wgpu::WgpuSetupCreateNew {
                device_descriptor: std::sync::Arc::new(|adapter| {
                    let (required_features, required_limits) = crate::gpu::device_requirements(adapter);
                    wgpu::DeviceDescriptor {
                        label: Some("raygl viewer device"),
                        required_features,
                        required_limits,
                        ..Default::default()
                    }
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        ..Default::default()
    };

    eframe::run_native(
        "raygl",
        options,
        Box::new(
            move |cc: &eframe::CreationContext<'_>| -> std::result::Result<Box<dyn eframe::App>, AppError> {
                let app = app::RayglApp::new(cc, trace_guard)?;
                Ok(Box::new(app))
            },
        ),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run: {}", e))
}
