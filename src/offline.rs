//! Headless rendering to an image file on the software device.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::cpu::CpuDevice;
use crate::pipeline::{FrameStatus, PipelineConfig, RenderPipeline};
use crate::present;
use crate::scene::{Camera, Scene};
use crate::util::{Error, Result};

/// Parameters of one offline render.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub bounces: u32,
    pub exposure: f32,
    pub output: PathBuf,
}

impl Default for RenderJob {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            samples: 64,
            bounces: PipelineConfig::default().bounces,
            exposure: 1.0,
            output: PathBuf::from("render.png"),
        }
    }
}

/// What an offline render produced.
#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub samples: u32,
    pub elapsed: Duration,
}

/// Render `scene` from `camera` until `job.samples` samples are accumulated,
/// then write `job.output`.
pub fn render(job: &RenderJob, scene: &Scene, camera: Camera) -> Result<RenderSummary> {
    let _span = tracing::info_span!("offline_render", width = job.width, height = job.height).entered();
    if job.width == 0 || job.height == 0 {
        return Err(Error::config(format!("image size {}x{} is empty", job.width, job.height)));
    }
    // fail on the extension before spending time on samples
    present::ExportFormat::from_path(&job.output)?;

    let config = PipelineConfig {
        bounces: job.bounces,
        target_samples: job.samples,
        samples_per_frame: 1,
    };
    let mut pipeline = RenderPipeline::new(CpuDevice::new(), config)?;
    pipeline.upload_scene(scene)?;
    pipeline.set_camera(camera);
    pipeline.resize(job.width, job.height)?;

    let start = Instant::now();
    loop {
        match pipeline.advance()? {
            FrameStatus::Rendered { samples } => {
                if samples % 16 == 0 {
                    log::debug!("{samples}/{} samples", job.samples);
                }
            }
            FrameStatus::Converged => break,
            FrameStatus::Skipped(reason) => {
                return Err(Error::binding(format!("offline render skipped a frame: {reason:?}")));
            }
        }
    }
    let elapsed = start.elapsed();

    let image = pipeline
        .output()
        .ok_or_else(|| Error::binding("no accumulated image after rendering"))?;
    present::export(image, &job.output, job.exposure)?;
    log::info!(
        "{} samples at {}x{} in {:.2?}",
        pipeline.sample_count(),
        job.width,
        job.height,
        elapsed
    );
    Ok(RenderSummary {
        samples: pipeline.sample_count(),
        elapsed,
    })
}
