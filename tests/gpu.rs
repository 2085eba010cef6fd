//! wgpu backend against the software device. Skipped when no adapter can
//! run the pass programs.
#![cfg(feature = "gpu")]

use raygl::cpu::CpuDevice;
use raygl::gpu::{GpuDevice, GpuImage};
use raygl::pipeline::{
    FrameStatus, ImageDesc, ImageRole, PipelineConfig, RenderDevice, RenderImage, RenderPipeline, IMAGE_DESCS,
};
use raygl::scene::{Primitive, Scene};
use raygl::util::{Error, Extent, Vec3, Vec4};

fn headless() -> Option<GpuDevice> {
    match GpuDevice::request_headless() {
        Ok(device) => Some(device),
        Err(Error::Unsupported(reason)) => {
            eprintln!("skipping: {reason}");
            None
        }
        Err(e) => panic!("gpu device setup failed: {e}"),
    }
}

fn desc(role: ImageRole) -> &'static ImageDesc {
    IMAGE_DESCS.iter().find(|d| d.role == role).unwrap()
}

fn fill(device: &GpuDevice, image: &GpuImage, value: Vec4) {
    let extent = image.extent();
    let texels = vec![value.to_array(); extent.pixel_count()];
    device.queue().write_texture(
        image.texture().as_image_copy(),
        bytemuck::cast_slice(&texels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(extent.width * 16),
            rows_per_image: Some(extent.height),
        },
        image.texture().size(),
    );
}

#[test]
fn test_gpu_matches_cpu_on_single_emitter() {
    let Some(gpu) = headless() else { return };
    let emission = Vec3::new(1.0, 0.5, 0.25);
    let scene = Scene::new(vec![Primitive::sphere(Vec3::ZERO, 100.0)
        .with_emission(emission)
        .with_albedo(Vec3::ZERO)]);
    let config = PipelineConfig {
        bounces: 1,
        target_samples: 10,
        samples_per_frame: 1,
    };

    let mut gp = RenderPipeline::new(gpu, config).unwrap();
    gp.upload_scene(&scene).unwrap();
    gp.resize(4, 4).unwrap();
    let mut cp = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    cp.upload_scene(&scene).unwrap();
    cp.resize(4, 4).unwrap();

    for frame in 1..=10 {
        assert_eq!(gp.advance().unwrap(), FrameStatus::Rendered { samples: frame });
        cp.advance().unwrap();
    }
    assert_eq!(gp.device().submissions(), 10);

    let gpu_image = gp.device().read_image(gp.output().unwrap(), 0).unwrap();
    let cpu_image = cp.output().unwrap().read().to_vec();
    assert_eq!(gpu_image.len(), 16);
    for (i, (g, c)) in gpu_image.iter().zip(&cpu_image).enumerate() {
        assert!((*g - *c).abs().max_element() < 1e-4, "pixel {i}: gpu {g} cpu {c}");
        assert!((g.truncate() - emission).abs().max_element() < 1e-4, "pixel {i}: {g}");
    }

    // converged: no submission, image untouched
    assert_eq!(gp.advance().unwrap(), FrameStatus::Converged);
    assert_eq!(gp.device().submissions(), 10);
    assert_eq!(gp.device().read_image(gp.output().unwrap(), 0).unwrap(), gpu_image);
}

#[test]
fn test_gpu_running_mean_keeps_moving_after_thousands_of_samples() {
    let Some(mut gpu) = headless() else { return };
    let extent = Extent::new(2, 2);
    let estimate = gpu.create_image(desc(ImageRole::Estimate), extent, 1).unwrap();
    let accumulated = gpu.create_image(desc(ImageRole::Accumulated), extent, 1).unwrap();

    // 1024 zeros then 3072 ones: the mean is 0.75
    for n in 0..4096u32 {
        match n {
            0 => fill(&gpu, &estimate, Vec4::ZERO),
            1024 => fill(&gpu, &estimate, Vec4::ONE),
            _ => {}
        }
        gpu.begin_frame();
        gpu.blend(&estimate, &accumulated, 1.0 / (n as f32 + 1.0)).unwrap();
        gpu.end_frame().unwrap();
    }

    for texel in gpu.read_image(&accumulated, 0).unwrap() {
        assert!((texel - Vec4::splat(0.75)).abs().max_element() < 1e-3, "{texel}");
    }
}

#[test]
fn test_gpu_readback_rejects_missing_layer() {
    let Some(mut gpu) = headless() else { return };
    let image = gpu.create_image(desc(ImageRole::Estimate), Extent::new(3, 3), 1).unwrap();
    assert!(matches!(gpu.read_image(&image, 1), Err(Error::BindingContract(_))));
}
