//! End-to-end behaviour of the progressive pipeline on the software device.

use raygl::cpu::shading::{self, Ray};
use raygl::cpu::{CpuDevice, CpuImage};
use raygl::pipeline::{
    BounceUniform, CameraUniform, FrameStatus, ImageRole, PipelineConfig, RenderImage, RenderPipeline,
};
use raygl::scene::{Camera, Primitive, Scene};
use raygl::util::{UVec2, Vec3, Vec4};

fn snapshot(image: &CpuImage) -> Vec<Vec4> {
    image.read().to_vec()
}

fn estimate(p: &RenderPipeline<CpuDevice>) -> Vec<Vec4> {
    snapshot(p.resources().image(ImageRole::Estimate).unwrap())
}

fn accumulated(p: &RenderPipeline<CpuDevice>) -> Vec<Vec4> {
    snapshot(p.output().unwrap())
}

fn close(a: Vec4, b: Vec4, tol: f32) -> bool {
    (a - b).abs().max_element() <= tol * b.abs().max_element().max(1.0)
}

#[test]
fn test_single_emitter_converges_to_its_emission() {
    let emission = Vec3::new(1.0, 0.5, 0.25);
    // camera sits inside the sphere, every primary ray hits it
    let scene = Scene::new(vec![Primitive::sphere(Vec3::ZERO, 100.0)
        .with_emission(emission)
        .with_albedo(Vec3::ZERO)]);
    let config = PipelineConfig {
        bounces: 1,
        target_samples: 10,
        samples_per_frame: 1,
    };
    let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    p.upload_scene(&scene).unwrap();
    p.resize(4, 4).unwrap();

    let mut estimates = Vec::new();
    for frame in 1..=10 {
        assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: frame });
        estimates.push(estimate(&p));
    }
    assert_eq!(p.sample_count(), 10);
    assert!(p.is_converged());

    let acc = accumulated(&p);
    for (i, texel) in acc.iter().enumerate() {
        let mean = estimates.iter().map(|e| e[i]).sum::<Vec4>() / estimates.len() as f32;
        assert!(close(*texel, mean, 1e-5), "pixel {i}: {texel} vs mean {mean}");
        assert!(close(*texel, emission.extend(1.0), 1e-5), "pixel {i}: {texel}");
    }

    // 11th frame: nothing issued, nothing changed
    let passes = p.device().stats().passes();
    assert_eq!(p.advance().unwrap(), FrameStatus::Converged);
    assert_eq!(p.device().stats().passes(), passes);
    assert_eq!(accumulated(&p), acc);
    assert_eq!(p.sample_count(), 10);
}

#[test]
fn test_accumulated_is_mean_of_estimates() {
    let config = PipelineConfig {
        bounces: 3,
        target_samples: 12,
        samples_per_frame: 1,
    };
    let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    p.upload_scene(&Scene::demo()).unwrap();
    p.resize(16, 9).unwrap();

    let mut sum: Vec<Vec4> = Vec::new();
    while let FrameStatus::Rendered { .. } = p.advance().unwrap() {
        let e = estimate(&p);
        if sum.is_empty() {
            sum = e;
        } else {
            sum.iter_mut().zip(&e).for_each(|(s, v)| *s += *v);
        }
    }
    assert_eq!(p.sample_count(), 12);

    for (acc, s) in accumulated(&p).iter().zip(&sum) {
        assert!(close(*acc, *s / 12.0, 1e-4), "{acc} vs {}", *s / 12.0);
    }
}

#[test]
fn test_bounce_layers_hold_only_their_bounce() {
    let bounces = 3;
    let config = PipelineConfig {
        bounces,
        ..Default::default()
    };
    let scene = Scene::demo();
    let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    p.upload_scene(&scene).unwrap();
    p.resize(8, 6).unwrap();
    p.advance().unwrap();
    assert_eq!(p.device().stats().bounce_layers, vec![0, 1, 2]);

    let attenuation = p.resources().image(ImageRole::Attenuation).unwrap();
    let emission = p.resources().image(ImageRole::Emission).unwrap();
    assert_eq!(attenuation.layers(), bounces);

    // replay the path of every pixel and compare layer by layer
    let extent = p.extent();
    let camera = CameraUniform::new(p.camera(), extent, 0, config.target_samples);
    for y in 0..extent.height {
        for x in 0..extent.width {
            let pixel = UVec2::new(x, y);
            let mut ray = shading::primary_ray(pixel, &camera);
            for k in 0..bounces {
                let params = BounceUniform {
                    sample_index: 0,
                    num_samples: config.target_samples,
                    bounce: k,
                    primitive_count: scene.len() as u32,
                };
                let out = shading::shade(&ray, &scene.primitives, pixel, &params);
                assert_eq!(attenuation.texel(x, y, k).unwrap().truncate(), out.attenuation, "att ({x},{y}) layer {k}");
                assert_eq!(emission.texel(x, y, k).unwrap().truncate(), out.emission, "emis ({x},{y}) layer {k}");
                ray = out.ray;
            }
        }
    }
}

#[test]
fn test_resize_resets_convergence() {
    let config = PipelineConfig {
        bounces: 1,
        ..Default::default()
    };
    let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    p.upload_scene(&Scene::demo()).unwrap();
    p.resize(800, 600).unwrap();
    for _ in 0..5 {
        p.advance().unwrap();
    }
    assert_eq!(p.sample_count(), 5);

    p.resize(640, 480).unwrap();
    assert_eq!(p.sample_count(), 0);
    assert_eq!(p.sampler().weight(), 1.0);
    assert_eq!(p.output().unwrap().extent().to_string(), "640x480");

    // the first sample after the resize overwrites the history
    p.advance().unwrap();
    assert_eq!(accumulated(&p), estimate(&p));
}

#[test]
fn test_lowering_target_restarts() {
    let config = PipelineConfig {
        bounces: 1,
        target_samples: 8,
        samples_per_frame: 1,
    };
    let mut p = RenderPipeline::new(CpuDevice::new(), config).unwrap();
    p.upload_scene(&Scene::demo()).unwrap();
    p.resize(4, 4).unwrap();
    for _ in 0..6 {
        p.advance().unwrap();
    }

    p.set_target_samples(10).unwrap();
    assert_eq!(p.sample_count(), 6);
    p.set_target_samples(4).unwrap();
    assert_eq!(p.sample_count(), 0);
    for _ in 0..4 {
        p.advance().unwrap();
    }
    assert_eq!(p.advance().unwrap(), FrameStatus::Converged);
}

#[test]
fn test_empty_scene_renders_black() {
    let mut p = RenderPipeline::new(CpuDevice::new(), PipelineConfig::default()).unwrap();
    p.upload_scene(&Scene::default()).unwrap();
    p.resize(3, 3).unwrap();
    assert_eq!(p.advance().unwrap(), FrameStatus::Rendered { samples: 1 });
    assert!(accumulated(&p).iter().all(|t| t.truncate() == Vec3::ZERO));
}

#[test]
fn test_camera_move_restarts_with_new_view() {
    let mut p = RenderPipeline::new(
        CpuDevice::new(),
        PipelineConfig {
            bounces: 2,
            ..Default::default()
        },
    )
    .unwrap();
    p.upload_scene(&Scene::demo()).unwrap();
    p.resize(6, 6).unwrap();
    p.advance().unwrap();
    p.advance().unwrap();

    p.set_camera(Camera::look_at(Vec3::new(3.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y, 50.0));
    assert_eq!(p.sample_count(), 0);
    p.advance().unwrap();
    assert_eq!(p.sample_count(), 1);
    assert_eq!(accumulated(&p), estimate(&p));
}

#[test]
fn test_terminated_rays_stay_terminated() {
    let ray = Ray::TERMINATED;
    let params = BounceUniform {
        sample_index: 0,
        num_samples: 1,
        bounce: 2,
        primitive_count: 1,
    };
    let prims = [Primitive::sphere(Vec3::ZERO, 1.0).with_emission(Vec3::ONE)];
    let out = shading::shade(&ray, &prims, UVec2::new(1, 1), &params);
    assert!(out.ray.is_terminated());
    assert_eq!(out.emission, Vec3::ZERO);
}
