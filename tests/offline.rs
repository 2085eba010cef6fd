//! Offline render to image files.

use raygl::offline::{self, RenderJob};
use raygl::scene::{Camera, Primitive, Scene};
use raygl::util::Vec3;

fn small_job(output: std::path::PathBuf) -> RenderJob {
    RenderJob {
        width: 12,
        height: 8,
        samples: 4,
        bounces: 2,
        output,
        ..Default::default()
    }
}

#[test]
fn test_render_png() {
    let dir = tempfile::tempdir().unwrap();
    let job = small_job(dir.path().join("demo.png"));

    let summary = offline::render(&job, &Scene::demo(), Camera::default()).unwrap();
    assert_eq!(summary.samples, 4);

    let img = image::open(&job.output).unwrap();
    assert_eq!((img.width(), img.height()), (12, 8));
}

#[test]
fn test_render_exr_keeps_linear_radiance() {
    let dir = tempfile::tempdir().unwrap();
    let job = small_job(dir.path().join("glow.exr"));
    // inside a bright emitter every pixel is exactly its emission
    let scene = Scene::new(vec![Primitive::sphere(Vec3::ZERO, 50.0)
        .with_albedo(Vec3::ZERO)
        .with_emission(Vec3::new(4.0, 2.0, 0.5))]);

    offline::render(&job, &scene, Camera::default()).unwrap();

    let img = image::open(&job.output).unwrap().into_rgba32f();
    assert_eq!(img.dimensions(), (12, 8));
    for px in img.pixels() {
        assert!((px[0] - 4.0).abs() < 1e-3, "{px:?}");
        assert!((px[1] - 2.0).abs() < 1e-3, "{px:?}");
        assert!((px[2] - 0.5).abs() < 1e-3, "{px:?}");
    }
}

#[test]
fn test_render_hdr() {
    let dir = tempfile::tempdir().unwrap();
    let job = small_job(dir.path().join("demo.hdr"));
    offline::render(&job, &Scene::demo(), Camera::default()).unwrap();
    let img = image::open(&job.output).unwrap();
    assert_eq!((img.width(), img.height()), (12, 8));
}

#[test]
fn test_render_rejects_bad_jobs() {
    let dir = tempfile::tempdir().unwrap();

    let job = small_job(dir.path().join("demo.tiff"));
    assert!(offline::render(&job, &Scene::demo(), Camera::default()).is_err());
    assert!(!job.output.exists());

    let job = RenderJob {
        width: 0,
        ..small_job(dir.path().join("empty.png"))
    };
    assert!(offline::render(&job, &Scene::demo(), Camera::default()).is_err());

    let job = RenderJob {
        bounces: 0,
        ..small_job(dir.path().join("flat.png"))
    };
    assert!(offline::render(&job, &Scene::demo(), Camera::default()).is_err());
}
