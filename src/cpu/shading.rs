//! Shading stages evaluated per pixel.
//!
//! Each function is the Rust twin of a WGSL entry point (`camera.wgsl`,
//! `bounce.wgsl`, `accumulate.wgsl`) and consumes random numbers in the same
//! order, so both backends produce the same estimator.

use crate::pipeline::{BounceUniform, CameraUniform};
use crate::scene::Primitive;
use crate::util::{stratified_jitter, Mat4, Rng, UVec2, Vec2, Vec3, Vec4};

/// Offset applied along the normal to spawn the next ray.
pub const SPAWN_OFFSET: f32 = 1e-3;

/// A ray as stored in the ping-pong buffers. A zero direction marks a
/// terminated path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub const TERMINATED: Self = Self {
        origin: Vec3::ZERO,
        direction: Vec3::ZERO,
    };

    pub fn from_texels(origin: Vec4, direction: Vec4) -> Self {
        Self {
            origin: origin.truncate(),
            direction: direction.truncate(),
        }
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.direction == Vec3::ZERO
    }

    pub fn origin_texel(&self) -> Vec4 {
        self.origin.extend(1.0)
    }

    pub fn direction_texel(&self) -> Vec4 {
        self.direction.extend(0.0)
    }
}

/// Output of one bounce for one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BounceOutput {
    pub ray: Ray,
    pub attenuation: Vec3,
    pub emission: Vec3,
}

impl BounceOutput {
    const NONE: Self = Self {
        ray: Ray::TERMINATED,
        attenuation: Vec3::ZERO,
        emission: Vec3::ZERO,
    };
}

/// Camera stage: jittered primary ray through `pixel`.
pub fn primary_ray(pixel: UVec2, camera: &CameraUniform) -> Ray {
    let mut rng = Rng::seed(pixel, camera.sample_index, 0);
    let jitter = stratified_jitter(camera.sample_index, camera.num_samples, &mut rng);
    let resolution = Vec2::new(camera.resolution[0] as f32, camera.resolution[1] as f32);
    let uv = (pixel.as_vec2() + jitter) / resolution;
    // top row of the image is +Y
    let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let fov = Vec2::from_array(camera.fov_factor);
    let local = Vec3::new(ndc.x * fov.x, ndc.y * fov.y, -1.0).normalize();

    let view = Mat4::from_cols_array_2d(&camera.view);
    Ray {
        origin: view.transform_point3(Vec3::ZERO),
        direction: view.transform_vector3(local).normalize(),
    }
}

/// Closest primitive hit: `(distance, index)`.
pub fn closest_hit(ray: &Ray, primitives: &[Primitive]) -> Option<(f32, usize)> {
    primitives
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.intersect(ray.origin, ray.direction).map(|t| (t, i)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
}

/// Bounce stage: intersect, emit, attenuate and scatter.
pub fn shade(ray: &Ray, primitives: &[Primitive], pixel: UVec2, params: &BounceUniform) -> BounceOutput {
    if ray.is_terminated() {
        return BounceOutput::NONE;
    }
    let count = (params.primitive_count as usize).min(primitives.len());
    let Some((t, index)) = closest_hit(ray, &primitives[..count]) else {
        return BounceOutput::NONE;
    };
    let prim = &primitives[index];

    let p = ray.origin + ray.direction * t;
    let mut n = (p - prim.position()) / prim.radius();
    if ray.direction.dot(n) > 0.0 {
        n = -n;
    }

    let mut rng = Rng::seed(pixel, params.sample_index, params.bounce + 1);
    let scattered = if rng.next_f32() < prim.metallic() {
        reflect(ray.direction, n) + rng.unit_vector() * prim.roughness2()
    } else {
        n + rng.unit_vector()
    };

    let emission = prim.emission();
    if scattered.length_squared() < 1e-8 || scattered.dot(n) <= 0.0 {
        // absorbed below the surface
        return BounceOutput {
            ray: Ray::TERMINATED,
            attenuation: Vec3::ZERO,
            emission,
        };
    }

    BounceOutput {
        ray: Ray {
            origin: p + n * SPAWN_OFFSET,
            direction: scattered.normalize(),
        },
        attenuation: prim.albedo(),
        emission,
    }
}

/// Accumulate stage: `Σ_k emission[k] · Π_{j<k} attenuation[j]`.
pub fn compose(layers: impl IntoIterator<Item = (Vec3, Vec3)>) -> Vec3 {
    let mut radiance = Vec3::ZERO;
    let mut throughput = Vec3::ONE;
    for (attenuation, emission) in layers {
        radiance += throughput * emission;
        throughput *= attenuation;
    }
    radiance
}

#[inline]
fn reflect(d: Vec3, n: Vec3) -> Vec3 {
    d - n * (2.0 * d.dot(n))
}
