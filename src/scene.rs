//! Scene primitives and camera.
//!
//! Primitives are spheres packed into three 16-byte blocks so the array can
//! be bound directly as a WGSL `array<Primitive>` storage buffer.

use bytemuck::{Pod, Zeroable};

use crate::util::{Mat4, Vec2, Vec3};

/// Minimum hit distance, avoids self-intersection at the ray origin.
pub const HIT_EPSILON: f32 = 1e-4;

/// GPU-friendly sphere record (48 bytes, matches the WGSL struct).
///
/// `[position.xyz, radius]`, `[emission.rgb, metallic]`, `[albedo.rgb, roughness²]`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Primitive {
    pub position_radius: [f32; 4],
    pub emission_metallic: [f32; 4],
    pub albedo_roughness2: [f32; 4],
}

impl Primitive {
    /// Grey diffuse sphere.
    pub fn sphere(position: Vec3, radius: f32) -> Self {
        Self {
            position_radius: [position.x, position.y, position.z, radius],
            emission_metallic: [0.0; 4],
            albedo_roughness2: [0.8, 0.8, 0.8, 1.0],
        }
    }

    pub fn with_emission(mut self, emission: Vec3) -> Self {
        self.emission_metallic[..3].copy_from_slice(&emission.to_array());
        self
    }

    pub fn with_albedo(mut self, albedo: Vec3) -> Self {
        self.albedo_roughness2[..3].copy_from_slice(&albedo.to_array());
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.emission_metallic[3] = metallic.clamp(0.0, 1.0);
        self
    }

    /// Perceptual roughness; stored squared.
    pub fn with_roughness(mut self, roughness: f32) -> Self {
        let r = roughness.clamp(0.0, 1.0);
        self.albedo_roughness2[3] = r * r;
        self
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_slice(&self.position_radius[..3])
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.position_radius[3]
    }

    #[inline]
    pub fn emission(&self) -> Vec3 {
        Vec3::from_slice(&self.emission_metallic[..3])
    }

    #[inline]
    pub fn metallic(&self) -> f32 {
        self.emission_metallic[3]
    }

    #[inline]
    pub fn albedo(&self) -> Vec3 {
        Vec3::from_slice(&self.albedo_roughness2[..3])
    }

    #[inline]
    pub fn roughness2(&self) -> f32 {
        self.albedo_roughness2[3]
    }

    /// Nearest hit distance along a normalized ray, if any.
    ///
    /// Returns the far root when the origin is inside the sphere.
    pub fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let oc = origin - self.position();
        let b = oc.dot(dir);
        let c = oc.length_squared() - self.radius() * self.radius();
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }
        let s = disc.sqrt();
        let near = -b - s;
        if near > HIT_EPSILON {
            return Some(near);
        }
        let far = -b + s;
        (far > HIT_EPSILON).then_some(far)
    }
}

/// Ordered set of primitives uploaded to the scene store.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub primitives: Vec<Primitive>,
}

impl Scene {
    pub fn new(primitives: Vec<Primitive>) -> Self {
        Self { primitives }
    }

    /// Three spheres on a ground plane under a sky dome and a warm area light.
    pub fn demo() -> Self {
        Self::new(vec![
            // sky dome, the only source of ambient light
            Primitive::sphere(Vec3::ZERO, 60.0)
                .with_albedo(Vec3::ZERO)
                .with_emission(Vec3::new(0.45, 0.55, 0.75)),
            // ground
            Primitive::sphere(Vec3::new(0.0, -1000.0, 0.0), 1000.0)
                .with_albedo(Vec3::new(0.5, 0.5, 0.45)),
            Primitive::sphere(Vec3::new(-1.2, 0.5, 0.0), 0.5)
                .with_albedo(Vec3::new(0.8, 0.2, 0.15)),
            Primitive::sphere(Vec3::new(0.0, 0.5, 0.0), 0.5)
                .with_albedo(Vec3::splat(0.9))
                .with_metallic(1.0)
                .with_roughness(0.1),
            Primitive::sphere(Vec3::new(1.2, 0.5, 0.0), 0.5)
                .with_albedo(Vec3::new(0.2, 0.4, 0.9))
                .with_metallic(0.3)
                .with_roughness(0.4),
            Primitive::sphere(Vec3::new(0.0, 3.0, 1.0), 0.6)
                .with_albedo(Vec3::ZERO)
                .with_emission(Vec3::new(8.0, 7.0, 6.0)),
        ])
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Raw bytes for buffer upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.primitives)
    }
}

/// Pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// World from camera; the camera looks down its local -Z.
    pub transform: Mat4,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

impl Camera {
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y_degrees: f32) -> Self {
        Self {
            transform: Mat4::look_at_rh(eye, target, up).inverse(),
            fov_y: fov_y_degrees.to_radians(),
        }
    }

    /// Half-extents of the image plane at distance 1, `(tan(fov/2)·aspect, tan(fov/2))`.
    pub fn fov_factor(&self, aspect: f32) -> Vec2 {
        let t = (self.fov_y * 0.5).tan();
        Vec2::new(t * aspect, t)
    }

    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::look_at(Vec3::new(0.0, 1.2, 4.5), Vec3::new(0.0, 0.5, 0.0), Vec3::Y, 45.0)
    }
}
