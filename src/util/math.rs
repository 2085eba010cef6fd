//! Math re-exports, image extents and the hash-based sampler.
//!
//! The random number functions here are bit-for-bit mirrors of the ones in
//! `common.wgsl`, so the CPU reference stages draw the same sample sequence
//! as the GPU for a given pixel, sample index and stream.

pub use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use std::fmt;

/// Width and height of a pass image in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    /// Unsized extent used before the first resize.
    pub const ZERO: Self = Self { width: 0, height: 0 };

    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero (nothing can be drawn).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Width over height, 1.0 for unsized extents.
    pub fn aspect(&self) -> f32 {
        if self.is_empty() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    #[inline]
    pub fn as_array(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// PCG output permutation used as an integer hash.
#[inline]
pub fn pcg_hash(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Per-pixel random stream.
///
/// Stream 0 belongs to the camera pass, stream `k + 1` to bounce `k`.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u32,
}

impl Rng {
    pub fn seed(pixel: UVec2, sample: u32, stream: u32) -> Self {
        Self {
            state: pcg_hash(pixel.x ^ pcg_hash(pixel.y ^ pcg_hash(sample ^ pcg_hash(stream)))),
        }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = pcg_hash(self.state);
        self.state
    }

    /// Uniform float in `[0, 1)` with 24 bits of precision.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    /// Uniformly distributed direction on the unit sphere.
    pub fn unit_vector(&mut self) -> Vec3 {
        let z = self.next_f32() * 2.0 - 1.0;
        let a = self.next_f32() * std::f32::consts::TAU;
        let r = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(r * a.cos(), r * a.sin(), z)
    }
}

/// Strata per axis are capped so the grid size fits in `u32`.
pub const MAX_STRATA_PER_AXIS: u32 = 65535;

/// Sub-pixel offset in `[0, 1)²` for sample `sample` of `num_samples`.
///
/// Samples are spread over a `ceil(sqrt(num_samples))²` grid of strata with a
/// random offset inside each stratum.
pub fn stratified_jitter(sample: u32, num_samples: u32, rng: &mut Rng) -> Vec2 {
    let n = ((num_samples.max(1) as f32).sqrt().ceil() as u32).min(MAX_STRATA_PER_AXIS);
    let cell = sample % (n * n);
    let cx = (cell % n) as f32;
    let cy = (cell / n) as f32;
    let u = rng.next_f32();
    let v = rng.next_f32();
    Vec2::new((cx + u) / n as f32, (cy + v) / n as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent() {
        assert!(Extent::ZERO.is_empty());
        assert!(Extent::new(4, 0).is_empty());
        let e = Extent::new(800, 600);
        assert_eq!(e.pixel_count(), 480_000);
        assert!((e.aspect() - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(e.to_string(), "800x600");
    }

    #[test]
    fn test_rng_deterministic_and_in_range() {
        let mut a = Rng::seed(UVec2::new(3, 7), 11, 2);
        let mut b = Rng::seed(UVec2::new(3, 7), 11, 2);
        for _ in 0..1000 {
            let x = a.next_f32();
            assert_eq!(x, b.next_f32());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_rng_streams_differ() {
        let mut a = Rng::seed(UVec2::new(0, 0), 0, 0);
        let mut b = Rng::seed(UVec2::new(0, 0), 0, 1);
        let same = (0..16).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 16);
    }

    #[test]
    fn test_unit_vector_is_normalized() {
        let mut rng = Rng::seed(UVec2::new(1, 2), 3, 4);
        for _ in 0..100 {
            let v = rng.unit_vector();
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_stratified_jitter_stays_in_cell() {
        let mut rng = Rng::seed(UVec2::ZERO, 0, 0);
        // 4 samples -> 2x2 strata
        for s in 0..4 {
            let j = stratified_jitter(s, 4, &mut rng);
            let cx = (s % 2) as f32 * 0.5;
            let cy = (s / 2) as f32 * 0.5;
            assert!(j.x >= cx && j.x < cx + 0.5);
            assert!(j.y >= cy && j.y < cy + 0.5);
        }
    }

    #[test]
    fn test_stratified_jitter_huge_sample_counts() {
        let mut rng = Rng::seed(UVec2::new(3, 1), 0, 0);
        for sample in [0, 1, 65534, 65535 * 65535, u32::MAX - 1] {
            let j = stratified_jitter(sample, u32::MAX, &mut rng);
            assert!((0.0..=1.0).contains(&j.x), "{sample}: {j}");
            assert!((0.0..=1.0).contains(&j.y), "{sample}: {j}");
        }
    }
}
