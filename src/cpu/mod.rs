//! Software reference device.
//!
//! Runs the same pass sequence as the GPU backend with images held in host
//! memory. Each pass is parallelised over pixel rows with rayon; passes run
//! one after another. Used by the headless renderer and by tests that need to
//! inspect pass outputs without a GPU adapter.

pub mod shading;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;

use crate::pipeline::{
    ensure_distinct, ensure_same_extent, AccumulateUniform, BounceBindings, BounceUniform, CameraUniform,
    ImageDesc, RayPair, RenderDevice, RenderImage,
};
use crate::scene::Primitive;
use crate::util::{Error, Extent, Result, UVec2, Vec4};

use shading::Ray;

/// Default largest image side, matching common GPU limits.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;
/// Largest layer count of a layered image.
pub const MAX_LAYERS: u32 = 256;

/// Host-side RGBA32F image, optionally layered.
#[derive(Debug)]
pub struct CpuImage {
    label: &'static str,
    extent: Extent,
    layers: u32,
    texels: RwLock<Vec<Vec4>>,
}

impl CpuImage {
    fn allocate(label: &'static str, extent: Extent, layers: u32) -> std::result::Result<Self, String> {
        let len = extent
            .pixel_count()
            .checked_mul(layers as usize)
            .ok_or_else(|| "texel count overflows".to_string())?;
        let mut texels = Vec::new();
        texels
            .try_reserve_exact(len)
            .map_err(|e| format!("{label}: {e}"))?;
        texels.resize(len, Vec4::ZERO);
        Ok(Self {
            label,
            extent,
            layers,
            texels: RwLock::new(texels),
        })
    }

    /// All texels, layer-major then row-major.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [Vec4]> {
        RwLockReadGuard::map(self.texels.read(), |t| t.as_slice())
    }

    /// Copy of one layer, `None` past the last layer.
    pub fn layer(&self, layer: u32) -> Option<Vec<Vec4>> {
        if layer >= self.layers {
            return None;
        }
        let n = self.extent.pixel_count();
        let start = layer as usize * n;
        Some(self.read()[start..start + n].to_vec())
    }

    /// One texel, `None` outside the image.
    pub fn texel(&self, x: u32, y: u32, layer: u32) -> Option<Vec4> {
        if x >= self.extent.width || y >= self.extent.height || layer >= self.layers {
            return None;
        }
        let n = self.extent.pixel_count();
        Some(self.read()[layer as usize * n + (y * self.extent.width + x) as usize])
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Vec4>> {
        self.texels.write()
    }
}

impl RenderImage for CpuImage {
    fn label(&self) -> &'static str {
        self.label
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn layers(&self) -> u32 {
        self.layers
    }
}

/// Scene buffer in host memory.
#[derive(Debug, Clone)]
pub struct CpuScene {
    primitives: Vec<Primitive>,
}

impl CpuScene {
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }
}

/// Pass counters, for tests and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    pub ray_init: u32,
    pub bounce: u32,
    pub accumulate: u32,
    pub blend: u32,
    /// Layer written by each bounce pass, in issue order.
    pub bounce_layers: Vec<u32>,
    pub frames: u32,
}

impl PassStats {
    pub fn passes(&self) -> u32 {
        self.ray_init + self.bounce + self.accumulate + self.blend
    }
}

/// Software implementation of [`RenderDevice`].
#[derive(Debug)]
pub struct CpuDevice {
    max_dimension: u32,
    stats: PassStats,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::with_max_dimension(DEFAULT_MAX_DIMENSION)
    }

    /// Device that rejects images wider or taller than `max_dimension`.
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            stats: PassStats::default(),
        }
    }

    pub fn stats(&self) -> &PassStats {
        &self.stats
    }
}

impl Default for CpuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDevice for CpuDevice {
    type Image = CpuImage;
    type Scene = CpuScene;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_image(&mut self, desc: &ImageDesc, extent: Extent, layers: u32) -> Result<CpuImage> {
        let fail = |reason: String| Error::Resize {
            width: extent.width,
            height: extent.height,
            reason,
        };
        if extent.width > self.max_dimension || extent.height > self.max_dimension {
            return Err(fail(format!(
                "{} exceeds max dimension {}",
                desc.label, self.max_dimension
            )));
        }
        if layers == 0 || layers > MAX_LAYERS {
            return Err(fail(format!("{} layers out of range 1..={MAX_LAYERS}", layers)));
        }
        CpuImage::allocate(desc.label, extent, layers).map_err(fail)
    }

    fn upload_scene(&mut self, primitives: &[Primitive]) -> Result<CpuScene> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(primitives.len())
            .map_err(|e| Error::Upload {
                count: primitives.len(),
                reason: e.to_string(),
            })?;
        buffer.extend_from_slice(primitives);
        Ok(CpuScene { primitives: buffer })
    }

    fn begin_frame(&mut self) {
        self.stats.frames += 1;
    }

    fn generate_rays(&mut self, target: RayPair<'_, CpuImage>, camera: &CameraUniform) -> Result<()> {
        ensure_distinct(&[target.origin, target.direction], "ray_init")?;
        let extent = ensure_same_extent(&[target.origin, target.direction], "ray_init")?;
        if extent.as_array() != camera.resolution {
            return Err(Error::binding(format!(
                "ray_init: targets are {extent} but camera resolution is {:?}",
                camera.resolution
            )));
        }
        let width = extent.width as usize;

        let mut origin = target.origin.write();
        let mut direction = target.direction.write();
        origin
            .par_chunks_mut(width)
            .zip(direction.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (origin_row, direction_row))| {
                for x in 0..width {
                    let ray = shading::primary_ray(UVec2::new(x as u32, y as u32), camera);
                    origin_row[x] = ray.origin_texel();
                    direction_row[x] = ray.direction_texel();
                }
            });

        self.stats.ray_init += 1;
        Ok(())
    }

    fn shade_bounce(
        &mut self,
        bindings: BounceBindings<'_, CpuImage>,
        scene: &CpuScene,
        params: &BounceUniform,
    ) -> Result<()> {
        let BounceBindings {
            layer,
            source,
            target,
            attenuation,
            emission,
        } = bindings;
        let all = [source.origin, source.direction, target.origin, target.direction, attenuation, emission];
        ensure_distinct(&all, "bounce")?;
        let extent = ensure_same_extent(&all, "bounce")?;
        if layer >= attenuation.layers || layer >= emission.layers {
            return Err(Error::binding(format!(
                "bounce writes layer {layer} of {}-layer buffers",
                attenuation.layers.min(emission.layers)
            )));
        }
        let width = extent.width as usize;
        let n = extent.pixel_count();
        let range = layer as usize * n..(layer as usize + 1) * n;

        let src_origin = source.origin.read();
        let src_direction = source.direction.read();
        let mut dst_origin = target.origin.write();
        let mut dst_direction = target.direction.write();
        let mut att = attenuation.write();
        let mut emis = emission.write();
        let primitives = scene.primitives();

        dst_origin
            .par_chunks_mut(width)
            .zip(dst_direction.par_chunks_mut(width))
            .zip(att[range.clone()].par_chunks_mut(width))
            .zip(emis[range].par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (((origin_row, direction_row), att_row), emis_row))| {
                for x in 0..width {
                    let i = y * width + x;
                    let ray = Ray::from_texels(src_origin[i], src_direction[i]);
                    let out = shading::shade(&ray, primitives, UVec2::new(x as u32, y as u32), params);
                    origin_row[x] = out.ray.origin_texel();
                    direction_row[x] = out.ray.direction_texel();
                    att_row[x] = out.attenuation.extend(1.0);
                    emis_row[x] = out.emission.extend(1.0);
                }
            });

        self.stats.bounce += 1;
        self.stats.bounce_layers.push(layer);
        Ok(())
    }

    fn accumulate(
        &mut self,
        attenuation: &CpuImage,
        emission: &CpuImage,
        estimate: &CpuImage,
        params: &AccumulateUniform,
    ) -> Result<()> {
        ensure_distinct(&[attenuation, emission, estimate], "accumulate")?;
        let extent = ensure_same_extent(&[attenuation, emission, estimate], "accumulate")?;
        let layers = params.layers.min(attenuation.layers).min(emission.layers) as usize;
        let n = extent.pixel_count();

        let att = attenuation.read();
        let emis = emission.read();
        let mut out = estimate.write();
        out.par_iter_mut().enumerate().for_each(|(i, texel)| {
            let radiance = shading::compose(
                (0..layers).map(|k| (att[k * n + i].truncate(), emis[k * n + i].truncate())),
            );
            *texel = radiance.extend(1.0);
        });

        self.stats.accumulate += 1;
        Ok(())
    }

    fn blend(&mut self, estimate: &CpuImage, accumulated: &CpuImage, weight: f32) -> Result<()> {
        ensure_distinct(&[estimate, accumulated], "blend")?;
        ensure_same_extent(&[estimate, accumulated], "blend")?;

        let src = estimate.read();
        let mut dst = accumulated.write();
        if weight >= 1.0 {
            // first sample replaces whatever the image held
            dst.copy_from_slice(&src);
        } else {
            dst.par_iter_mut().zip(src.par_iter()).for_each(|(acc, s)| {
                *acc = *acc * (1.0 - weight) + *s * weight;
            });
        }

        self.stats.blend += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{ImageRole, IMAGE_DESCS};

    fn desc(role: ImageRole) -> ImageDesc {
        *IMAGE_DESCS.iter().find(|d| d.role == role).unwrap()
    }

    #[test]
    fn test_create_image_limits() {
        let mut device = CpuDevice::with_max_dimension(32);
        let img = device.create_image(&desc(ImageRole::Emission), Extent::new(4, 2), 3).unwrap();
        assert_eq!(img.read().len(), 24);
        assert!(matches!(
            device.create_image(&desc(ImageRole::Estimate), Extent::new(33, 1), 1),
            Err(Error::Resize { width: 33, .. })
        ));
        assert!(device.create_image(&desc(ImageRole::Emission), Extent::new(1, 1), 0).is_err());
    }

    #[test]
    fn test_blend_rejects_aliasing() {
        let mut device = CpuDevice::new();
        let img = device.create_image(&desc(ImageRole::Estimate), Extent::new(2, 2), 1).unwrap();
        assert!(matches!(device.blend(&img, &img, 0.5), Err(Error::BindingContract(_))));
        assert_eq!(device.stats().blend, 0);
    }

    #[test]
    fn test_blend_running_mean() {
        let mut device = CpuDevice::new();
        let est = device.create_image(&desc(ImageRole::Estimate), Extent::new(1, 1), 1).unwrap();
        let acc = device.create_image(&desc(ImageRole::Accumulated), Extent::new(1, 1), 1).unwrap();
        for (i, s) in [1.0f32, 0.0, 0.5].into_iter().enumerate() {
            est.write()[0] = Vec4::splat(s);
            device.blend(&est, &acc, 1.0 / (i as f32 + 1.0)).unwrap();
        }
        assert!((acc.texel(0, 0, 0).unwrap().x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_accumulate_composes_layers() {
        let mut device = CpuDevice::new();
        let extent = Extent::new(1, 1);
        let att = device.create_image(&desc(ImageRole::Attenuation), extent, 2).unwrap();
        let emis = device.create_image(&desc(ImageRole::Emission), extent, 2).unwrap();
        let est = device.create_image(&desc(ImageRole::Estimate), extent, 1).unwrap();
        {
            let mut a = att.write();
            a[0] = Vec4::splat(0.5);
            a[1] = Vec4::splat(0.5);
            let mut e = emis.write();
            e[0] = Vec4::splat(1.0);
            e[1] = Vec4::splat(4.0);
        }
        device.accumulate(&att, &emis, &est, &AccumulateUniform::new(2)).unwrap();
        assert_eq!(est.texel(0, 0, 0).unwrap().truncate(), crate::util::Vec3::splat(3.0));

        // only the first layer
        device.accumulate(&att, &emis, &est, &AccumulateUniform::new(1)).unwrap();
        assert_eq!(est.texel(0, 0, 0).unwrap().truncate(), crate::util::Vec3::splat(1.0));
    }

    #[test]
    fn test_texel_access_out_of_range() {
        let mut device = CpuDevice::new();
        let img = device
            .create_image(&desc(ImageRole::Emission), Extent::new(3, 2), 2)
            .unwrap();
        assert_eq!(img.texel(2, 1, 1), Some(Vec4::ZERO));
        assert_eq!(img.texel(3, 0, 0), None);
        assert_eq!(img.texel(0, 2, 0), None);
        assert_eq!(img.texel(0, 0, 2), None);
        assert_eq!(img.layer(1).map(|l| l.len()), Some(6));
        assert!(img.layer(2).is_none());
    }
}
