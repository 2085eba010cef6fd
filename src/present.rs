//! Tonemapping and image export of the accumulated image.
//!
//! The curve here is the one `present.wgsl` applies on the GPU: exposure
//! scale, ACES filmic fit, then sRGB encoding.

use std::path::Path;

use image::{ImageBuffer, Rgb, Rgb32FImage, RgbImage, Rgba, Rgba32FImage};

use crate::cpu::CpuImage;
use crate::pipeline::RenderImage;
use crate::util::{Error, Result, Vec3, Vec4};

/// Narkowicz ACES filmic fit.
#[inline]
pub fn aces(x: Vec3) -> Vec3 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;
    ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Linear to sRGB transfer for one channel in `[0, 1]`.
#[inline]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Display value in `[0, 1]` for linear radiance.
pub fn tonemap(radiance: Vec3, exposure: f32) -> Vec3 {
    let mapped = aces(radiance.max(Vec3::ZERO) * exposure);
    Vec3::new(
        linear_to_srgb(mapped.x),
        linear_to_srgb(mapped.y),
        linear_to_srgb(mapped.z),
    )
}

/// Output container, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// 8-bit tonemapped.
    Png,
    /// Radiance HDR, linear.
    Hdr,
    /// OpenEXR, linear.
    Exr,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "png" => Ok(Self::Png),
            "hdr" => Ok(Self::Hdr),
            "exr" => Ok(Self::Exr),
            other => Err(Error::config(format!(
                "unsupported output extension '{other}' (png, hdr, exr)"
            ))),
        }
    }
}

/// Tonemapped 8-bit copy of `image` (layer 0).
pub fn to_rgb8(image: &CpuImage, exposure: f32) -> RgbImage {
    let extent = image.extent();
    let texels = image.read();
    ImageBuffer::from_fn(extent.width, extent.height, |x, y| {
        let c = tonemap(texels[(y * extent.width + x) as usize].truncate(), exposure);
        Rgb([to_u8(c.x), to_u8(c.y), to_u8(c.z)])
    })
}

#[inline]
fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}

/// Write the accumulated image. PNG is tonemapped with `exposure`; HDR and
/// EXR keep linear radiance.
pub fn export(image: &CpuImage, path: &Path, exposure: f32) -> Result<()> {
    let extent = image.extent();
    if extent.is_empty() {
        return Err(Error::config("nothing to export from an unsized image"));
    }
    let format = ExportFormat::from_path(path)?;
    log::info!("writing {extent} {format:?} to {}", path.display());

    match format {
        ExportFormat::Png => to_rgb8(image, exposure).save(path)?,
        ExportFormat::Hdr => {
            let texels = image.read();
            let buf: Rgb32FImage = ImageBuffer::from_fn(extent.width, extent.height, |x, y| {
                Rgb(texels[(y * extent.width + x) as usize].truncate().to_array())
            });
            buf.save(path)?;
        }
        ExportFormat::Exr => {
            let texels = image.read();
            let buf: Rgba32FImage = ImageBuffer::from_fn(extent.width, extent.height, |x, y| {
                let t: Vec4 = texels[(y * extent.width + x) as usize];
                Rgba([t.x, t.y, t.z, 1.0])
            });
            buf.save(path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonemap_range() {
        assert_eq!(tonemap(Vec3::ZERO, 1.0), Vec3::ZERO);
        let hot = tonemap(Vec3::splat(1000.0), 1.0);
        assert!(hot.cmple(Vec3::ONE).all());
        assert!(hot.x > 0.99);
        // negative radiance clamps to black
        assert_eq!(tonemap(Vec3::splat(-1.0), 1.0), Vec3::ZERO);
    }

    #[test]
    fn test_tonemap_monotonic() {
        let mut last = -1.0;
        for i in 0..64 {
            let v = tonemap(Vec3::splat(i as f32 * 0.1), 1.0).x;
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_srgb_endpoints() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-5);
        assert!(linear_to_srgb(0.18) > 0.45);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out.PNG")).unwrap(), ExportFormat::Png);
        assert_eq!(ExportFormat::from_path(Path::new("a/b.exr")).unwrap(), ExportFormat::Exr);
        assert!(ExportFormat::from_path(Path::new("out.jpg")).is_err());
        assert!(ExportFormat::from_path(Path::new("out")).is_err());
    }
}
