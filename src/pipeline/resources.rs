//! Pass images owned by the pipeline.
//!
//! All images are described by an ordered, tagged descriptor list and
//! (re)allocated together. A reallocation builds the complete new set before
//! it replaces the old one, so a failed resize leaves the previous images
//! bound and usable. Every successful reallocation bumps the generation.

use super::device::{BounceBindings, RayPair, RenderDevice, RenderImage};
use super::schedule::{BouncePass, PingPong};
use crate::util::{Error, Extent, Result};

/// Semantic tag of a pass image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    RayOrigin(PingPong),
    RayDirection(PingPong),
    /// Per-bounce throughput, one layer per bounce.
    Attenuation,
    /// Per-bounce emitted radiance, one layer per bounce.
    Emission,
    /// One-sample radiance estimate of the current frame.
    Estimate,
    /// Running mean over all samples.
    Accumulated,
}

impl ImageRole {
    #[inline]
    pub fn is_layered(self) -> bool {
        matches!(self, Self::Attenuation | Self::Emission)
    }
}

/// Descriptor of one pass image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub role: ImageRole,
    pub label: &'static str,
}

impl ImageDesc {
    const fn new(role: ImageRole, label: &'static str) -> Self {
        Self { role, label }
    }
}

/// Every image the pipeline needs, in allocation order.
pub const IMAGE_DESCS: [ImageDesc; 8] = [
    ImageDesc::new(ImageRole::RayOrigin(PingPong::Zero), "ray_origin_0"),
    ImageDesc::new(ImageRole::RayDirection(PingPong::Zero), "ray_direction_0"),
    ImageDesc::new(ImageRole::RayOrigin(PingPong::One), "ray_origin_1"),
    ImageDesc::new(ImageRole::RayDirection(PingPong::One), "ray_direction_1"),
    ImageDesc::new(ImageRole::Attenuation, "attenuation_layers"),
    ImageDesc::new(ImageRole::Emission, "emission_layers"),
    ImageDesc::new(ImageRole::Estimate, "estimate"),
    ImageDesc::new(ImageRole::Accumulated, "accumulated"),
];

/// Owner of all pass images.
pub struct ResourceSet<I> {
    descs: &'static [ImageDesc],
    images: Option<Vec<I>>,
    extent: Extent,
    layers: u32,
    generation: u64,
}

impl<I: RenderImage> ResourceSet<I> {
    /// Descriptors only; nothing is sized until the first resize.
    pub fn initialize(layers: u32) -> Self {
        Self {
            descs: &IMAGE_DESCS,
            images: None,
            extent: Extent::ZERO,
            layers,
            generation: 0,
        }
    }

    pub fn descriptors(&self) -> &[ImageDesc] {
        self.descs
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    /// Incremented on every successful reallocation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once images with a non-zero extent are bound.
    pub fn is_sized(&self) -> bool {
        self.images.is_some() && !self.extent.is_empty()
    }

    /// Reallocate every image at `width x height`.
    ///
    /// Returns `Ok(false)` without touching anything if the size is unchanged.
    pub fn resize<D>(&mut self, device: &mut D, width: u32, height: u32) -> Result<bool>
    where
        D: RenderDevice<Image = I>,
    {
        let extent = Extent::new(width, height);
        if extent == self.extent {
            return Ok(false);
        }
        self.reallocate(device, extent, self.layers)?;
        Ok(true)
    }

    /// Reallocate for a new bounce count (layered images change depth).
    pub fn set_layer_count<D>(&mut self, device: &mut D, layers: u32) -> Result<bool>
    where
        D: RenderDevice<Image = I>,
    {
        if layers == self.layers {
            return Ok(false);
        }
        if self.extent.is_empty() {
            // nothing allocated yet; the next resize uses the new depth
            self.layers = layers;
            return Ok(false);
        }
        self.reallocate(device, self.extent, layers)?;
        Ok(true)
    }

    fn reallocate<D>(&mut self, device: &mut D, extent: Extent, layers: u32) -> Result<()>
    where
        D: RenderDevice<Image = I>,
    {
        let _span = tracing::info_span!("resource_reallocate").entered();
        if extent.is_empty() {
            log::debug!("pass images released ({extent})");
            self.images = None;
        } else {
            let images = self
                .descs
                .iter()
                .map(|desc| {
                    let depth = if desc.role.is_layered() { layers } else { 1 };
                    device.create_image(desc, extent, depth)
                })
                .collect::<Result<Vec<_>>>()?;
            validate(self.descs, &images, extent, layers)?;
            log::debug!(
                "allocated {} pass images at {extent} with {layers} layers on {}",
                images.len(),
                device.name()
            );
            self.images = Some(images);
        }
        self.extent = extent;
        self.layers = layers;
        self.generation += 1;
        Ok(())
    }

    /// Image bound to `role`.
    pub fn image(&self, role: ImageRole) -> Result<&I> {
        let images = self
            .images
            .as_ref()
            .ok_or_else(|| Error::binding(format!("{role:?} requested before first resize")))?;
        self.descs
            .iter()
            .position(|d| d.role == role)
            .and_then(|i| images.get(i))
            .ok_or_else(|| Error::binding(format!("no image for {role:?}")))
    }

    pub fn ray_pair(&self, slot: PingPong) -> Result<RayPair<'_, I>> {
        Ok(RayPair {
            origin: self.image(ImageRole::RayOrigin(slot))?,
            direction: self.image(ImageRole::RayDirection(slot))?,
        })
    }

    pub fn bounce_bindings(&self, pass: &BouncePass) -> Result<BounceBindings<'_, I>> {
        if pass.read == pass.write {
            return Err(Error::binding(format!(
                "bounce {} reads and writes ray slot {:?}",
                pass.index, pass.read
            )));
        }
        if pass.index >= self.layers {
            return Err(Error::binding(format!(
                "bounce {} has no layer (layers: {})",
                pass.index, self.layers
            )));
        }
        Ok(BounceBindings {
            layer: pass.index,
            source: self.ray_pair(pass.read)?,
            target: self.ray_pair(pass.write)?,
            attenuation: self.image(ImageRole::Attenuation)?,
            emission: self.image(ImageRole::Emission)?,
        })
    }

    /// The accumulated image, if sized.
    pub fn accumulated(&self) -> Option<&I> {
        self.image(ImageRole::Accumulated).ok()
    }
}

/// Binding completeness: one image per descriptor, all at `extent`, layered
/// images `layers` deep.
fn validate<I: RenderImage>(descs: &[ImageDesc], images: &[I], extent: Extent, layers: u32) -> Result<()> {
    if descs.len() != images.len() {
        return Err(Error::binding(format!(
            "{} descriptors but {} images",
            descs.len(),
            images.len()
        )));
    }
    for (desc, image) in descs.iter().zip(images) {
        if image.extent() != extent {
            return Err(Error::binding(format!(
                "{} is {} instead of {extent}",
                desc.label,
                image.extent()
            )));
        }
        let want = if desc.role.is_layered() { layers } else { 1 };
        if image.layers() != want {
            return Err(Error::binding(format!(
                "{} has {} layers instead of {want}",
                desc.label,
                image.layers()
            )));
        }
    }
    Ok(())
}
