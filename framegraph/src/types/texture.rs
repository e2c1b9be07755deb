//! Transient texture descriptors.
//!
//! The frame graph never interprets texel data. Formats carry only what
//! placement and view creation need: the texel size for the heap footprint
//! estimate and whether the format binds as a depth/stencil target.

use bitflags::bitflags;

/// Texel layout of a transient texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    R8Unorm,
    R32Float,
    R32Uint,
    Rg16Float,
    #[default]
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    /// Packed HDR color, three floats in 32 bits.
    Rg11B10Float,
    Rgba16Float,
    Rgba32Float,
    Depth24PlusStencil8,
    Depth32Float,
}

impl TextureFormat {
    /// Whether views of this format are written through a DSV.
    pub fn is_depth_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8 | Self::Depth32Float)
    }

    /// Bytes per texel per sample.
    pub fn texel_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
            _ => 4,
        }
    }
}

bitflags! {
    /// How passes may touch a transient texture.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureUsage: u32 {
        /// Read through a shader-resource view.
        const SAMPLED = 1;
        /// Read or written through an unordered-access view.
        const STORAGE = 1 << 1;
        /// Written through a render-target view.
        const RENDER_TARGET = 1 << 2;
        /// Written through a depth/stencil view.
        const DEPTH_STENCIL = 1 << 3;
        const COPY_SRC = 1 << 4;
        const COPY_DST = 1 << 5;
    }
}

/// Texture dimensions. 2D arrays keep their layer count in `depth_or_layers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u32,
}

impl Extent3d {
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_layers: 1,
        }
    }

    /// Width and height of mip `level`, never below one texel.
    pub fn mip_dimensions(&self, level: u32) -> (u64, u64) {
        let shrink = |extent: u32| u64::from(extent.checked_shr(level).unwrap_or(0).max(1));
        (shrink(self.width), shrink(self.height))
    }
}

impl Default for Extent3d {
    fn default() -> Self {
        Self::new_2d(1, 1)
    }
}

/// What a pass needs from a transient texture.
///
/// Two descriptors that compare equal produce textures of the same heap
/// footprint on a given device, so a schedule that is reset and rebuilt with
/// the same descriptors packs into the same offsets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: Extent3d,
    pub mip_level_count: u32,
    /// Samples per texel. Anything above one is a multisampled target.
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Single-mip, single-sample 2D texture.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            size: Extent3d::new_2d(width, height),
            format,
            usage,
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1
    }

    /// Unpadded byte size of every mip of every layer.
    ///
    /// Devices report the real placement size through
    /// [`Device::texture_allocation_info`](crate::device::Device::texture_allocation_info);
    /// this is the lower bound that query must honour.
    pub fn estimated_size(&self) -> u64 {
        let bytes_per_texel =
            u64::from(self.format.texel_size()) * u64::from(self.sample_count.max(1));
        let layer: u64 = (0..self.mip_level_count.max(1))
            .map(|level| {
                let (width, height) = self.size.mip_dimensions(level);
                width * height
            })
            .sum();
        layer * bytes_per_texel * u64::from(self.size.depth_or_layers.max(1))
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            sample_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}
