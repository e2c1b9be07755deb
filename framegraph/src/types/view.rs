//! View descriptors for execution-scoped buffer and texture views.

use super::TextureFormat;

/// Range of mips and array layers a texture view covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSubresource {
    /// First mip level.
    pub base_mip_level: u32,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// First array layer.
    pub base_array_layer: u32,
    /// Number of array layers.
    pub array_layer_count: u32,
}

impl TextureSubresource {
    /// Every mip and layer of a single-layer texture with `mips` levels.
    pub fn all_mips(mips: u32) -> Self {
        Self {
            base_mip_level: 0,
            mip_level_count: mips,
            base_array_layer: 0,
            array_layer_count: 1,
        }
    }

    /// One mip of layer 0.
    pub fn mip(level: u32) -> Self {
        Self {
            base_mip_level: level,
            mip_level_count: 1,
            base_array_layer: 0,
            array_layer_count: 1,
        }
    }
}

impl Default for TextureSubresource {
    fn default() -> Self {
        Self::mip(0)
    }
}

/// What a texture view is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewKind {
    /// Sampled or read in a shader.
    ShaderResource,
    /// Read/write storage access.
    Storage,
    /// Color render target.
    RenderTarget,
    /// Depth/stencil target.
    DepthStencil {
        /// Depth and stencil are only tested, never written.
        read_only: bool,
    },
}

/// Descriptor for a transient texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    /// What the view is used for.
    pub kind: TextureViewKind,
    /// View format, reinterpreting the texture's format when compatible.
    pub format: TextureFormat,
    /// Covered subresources.
    pub subresource: TextureSubresource,
}

/// Descriptor for a transient buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferViewDescriptor {
    /// Byte offset of the first element.
    pub offset: u64,
    /// Byte size of the view.
    pub size: u64,
    /// Structure stride, or `None` for a raw/typed view.
    pub stride: Option<u32>,
    /// Element format for typed views.
    pub format: Option<TextureFormat>,
    /// Whether shaders may write through the view.
    pub writable: bool,
}

impl BufferViewDescriptor {
    /// A read-only structured view.
    pub fn structured(offset: u64, size: u64, stride: u32) -> Self {
        Self {
            offset,
            size,
            stride: Some(stride),
            format: None,
            writable: false,
        }
    }

    /// A read-only typed view.
    pub fn typed(offset: u64, size: u64, format: TextureFormat) -> Self {
        Self {
            offset,
            size,
            stride: None,
            format: Some(format),
            writable: false,
        }
    }

    /// Allow shader writes through the view.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }
}
