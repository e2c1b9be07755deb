//! Pass records and their declared dependencies.

use super::resource::{AccessMode, BufferHandle, TextureHandle};
use crate::context::PassExecutionContext;
use crate::error::FrameGraphResult;

/// Handle to a pass in a schedule.
///
/// Passes execute in the order their handles were issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Position of the pass in execution order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Kind of GPU work a pass records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassType {
    /// Rasterization work.
    #[default]
    Graphics,
    /// Compute dispatches.
    Compute,
    /// Copies only.
    Copy,
}

impl PassType {
    /// Name of the queue family this kind of pass prefers.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Graphics => "graphics",
            Self::Compute => "compute",
            Self::Copy => "copy",
        }
    }
}

/// A buffer a pass touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDependency {
    pub buffer: BufferHandle,
    pub access: AccessMode,
}

/// A texture a pass touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDependency {
    pub texture: TextureHandle,
    pub access: AccessMode,
}

/// Every resource a pass reads or writes.
///
/// The frame graph does not insert barriers itself, but these lists are the
/// only record of read/write ordering, so they must name every resource the
/// pass touches.
///
/// # Example
///
/// ```ignore
/// let deps = PassDependencies::new()
///     .with_texture(gbuffer, AccessMode::ShaderRead)
///     .with_texture(hdr, AccessMode::RenderTarget);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassDependencies {
    pub buffers: Vec<BufferDependency>,
    pub textures: Vec<TextureDependency>,
}

impl PassDependencies {
    /// No dependencies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a buffer dependency.
    pub fn with_buffer(mut self, buffer: BufferHandle, access: AccessMode) -> Self {
        self.buffers.push(BufferDependency { buffer, access });
        self
    }

    /// Add a texture dependency.
    pub fn with_texture(mut self, texture: TextureHandle, access: AccessMode) -> Self {
        self.textures.push(TextureDependency { texture, access });
        self
    }

    /// Total number of declared dependencies.
    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    /// Whether the pass declares no dependencies.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }
}

/// Callback recording a pass.
pub type PassExecutor =
    Box<dyn FnMut(&mut PassExecutionContext<'_>) -> FrameGraphResult<()> + Send + 'static>;

/// A declared pass, without its executor.
#[derive(Debug, Clone)]
pub struct Pass {
    name: String,
    pass_type: PassType,
    dependencies: PassDependencies,
}

impl Pass {
    pub(crate) fn new(name: String, pass_type: PassType, dependencies: PassDependencies) -> Self {
        Self {
            name,
            pass_type,
            dependencies,
        }
    }

    /// Get the pass name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the pass type.
    pub fn pass_type(&self) -> PassType {
        self.pass_type
    }

    /// Get the declared dependencies.
    pub fn dependencies(&self) -> &PassDependencies {
        &self.dependencies
    }

    /// Check whether the pass writes `texture`.
    pub fn writes_texture(&self, texture: TextureHandle) -> bool {
        self.dependencies
            .textures
            .iter()
            .any(|dep| dep.texture == texture && dep.access.is_write())
    }

    /// Check whether the pass writes `buffer`.
    pub fn writes_buffer(&self, buffer: BufferHandle) -> bool {
        self.dependencies
            .buffers
            .iter()
            .any(|dep| dep.buffer == buffer && dep.access.is_write())
    }
}
