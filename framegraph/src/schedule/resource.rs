//! Graph-level resource handles and access modes.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::device::{DeviceBuffer, DeviceTexture};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Identifies one build of one [`Schedule`](super::Schedule).
///
/// Handles carry the id of the build that created them so a handle from
/// another schedule, or from before a reset, is caught instead of silently
/// resolving to the wrong resource.
pub(crate) fn next_schedule_id() -> u32 {
    static NEXT_ID: AtomicU32 = AtomicU32::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

macro_rules! graph_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            index: u32,
            schedule: u32,
        }

        impl $name {
            pub(crate) fn new(schedule: u32, index: u32) -> Self {
                Self { index, schedule }
            }

            /// Index of the resource within its schedule.
            pub fn index(&self) -> u32 {
                self.index
            }

            pub(crate) fn schedule(&self) -> u32 {
                self.schedule
            }
        }
    };
}

graph_handle!(
    /// Handle to a buffer declared in a schedule.
    ///
    /// Only valid within the schedule that created it, until that schedule
    /// is reset.
    BufferHandle
);
graph_handle!(
    /// Handle to a texture declared in a schedule.
    ///
    /// Only valid within the schedule that created it, until that schedule
    /// is reset.
    TextureHandle
);

/// How a pass touches a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Sampled or loaded in a shader.
    ShaderRead,
    /// Written from a shader.
    ShaderWrite,
    /// Read and written from a shader.
    ShaderReadWrite,
    /// Bound as a color render target.
    RenderTarget,
    /// Bound as a depth/stencil target that is only tested.
    DepthStencilReadOnly,
    /// Bound as a depth/stencil target that is tested and written.
    DepthStencilReadWrite,
}

impl AccessMode {
    /// Check if this access reads existing contents.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::ShaderRead
                | Self::ShaderReadWrite
                | Self::DepthStencilReadOnly
                | Self::DepthStencilReadWrite
        )
    }

    /// Check if this access writes.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::ShaderWrite
                | Self::ShaderReadWrite
                | Self::RenderTarget
                | Self::DepthStencilReadWrite
        )
    }
}

/// Where a graph-level buffer comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferSource {
    /// Placed in the transient pool for each execution.
    Transient(BufferDescriptor),
    /// Owned by the caller and imported as-is.
    External(DeviceBuffer),
}

impl BufferSource {
    /// Whether the buffer is created by the schedule.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Transient(descriptor) => descriptor.label.as_deref(),
            Self::External(_) => None,
        }
    }
}

/// Where a graph-level texture comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    /// Placed in the transient pool for each execution.
    Transient(TextureDescriptor),
    /// Owned by the caller and imported as-is.
    External(DeviceTexture),
}

impl TextureSource {
    /// Whether the texture is created by the schedule.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Transient(descriptor) => descriptor.label.as_deref(),
            Self::External(_) => None,
        }
    }
}
