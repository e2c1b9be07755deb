//! Transient buffer descriptors.

use bitflags::bitflags;

bitflags! {
    /// How passes may touch a transient buffer.
    ///
    /// The device picks the buffer's resource flags from this mask when it
    /// creates the buffer inside the transient heap.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Read or written by shaders through a buffer view.
        const STORAGE = 1;
        /// Bound as a constant buffer view.
        const CONSTANT = 1 << 1;
        /// Source of indirect draw or dispatch arguments.
        const INDIRECT = 1 << 2;
        const VERTEX = 1 << 3;
        const INDEX = 1 << 4;
        /// Source of a copy pass.
        const COPY_SRC = 1 << 5;
        /// Destination of a copy pass.
        const COPY_DST = 1 << 6;
    }
}

impl Default for BufferUsage {
    /// Scratch buffers are storage buffers unless told otherwise.
    fn default() -> Self {
        Self::STORAGE
    }
}

/// What a pass needs from a transient buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    /// Requested size in bytes, before placement rounding.
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    /// Storage buffer of `size` bytes.
    pub fn with_size(size: u64) -> Self {
        Self::new(size, BufferUsage::default())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Bytes the buffer occupies in the heap before placement rounding.
    ///
    /// A zero-sized request still reserves one byte so every placed buffer
    /// has a distinct offset.
    pub fn placed_size(&self) -> u64 {
        self.size.max(1)
    }
}
