//! Device abstraction consumed by the frame graph.
//!
//! The frame graph does not encode commands or talk to a graphics API. It
//! needs a handful of operations from whatever sits below it:
//!
//! - placed resource creation and destruction inside a memory allocation
//! - texture size queries and descriptor-layout introspection
//! - view writes into a descriptor table
//! - queue completion checks through [`QueueSync`]
//!
//! Backends implement [`Device`]; [`DummyDevice`] is an in-process
//! implementation for tests and headless runs.

mod dummy;
mod sync;

use std::ptr::NonNull;

pub use dummy::{DeviceCall, DummyDevice};
pub use sync::{SyncPoint, SyncTimeline};

use crate::error::FrameGraphResult;
use crate::types::{
    BufferDescriptor, BufferViewDescriptor, TextureDescriptor, TextureViewDescriptor,
};

macro_rules! device_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a backend-specific raw handle.
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// The backend-specific raw handle.
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

device_handle!(
    /// Handle to a device buffer.
    DeviceBuffer
);
device_handle!(
    /// Handle to a device texture.
    DeviceTexture
);
device_handle!(
    /// Handle to a raw device memory allocation that resources are placed in.
    DeviceMemory
);
device_handle!(
    /// Handle to a descriptor set layout.
    DescriptorSetLayout
);
device_handle!(
    /// Handle to the command list passes record into.
    CommandList
);
device_handle!(
    /// Handle to a shader-visible descriptor table.
    DescriptorTableHandle
);

/// Size and alignment a resource needs inside a memory allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationInfo {
    /// Bytes the resource occupies.
    pub size: u64,
    /// Required placement alignment in bytes.
    pub alignment: u64,
}

/// A shader-visible descriptor table the transient descriptor ring lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorTable {
    /// Device handle of the table.
    pub handle: DescriptorTableHandle,
    /// GPU address of descriptor 0.
    pub base_address: u64,
    /// Byte stride between descriptors.
    pub descriptor_size: u64,
    /// Number of descriptors in the table.
    pub capacity: u32,
}

/// Address of one descriptor inside a [`DescriptorTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorAddress {
    /// Table the descriptor lives in.
    pub table: DescriptorTableHandle,
    /// Index of the descriptor within the table.
    pub index: u32,
    /// GPU address of the descriptor.
    pub gpu_address: u64,
}

/// A persistently mapped upload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedUploadBuffer {
    /// Device handle of the buffer.
    pub buffer: DeviceBuffer,
    /// GPU address of byte 0.
    pub gpu_address: u64,
    /// CPU address of byte 0.
    pub ptr: NonNull<u8>,
    /// Mapped size in bytes.
    pub size: u64,
}

/// Queue completion checks.
///
/// Split from [`Device`] so the circular allocators only depend on what they
/// use.
pub trait QueueSync {
    /// Check whether the queue has finished all work up to `sync_point`.
    fn is_queue_sync_point_reached(&self, sync_point: SyncPoint) -> bool;

    /// Block the calling thread until `sync_point` is reached.
    fn wait_for_queue_sync_point(&self, sync_point: SyncPoint);
}

/// Device operations the frame graph consumes.
pub trait Device: QueueSync {
    /// Allocate device memory that resources can be placed into.
    fn allocate_memory(&self, size: u64) -> FrameGraphResult<DeviceMemory>;

    /// Free memory from [`allocate_memory`](Self::allocate_memory).
    fn free_memory(&self, memory: DeviceMemory);

    /// Create a buffer at `offset` inside `memory`.
    fn create_placed_buffer(
        &self,
        memory: DeviceMemory,
        offset: u64,
        descriptor: &BufferDescriptor,
    ) -> FrameGraphResult<DeviceBuffer>;

    /// Create a texture at `offset` inside `memory`.
    fn create_placed_texture(
        &self,
        memory: DeviceMemory,
        offset: u64,
        descriptor: &TextureDescriptor,
    ) -> FrameGraphResult<DeviceTexture>;

    /// Destroy a placed buffer.
    fn destroy_buffer(&self, buffer: DeviceBuffer);

    /// Destroy a placed texture.
    fn destroy_texture(&self, texture: DeviceTexture);

    /// Size and alignment a texture with `descriptor` needs when placed.
    fn texture_allocation_info(&self, descriptor: &TextureDescriptor) -> AllocationInfo;

    /// Number of descriptors a set with `layout` occupies.
    fn descriptor_count(&self, layout: DescriptorSetLayout) -> u32;

    /// Create a shader-visible descriptor table with room for `capacity` descriptors.
    fn create_descriptor_table(&self, capacity: u32) -> FrameGraphResult<DescriptorTable>;

    /// Destroy a descriptor table.
    fn destroy_descriptor_table(&self, table: DescriptorTableHandle);

    /// Create a persistently mapped upload buffer.
    fn create_upload_buffer(&self, size: u64) -> FrameGraphResult<MappedUploadBuffer>;

    /// Destroy an upload buffer created by [`create_upload_buffer`](Self::create_upload_buffer).
    fn destroy_upload_buffer(&self, buffer: DeviceBuffer);

    /// Write a buffer view into the descriptor at `dst`.
    fn write_buffer_view(
        &self,
        dst: DescriptorAddress,
        buffer: DeviceBuffer,
        view: &BufferViewDescriptor,
    );

    /// Write a texture view into the descriptor at `dst`.
    fn write_texture_view(
        &self,
        dst: DescriptorAddress,
        texture: DeviceTexture,
        view: &TextureViewDescriptor,
    );
}
