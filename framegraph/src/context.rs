//! Per-execution broker handed to pass executors.
//!
//! One context is built for each [`Schedule::execute`](crate::Schedule::execute)
//! and shared by every pass in it. It is the only way a pass reaches device
//! resources, transient descriptors and upload memory. Descriptors and upload
//! ranges are never freed one by one; the whole frame's usage is released
//! when the execution ends.

use std::any::Any;

use crate::allocator::{
    CircularDescriptorAllocator, CircularUploadAllocator, DescriptorRange, UploadAllocation,
};
use crate::device::{
    CommandList, DescriptorAddress, DescriptorSetLayout, Device, DeviceBuffer, DeviceTexture,
};
use crate::schedule::{BufferHandle, Pass, PassHandle, PassType, TextureHandle, UserData};
use crate::schedule::user_data::UserDataArena;
use crate::types::{
    BufferViewDescriptor, TextureFormat, TextureSubresource, TextureViewDescriptor,
    TextureViewKind,
};

/// Execution broker for the passes of one schedule execution.
pub struct PassExecutionContext<'a> {
    device: &'a dyn Device,
    command_list: CommandList,
    schedule: u32,
    passes: &'a [Pass],
    current: PassHandle,
    buffers: &'a [DeviceBuffer],
    textures: &'a [DeviceTexture],
    descriptors: &'a mut CircularDescriptorAllocator,
    uploads: &'a mut CircularUploadAllocator,
    user_data: &'a mut UserDataArena,
    descriptors_allocated: u64,
    upload_bytes: u64,
}

impl<'a> PassExecutionContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: &'a dyn Device,
        command_list: CommandList,
        schedule: u32,
        passes: &'a [Pass],
        buffers: &'a [DeviceBuffer],
        textures: &'a [DeviceTexture],
        descriptors: &'a mut CircularDescriptorAllocator,
        uploads: &'a mut CircularUploadAllocator,
        user_data: &'a mut UserDataArena,
    ) -> Self {
        Self {
            device,
            command_list,
            schedule,
            passes,
            current: PassHandle::new(0),
            buffers,
            textures,
            descriptors,
            uploads,
            user_data,
            descriptors_allocated: 0,
            upload_bytes: 0,
        }
    }

    pub(crate) fn set_current_pass(&mut self, pass: PassHandle) {
        self.current = pass;
    }

    pub(crate) fn descriptors_allocated(&self) -> u64 {
        self.descriptors_allocated
    }

    pub(crate) fn upload_bytes(&self) -> u64 {
        self.upload_bytes
    }

    /// The device passes record against.
    pub fn device(&self) -> &'a dyn Device {
        self.device
    }

    /// The command list passes record into.
    pub fn command_list(&self) -> CommandList {
        self.command_list
    }

    /// Handle of the pass currently executing.
    pub fn pass(&self) -> PassHandle {
        self.current
    }

    /// Name of the pass currently executing.
    pub fn pass_name(&self) -> &'a str {
        self.passes[self.current.index()].name()
    }

    /// Type of the pass currently executing.
    pub fn pass_type(&self) -> PassType {
        self.passes[self.current.index()].pass_type()
    }

    /// Device buffer behind a graph-level buffer handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not created by the executing schedule.
    pub fn resolve_buffer(&self, buffer: BufferHandle) -> DeviceBuffer {
        assert!(
            buffer.schedule() == self.schedule,
            "{buffer:?} was not created by the executing schedule"
        );
        *self
            .buffers
            .get(buffer.index() as usize)
            .unwrap_or_else(|| panic!("unknown buffer handle {buffer:?}"))
    }

    /// Device texture behind a graph-level texture handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle was not created by the executing schedule.
    pub fn resolve_texture(&self, texture: TextureHandle) -> DeviceTexture {
        assert!(
            texture.schedule() == self.schedule,
            "{texture:?} was not created by the executing schedule"
        );
        *self
            .textures
            .get(texture.index() as usize)
            .unwrap_or_else(|| panic!("unknown texture handle {texture:?}"))
    }

    /// Mutable access to a value stored with
    /// [`Schedule::allocate_user_data`](crate::Schedule::allocate_user_data).
    pub fn user_data<T: Any>(&mut self, handle: UserData<T>) -> &mut T {
        self.user_data.get_mut(self.schedule, handle)
    }

    /// Allocate `count` contiguous descriptors for this frame.
    pub fn allocate_transient_descriptors(&mut self, count: u32) -> DescriptorRange {
        self.descriptors_allocated += count as u64;
        self.descriptors.allocate(self.device, count)
    }

    /// Allocate descriptors for one set with `layout`.
    pub fn allocate_transient_descriptor_set(
        &mut self,
        layout: DescriptorSetLayout,
    ) -> DescriptorRange {
        let count = self.device.descriptor_count(layout);
        self.allocate_transient_descriptors(count)
    }

    /// Allocate `size` bytes of CPU-writable upload memory for this frame.
    pub fn allocate_transient_upload_memory(&mut self, size: u64) -> UploadAllocation<'a> {
        let allocation = self.uploads.allocate_for_frame(self.device, size);
        self.upload_bytes += allocation.size();
        allocation
    }

    /// Write a view of `buffer` into a fresh transient descriptor.
    pub fn create_transient_buffer_view(
        &mut self,
        buffer: BufferHandle,
        view: &BufferViewDescriptor,
    ) -> DescriptorAddress {
        let device_buffer = self.resolve_buffer(buffer);
        let dst = self.allocate_transient_descriptors(1).descriptor(0);
        self.device.write_buffer_view(dst, device_buffer, view);
        dst
    }

    /// Write a shader-resource view of `texture` into a fresh transient descriptor.
    pub fn create_transient_texture_view(
        &mut self,
        texture: TextureHandle,
        format: TextureFormat,
        subresource: TextureSubresource,
    ) -> DescriptorAddress {
        self.write_texture_view(texture, TextureViewKind::ShaderResource, format, subresource)
    }

    /// Write a storage view of `texture` into a fresh transient descriptor.
    pub fn create_transient_storage_view(
        &mut self,
        texture: TextureHandle,
        format: TextureFormat,
        subresource: TextureSubresource,
    ) -> DescriptorAddress {
        self.write_texture_view(texture, TextureViewKind::Storage, format, subresource)
    }

    /// Write a render-target view of `texture` into a fresh transient descriptor.
    pub fn create_transient_render_target_view(
        &mut self,
        texture: TextureHandle,
        format: TextureFormat,
        subresource: TextureSubresource,
    ) -> DescriptorAddress {
        self.write_texture_view(texture, TextureViewKind::RenderTarget, format, subresource)
    }

    /// Write a depth/stencil view of `texture` into a fresh transient descriptor.
    pub fn create_transient_depth_stencil_view(
        &mut self,
        texture: TextureHandle,
        format: TextureFormat,
        subresource: TextureSubresource,
        read_only: bool,
    ) -> DescriptorAddress {
        debug_assert!(format.is_depth_stencil(), "{format:?} is not a depth format");
        self.write_texture_view(
            texture,
            TextureViewKind::DepthStencil { read_only },
            format,
            subresource,
        )
    }

    fn write_texture_view(
        &mut self,
        texture: TextureHandle,
        kind: TextureViewKind,
        format: TextureFormat,
        subresource: TextureSubresource,
    ) -> DescriptorAddress {
        let device_texture = self.resolve_texture(texture);
        let dst = self.allocate_transient_descriptors(1).descriptor(0);
        let view = TextureViewDescriptor {
            kind,
            format,
            subresource,
        };
        self.device.write_texture_view(dst, device_texture, &view);
        dst
    }
}

impl std::fmt::Debug for PassExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassExecutionContext")
            .field("command_list", &self.command_list)
            .field("pass", &self.passes.get(self.current.index()).map(Pass::name))
            .field("descriptors_allocated", &self.descriptors_allocated)
            .field("upload_bytes", &self.upload_bytes)
            .finish()
    }
}
