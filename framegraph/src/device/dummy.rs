//! Dummy device for testing and headless runs.
//!
//! No GPU work happens. Resource creation hands out fresh handles, upload
//! buffers are backed by host memory, and every call is appended to a
//! journal tests can inspect. Queue completion is driven by hand through
//! [`DummyDevice::signal`].

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{
    AllocationInfo, CommandList, DescriptorAddress, DescriptorSetLayout, DescriptorTable,
    DescriptorTableHandle, Device, DeviceBuffer, DeviceMemory, DeviceTexture, MappedUploadBuffer,
    QueueSync, SyncPoint, SyncTimeline,
};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::types::{
    BufferDescriptor, BufferViewDescriptor, TextureDescriptor, TextureViewDescriptor,
    TextureViewKind,
};

/// Placement alignment the dummy device reports for single-sampled textures.
const TEXTURE_ALIGNMENT: u64 = 64 * 1024;
/// Placement alignment the dummy device reports for multisampled textures.
const MSAA_TEXTURE_ALIGNMENT: u64 = 4 * 1024 * 1024;
/// Byte stride between descriptors in dummy descriptor tables.
const DESCRIPTOR_SIZE: u64 = 32;

/// A device call recorded by [`DummyDevice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    AllocateMemory {
        memory: DeviceMemory,
        size: u64,
    },
    FreeMemory {
        memory: DeviceMemory,
    },
    CreateBuffer {
        buffer: DeviceBuffer,
        memory: DeviceMemory,
        offset: u64,
        size: u64,
    },
    CreateTexture {
        texture: DeviceTexture,
        memory: DeviceMemory,
        offset: u64,
        label: Option<String>,
    },
    DestroyBuffer {
        buffer: DeviceBuffer,
    },
    DestroyTexture {
        texture: DeviceTexture,
    },
    WriteBufferView {
        dst: DescriptorAddress,
        buffer: DeviceBuffer,
    },
    WriteTextureView {
        dst: DescriptorAddress,
        texture: DeviceTexture,
        kind: TextureViewKind,
    },
}

/// Host memory standing in for a mapped upload buffer.
struct HostAllocation {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the allocation is plain bytes owned by the device; access is
// serialized through the device's mutex or the upload ring's exclusive ranges.
unsafe impl Send for HostAllocation {}

impl HostAllocation {
    fn new(len: usize) -> Self {
        let boxed = vec![0u8; len].into_boxed_slice();
        let raw = Box::into_raw(boxed) as *mut u8;
        Self {
            // SAFETY: Box::into_raw never returns null.
            ptr: unsafe { NonNull::new_unchecked(raw) },
            len,
        }
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: ptr/len come from a live boxed slice owned by self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        // SAFETY: reconstructs the boxed slice leaked in `new`.
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

#[derive(Default)]
struct DummyState {
    journal: Vec<DeviceCall>,
    memory: HashMap<DeviceMemory, u64>,
    buffers: HashSet<DeviceBuffer>,
    textures: HashSet<DeviceTexture>,
    uploads: HashMap<DeviceBuffer, HostAllocation>,
    tables: HashSet<DescriptorTableHandle>,
    layouts: HashMap<DescriptorSetLayout, u32>,
}

/// Dummy device.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::{DummyDevice, QueueSync, SyncPoint};
///
/// let device = DummyDevice::new();
/// assert!(!device.is_queue_sync_point_reached(SyncPoint::new(1)));
/// device.signal(SyncPoint::new(1));
/// assert!(device.is_queue_sync_point_reached(SyncPoint::new(1)));
/// ```
pub struct DummyDevice {
    timeline: SyncTimeline,
    next_handle: AtomicU64,
    fail_next_creation: AtomicBool,
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self {
            timeline: SyncTimeline::new(),
            next_handle: AtomicU64::new(1),
            fail_next_creation: AtomicBool::new(false),
            state: Mutex::new(DummyState::default()),
        }
    }

    /// Get the device name.
    pub fn name(&self) -> &'static str {
        "Dummy Device"
    }

    /// The queue timeline this device reports completion from.
    pub fn timeline(&self) -> &SyncTimeline {
        &self.timeline
    }

    /// Simulate the queue finishing all work up to `sync_point`.
    pub fn signal(&self, sync_point: SyncPoint) {
        log::trace!("DummyDevice: queue reached {sync_point}");
        self.timeline.signal(sync_point);
    }

    /// Create a command list handle.
    pub fn create_command_list(&self) -> CommandList {
        CommandList::from_raw(self.next_raw())
    }

    /// Register a descriptor set layout occupying `descriptor_count` descriptors.
    pub fn create_descriptor_set_layout(&self, descriptor_count: u32) -> DescriptorSetLayout {
        let layout = DescriptorSetLayout::from_raw(self.next_raw());
        self.state.lock().layouts.insert(layout, descriptor_count);
        layout
    }

    /// Make the next placed resource creation fail.
    pub fn fail_next_creation(&self) {
        self.fail_next_creation.store(true, Ordering::Release);
    }

    /// Snapshot of every call recorded so far.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().journal.clone()
    }

    /// Forget the recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }

    /// Number of placed buffers currently alive.
    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Number of placed textures currently alive.
    pub fn live_texture_count(&self) -> usize {
        self.state.lock().textures.len()
    }

    /// Number of memory allocations, upload buffers and descriptor tables alive.
    pub fn live_allocation_count(&self) -> usize {
        let state = self.state.lock();
        state.memory.len() + state.uploads.len() + state.tables.len()
    }

    /// Read back bytes written into an upload buffer.
    ///
    /// # Panics
    ///
    /// Panics if `buffer` is not a live upload buffer or the range is out of bounds.
    pub fn read_upload_buffer(&self, buffer: DeviceBuffer, offset: u64, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        let allocation = state
            .uploads
            .get(&buffer)
            .unwrap_or_else(|| panic!("{buffer:?} is not an upload buffer"));
        let start = offset as usize;
        allocation.bytes()[start..start + len].to_vec()
    }

    fn next_raw(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn check_injected_failure(&self, what: &str) -> FrameGraphResult<()> {
        if self.fail_next_creation.swap(false, Ordering::AcqRel) {
            return Err(FrameGraphError::ResourceCreationFailed(format!(
                "injected failure creating {what}"
            )));
        }
        Ok(())
    }

    fn check_placement(
        state: &DummyState,
        memory: DeviceMemory,
        offset: u64,
        size: u64,
    ) -> FrameGraphResult<()> {
        let Some(&memory_size) = state.memory.get(&memory) else {
            return Err(FrameGraphError::InvalidParameter(format!(
                "{memory:?} is not a live allocation"
            )));
        };
        if offset + size > memory_size {
            return Err(FrameGraphError::InvalidParameter(format!(
                "placement {offset}..{} exceeds allocation of {memory_size} bytes",
                offset + size
            )));
        }
        Ok(())
    }
}

impl Default for DummyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DummyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DummyDevice")
            .field("completed", &self.timeline.completed())
            .field("buffers", &state.buffers.len())
            .field("textures", &state.textures.len())
            .field("calls", &state.journal.len())
            .finish()
    }
}

impl QueueSync for DummyDevice {
    fn is_queue_sync_point_reached(&self, sync_point: SyncPoint) -> bool {
        self.timeline.is_reached(sync_point)
    }

    fn wait_for_queue_sync_point(&self, sync_point: SyncPoint) {
        log::trace!("DummyDevice: waiting for {sync_point}");
        self.timeline.wait(sync_point);
    }
}

impl Device for DummyDevice {
    fn allocate_memory(&self, size: u64) -> FrameGraphResult<DeviceMemory> {
        if size == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "cannot allocate zero bytes of device memory".to_string(),
            ));
        }
        let memory = DeviceMemory::from_raw(self.next_raw());
        log::trace!("DummyDevice: allocating {size} bytes as {memory:?}");
        let mut state = self.state.lock();
        state.memory.insert(memory, size);
        state.journal.push(DeviceCall::AllocateMemory { memory, size });
        Ok(memory)
    }

    fn free_memory(&self, memory: DeviceMemory) {
        let mut state = self.state.lock();
        assert!(
            state.memory.remove(&memory).is_some(),
            "double free of {memory:?}"
        );
        state.journal.push(DeviceCall::FreeMemory { memory });
    }

    fn create_placed_buffer(
        &self,
        memory: DeviceMemory,
        offset: u64,
        descriptor: &BufferDescriptor,
    ) -> FrameGraphResult<DeviceBuffer> {
        self.check_injected_failure("buffer")?;
        let mut state = self.state.lock();
        Self::check_placement(&state, memory, offset, descriptor.size)?;

        let buffer = DeviceBuffer::from_raw(self.next_raw());
        log::trace!(
            "DummyDevice: creating buffer {:?} (size: {}) at {offset}",
            descriptor.label,
            descriptor.size
        );
        state.buffers.insert(buffer);
        state.journal.push(DeviceCall::CreateBuffer {
            buffer,
            memory,
            offset,
            size: descriptor.size,
        });
        Ok(buffer)
    }

    fn create_placed_texture(
        &self,
        memory: DeviceMemory,
        offset: u64,
        descriptor: &TextureDescriptor,
    ) -> FrameGraphResult<DeviceTexture> {
        self.check_injected_failure("texture")?;
        let info = self.texture_allocation_info(descriptor);
        let mut state = self.state.lock();
        Self::check_placement(&state, memory, offset, info.size)?;
        if offset % info.alignment != 0 {
            return Err(FrameGraphError::InvalidParameter(format!(
                "texture offset {offset} is not {}-byte aligned",
                info.alignment
            )));
        }

        let texture = DeviceTexture::from_raw(self.next_raw());
        log::trace!(
            "DummyDevice: creating texture {:?} ({}x{}x{}) at {offset}",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth_or_layers
        );
        state.textures.insert(texture);
        state.journal.push(DeviceCall::CreateTexture {
            texture,
            memory,
            offset,
            label: descriptor.label.clone(),
        });
        Ok(texture)
    }

    fn destroy_buffer(&self, buffer: DeviceBuffer) {
        let mut state = self.state.lock();
        assert!(
            state.buffers.remove(&buffer),
            "destroying unknown buffer {buffer:?}"
        );
        state.journal.push(DeviceCall::DestroyBuffer { buffer });
    }

    fn destroy_texture(&self, texture: DeviceTexture) {
        let mut state = self.state.lock();
        assert!(
            state.textures.remove(&texture),
            "destroying unknown texture {texture:?}"
        );
        state.journal.push(DeviceCall::DestroyTexture { texture });
    }

    fn texture_allocation_info(&self, descriptor: &TextureDescriptor) -> AllocationInfo {
        let alignment = if descriptor.is_multisampled() {
            MSAA_TEXTURE_ALIGNMENT
        } else {
            TEXTURE_ALIGNMENT
        };
        AllocationInfo {
            size: crate::util::align_up(descriptor.estimated_size(), alignment),
            alignment,
        }
    }

    fn descriptor_count(&self, layout: DescriptorSetLayout) -> u32 {
        *self
            .state
            .lock()
            .layouts
            .get(&layout)
            .unwrap_or_else(|| panic!("unknown descriptor set layout {layout:?}"))
    }

    fn create_descriptor_table(&self, capacity: u32) -> FrameGraphResult<DescriptorTable> {
        let handle = DescriptorTableHandle::from_raw(self.next_raw());
        self.state.lock().tables.insert(handle);
        Ok(DescriptorTable {
            handle,
            // Arbitrary but non-zero so address arithmetic shows up in tests.
            base_address: 0x1_0000_0000 * handle.raw(),
            descriptor_size: DESCRIPTOR_SIZE,
            capacity,
        })
    }

    fn destroy_descriptor_table(&self, table: DescriptorTableHandle) {
        assert!(
            self.state.lock().tables.remove(&table),
            "destroying unknown descriptor table {table:?}"
        );
    }

    fn create_upload_buffer(&self, size: u64) -> FrameGraphResult<MappedUploadBuffer> {
        let len = usize::try_from(size).map_err(|_| FrameGraphError::OutOfMemory)?;
        if len == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "upload buffer size cannot be zero".to_string(),
            ));
        }
        let buffer = DeviceBuffer::from_raw(self.next_raw());
        let allocation = HostAllocation::new(len);
        let ptr = allocation.ptr;
        self.state.lock().uploads.insert(buffer, allocation);
        log::trace!("DummyDevice: creating upload buffer {buffer:?} ({size} bytes)");
        Ok(MappedUploadBuffer {
            buffer,
            gpu_address: 0x10_0000_0000 + buffer.raw() * 0x1_0000_0000,
            ptr,
            size,
        })
    }

    fn destroy_upload_buffer(&self, buffer: DeviceBuffer) {
        assert!(
            self.state.lock().uploads.remove(&buffer).is_some(),
            "destroying unknown upload buffer {buffer:?}"
        );
    }

    fn write_buffer_view(
        &self,
        dst: DescriptorAddress,
        buffer: DeviceBuffer,
        view: &BufferViewDescriptor,
    ) {
        log::trace!(
            "DummyDevice: buffer view of {buffer:?} ({} bytes) at descriptor {}",
            view.size,
            dst.index
        );
        let mut state = self.state.lock();
        debug_assert!(state.tables.contains(&dst.table));
        state
            .journal
            .push(DeviceCall::WriteBufferView { dst, buffer });
    }

    fn write_texture_view(
        &self,
        dst: DescriptorAddress,
        texture: DeviceTexture,
        view: &TextureViewDescriptor,
    ) {
        log::trace!(
            "DummyDevice: {:?} view of {texture:?} at descriptor {}",
            view.kind,
            dst.index
        );
        let mut state = self.state.lock();
        debug_assert!(state.tables.contains(&dst.table));
        state.journal.push(DeviceCall::WriteTextureView {
            dst,
            texture,
            kind: view.kind,
        });
    }
}

static_assertions::assert_impl_all!(DummyDevice: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TextureFormat, TextureUsage};

    #[test]
    fn test_dummy_device_name() {
        assert_eq!(DummyDevice::new().name(), "Dummy Device");
    }

    #[test]
    fn test_placed_buffer_lifecycle() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(1 << 20).unwrap();
        let buffer = device
            .create_placed_buffer(memory, 0, &BufferDescriptor::with_size(1024))
            .unwrap();
        assert_eq!(device.live_buffer_count(), 1);

        device.destroy_buffer(buffer);
        assert_eq!(device.live_buffer_count(), 0);
        assert!(matches!(
            device.calls().last(),
            Some(DeviceCall::DestroyBuffer { .. })
        ));
    }

    #[test]
    fn test_placement_out_of_bounds() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(4096).unwrap();
        let result = device.create_placed_buffer(memory, 4000, &BufferDescriptor::with_size(200));
        assert!(matches!(result, Err(FrameGraphError::InvalidParameter(_))));
    }

    #[test]
    fn test_injected_failure_is_one_shot() {
        let device = DummyDevice::new();
        let memory = device.allocate_memory(1 << 20).unwrap();
        device.fail_next_creation();
        assert!(
            device
                .create_placed_buffer(memory, 0, &BufferDescriptor::with_size(16))
                .is_err()
        );
        assert!(
            device
                .create_placed_buffer(memory, 0, &BufferDescriptor::with_size(16))
                .is_ok()
        );
    }

    #[test]
    fn test_texture_allocation_info_alignment() {
        let device = DummyDevice::new();
        let desc =
            TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm, TextureUsage::SAMPLED);
        let info = device.texture_allocation_info(&desc);
        assert_eq!(info.alignment, TEXTURE_ALIGNMENT);
        assert_eq!(info.size, TEXTURE_ALIGNMENT);

        let msaa = desc.with_sample_count(4);
        assert_eq!(
            device.texture_allocation_info(&msaa).alignment,
            MSAA_TEXTURE_ALIGNMENT
        );
    }

    #[test]
    fn test_upload_buffer_readback() {
        let device = DummyDevice::new();
        let mapped = device.create_upload_buffer(256).unwrap();
        // SAFETY: the mapping is 256 bytes long and owned by the device.
        unsafe { mapped.ptr.as_ptr().add(8).write(0xAB) };
        assert_eq!(device.read_upload_buffer(mapped.buffer, 8, 1), vec![0xAB]);
        device.destroy_upload_buffer(mapped.buffer);
    }

    #[test]
    fn test_descriptor_layout_count() {
        let device = DummyDevice::new();
        let layout = device.create_descriptor_set_layout(6);
        assert_eq!(device.descriptor_count(layout), 6);
    }
}
