//! Transient resource pool.
//!
//! One fixed device-memory allocation that every frame's transient buffers and
//! textures are placed into. Placement is a linear bump from offset 0; each
//! frame repacks from scratch, so identical graphs get identical offsets.
//!
//! The pool memory is shared by consecutive frames, so a frame's resources
//! are only destroyed once the sync point of the submission that used them is
//! reached, and [`TransientResourcePool::begin_frame`] blocks until every
//! earlier frame has retired before reusing offsets.

use std::collections::VecDeque;

use crate::device::{Device, DeviceBuffer, DeviceMemory, DeviceTexture, SyncPoint};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Granularity of every placement in the pool.
pub const PLACEMENT_ALIGNMENT: u64 = 64 * 1024;

/// A device resource created in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientResource {
    Buffer(DeviceBuffer),
    Texture(DeviceTexture),
}

/// Where a transient resource was placed in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placement {
    /// Byte offset into the pool memory.
    pub offset: u64,
    /// Bytes reserved, a multiple of [`PLACEMENT_ALIGNMENT`].
    pub size: u64,
}

/// Resources of a submitted frame, destroyed once `sync_point` is reached.
#[derive(Debug)]
struct RetiringFrame {
    sync_point: SyncPoint,
    resources: Vec<TransientResource>,
}

/// Pool of placed transient resources over one device-memory allocation.
#[derive(Debug)]
pub struct TransientResourcePool {
    memory: DeviceMemory,
    capacity: u64,
    cursor: u64,
    peak_used: u64,
    frame_open: bool,
    resources: Vec<TransientResource>,
    placements: Vec<Placement>,
    in_flight: VecDeque<RetiringFrame>,
}

impl TransientResourcePool {
    /// Bind the pool to `size` bytes of `memory`.
    pub fn new(memory: DeviceMemory, size: u64) -> Self {
        Self {
            memory,
            capacity: size,
            cursor: 0,
            peak_used: 0,
            frame_open: false,
            resources: Vec::new(),
            placements: Vec::new(),
            in_flight: VecDeque::new(),
        }
    }

    /// The memory allocation resources are placed into.
    pub fn memory(&self) -> DeviceMemory {
        self.memory
    }

    /// Size of the pool in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes placed so far in the current frame.
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Largest per-frame usage seen.
    pub fn peak_used(&self) -> u64 {
        self.peak_used
    }

    /// Placements of the current (or last) frame, in creation order.
    pub fn frame_placements(&self) -> &[Placement] {
        &self.placements
    }

    /// Number of submitted frames whose resources are not destroyed yet.
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether a frame is between [`begin_frame`](Self::begin_frame) and
    /// [`end_frame`](Self::end_frame).
    pub fn is_frame_open(&self) -> bool {
        self.frame_open
    }

    /// Start placing a new frame.
    ///
    /// Destroys resources of earlier frames that have retired and blocks on
    /// the newest frame still in flight, since the new frame reuses its
    /// offsets.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already open.
    pub fn begin_frame<D: Device + ?Sized>(&mut self, device: &D) {
        assert!(
            !self.frame_open,
            "begin_frame called while a frame is already open"
        );
        self.retire(device);
        if let Some(newest) = self.in_flight.back() {
            log::debug!(
                "TransientResourcePool: waiting for {} before reusing pool memory",
                newest.sync_point
            );
            device.wait_for_queue_sync_point(newest.sync_point);
            self.retire(device);
        }

        self.cursor = 0;
        self.placements.clear();
        self.frame_open = true;
    }

    /// Place a buffer at the next free offset.
    ///
    /// Returns [`FrameGraphError::TransientPoolExhausted`] if it does not fit.
    pub fn place_buffer<D: Device + ?Sized>(
        &mut self,
        device: &D,
        descriptor: &BufferDescriptor,
    ) -> FrameGraphResult<DeviceBuffer> {
        let placement = self.reserve(PLACEMENT_ALIGNMENT, descriptor.placed_size())?;
        let buffer = device.create_placed_buffer(self.memory, placement.offset, descriptor)?;
        log::trace!(
            "TransientResourcePool: buffer {:?} at {} ({} bytes)",
            descriptor.label,
            placement.offset,
            placement.size
        );
        self.commit(TransientResource::Buffer(buffer), placement);
        Ok(buffer)
    }

    /// Place a texture at the next offset satisfying its alignment.
    ///
    /// Returns [`FrameGraphError::TransientPoolExhausted`] if it does not fit.
    pub fn place_texture<D: Device + ?Sized>(
        &mut self,
        device: &D,
        descriptor: &TextureDescriptor,
    ) -> FrameGraphResult<DeviceTexture> {
        let info = device.texture_allocation_info(descriptor);
        let placement = self.reserve(info.alignment.max(PLACEMENT_ALIGNMENT), info.size)?;
        let texture = device.create_placed_texture(self.memory, placement.offset, descriptor)?;
        log::trace!(
            "TransientResourcePool: texture {:?} at {} ({} bytes)",
            descriptor.label,
            placement.offset,
            placement.size
        );
        self.commit(TransientResource::Texture(texture), placement);
        Ok(texture)
    }

    /// Hand the frame's resources over for destruction once `sync_point` is reached.
    ///
    /// # Panics
    ///
    /// Panics if no frame is open.
    pub fn end_frame(&mut self, sync_point: SyncPoint) {
        assert!(self.frame_open, "end_frame called without begin_frame");
        self.frame_open = false;
        if self.resources.is_empty() {
            return;
        }
        log::trace!(
            "TransientResourcePool: {} resource(s) retire at {sync_point}",
            self.resources.len()
        );
        self.in_flight.push_back(RetiringFrame {
            sync_point,
            resources: std::mem::take(&mut self.resources),
        });
    }

    /// Destroy the open frame's resources immediately.
    ///
    /// For frames that were never submitted.
    pub fn abort_frame<D: Device + ?Sized>(&mut self, device: &D) {
        assert!(self.frame_open, "abort_frame called without begin_frame");
        self.frame_open = false;
        log::debug!(
            "TransientResourcePool: aborting frame with {} resource(s)",
            self.resources.len()
        );
        Self::destroy_resources(device, std::mem::take(&mut self.resources));
    }

    /// Destroy resources of every submitted frame whose sync point is reached.
    ///
    /// Frames retire in submission order. Returns the number retired.
    pub fn retire<D: Device + ?Sized>(&mut self, device: &D) -> usize {
        let mut retired = 0;
        while let Some(frame) = self.in_flight.front() {
            if !device.is_queue_sync_point_reached(frame.sync_point) {
                break;
            }
            if let Some(frame) = self.in_flight.pop_front() {
                Self::destroy_resources(device, frame.resources);
                retired += 1;
            }
        }
        retired
    }

    /// Block until every submitted frame has retired and destroy its resources.
    pub fn wait_idle<D: Device + ?Sized>(&mut self, device: &D) {
        while let Some(frame) = self.in_flight.pop_front() {
            device.wait_for_queue_sync_point(frame.sync_point);
            Self::destroy_resources(device, frame.resources);
        }
    }

    /// Find room for `bytes` at the cursor rounded up to `alignment`.
    ///
    /// Sizes that do not fit in `u64` once rounded report `u64::MAX` as required.
    fn reserve(&self, alignment: u64, bytes: u64) -> FrameGraphResult<Placement> {
        assert!(self.frame_open, "placing a resource outside begin_frame/end_frame");
        let offset = self.cursor.checked_next_multiple_of(alignment);
        let size = bytes.max(1).checked_next_multiple_of(PLACEMENT_ALIGNMENT);
        let end = offset.zip(size).and_then(|(offset, size)| offset.checked_add(size));
        match (offset, size, end) {
            (Some(offset), Some(size), Some(end)) if end <= self.capacity => {
                Ok(Placement { offset, size })
            }
            _ => Err(FrameGraphError::TransientPoolExhausted {
                required: end.unwrap_or(u64::MAX),
                capacity: self.capacity,
            }),
        }
    }

    fn commit(&mut self, resource: TransientResource, placement: Placement) {
        self.cursor = placement.offset + placement.size;
        self.peak_used = self.peak_used.max(self.cursor);
        self.resources.push(resource);
        self.placements.push(placement);
    }

    fn destroy_resources<D: Device + ?Sized>(device: &D, resources: Vec<TransientResource>) {
        for resource in resources.into_iter().rev() {
            match resource {
                TransientResource::Buffer(buffer) => device.destroy_buffer(buffer),
                TransientResource::Texture(texture) => device.destroy_texture(texture),
            }
        }
    }
}

impl Drop for TransientResourcePool {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.in_flight.is_empty() && self.resources.is_empty(),
            "TransientResourcePool dropped with {} frame(s) in flight and {} open resource(s)",
            self.in_flight.len(),
            self.resources.len()
        );
    }
}

static_assertions::assert_impl_all!(TransientResourcePool: Send, Sync);
