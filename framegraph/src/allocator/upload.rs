//! Upload memory ring over a persistently mapped buffer.

use std::marker::PhantomData;
use std::ptr::NonNull;

use super::ring::{CircularRangeAllocator, RingAllocation};
use crate::device::{DeviceBuffer, MappedUploadBuffer, QueueSync, SyncPoint};
use crate::error::FrameGraphResult;

/// Constant buffer bind alignment most devices require.
pub const DEFAULT_UPLOAD_ALIGNMENT: u64 = 256;

/// A CPU-writable range of the upload buffer.
///
/// The range belongs to the caller until the frame that allocated it enqueues
/// its release; the lifetime keeps it from outliving that frame.
#[derive(Debug)]
pub struct UploadAllocation<'a> {
    buffer: DeviceBuffer,
    offset: u64,
    size: u64,
    gpu_address: u64,
    ptr: NonNull<u8>,
    _frame: PhantomData<&'a mut [u8]>,
}

impl UploadAllocation<'_> {
    /// Upload buffer the range lives in.
    pub fn buffer(&self) -> DeviceBuffer {
        self.buffer
    }

    /// Byte offset within the upload buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes, after alignment.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU address of the first byte.
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    /// CPU address of the first byte.
    pub fn as_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Copy `data` into the range starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if the write would run past the end of the range.
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) {
        let in_bounds = offset
            .checked_add(data.len() as u64)
            .is_some_and(|end| end <= self.size);
        assert!(
            in_bounds,
            "upload write of {} bytes at {offset} exceeds allocation of {} bytes",
            data.len(),
            self.size
        );
        // SAFETY: the range [ptr, ptr + size) is mapped and exclusively owned
        // by this allocation, and the bounds were checked above.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.ptr.as_ptr().add(offset as usize),
                data.len(),
            );
        }
    }

    /// Write a plain-old-data value at `offset`.
    pub fn write_pod<T: bytemuck::Pod>(&mut self, offset: u64, value: &T) {
        self.write_bytes(offset, bytemuck::bytes_of(value));
    }

    /// Write a slice of plain-old-data values starting at `offset`.
    pub fn write_slice<T: bytemuck::Pod>(&mut self, offset: u64, values: &[T]) {
        self.write_bytes(offset, bytemuck::cast_slice(values));
    }
}

/// Circular allocator handing out ranges of one mapped upload buffer.
///
/// Offsets are aligned to the configured alignment, so they can be bound
/// directly as constant buffer offsets.
pub struct CircularUploadAllocator {
    ring: CircularRangeAllocator,
    mapped: MappedUploadBuffer,
}

// SAFETY: the allocator is the only writer of the mapping; the raw pointer is
// not tied to the thread that created it.
unsafe impl Send for CircularUploadAllocator {}
// SAFETY: every method touching the mapping takes `&mut self`.
unsafe impl Sync for CircularUploadAllocator {}

impl CircularUploadAllocator {
    /// Wrap a mapped upload buffer.
    ///
    /// # Safety
    ///
    /// `mapped.ptr` must point to `mapped.size` writable bytes that stay mapped
    /// for the lifetime of the allocator, and nothing else may write to them.
    pub unsafe fn new(
        mapped: MappedUploadBuffer,
        release_queue_limit: usize,
        alignment: u64,
    ) -> FrameGraphResult<Self> {
        let capacity = mapped.size - mapped.size % alignment.max(1);
        let ring = CircularRangeAllocator::new(capacity, release_queue_limit, alignment)?;
        Ok(Self { ring, mapped })
    }

    /// The mapped buffer this allocator sub-allocates.
    pub fn mapped(&self) -> &MappedUploadBuffer {
        &self.mapped
    }

    /// The underlying range allocator.
    pub fn ring(&self) -> &CircularRangeAllocator {
        &self.ring
    }

    /// Allocate `size` bytes of upload memory.
    ///
    /// # Panics
    ///
    /// Panics if the ring is exhausted.
    pub fn allocate<Q: QueueSync + ?Sized>(
        &mut self,
        queue: &Q,
        size: u64,
    ) -> UploadAllocation<'_> {
        let range = self.ring.allocate(queue, size);
        self.bind(range)
    }

    /// Allocate `size` bytes of upload memory, reporting exhaustion as an error.
    pub fn try_allocate<Q: QueueSync + ?Sized>(
        &mut self,
        queue: &Q,
        size: u64,
    ) -> FrameGraphResult<UploadAllocation<'_>> {
        let range = self.ring.try_allocate(queue, size)?;
        Ok(self.bind(range))
    }

    /// Allocate without tying the result to a borrow of `self`.
    ///
    /// The caller keeps the allocator borrowed for `'frame` and does not
    /// enqueue a release while any returned allocation is alive.
    pub(crate) fn allocate_for_frame<'frame, Q: QueueSync + ?Sized>(
        &mut self,
        queue: &Q,
        size: u64,
    ) -> UploadAllocation<'frame> {
        let range = self.ring.allocate(queue, size);
        self.bind(range)
    }

    /// Pass-through to [`CircularRangeAllocator::enqueue_release`].
    pub fn enqueue_release(&mut self, sync_point: SyncPoint) {
        self.ring.enqueue_release(sync_point);
    }

    /// Pass-through to [`CircularRangeAllocator::discard_unreleased`].
    pub fn discard_unreleased(&mut self) {
        self.ring.discard_unreleased();
    }

    /// Pass-through to [`CircularRangeAllocator::reconcile`].
    pub fn reconcile<Q: QueueSync + ?Sized>(&mut self, queue: &Q) -> usize {
        self.ring.reconcile(queue)
    }

    /// Pass-through to [`CircularRangeAllocator::wait_idle`].
    pub fn wait_idle<Q: QueueSync + ?Sized>(&mut self, queue: &Q) {
        self.ring.wait_idle(queue);
    }

    fn bind<'frame>(&self, range: RingAllocation) -> UploadAllocation<'frame> {
        // SAFETY: range.offset < capacity <= mapped.size, so the result stays
        // inside the mapping and is non-null.
        let ptr = unsafe {
            NonNull::new_unchecked(self.mapped.ptr.as_ptr().add(range.offset as usize))
        };
        UploadAllocation {
            buffer: self.mapped.buffer,
            offset: range.offset,
            size: range.size,
            gpu_address: self.mapped.gpu_address + range.offset,
            ptr,
            _frame: PhantomData,
        }
    }
}

impl std::fmt::Debug for CircularUploadAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularUploadAllocator")
            .field("buffer", &self.mapped.buffer)
            .field("ring", &self.ring)
            .finish()
    }
}
