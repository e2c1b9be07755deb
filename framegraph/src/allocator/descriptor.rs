//! Transient descriptor ring over a shader-visible descriptor table.

use super::ring::CircularRangeAllocator;
use crate::device::{
    DescriptorAddress, DescriptorTable, DescriptorTableHandle, QueueSync, SyncPoint,
};
use crate::error::FrameGraphResult;

/// A contiguous run of descriptors in a descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    /// Table the descriptors live in.
    pub table: DescriptorTableHandle,
    /// Index of the first descriptor.
    pub first_index: u32,
    /// Number of descriptors.
    pub count: u32,
    /// GPU address of the first descriptor.
    pub gpu_address: u64,
    /// Byte stride between descriptors.
    pub descriptor_size: u64,
}

impl DescriptorRange {
    /// Address of the `index`-th descriptor of the range.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn descriptor(&self, index: u32) -> DescriptorAddress {
        assert!(
            index < self.count,
            "descriptor {index} out of range for a run of {}",
            self.count
        );
        DescriptorAddress {
            table: self.table,
            index: self.first_index + index,
            gpu_address: self.gpu_address + index as u64 * self.descriptor_size,
        }
    }
}

/// Circular allocator handing out descriptor runs from one table.
///
/// The ring works in bytes with the descriptor size as its alignment, so a
/// count can never be passed where a byte size is expected.
#[derive(Debug)]
pub struct CircularDescriptorAllocator {
    ring: CircularRangeAllocator,
    table: DescriptorTable,
}

impl CircularDescriptorAllocator {
    /// Wrap a descriptor table.
    ///
    /// Fails if the table's descriptor size is not a power of two.
    pub fn new(table: DescriptorTable, release_queue_limit: usize) -> FrameGraphResult<Self> {
        let ring = CircularRangeAllocator::new(
            table.capacity as u64 * table.descriptor_size,
            release_queue_limit,
            table.descriptor_size,
        )?;
        Ok(Self { ring, table })
    }

    /// The table this allocator sub-allocates.
    pub fn table(&self) -> &DescriptorTable {
        &self.table
    }

    /// The underlying range allocator.
    pub fn ring(&self) -> &CircularRangeAllocator {
        &self.ring
    }

    /// Allocate `count` contiguous descriptors.
    ///
    /// # Panics
    ///
    /// Panics if the ring is exhausted.
    pub fn allocate<Q: QueueSync + ?Sized>(&mut self, queue: &Q, count: u32) -> DescriptorRange {
        let range = self
            .ring
            .allocate(queue, count as u64 * self.table.descriptor_size);
        DescriptorRange {
            table: self.table.handle,
            first_index: (range.offset / self.table.descriptor_size) as u32,
            count,
            gpu_address: self.table.base_address + range.offset,
            descriptor_size: self.table.descriptor_size,
        }
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
}
