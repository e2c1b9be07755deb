//! Circular range allocator with GPU-gated release.
//!
//! The allocator hands out contiguous byte ranges from a fixed arena
//! `[0, capacity)`, walking forward and wrapping to 0 when the tail of the
//! arena is too small. Ranges are never freed one by one. Instead the caller
//! periodically calls [`enqueue_release`] with the sync point of the
//! submission that consumes everything allocated so far; those bytes become
//! reusable once the queue reports that sync point reached.
//!
//! ```text
//!            tail (oldest unretired)          head (write cursor)
//!              v                                v
//! [ free ... | seg A (S1) | seg B (S2) | unreleased | free ... ]
//! ```
//!
//! Segments retire strictly front to back. A later segment never retires
//! before an earlier one, even if its sync point completes first, so the
//! in-use region is always the single wrapped interval `[tail, head)`.
//!
//! # Example
//!
//! ```
//! use redlilium_framegraph::{CircularRangeAllocator, SyncPoint, SyncTimeline};
//!
//! let queue = SyncTimeline::new();
//! let mut ring = CircularRangeAllocator::new(1024, 4, 256).unwrap();
//!
//! let constants = ring.allocate(&queue, 100);
//! assert_eq!(constants.offset, 0);
//! assert_eq!(constants.size, 256);
//!
//! ring.enqueue_release(SyncPoint::new(1));
//! queue.signal(SyncPoint::new(1));
//! ring.reconcile(&queue);
//! assert_eq!(ring.used(), 0);
//! ```
//!
//! [`enqueue_release`]: CircularRangeAllocator::enqueue_release

use std::collections::VecDeque;

use crate::device::{QueueSync, SyncPoint};
use crate::error::{FrameGraphError, FrameGraphResult};

/// A sub-allocation from a circular allocator.
///
/// Contains the offset and size of the allocated region within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingAllocation {
    /// Byte offset into the arena.
    pub offset: u64,
    /// Size of the allocation in bytes, after alignment.
    pub size: u64,
}

impl RingAllocation {
    /// Create a new ring allocation.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the end offset (offset + size).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Bytes that become reusable once `sync_point` is reached.
#[derive(Debug, Clone, Copy)]
struct ReleaseRecord {
    /// Write cursor when the release was enqueued; becomes the new tail.
    end: u64,
    /// Bytes between the previous record's end and `end`, wrap padding included.
    bytes: u64,
    sync_point: SyncPoint,
}

/// Circular range allocator whose freed ranges are gated on queue sync points.
///
/// # Thread Safety
///
/// Not internally synchronized. One thread drives the frame loop and owns
/// the allocator; hand it off between threads with `&mut` or a mutex.
pub struct CircularRangeAllocator {
    capacity: u64,
    alignment: u64,
    /// Write cursor, always `< capacity`.
    head: u64,
    /// Start of the oldest unretired byte.
    tail: u64,
    /// Bytes in `[tail, head)` modulo wraparound, including skipped tails.
    used: u64,
    /// Bytes allocated since the last `enqueue_release`.
    unreleased: u64,
    releases: VecDeque<ReleaseRecord>,
    release_queue_limit: usize,
    peak_used: u64,
    wrap_count: u64,
}

impl CircularRangeAllocator {
    /// Create an allocator over `capacity` bytes.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Arena size in bytes, a non-zero multiple of `alignment`
    /// * `release_queue_limit` - Maximum number of outstanding releases
    /// * `alignment` - Allocation granularity (must be a power of 2)
    ///
    /// The release queue is reserved up front; see
    /// [`internal_storage_requirement`](Self::internal_storage_requirement).
    pub fn new(
        capacity: u64,
        release_queue_limit: usize,
        alignment: u64,
    ) -> FrameGraphResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(FrameGraphError::InvalidParameter(format!(
                "alignment must be a power of 2, got {alignment}"
            )));
        }
        if capacity == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "circular allocator capacity cannot be zero".to_string(),
            ));
        }
        if capacity % alignment != 0 {
            return Err(FrameGraphError::InvalidParameter(format!(
                "capacity {capacity} is not a multiple of alignment {alignment}"
            )));
        }
        if release_queue_limit == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "release queue limit cannot be zero".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            alignment,
            head: 0,
            tail: 0,
            used: 0,
            unreleased: 0,
            releases: VecDeque::with_capacity(release_queue_limit),
            release_queue_limit,
            peak_used: 0,
            wrap_count: 0,
        })
    }

    /// Bytes of bookkeeping storage reserved for `release_queue_limit` releases.
    pub fn internal_storage_requirement(release_queue_limit: usize) -> usize {
        release_queue_limit * std::mem::size_of::<ReleaseRecord>()
    }

    /// Get the total capacity of the arena.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the allocation granularity.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Bytes not yet retired, including wrap padding.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Bytes not in use. Not necessarily contiguous.
    pub fn available(&self) -> u64 {
        self.capacity - self.used
    }

    /// Bytes allocated since the last [`enqueue_release`](Self::enqueue_release).
    pub fn unreleased(&self) -> u64 {
        self.unreleased
    }

    /// Number of releases waiting on their sync point.
    pub fn pending_release_count(&self) -> usize {
        self.releases.len()
    }

    /// Maximum release count given at creation.
    pub fn release_queue_limit(&self) -> usize {
        self.release_queue_limit
    }

    /// High-water mark of [`used`](Self::used).
    pub fn peak_used(&self) -> u64 {
        self.peak_used
    }

    /// Number of times an allocation skipped the arena tail and wrapped to 0.
    pub fn wrap_count(&self) -> u64 {
        self.wrap_count
    }

    /// Current write cursor.
    pub fn write_offset(&self) -> u64 {
        self.head
    }

    /// Start of the oldest unretired range.
    pub fn read_offset(&self) -> u64 {
        self.tail
    }

    /// Retire every release at the front of the queue whose sync point is reached.
    ///
    /// Stops at the first release still in flight, even if later ones have
    /// completed. Returns the number of releases retired.
    pub fn reconcile<Q: QueueSync + ?Sized>(&mut self, queue: &Q) -> usize {
        let mut retired = 0;
        while let Some(record) = self.releases.front() {
            if !queue.is_queue_sync_point_reached(record.sync_point) {
                break;
            }
            self.tail = record.end;
            self.used -= record.bytes;
            self.releases.pop_front();
            retired += 1;
        }
        if retired > 0 {
            log::trace!(
                "CircularRangeAllocator: retired {retired} release(s), {} of {} bytes in use",
                self.used,
                self.capacity
            );
        }
        retired
    }

    /// Allocate `size` bytes, rounded up to the alignment.
    ///
    /// Reconciles the release queue first. Returns
    /// [`FrameGraphError::RingExhausted`] if no contiguous range fits.
    pub fn try_allocate<Q: QueueSync + ?Sized>(
        &mut self,
        queue: &Q,
        size: u64,
    ) -> FrameGraphResult<RingAllocation> {
        // Sizes that overflow when rounded can never fit.
        let size = size.checked_next_multiple_of(self.alignment).unwrap_or(u64::MAX);
        if size == 0 {
            return Ok(RingAllocation::new(self.head, 0));
        }

        self.reconcile(queue);

        let (available, capacity) = (self.capacity - self.used, self.capacity);
        let exhausted = move || FrameGraphError::RingExhausted {
            requested: size,
            available,
            capacity,
        };
        if size > self.capacity {
            return Err(exhausted());
        }
        let (offset, padding) = self.find_space(size).ok_or_else(exhausted)?;

        if padding > 0 {
            self.wrap_count += 1;
        }
        self.head = offset + size;
        if self.head == self.capacity {
            self.head = 0;
        }
        self.used += size + padding;
        self.unreleased += size + padding;
        self.peak_used = self.peak_used.max(self.used);

        Ok(RingAllocation::new(offset, size))
    }

    /// Allocate `size` bytes, rounded up to the alignment.
    ///
    /// # Panics
    ///
    /// Panics if the arena is exhausted. Arenas are sized for the worst-case
    /// frame; running out is a configuration bug, not a runtime condition.
    pub fn allocate<Q: QueueSync + ?Sized>(&mut self, queue: &Q, size: u64) -> RingAllocation {
        match self.try_allocate(queue, size) {
            Ok(allocation) => allocation,
            Err(err) => panic!("{err}"),
        }
    }

    /// Mark everything allocated since the previous call reusable once
    /// `sync_point` is reached.
    ///
    /// Nothing is recorded if nothing was allocated in between.
    ///
    /// # Panics
    ///
    /// Panics if the number of outstanding releases would exceed the limit
    /// given at creation.
    pub fn enqueue_release(&mut self, sync_point: SyncPoint) {
        if self.unreleased == 0 {
            log::trace!("CircularRangeAllocator: nothing to release at {sync_point}");
            return;
        }
        assert!(
            self.releases.len() < self.release_queue_limit,
            "release queue limit of {} exceeded",
            self.release_queue_limit
        );

        self.releases.push_back(ReleaseRecord {
            end: self.head,
            bytes: self.unreleased,
            sync_point,
        });
        self.unreleased = 0;
    }

    /// Give back everything allocated since the previous release without
    /// queueing a record of its own.
    ///
    /// For ranges the GPU will never read, such as those of an aborted frame.
    /// The bytes join the newest pending release, or are freed right away
    /// when nothing is pending, so they never take a release queue slot.
    pub fn discard_unreleased(&mut self) {
        if self.unreleased == 0 {
            return;
        }
        match self.releases.back_mut() {
            Some(newest) => {
                newest.end = self.head;
                newest.bytes += self.unreleased;
            }
            None => {
                self.used -= self.unreleased;
                self.tail = self.head;
            }
        }
        log::trace!(
            "CircularRangeAllocator: discarded {} unreleased bytes",
            self.unreleased
        );
        self.unreleased = 0;
    }

    /// Block until every outstanding release has retired.
    ///
    /// Waits on each release in queue order. Bytes allocated but never
    /// released stay in use.
    pub fn wait_idle<Q: QueueSync + ?Sized>(&mut self, queue: &Q) {
        while let Some(record) = self.releases.front().copied() {
            queue.wait_for_queue_sync_point(record.sync_point);
            self.reconcile(queue);
        }
    }

    /// Find a contiguous range for `size` bytes.
    ///
    /// Returns the offset and the number of tail bytes skipped to get there.
    fn find_space(&mut self, size: u64) -> Option<(u64, u64)> {
        if self.used == 0 {
            // Nothing outstanding and no release refers to a cursor position.
            self.head = 0;
            self.tail = 0;
            return Some((0, 0));
        }
        if self.used == self.capacity {
            return None;
        }

        if self.head >= self.tail {
            // Free space is [head, capacity) and [0, tail).
            let suffix = self.capacity - self.head;
            if size <= suffix {
                Some((self.head, 0))
            } else if size <= self.tail {
                Some((0, suffix))
            } else {
                None
            }
        } else if size <= self.tail - self.head {
            Some((self.head, 0))
        } else {
            None
        }
    }
}

impl Drop for CircularRangeAllocator {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.releases.is_empty(),
            "CircularRangeAllocator dropped with {} release(s) still in flight",
            self.releases.len()
        );
        if self.unreleased > 0 {
            log::warn!(
                "CircularRangeAllocator dropped with {} bytes never released",
                self.unreleased
            );
        }
    }
}

impl std::fmt::Debug for CircularRangeAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularRangeAllocator")
            .field("capacity", &self.capacity)
            .field("alignment", &self.alignment)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("used", &self.used)
            .field("pending_releases", &self.releases.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(CircularRangeAllocator: Send, Sync);
