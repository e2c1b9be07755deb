//! Queue sync points and a CPU-side completion timeline.
//!
//! A [`SyncPoint`] names "all work submitted up to here". The queue reports
//! completion as a monotonically increasing counter, so a sync point is
//! reached once the counter is at or past its value.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::QueueSync;

/// Monotonically comparable marker for queue completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SyncPoint(u64);

impl SyncPoint {
    /// The sync point every queue has already reached.
    pub const ZERO: SyncPoint = SyncPoint(0);

    /// Create a sync point from a raw counter value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw counter value.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The sync point signalled by the next submission.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for SyncPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// CPU-visible completion counter of a GPU queue.
///
/// Backends signal the timeline as submissions retire; the frame graph only
/// compares against it or blocks on it. Waiting parks the thread on a
/// condition variable instead of spinning.
///
/// # Example
///
/// ```
/// use redlilium_framegraph::{SyncPoint, SyncTimeline};
///
/// let timeline = SyncTimeline::new();
/// assert!(!timeline.is_reached(SyncPoint::new(1)));
/// timeline.signal(SyncPoint::new(2));
/// assert!(timeline.is_reached(SyncPoint::new(1)));
/// ```
#[derive(Debug, Default)]
pub struct SyncTimeline {
    completed: Mutex<u64>,
    retired: Condvar,
}

impl SyncTimeline {
    /// Create a timeline with nothing completed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The last completed sync point.
    pub fn completed(&self) -> SyncPoint {
        SyncPoint(*self.completed.lock())
    }

    /// Check whether `sync_point` has completed (non-blocking).
    pub fn is_reached(&self, sync_point: SyncPoint) -> bool {
        *self.completed.lock() >= sync_point.0
    }

    /// Mark everything up to `sync_point` complete and wake waiters.
    ///
    /// Signalling an older value than the current one is ignored; the
    /// counter never goes backwards.
    pub fn signal(&self, sync_point: SyncPoint) {
        let mut completed = self.completed.lock();
        if sync_point.0 > *completed {
            *completed = sync_point.0;
            self.retired.notify_all();
        }
    }

    /// Block until `sync_point` completes.
    pub fn wait(&self, sync_point: SyncPoint) {
        let mut completed = self.completed.lock();
        while *completed < sync_point.0 {
            self.retired.wait(&mut completed);
        }
    }

    /// Block until `sync_point` completes or `timeout` elapses.
    ///
    /// Returns `true` if the sync point was reached.
    pub fn wait_timeout(&self, sync_point: SyncPoint, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.completed.lock();
        while *completed < sync_point.0 {
            if self
                .retired
                .wait_until(&mut completed, deadline)
                .timed_out()
            {
                return *completed >= sync_point.0;
            }
        }
        true
    }
}

impl QueueSync for SyncTimeline {
    fn is_queue_sync_point_reached(&self, sync_point: SyncPoint) -> bool {
        self.is_reached(sync_point)
    }

    fn wait_for_queue_sync_point(&self, sync_point: SyncPoint) {
        self.wait(sync_point);
    }
}

static_assertions::assert_impl_all!(SyncTimeline: Send, Sync);
