//! Frame pipeline: owner of the long-lived frame graph allocators.
//!
//! A [`FramePipeline`] holds the three arenas every schedule execution draws
//! from and hands out one [`SyncPoint`] per frame:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                        FramePipeline                         |
//! |  TransientResourcePool      CircularDescriptorAllocator      |
//! |  (placed buffers/textures)  (shader-visible descriptors)     |
//! |                CircularUploadAllocator                       |
//! |                (CPU-writable constants)                      |
//! +--------------------------------------------------------------+
//!            |  execute(schedule) -> (#n, summary)
//!            v
//!   caller submits the command list, queue signals #n
//! ```
//!
//! # Frame pacing
//!
//! At most `frames_in_flight` frames may be outstanding. Before a new frame
//! is executed the pipeline waits for the frame `frames_in_flight` submissions
//! back, the same way a swapchain paces CPU recording against the GPU:
//!
//! ```text
//! frames_in_flight = 2
//!
//! Frame 0: [execute #1] [submit] -------- GPU #1 --------|
//! Frame 1:                [execute #2] [submit] --- GPU #2 ---|
//! Frame 2:                       [wait #1] [execute #3] ...
//! ```
//!
//! The transient pool is stricter: every frame repacks from offset 0, so it
//! waits for the previous frame's resources to retire before placing new
//! ones. Frames without transient resources overlap freely.
//!
//! # Submission contract
//!
//! The [`SyncPoint`] returned by [`FramePipeline::execute`] must be signalled
//! by the queue once the frame's command list completes. Sync points are
//! handed out in increasing order and a frame whose execution failed does
//! not consume one.
//!
//! # Graceful shutdown
//!
//! ```ignore
//! pipeline.wait_idle(&device);
//! pipeline.destroy(&device);
//! ```

use std::collections::VecDeque;

use crate::allocator::{
    CircularDescriptorAllocator, CircularUploadAllocator, DEFAULT_UPLOAD_ALIGNMENT,
};
use crate::device::{CommandList, Device, DeviceMemory, MappedUploadBuffer, SyncPoint};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::schedule::{ExecutionSummary, Schedule, ScheduleState};
use crate::transient::TransientResourcePool;
use crate::{frame_mark, profile_plot, profile_scope};

/// Sizes of the arenas owned by a [`FramePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePipelineConfig {
    /// Bytes of device memory for transient resources.
    pub transient_pool_size: u64,
    /// Bytes of the mapped upload buffer.
    pub upload_arena_size: u64,
    /// Alignment of every upload allocation.
    pub upload_alignment: u64,
    /// Descriptors in the shader-visible table.
    pub descriptor_capacity: u32,
    /// Outstanding releases each ring can record.
    pub release_queue_limit: usize,
    /// Frames that may be executed before the oldest one completes.
    pub frames_in_flight: usize,
}

impl Default for FramePipelineConfig {
    fn default() -> Self {
        Self {
            transient_pool_size: 64 * 1024 * 1024,
            upload_arena_size: 4 * 1024 * 1024,
            upload_alignment: DEFAULT_UPLOAD_ALIGNMENT,
            descriptor_capacity: 4096,
            release_queue_limit: 16,
            frames_in_flight: 2,
        }
    }
}

impl FramePipelineConfig {
    /// Set the transient pool size.
    pub fn with_transient_pool_size(mut self, size: u64) -> Self {
        self.transient_pool_size = size;
        self
    }

    /// Set the upload arena size.
    pub fn with_upload_arena_size(mut self, size: u64) -> Self {
        self.upload_arena_size = size;
        self
    }

    /// Set the upload allocation alignment.
    pub fn with_upload_alignment(mut self, alignment: u64) -> Self {
        self.upload_alignment = alignment;
        self
    }

    /// Set the descriptor table capacity.
    pub fn with_descriptor_capacity(mut self, capacity: u32) -> Self {
        self.descriptor_capacity = capacity;
        self
    }

    /// Set the per-ring release queue limit.
    pub fn with_release_queue_limit(mut self, limit: usize) -> Self {
        self.release_queue_limit = limit;
        self
    }

    /// Set the number of frames in flight.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    fn validate(&self) -> FrameGraphResult<()> {
        if self.transient_pool_size == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "transient pool size must be non-zero".into(),
            ));
        }
        if self.descriptor_capacity == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "descriptor capacity must be non-zero".into(),
            ));
        }
        if self.frames_in_flight == 0 {
            return Err(FrameGraphError::InvalidParameter(
                "frames in flight must be non-zero".into(),
            ));
        }
        // Each frame in flight holds one release record per ring, and the
        // frame being recorded needs one more.
        if self.release_queue_limit <= self.frames_in_flight {
            return Err(FrameGraphError::InvalidParameter(format!(
                "release queue limit {} must exceed frames in flight {}",
                self.release_queue_limit, self.frames_in_flight
            )));
        }
        Ok(())
    }
}

/// Owner of the transient pool and the descriptor and upload rings.
///
/// Must be torn down with [`FramePipeline::destroy`]; dropping it while
/// frames are in flight panics.
#[derive(Debug)]
pub struct FramePipeline {
    pool: TransientResourcePool,
    descriptors: CircularDescriptorAllocator,
    uploads: CircularUploadAllocator,
    /// Sync points of submitted frames, oldest first.
    submitted: VecDeque<SyncPoint>,
    last_sync_point: SyncPoint,
    frames_in_flight: usize,
    frame_count: u64,
}

impl FramePipeline {
    /// Allocate the pool memory, upload buffer and descriptor table.
    ///
    /// Anything already created is released again if a later step fails.
    pub fn new(device: &dyn Device, config: FramePipelineConfig) -> FrameGraphResult<Self> {
        config.validate()?;

        let memory = device.allocate_memory(config.transient_pool_size)?;
        let mapped = match device.create_upload_buffer(config.upload_arena_size) {
            Ok(mapped) => mapped,
            Err(err) => {
                device.free_memory(memory);
                return Err(err);
            }
        };
        let release_partial = |mapped: &MappedUploadBuffer, memory: DeviceMemory| {
            device.destroy_upload_buffer(mapped.buffer);
            device.free_memory(memory);
        };

        let table = match device.create_descriptor_table(config.descriptor_capacity) {
            Ok(table) => table,
            Err(err) => {
                release_partial(&mapped, memory);
                return Err(err);
            }
        };
        let rings = CircularDescriptorAllocator::new(table, config.release_queue_limit).and_then(
            |descriptors| {
                // SAFETY: the device keeps the buffer mapped until it is
                // destroyed in `destroy`, and only the upload ring writes it.
                let uploads = unsafe {
                    CircularUploadAllocator::new(
                        mapped,
                        config.release_queue_limit,
                        config.upload_alignment,
                    )
                }?;
                Ok((descriptors, uploads))
            },
        );
        let (descriptors, uploads) = match rings {
            Ok(rings) => rings,
            Err(err) => {
                device.destroy_descriptor_table(table.handle);
                release_partial(&mapped, memory);
                return Err(err);
            }
        };

        log::info!(
            "FramePipeline: {} byte transient pool, {} byte upload arena, {} descriptors, \
             {} frame(s) in flight",
            config.transient_pool_size,
            uploads.ring().capacity(),
            config.descriptor_capacity,
            config.frames_in_flight
        );

        Ok(Self {
            pool: TransientResourcePool::new(memory, config.transient_pool_size),
            descriptors,
            uploads,
            submitted: VecDeque::with_capacity(config.frames_in_flight),
            last_sync_point: SyncPoint::ZERO,
            frames_in_flight: config.frames_in_flight,
            frame_count: 0,
        })
    }

    /// Get the transient resource pool.
    pub fn pool(&self) -> &TransientResourcePool {
        &self.pool
    }

    /// Get the transient descriptor ring.
    pub fn descriptors(&self) -> &CircularDescriptorAllocator {
        &self.descriptors
    }

    /// Get the upload ring.
    pub fn uploads(&self) -> &CircularUploadAllocator {
        &self.uploads
    }

    /// Sync point of the most recent successfully executed frame.
    pub fn last_sync_point(&self) -> SyncPoint {
        self.last_sync_point
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Get the total number of frames executed successfully.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Execute `schedule` into `command_list` as the next frame.
    ///
    /// Compiles the schedule first if it is still building. Returns the sync
    /// point the queue must signal once `command_list` completes.
    ///
    /// On error nothing from the frame needs submitting: the command list
    /// must be discarded and no sync point is consumed.
    ///
    /// # Panics
    ///
    /// Panics if the schedule was already executed and not reset.
    pub fn execute(
        &mut self,
        device: &dyn Device,
        schedule: &mut Schedule,
        command_list: CommandList,
    ) -> FrameGraphResult<(SyncPoint, ExecutionSummary)> {
        profile_scope!("frame_pipeline_execute");

        if self.submitted.len() >= self.frames_in_flight
            && let Some(oldest) = self.submitted.pop_front()
        {
            if !device.is_queue_sync_point_reached(oldest) {
                log::trace!("FramePipeline: waiting for {oldest} before recording");
            }
            device.wait_for_queue_sync_point(oldest);
        }
        self.descriptors.reconcile(device);
        self.uploads.reconcile(device);

        if schedule.state() == ScheduleState::Building {
            schedule.compile();
        }

        let sync_point = self.last_sync_point.next();
        log::trace!("Begin frame {} (sync point {sync_point})", self.frame_count);

        let summary = schedule.execute(
            device,
            command_list,
            sync_point,
            &mut self.pool,
            &mut self.descriptors,
            &mut self.uploads,
        )?;

        self.last_sync_point = sync_point;
        self.submitted.push_back(sync_point);
        self.frame_count += 1;

        profile_plot!("transient_pool_bytes", self.pool.used());
        profile_plot!("descriptor_ring_bytes", self.descriptors.ring().used());
        profile_plot!("upload_ring_bytes", self.uploads.ring().used());
        frame_mark!();

        Ok((sync_point, summary))
    }

    /// Block until every executed frame has completed and release its usage.
    pub fn wait_idle(&mut self, device: &dyn Device) {
        log::debug!("FramePipeline: waiting for {} frame(s)", self.submitted.len());
        if let Some(&newest) = self.submitted.back() {
            device.wait_for_queue_sync_point(newest);
        }
        self.submitted.clear();
        self.pool.wait_idle(device);
        self.descriptors.wait_idle(device);
        self.uploads.wait_idle(device);
    }

    /// Wait for the GPU and free the pool memory, upload buffer and
    /// descriptor table.
    pub fn destroy(mut self, device: &dyn Device) {
        self.wait_idle(device);
        device.destroy_upload_buffer(self.uploads.mapped().buffer);
        device.destroy_descriptor_table(self.descriptors.table().handle);
        device.free_memory(self.pool.memory());
        log::debug!("FramePipeline: destroyed after {} frame(s)", self.frame_count);
    }
}

static_assertions::assert_impl_all!(FramePipeline: Send, Sync);
