//! # RedLilium Frame Graph
//!
//! Per-frame pass scheduling over fence-gated GPU memory arenas.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Schedule`] - A frame's passes, transient resources and pass parameters
//! - [`PassExecutionContext`] - What a pass executor records through
//! - [`TransientResourcePool`] - Placed transient buffers and textures in one allocation
//! - [`CircularRangeAllocator`] - Ring sub-allocator retired by queue sync points,
//!   wrapped by [`CircularUploadAllocator`] and [`CircularDescriptorAllocator`]
//! - [`FramePipeline`] - Owner of the arenas that hands out one sync point per frame
//! - [`Device`] - Trait the graphics backend implements, with [`DummyDevice`] for testing
//!
//! ## Example
//!
//! ```
//! use redlilium_framegraph::{
//!     AccessMode, BufferDescriptor, BufferUsage, DummyDevice, FramePipeline,
//!     FramePipelineConfig, PassDependencies, PassType, Schedule,
//! };
//!
//! let device = DummyDevice::new();
//! let mut pipeline = FramePipeline::new(&device, FramePipelineConfig::default()).unwrap();
//!
//! let mut schedule = Schedule::new().with_label("main");
//! let particles = schedule.create_transient_buffer(
//!     BufferDescriptor::new(64 * 1024, BufferUsage::STORAGE).with_label("particles"),
//! );
//! let params = schedule.allocate_user_data(0.016f32);
//! schedule.add_pass(
//!     "simulate",
//!     PassType::Compute,
//!     PassDependencies::new().with_buffer(particles, AccessMode::ShaderWrite),
//!     move |ctx| {
//!         let dt = *ctx.user_data(params);
//!         let mut constants = ctx.allocate_transient_upload_memory(4);
//!         constants.write_pod(0, &dt);
//!         ctx.allocate_transient_descriptors(2);
//!         Ok(())
//!     },
//! );
//!
//! let (sync_point, summary) = pipeline
//!     .execute(&device, &mut schedule, device.create_command_list())
//!     .unwrap();
//! assert_eq!(summary.transient_buffers, 1);
//!
//! device.signal(sync_point);
//! schedule.reset();
//! pipeline.destroy(&device);
//! ```

pub mod allocator;
pub mod context;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod profiling;
pub mod schedule;
pub mod transient;
pub mod types;

mod util;

// Re-export main types for convenience
pub use allocator::{
    CircularDescriptorAllocator, CircularRangeAllocator, CircularUploadAllocator,
    DEFAULT_UPLOAD_ALIGNMENT, DescriptorRange, RingAllocation, UploadAllocation,
};
pub use context::PassExecutionContext;
pub use device::{
    AllocationInfo, CommandList, DescriptorAddress, DescriptorSetLayout, DescriptorTable,
    DescriptorTableHandle, Device, DeviceBuffer, DeviceCall, DeviceMemory, DeviceTexture,
    DummyDevice, MappedUploadBuffer, QueueSync, SyncPoint, SyncTimeline,
};
pub use error::{FrameGraphError, FrameGraphResult};
pub use pipeline::{FramePipeline, FramePipelineConfig};
pub use schedule::{
    AccessMode, BufferHandle, ExecutionSummary, Lifetime, Pass, PassDependencies, PassHandle,
    PassType, Schedule, ScheduleState, TextureHandle, UserData,
};
pub use transient::{PLACEMENT_ALIGNMENT, Placement, TransientResourcePool};
pub use types::{
    BufferDescriptor, BufferUsage, BufferViewDescriptor, Extent3d, TextureDescriptor,
    TextureFormat, TextureSubresource, TextureUsage, TextureViewDescriptor, TextureViewKind,
};

/// Frame graph library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the frame graph.
///
/// Only logs the version; call it once at startup so logs show which build
/// scheduled the frames.
pub fn init() {
    log::info!("RedLilium Frame Graph v{} initialized", VERSION);
}
