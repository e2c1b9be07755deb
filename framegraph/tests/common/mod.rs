//! Shared fixtures for the frame graph integration tests.
//!
//! Every test drives a [`FramePipeline`] over a [`DummyDevice`]; the device
//! plays the GPU by signalling sync points when a test says a frame is done.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use redlilium_framegraph::{
    AccessMode, BufferDescriptor, BufferUsage, DummyDevice, ExecutionSummary, FrameGraphResult,
    FramePipeline, FramePipelineConfig, PassDependencies, PassType, Schedule, SyncPoint,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Route `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Arena sizes small enough that wraparound shows up within a few frames.
pub fn small_config() -> FramePipelineConfig {
    FramePipelineConfig::default()
        .with_transient_pool_size(32 * 1024 * 1024)
        .with_upload_arena_size(16 * 1024)
        .with_descriptor_capacity(64)
}

pub fn color_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Rgba8Unorm,
        TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
    )
}

pub fn depth_target(width: u32, height: u32) -> TextureDescriptor {
    TextureDescriptor::new_2d(
        width,
        height,
        TextureFormat::Depth32Float,
        TextureUsage::DEPTH_STENCIL | TextureUsage::SAMPLED,
    )
}

// ============================================================================
// Test Context
// ============================================================================

/// A dummy device with a pipeline on top of it.
pub struct TestContext {
    pub device: Arc<DummyDevice>,
    pub pipeline: FramePipeline,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(small_config())
    }

    pub fn with_config(config: FramePipelineConfig) -> Self {
        init_logging();
        let device = Arc::new(DummyDevice::new());
        let pipeline = FramePipeline::new(&*device, config).expect("pipeline creation failed");
        Self { device, pipeline }
    }

    /// Execute `schedule` without completing it on the "GPU".
    pub fn execute(
        &mut self,
        schedule: &mut Schedule,
    ) -> FrameGraphResult<(SyncPoint, ExecutionSummary)> {
        let command_list = self.device.create_command_list();
        self.pipeline.execute(&*self.device, schedule, command_list)
    }

    /// Execute `schedule` and signal its sync point right away.
    pub fn run_frame(&mut self, schedule: &mut Schedule) -> ExecutionSummary {
        let (sync_point, summary) = self.execute(schedule).expect("frame failed");
        self.device.signal(sync_point);
        summary
    }

    /// Tear the pipeline down and check nothing leaked.
    pub fn finish(self) {
        let Self { device, pipeline } = self;
        pipeline.destroy(&*device);
        assert_eq!(device.live_buffer_count(), 0, "transient buffers leaked");
        assert_eq!(device.live_texture_count(), 0, "transient textures leaked");
        assert_eq!(device.live_allocation_count(), 0, "arenas leaked");
    }
}

// ============================================================================
// Simulated GPU
// ============================================================================

/// A thread that signals submitted sync points after a fixed delay, in order.
pub struct SimulatedGpu {
    queue: Option<Sender<SyncPoint>>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedGpu {
    pub fn spawn(device: Arc<DummyDevice>, latency: Duration) -> Self {
        let (queue, submissions) = mpsc::channel::<SyncPoint>();
        let worker = std::thread::spawn(move || {
            for sync_point in submissions {
                std::thread::sleep(latency);
                device.signal(sync_point);
            }
        });
        Self {
            queue: Some(queue),
            worker: Some(worker),
        }
    }

    pub fn submit(&self, sync_point: SyncPoint) {
        if let Some(queue) = &self.queue {
            queue.send(sync_point).expect("simulated GPU stopped");
        }
    }

    /// Drain the queue and join the worker.
    pub fn shutdown(mut self) {
        self.queue.take();
        if let Some(worker) = self.worker.take() {
            worker.join().expect("simulated GPU panicked");
        }
    }
}

// ============================================================================
// Schedules
// ============================================================================

/// Deferred-shading style frame: gbuffer, lighting and tonemap over three
/// transient textures and one transient light buffer.
pub fn deferred_schedule(width: u32, height: u32) -> Schedule {
    let mut schedule = Schedule::new().with_label("deferred");
    let albedo =
        schedule.create_transient_texture(color_target(width, height).with_label("albedo"));
    let depth =
        schedule.create_transient_texture(depth_target(width, height).with_label("depth"));
    let hdr = schedule.create_transient_texture(
        TextureDescriptor::new_2d(
            width,
            height,
            TextureFormat::Rgba16Float,
            TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
        )
        .with_label("hdr"),
    );
    let lights = schedule.create_transient_buffer(
        BufferDescriptor::new(16 * 1024, BufferUsage::STORAGE).with_label("lights"),
    );

    schedule.add_pass(
        "gbuffer",
        PassType::Graphics,
        PassDependencies::new()
            .with_texture(albedo, AccessMode::RenderTarget)
            .with_texture(depth, AccessMode::DepthStencilReadWrite),
        move |ctx| {
            ctx.create_transient_render_target_view(
                albedo,
                TextureFormat::Rgba8Unorm,
                Default::default(),
            );
            Ok(())
        },
    );
    schedule.add_pass(
        "cull_lights",
        PassType::Compute,
        PassDependencies::new().with_buffer(lights, AccessMode::ShaderWrite),
        move |ctx| {
            let mut constants = ctx.allocate_transient_upload_memory(64);
            constants.write_slice(0, &[0u32; 16]);
            Ok(())
        },
    );
    schedule.add_pass(
        "lighting",
        PassType::Graphics,
        PassDependencies::new()
            .with_texture(albedo, AccessMode::ShaderRead)
            .with_texture(depth, AccessMode::DepthStencilReadOnly)
            .with_buffer(lights, AccessMode::ShaderRead)
            .with_texture(hdr, AccessMode::RenderTarget),
        move |ctx| {
            ctx.create_transient_texture_view(
                albedo,
                TextureFormat::Rgba8Unorm,
                Default::default(),
            );
            ctx.create_transient_depth_stencil_view(
                depth,
                TextureFormat::Depth32Float,
                Default::default(),
                true,
            );
            Ok(())
        },
    );
    schedule.add_pass(
        "tonemap",
        PassType::Graphics,
        PassDependencies::new().with_texture(hdr, AccessMode::ShaderRead),
        move |ctx| {
            ctx.create_transient_texture_view(
                hdr,
                TextureFormat::Rgba16Float,
                Default::default(),
            );
            Ok(())
        },
    );
    schedule
}
