//! Integration tests for the frame graph.
//!
//! These tests drive whole frames through [`FramePipeline`] on the dummy
//! device: schedules are built, executed, "submitted" by signalling their
//! sync point, and the device journal is checked afterwards.
//!
//! # Test Categories
//!
//! - **Execution Tests**: pass order, handle resolution, user data
//! - **Placement Tests**: deterministic transient packing across frames
//! - **Failure Tests**: executor errors and pool exhaustion abort the frame
//! - **Context Tests**: descriptors, views and upload writes
//! - **Pacing Tests**: frames retiring on a simulated GPU thread
//!
//! ```bash
//! cargo test --test framegraph_tests
//! ```

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use rstest::rstest;

use common::{SimulatedGpu, TestContext, color_target, deferred_schedule, small_config};
use redlilium_framegraph::{
    AccessMode, BufferDescriptor, BufferUsage, BufferViewDescriptor, Device, DeviceCall,
    DeviceTexture, FrameGraphError, PassDependencies, PassType, Schedule, ScheduleState,
    SyncPoint, TextureFormat, TextureSubresource, TextureViewKind,
};

// ============================================================================
// Execution Tests
// ============================================================================

/// A writer and a reader of the same transient texture run once each, in
/// order, and both see the same device texture.
#[test]
fn test_shared_texture_resolves_identically() {
    let mut ctx = TestContext::new();
    let seen: Arc<Mutex<Vec<(String, DeviceTexture)>>> = Arc::default();

    let mut schedule = Schedule::new();
    let target = schedule.create_transient_texture(color_target(512, 512));
    for (name, access) in [("write", AccessMode::RenderTarget), ("read", AccessMode::ShaderRead)] {
        let seen = Arc::clone(&seen);
        schedule.add_pass(
            name,
            PassType::Graphics,
            PassDependencies::new().with_texture(target, access),
            move |pass| {
                let texture = pass.resolve_texture(target);
                seen.lock().push((pass.pass_name().to_string(), texture));
                Ok(())
            },
        );
    }

    let summary = ctx.run_frame(&mut schedule);
    assert_eq!(summary.passes_executed, 2);
    assert_eq!(schedule.state(), ScheduleState::Executed);

    let seen = seen.lock();
    let names: Vec<&str> = seen.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["write", "read"]);
    assert_eq!(seen[0].1, seen[1].1);
    drop(seen);

    ctx.finish();
}

/// Passes run strictly in declaration order regardless of their type.
#[test]
fn test_passes_run_in_declaration_order() {
    let mut ctx = TestContext::new();
    let order: Arc<Mutex<Vec<usize>>> = Arc::default();

    let mut schedule = Schedule::new();
    let types = [PassType::Copy, PassType::Graphics, PassType::Compute, PassType::Graphics];
    for (index, pass_type) in types.into_iter().enumerate() {
        let order = Arc::clone(&order);
        schedule.add_pass(
            format!("pass_{index}"),
            pass_type,
            PassDependencies::new(),
            move |pass| {
                assert_eq!(pass.pass_type(), pass_type);
                order.lock().push(pass.pass().index());
                Ok(())
            },
        );
    }

    ctx.run_frame(&mut schedule);
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    ctx.finish();
}

/// User data written by one pass is visible to the next.
#[test]
fn test_user_data_flows_between_passes() {
    let mut ctx = TestContext::new();
    let observed = Arc::new(Mutex::new(None));

    let mut schedule = Schedule::new();
    let histogram = schedule.allocate_user_data(vec![0u32; 4]);
    schedule.add_pass("build_histogram", PassType::Compute, PassDependencies::new(), move |pass| {
        pass.user_data(histogram)[2] = 7;
        Ok(())
    });
    let sink = Arc::clone(&observed);
    schedule.add_pass("read_histogram", PassType::Compute, PassDependencies::new(), move |pass| {
        *sink.lock() = Some(pass.user_data(histogram).clone());
        Ok(())
    });

    ctx.run_frame(&mut schedule);
    assert_eq!(*observed.lock(), Some(vec![0, 0, 7, 0]));
    ctx.finish();
}

/// Imported resources resolve to the caller's handles and outlive the frame.
#[test]
fn test_external_resources_are_not_pooled() {
    let mut ctx = TestContext::new();
    let memory = ctx.device.allocate_memory(1 << 20).unwrap();
    let swapchain = ctx
        .device
        .create_placed_texture(memory, 0, &color_target(128, 128))
        .unwrap();

    let resolved = Arc::new(Mutex::new(None));
    let mut schedule = Schedule::new();
    let backbuffer = schedule.import_external_texture(swapchain);
    let sink = Arc::clone(&resolved);
    schedule.add_pass(
        "present_blit",
        PassType::Graphics,
        PassDependencies::new().with_texture(backbuffer, AccessMode::RenderTarget),
        move |pass| {
            *sink.lock() = Some(pass.resolve_texture(backbuffer));
            Ok(())
        },
    );

    let summary = ctx.run_frame(&mut schedule);
    assert_eq!(summary.transient_textures, 0);
    assert_eq!(*resolved.lock(), Some(swapchain));

    ctx.pipeline.wait_idle(&*ctx.device);
    assert_eq!(ctx.device.live_texture_count(), 1);

    ctx.device.destroy_texture(swapchain);
    ctx.device.free_memory(memory);
    ctx.finish();
}

#[test]
#[should_panic(expected = "execute called on a schedule in state Executed")]
fn test_executing_twice_without_reset_panics() {
    let mut ctx = TestContext::new();
    let mut schedule = Schedule::new();
    schedule.add_pass("once", PassType::Copy, PassDependencies::new(), |_| Ok(()));
    ctx.run_frame(&mut schedule);
    ctx.run_frame(&mut schedule);
}

// ============================================================================
// Placement Tests
// ============================================================================

/// Identical graphs pack to identical offsets, frame after frame.
#[rstest]
#[case::single(1)]
#[case::few(3)]
#[case::many(16)]
fn test_placements_identical_across_frames(#[case] frames: usize) {
    let mut ctx = TestContext::new();
    let mut placements = Vec::with_capacity(frames);

    let mut schedule = deferred_schedule(256, 256);
    for _ in 0..frames {
        let summary = ctx.run_frame(&mut schedule);
        assert_eq!(summary.transient_textures, 3);
        assert_eq!(summary.transient_buffers, 1);
        placements.push(ctx.pipeline.pool().frame_placements().to_vec());

        schedule = deferred_schedule(256, 256);
    }

    assert!(placements.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(placements[0].len(), 4);
    ctx.finish();
}

/// Reusing one schedule object through reset packs the same way.
#[test]
fn test_reset_schedule_repacks_identically() {
    let mut ctx = TestContext::new();
    let mut schedule = Schedule::new();
    let mut previous = None;

    for _ in 0..4 {
        schedule.reset();
        let target = schedule.create_transient_texture(color_target(640, 360));
        let scratch = schedule.create_transient_buffer(BufferDescriptor::with_size(100_000));
        schedule.add_pass(
            "blur",
            PassType::Compute,
            PassDependencies::new()
                .with_texture(target, AccessMode::ShaderWrite)
                .with_buffer(scratch, AccessMode::ShaderReadWrite),
            |_| Ok(()),
        );

        ctx.run_frame(&mut schedule);
        let placements = ctx.pipeline.pool().frame_placements().to_vec();
        if let Some(previous) = &previous {
            assert_eq!(previous, &placements);
        }
        previous = Some(placements);
    }
    ctx.finish();
}

/// Transient resources are destroyed once their frame's sync point is reached.
#[test]
fn test_transients_destroyed_after_completion() {
    let mut ctx = TestContext::new();
    let mut schedule = deferred_schedule(128, 128);

    let (sync_point, _) = ctx.execute(&mut schedule).unwrap();
    assert_eq!(ctx.device.live_texture_count(), 3);
    assert_eq!(ctx.device.live_buffer_count(), 1);

    ctx.device.signal(sync_point);
    let mut next = deferred_schedule(128, 128);
    ctx.run_frame(&mut next);
    // The first frame's resources are gone; only the second frame's remain.
    assert_eq!(ctx.device.live_texture_count(), 3);
    ctx.pipeline.wait_idle(&*ctx.device);
    assert_eq!(ctx.device.live_texture_count(), 0);

    ctx.finish();
}

// ============================================================================
// Failure Tests
// ============================================================================

/// A failing executor skips the remaining passes and tears the frame down.
#[test]
fn test_executor_error_aborts_frame() {
    let mut ctx = TestContext::new();
    let ran: Arc<Mutex<Vec<&'static str>>> = Arc::default();

    let mut schedule = Schedule::new();
    let target = schedule.create_transient_texture(color_target(256, 256));
    for name in ["shadows", "lighting", "post"] {
        let ran = Arc::clone(&ran);
        schedule.add_pass(
            name,
            PassType::Graphics,
            PassDependencies::new().with_texture(target, AccessMode::RenderTarget),
            move |pass| {
                ran.lock().push(name);
                pass.allocate_transient_descriptors(2);
                if name == "lighting" {
                    return Err(FrameGraphError::InvalidParameter("missing light buffer".into()));
                }
                Ok(())
            },
        );
    }

    let err = ctx.execute(&mut schedule).unwrap_err();
    assert_eq!(
        err,
        FrameGraphError::PassFailed {
            pass: "lighting".into(),
            reason: "invalid parameter: missing light buffer".into(),
        }
    );
    assert_eq!(*ran.lock(), vec!["shadows", "lighting"]);
    // Destroyed immediately; nothing was submitted.
    assert_eq!(ctx.device.live_texture_count(), 0);
    assert_eq!(ctx.pipeline.last_sync_point(), SyncPoint::ZERO);

    // The aborted frame's descriptors are reclaimed without any signal.
    let mut next = deferred_schedule(64, 64);
    ctx.run_frame(&mut next);
    assert_eq!(ctx.pipeline.descriptors().ring().pending_release_count(), 1);
    ctx.finish();
}

/// A frame that only uses the rings, so the pool never waits on it.
fn ring_only_schedule(fails: bool) -> Schedule {
    let mut schedule = Schedule::new();
    schedule.add_pass("constants", PassType::Compute, PassDependencies::new(), move |pass| {
        pass.allocate_transient_descriptors(1);
        let mut constants = pass.allocate_transient_upload_memory(16);
        constants.write_pod(0, &[1u32; 4]);
        if fails {
            return Err(FrameGraphError::InvalidParameter("broken constants".into()));
        }
        Ok(())
    });
    schedule
}

/// Failed frames behind an in-flight frame never overflow the release queue.
#[test]
fn test_repeated_failures_while_frame_in_flight() {
    let config = small_config()
        .with_frames_in_flight(2)
        .with_release_queue_limit(3);
    let mut ctx = TestContext::with_config(config);

    ctx.run_frame(&mut ring_only_schedule(false));
    let (in_flight, _) = ctx.execute(&mut ring_only_schedule(false)).unwrap();

    for _ in 0..6 {
        let err = ctx.execute(&mut ring_only_schedule(true)).unwrap_err();
        assert!(matches!(err, FrameGraphError::PassFailed { .. }));
    }

    let descriptors = ctx.pipeline.descriptors().ring();
    assert!(descriptors.pending_release_count() <= 2);
    assert_eq!(descriptors.unreleased(), 0);
    assert_eq!(ctx.pipeline.uploads().ring().unreleased(), 0);
    assert_eq!(ctx.pipeline.last_sync_point(), in_flight);

    ctx.device.signal(in_flight);
    ctx.run_frame(&mut deferred_schedule(64, 64));
    ctx.finish();
}

/// A pool too small for the graph fails before any pass runs.
#[test]
fn test_pool_exhaustion_aborts_frame() {
    let mut ctx = TestContext::with_config(small_config().with_transient_pool_size(1 << 20));
    let ran = Arc::new(Mutex::new(false));

    let mut schedule = Schedule::new();
    let small = schedule.create_transient_buffer(BufferDescriptor::with_size(4096));
    let huge = schedule.create_transient_texture(color_target(2048, 2048));
    let sink = Arc::clone(&ran);
    schedule.add_pass(
        "upscale",
        PassType::Graphics,
        PassDependencies::new()
            .with_buffer(small, AccessMode::ShaderRead)
            .with_texture(huge, AccessMode::RenderTarget),
        move |_| {
            *sink.lock() = true;
            Ok(())
        },
    );

    let err = ctx.execute(&mut schedule).unwrap_err();
    assert!(matches!(
        err,
        FrameGraphError::TransientPoolExhausted { capacity, .. } if capacity == 1 << 20
    ));
    assert!(!*ran.lock());
    assert_eq!(ctx.device.live_buffer_count(), 0);
    ctx.finish();
}

/// A device failure while placing a resource is returned, not panicked.
#[test]
fn test_device_creation_failure_aborts_frame() {
    let mut ctx = TestContext::new();
    let mut schedule = deferred_schedule(64, 64);
    ctx.device.fail_next_creation();

    let err = ctx.execute(&mut schedule).unwrap_err();
    assert!(matches!(err, FrameGraphError::ResourceCreationFailed(_)));
    ctx.finish();
}

// ============================================================================
// Context Tests
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct ViewConstants {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
}

/// Upload writes land in the mapped buffer at the returned offset.
#[test]
fn test_upload_writes_reach_mapped_buffer() {
    let mut ctx = TestContext::new();
    let constants = ViewConstants {
        view_proj: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
        camera_position: [3.0, 4.0, 5.0, 1.0],
    };
    let location = Arc::new(Mutex::new(None));

    let mut schedule = Schedule::new();
    let sink = Arc::clone(&location);
    schedule.add_pass("upload_view", PassType::Copy, PassDependencies::new(), move |pass| {
        // Shift the interesting allocation off offset 0.
        pass.allocate_transient_upload_memory(100);
        let mut allocation =
            pass.allocate_transient_upload_memory(std::mem::size_of::<ViewConstants>() as u64);
        allocation.write_pod(0, &constants);
        *sink.lock() = Some((allocation.buffer(), allocation.offset()));
        Ok(())
    });

    let summary = ctx.run_frame(&mut schedule);
    assert_eq!(summary.upload_bytes, 256 + 256);

    let (buffer, offset) = location.lock().take().unwrap();
    assert_eq!(offset, 256);
    let bytes = ctx
        .device
        .read_upload_buffer(buffer, offset, std::mem::size_of::<ViewConstants>());
    assert_eq!(bytemuck::pod_read_unaligned::<ViewConstants>(&bytes), constants);
    ctx.finish();
}

/// Every view helper writes one descriptor of the matching kind.
#[test]
fn test_view_helpers_write_descriptors() {
    let mut ctx = TestContext::new();
    ctx.device.clear_calls();

    let mut schedule = Schedule::new();
    let color = schedule.create_transient_texture(color_target(64, 64).with_mip_levels(4));
    let depth = schedule.create_transient_texture(common::depth_target(64, 64));
    let particles = schedule.create_transient_buffer(BufferDescriptor::new(
        4096,
        BufferUsage::STORAGE,
    ));
    schedule.add_pass(
        "views",
        PassType::Graphics,
        PassDependencies::new()
            .with_texture(color, AccessMode::ShaderReadWrite)
            .with_texture(depth, AccessMode::DepthStencilReadWrite)
            .with_buffer(particles, AccessMode::ShaderReadWrite),
        move |pass| {
            let srv = pass.create_transient_texture_view(
                color,
                TextureFormat::Rgba8Unorm,
                TextureSubresource::all_mips(4),
            );
            let uav = pass.create_transient_storage_view(
                color,
                TextureFormat::Rgba8Unorm,
                TextureSubresource::mip(1),
            );
            pass.create_transient_render_target_view(
                color,
                TextureFormat::Rgba8Unorm,
                TextureSubresource::mip(0),
            );
            pass.create_transient_depth_stencil_view(
                depth,
                TextureFormat::Depth32Float,
                TextureSubresource::default(),
                false,
            );
            pass.create_transient_buffer_view(
                particles,
                &BufferViewDescriptor::structured(0, 4096, 16).writable(),
            );
            assert_eq!(uav.index, srv.index + 1);
            assert_eq!(uav.gpu_address - srv.gpu_address, 32);
            Ok(())
        },
    );

    let summary = ctx.run_frame(&mut schedule);
    assert_eq!(summary.descriptors_allocated, 5);

    let kinds: Vec<TextureViewKind> = ctx
        .device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            DeviceCall::WriteTextureView { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            TextureViewKind::ShaderResource,
            TextureViewKind::Storage,
            TextureViewKind::RenderTarget,
            TextureViewKind::DepthStencil { read_only: false },
        ]
    );
    assert_eq!(
        ctx.device
            .calls()
            .iter()
            .filter(|call| matches!(call, DeviceCall::WriteBufferView { .. }))
            .count(),
        1
    );
    ctx.finish();
}

/// Descriptor sets take as many descriptors as their layout declares.
#[test]
fn test_descriptor_set_uses_layout_count() {
    let mut ctx = TestContext::new();
    let layout = ctx.device.create_descriptor_set_layout(6);
    let range = Arc::new(Mutex::new(None));

    let mut schedule = Schedule::new();
    let sink = Arc::clone(&range);
    schedule.add_pass("material", PassType::Graphics, PassDependencies::new(), move |pass| {
        pass.allocate_transient_descriptors(1);
        *sink.lock() = Some(pass.allocate_transient_descriptor_set(layout));
        Ok(())
    });

    let summary = ctx.run_frame(&mut schedule);
    assert_eq!(summary.descriptors_allocated, 7);
    let range = range.lock().take().unwrap();
    assert_eq!(range.count, 6);
    assert_eq!(range.first_index, 1);
    assert_eq!(range.descriptor(5).index, 6);
    ctx.finish();
}

/// Per-frame ring usage wraps around while the previous frame is still in flight.
#[test]
fn test_rings_wrap_across_frames() {
    let mut ctx = TestContext::new();
    let capacity = ctx.pipeline.uploads().ring().capacity();
    let mut in_flight = None;

    for _ in 0..12 {
        let mut schedule = Schedule::new();
        schedule.add_pass("stream", PassType::Copy, PassDependencies::new(), move |pass| {
            let mut staging = pass.allocate_transient_upload_memory(capacity / 3);
            staging.write_bytes(0, &[0xAB; 64]);
            pass.allocate_transient_descriptors(24);
            Ok(())
        });
        let (sync_point, _) = ctx.execute(&mut schedule).unwrap();
        // The GPU lags one frame behind.
        if let Some(previous) = in_flight.replace(sync_point) {
            ctx.device.signal(previous);
        }
    }

    assert!(ctx.pipeline.uploads().ring().wrap_count() > 0);
    assert!(ctx.pipeline.descriptors().ring().wrap_count() > 0);
    assert_eq!(ctx.pipeline.frame_count(), 12);
    if let Some(last) = in_flight {
        ctx.device.signal(last);
    }
    ctx.finish();
}

// ============================================================================
// Pacing Tests
// ============================================================================

/// Frames retire on a GPU thread while the CPU keeps recording.
#[rstest]
#[case::single_buffered(1)]
#[case::double_buffered(2)]
#[case::triple_buffered(3)]
fn test_frames_retire_on_gpu_thread(#[case] frames_in_flight: usize) {
    let mut ctx = TestContext::with_config(small_config().with_frames_in_flight(frames_in_flight));
    let gpu = SimulatedGpu::spawn(Arc::clone(&ctx.device), Duration::from_millis(1));

    let mut last = SyncPoint::ZERO;
    for _ in 0..10 {
        let mut schedule = deferred_schedule(128, 128);
        let (sync_point, summary) = ctx.execute(&mut schedule).unwrap();
        assert_eq!(summary.passes_executed, 4);
        assert!(sync_point > last);
        last = sync_point;
        gpu.submit(sync_point);
    }

    ctx.pipeline.wait_idle(&*ctx.device);
    assert!(ctx.device.timeline().is_reached(last));
    gpu.shutdown();
    ctx.finish();
}
