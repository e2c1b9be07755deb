//! Frame schedule: the per-frame pass graph.
//!
//! A [`Schedule`] records transient and imported resources, passes with their
//! dependency lists, and typed user data for the pass executors. It moves
//! through three states:
//!
//! ```text
//! Building --compile()--> Compiled --execute()--> Executed
//!     ^                                               |
//!     +------------------- reset() -------------------+
//! ```
//!
//! Calling an operation in the wrong state panics.
//!
//! # Example
//!
//! ```
//! use redlilium_framegraph::{
//!     AccessMode, DummyDevice, FramePipeline, FramePipelineConfig, PassDependencies, PassType,
//!     Schedule, TextureDescriptor, TextureFormat, TextureUsage,
//! };
//!
//! let device = DummyDevice::new();
//! let mut pipeline = FramePipeline::new(&device, FramePipelineConfig::default()).unwrap();
//!
//! let mut schedule = Schedule::new();
//! let hdr = schedule.create_transient_texture(TextureDescriptor::new_2d(
//!     1280,
//!     720,
//!     TextureFormat::Rgba16Float,
//!     TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
//! ));
//! schedule.add_pass(
//!     "sky",
//!     PassType::Graphics,
//!     PassDependencies::new().with_texture(hdr, AccessMode::RenderTarget),
//!     move |ctx| {
//!         let _target = ctx.resolve_texture(hdr);
//!         Ok(())
//!     },
//! );
//!
//! let (sync_point, summary) = pipeline
//!     .execute(&device, &mut schedule, device.create_command_list())
//!     .unwrap();
//! assert_eq!(summary.passes_executed, 1);
//!
//! device.signal(sync_point);
//! pipeline.destroy(&device);
//! ```

mod compiler;
mod pass;
mod resource;
pub(crate) mod user_data;

use std::any::Any;

pub use compiler::Lifetime;
pub use pass::{
    BufferDependency, Pass, PassDependencies, PassExecutor, PassHandle, PassType,
    TextureDependency,
};
pub use resource::{AccessMode, BufferHandle, BufferSource, TextureHandle, TextureSource};
pub use user_data::UserData;

use compiler::CompiledLifetimes;
use user_data::UserDataArena;

use crate::allocator::{CircularDescriptorAllocator, CircularUploadAllocator};
use crate::context::PassExecutionContext;
use crate::device::{CommandList, Device, DeviceBuffer, DeviceTexture, SyncPoint};
use crate::error::{FrameGraphError, FrameGraphResult};
use crate::profile_scope;
use crate::transient::TransientResourcePool;
use crate::types::{BufferDescriptor, TextureDescriptor};

/// Where a schedule is in its build/compile/execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleState {
    /// Accepting resources and passes.
    Building,
    /// Lifetimes computed, ready to execute.
    Compiled,
    /// Executed; must be reset before reuse.
    Executed,
}

/// What one execution did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Passes whose executor ran to completion.
    pub passes_executed: usize,
    /// Transient buffers placed in the pool.
    pub transient_buffers: usize,
    /// Transient textures placed in the pool.
    pub transient_textures: usize,
    /// Pool bytes used by the frame.
    pub transient_bytes: u64,
    /// Descriptors taken from the descriptor ring.
    pub descriptors_allocated: u64,
    /// Bytes taken from the upload ring.
    pub upload_bytes: u64,
}

/// A frame's pass graph.
pub struct Schedule {
    label: Option<String>,
    id: u32,
    state: ScheduleState,
    buffers: Vec<BufferSource>,
    textures: Vec<TextureSource>,
    passes: Vec<Pass>,
    executors: Vec<PassExecutor>,
    user_data: UserDataArena,
    lifetimes: CompiledLifetimes,
    // Resolution tables rebuilt on every execution.
    resolved_buffers: Vec<DeviceBuffer>,
    resolved_textures: Vec<DeviceTexture>,
}

impl Schedule {
    /// Create an empty schedule.
    pub fn new() -> Self {
        Self {
            label: None,
            id: resource::next_schedule_id(),
            state: ScheduleState::Building,
            buffers: Vec::new(),
            textures: Vec::new(),
            passes: Vec::new(),
            executors: Vec::new(),
            user_data: UserDataArena::default(),
            lifetimes: CompiledLifetimes::default(),
            resolved_buffers: Vec::new(),
            resolved_textures: Vec::new(),
        }
    }

    /// Set a debug label used in log output.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Debug label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Current state.
    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// Declare a buffer placed in the transient pool for each execution.
    pub fn create_transient_buffer(&mut self, descriptor: BufferDescriptor) -> BufferHandle {
        self.assert_building("create_transient_buffer");
        self.push_buffer(BufferSource::Transient(descriptor))
    }

    /// Declare a texture placed in the transient pool for each execution.
    pub fn create_transient_texture(&mut self, descriptor: TextureDescriptor) -> TextureHandle {
        self.assert_building("create_transient_texture");
        self.push_texture(TextureSource::Transient(descriptor))
    }

    /// Import a caller-owned buffer so passes can depend on it.
    pub fn import_external_buffer(&mut self, buffer: DeviceBuffer) -> BufferHandle {
        self.assert_building("import_external_buffer");
        self.push_buffer(BufferSource::External(buffer))
    }

    /// Import a caller-owned texture so passes can depend on it.
    pub fn import_external_texture(&mut self, texture: DeviceTexture) -> TextureHandle {
        self.assert_building("import_external_texture");
        self.push_texture(TextureSource::External(texture))
    }

    /// Store a value for pass executors, freed when the schedule is reset or dropped.
    pub fn allocate_user_data<T: Any + Send>(&mut self, value: T) -> UserData<T> {
        self.assert_building("allocate_user_data");
        self.user_data.allocate(self.id, value)
    }

    /// Append a pass. Passes execute in the order they are added.
    ///
    /// `dependencies` must name every resource the executor touches.
    pub fn add_pass<F>(
        &mut self,
        name: impl Into<String>,
        pass_type: PassType,
        dependencies: PassDependencies,
        executor: F,
    ) -> PassHandle
    where
        F: FnMut(&mut PassExecutionContext<'_>) -> FrameGraphResult<()> + Send + 'static,
    {
        self.assert_building("add_pass");
        let handle = PassHandle::new(self.passes.len() as u32);
        self.passes.push(Pass::new(name.into(), pass_type, dependencies));
        self.executors.push(Box::new(executor));
        handle
    }

    /// Get all passes in execution order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Get the number of passes.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Get all declared buffers.
    pub fn buffers(&self) -> &[BufferSource] {
        &self.buffers
    }

    /// Get all declared textures.
    pub fn textures(&self) -> &[TextureSource] {
        &self.textures
    }

    /// Number of user-data values stored.
    pub fn user_data_count(&self) -> usize {
        self.user_data.len()
    }

    /// Validate dependencies and compute resource lifetimes.
    ///
    /// # Panics
    ///
    /// Panics if the schedule is not building, or if a pass depends on a
    /// handle this schedule did not create.
    pub fn compile(&mut self) {
        self.assert_building("compile");
        profile_scope!("schedule_compile");
        compiler::compile_into(
            self.id,
            &self.passes,
            &self.buffers,
            &self.textures,
            &mut self.lifetimes,
        );
        self.state = ScheduleState::Compiled;
    }

    /// Passes between which `buffer` is used, once compiled.
    pub fn buffer_lifetime(&self, buffer: BufferHandle) -> Option<Lifetime> {
        assert!(
            self.state != ScheduleState::Building,
            "lifetimes are only known after compile"
        );
        if buffer.schedule() != self.id {
            return None;
        }
        self.lifetimes
            .buffers
            .get(buffer.index() as usize)
            .copied()
            .flatten()
    }

    /// Passes between which `texture` is used, once compiled.
    pub fn texture_lifetime(&self, texture: TextureHandle) -> Option<Lifetime> {
        assert!(
            self.state != ScheduleState::Building,
            "lifetimes are only known after compile"
        );
        if texture.schedule() != self.id {
            return None;
        }
        self.lifetimes
            .textures
            .get(texture.index() as usize)
            .copied()
            .flatten()
    }

    /// Run every pass once, in order.
    ///
    /// Places transient resources in `pool`, runs the executors against one
    /// shared [`PassExecutionContext`], then hands the frame's transient
    /// resources and ring usage over for release at `sync_point`. The caller
    /// submits `command_list` so the queue reaches `sync_point` once the
    /// frame's GPU work is done.
    ///
    /// If placement fails or an executor returns an error, the remaining
    /// passes are skipped, the frame's transient resources are destroyed
    /// right away and the error is returned. The command list must then be
    /// discarded instead of submitted.
    ///
    /// # Panics
    ///
    /// Panics if the schedule has not been compiled.
    pub fn execute(
        &mut self,
        device: &dyn Device,
        command_list: CommandList,
        sync_point: SyncPoint,
        pool: &mut TransientResourcePool,
        descriptors: &mut CircularDescriptorAllocator,
        uploads: &mut CircularUploadAllocator,
    ) -> FrameGraphResult<ExecutionSummary> {
        assert!(
            self.state == ScheduleState::Compiled,
            "execute called on a schedule in state {:?}",
            self.state
        );
        profile_scope!("schedule_execute");
        self.state = ScheduleState::Executed;

        pool.begin_frame(device);
        if let Err(err) = self.materialize(device, pool) {
            log::error!("Schedule {}: transient placement failed: {err}", self.display_name());
            pool.abort_frame(device);
            return Err(err);
        }

        let mut summary = ExecutionSummary {
            transient_buffers: self.buffers.iter().filter(|b| b.is_transient()).count(),
            transient_textures: self.textures.iter().filter(|t| t.is_transient()).count(),
            transient_bytes: pool.used(),
            ..Default::default()
        };

        let failure = {
            let Self {
                id,
                passes,
                executors,
                user_data,
                resolved_buffers,
                resolved_textures,
                ..
            } = self;
            let mut ctx = PassExecutionContext::new(
                device,
                command_list,
                *id,
                passes,
                resolved_buffers,
                resolved_textures,
                descriptors,
                uploads,
                user_data,
            );

            let mut failure = None;
            for (index, executor) in executors.iter_mut().enumerate() {
                let handle = PassHandle::new(index as u32);
                ctx.set_current_pass(handle);
                log::trace!(
                    "Executing pass '{}' ({:?})",
                    passes[index].name(),
                    passes[index].pass_type()
                );
                profile_scope!("execute_pass");
                if let Err(err) = executor(&mut ctx) {
                    failure = Some((handle, err));
                    break;
                }
                summary.passes_executed += 1;
            }
            summary.descriptors_allocated = ctx.descriptors_allocated();
            summary.upload_bytes = ctx.upload_bytes();
            failure
        };

        if let Some((handle, err)) = failure {
            let name = self.passes[handle.index()].name().to_string();
            log::error!(
                "Schedule {}: pass '{name}' failed, skipping {} remaining pass(es): {err}",
                self.display_name(),
                self.passes.len() - handle.index() - 1
            );
            pool.abort_frame(device);
            // Nothing from this frame reaches the GPU. Its ring usage retires
            // with the newest pending release and takes no queue slot.
            descriptors.discard_unreleased();
            uploads.discard_unreleased();
            return Err(match err {
                FrameGraphError::PassFailed { .. } => err,
                other => FrameGraphError::PassFailed {
                    pass: name,
                    reason: other.to_string(),
                },
            });
        }

        pool.end_frame(sync_point);
        descriptors.enqueue_release(sync_point);
        uploads.enqueue_release(sync_point);

        log::debug!(
            "Schedule {}: executed {} pass(es), {} transient buffer(s), {} transient texture(s), \
             {} pool bytes, {} descriptor(s), {} upload bytes, release at {sync_point}",
            self.display_name(),
            summary.passes_executed,
            summary.transient_buffers,
            summary.transient_textures,
            summary.transient_bytes,
            summary.descriptors_allocated,
            summary.upload_bytes
        );
        Ok(summary)
    }

    /// Return to [`ScheduleState::Building`] with no resources, passes or user data.
    ///
    /// Handles issued before the reset are invalidated. Allocations are kept
    /// for the next build.
    pub fn reset(&mut self) {
        self.id = resource::next_schedule_id();
        self.state = ScheduleState::Building;
        self.buffers.clear();
        self.textures.clear();
        self.passes.clear();
        self.executors.clear();
        self.user_data.clear();
        self.lifetimes.clear();
        self.resolved_buffers.clear();
        self.resolved_textures.clear();
    }

    fn materialize(
        &mut self,
        device: &dyn Device,
        pool: &mut TransientResourcePool,
    ) -> FrameGraphResult<()> {
        profile_scope!("materialize_transients");
        self.resolved_buffers.clear();
        self.resolved_textures.clear();
        for source in &self.buffers {
            let buffer = match source {
                BufferSource::Transient(descriptor) => pool.place_buffer(device, descriptor)?,
                BufferSource::External(buffer) => *buffer,
            };
            self.resolved_buffers.push(buffer);
        }
        for source in &self.textures {
            let texture = match source {
                TextureSource::Transient(descriptor) => pool.place_texture(device, descriptor)?,
                TextureSource::External(texture) => *texture,
            };
            self.resolved_textures.push(texture);
        }
        Ok(())
    }

    fn push_buffer(&mut self, source: BufferSource) -> BufferHandle {
        let handle = BufferHandle::new(self.id, self.buffers.len() as u32);
        self.buffers.push(source);
        handle
    }

    fn push_texture(&mut self, source: TextureSource) -> TextureHandle {
        let handle = TextureHandle::new(self.id, self.textures.len() as u32);
        self.textures.push(source);
        handle
    }

    fn assert_building(&self, operation: &str) {
        assert!(
            self.state == ScheduleState::Building,
            "{operation} called on a schedule in state {:?}",
            self.state
        );
    }

    fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed")
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("buffers", &self.buffers.len())
            .field("textures", &self.textures.len())
            .field("passes", &self.passes)
            .field("user_data", &self.user_data)
            .finish()
    }
}

static_assertions::assert_impl_all!(Schedule: Send);
