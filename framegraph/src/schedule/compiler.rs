//! Schedule compilation.
//!
//! Passes keep their declaration order, so compiling does not sort
//! anything. It validates every dependency handle and records, for each
//! resource, the first and last pass that touches it. Suspicious graphs
//! (transient resources no pass touches, or whose first access is a read)
//! are reported as warnings; they are legal but almost always a bug in the
//! code building the graph.

use super::pass::{Pass, PassHandle};
use super::resource::{AccessMode, BufferSource, TextureSource};

/// Span of passes a resource is used in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lifetime {
    /// First pass that touches the resource.
    pub first_pass: PassHandle,
    /// Last pass that touches the resource.
    pub last_pass: PassHandle,
    /// First pass that writes the resource, if any.
    pub first_write: Option<PassHandle>,
}

impl Lifetime {
    fn start(pass: PassHandle, access: AccessMode) -> Self {
        Self {
            first_pass: pass,
            last_pass: pass,
            first_write: access.is_write().then_some(pass),
        }
    }

    fn extend(&mut self, pass: PassHandle, access: AccessMode) {
        self.last_pass = pass;
        if self.first_write.is_none() && access.is_write() {
            self.first_write = Some(pass);
        }
    }

    /// Check whether `pass` falls inside the lifetime.
    pub fn contains(&self, pass: PassHandle) -> bool {
        self.first_pass <= pass && pass <= self.last_pass
    }
}

/// Per-resource lifetimes of a compiled schedule.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CompiledLifetimes {
    pub(crate) buffers: Vec<Option<Lifetime>>,
    pub(crate) textures: Vec<Option<Lifetime>>,
}

impl CompiledLifetimes {
    pub(crate) fn clear(&mut self) {
        self.buffers.clear();
        self.textures.clear();
    }
}

/// Compile pass dependencies into `target`, reusing its allocations.
///
/// # Panics
///
/// Panics if a dependency names a handle that was not created by this
/// schedule build.
pub(crate) fn compile_into(
    schedule: u32,
    passes: &[Pass],
    buffers: &[BufferSource],
    textures: &[TextureSource],
    target: &mut CompiledLifetimes,
) {
    target.clear();
    target.buffers.resize(buffers.len(), None);
    target.textures.resize(textures.len(), None);

    for (index, pass) in passes.iter().enumerate() {
        let handle = PassHandle::new(index as u32);
        let dependencies = pass.dependencies();

        for dep in &dependencies.buffers {
            assert!(
                dep.buffer.schedule() == schedule
                    && (dep.buffer.index() as usize) < buffers.len(),
                "pass '{}' depends on {:?}, which was not created by this schedule",
                pass.name(),
                dep.buffer
            );
            touch(&mut target.buffers[dep.buffer.index() as usize], handle, dep.access);
        }
        for dep in &dependencies.textures {
            assert!(
                dep.texture.schedule() == schedule
                    && (dep.texture.index() as usize) < textures.len(),
                "pass '{}' depends on {:?}, which was not created by this schedule",
                pass.name(),
                dep.texture
            );
            touch(&mut target.textures[dep.texture.index() as usize], handle, dep.access);
        }
    }

    for (index, (source, lifetime)) in buffers.iter().zip(&target.buffers).enumerate() {
        if source.is_transient() {
            warn_suspicious("buffer", index, source.label(), lifetime.as_ref(), passes);
        }
    }
    for (index, (source, lifetime)) in textures.iter().zip(&target.textures).enumerate() {
        if source.is_transient() {
            warn_suspicious("texture", index, source.label(), lifetime.as_ref(), passes);
        }
    }
}

fn touch(slot: &mut Option<Lifetime>, pass: PassHandle, access: AccessMode) {
    match slot {
        Some(lifetime) => lifetime.extend(pass, access),
        None => *slot = Some(Lifetime::start(pass, access)),
    }
}

fn warn_suspicious(
    kind: &str,
    index: usize,
    label: Option<&str>,
    lifetime: Option<&Lifetime>,
    passes: &[Pass],
) {
    let label = label.unwrap_or("unnamed");
    match lifetime {
        None => log::warn!("Transient {kind} #{index} ({label}) is not used by any pass"),
        Some(lifetime) if lifetime.first_write != Some(lifetime.first_pass) => {
            log::warn!(
                "Transient {kind} #{index} ({label}) is read by pass '{}' before any pass writes it",
                passes[lifetime.first_pass.index()].name()
            );
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::pass::{PassDependencies, PassType};
    use crate::schedule::resource::{BufferHandle, TextureHandle};
    use crate::types::{BufferDescriptor, TextureDescriptor};

    const SCHEDULE: u32 = 42;

    fn pass(name: &str, dependencies: PassDependencies) -> Pass {
        Pass::new(name.into(), PassType::Graphics, dependencies)
    }

    #[test]
    fn test_lifetimes_span_first_to_last_use() {
        let textures = vec![
            TextureSource::Transient(TextureDescriptor::default()),
            TextureSource::Transient(TextureDescriptor::default()),
        ];
        let gbuffer = TextureHandle::new(SCHEDULE, 0);
        let hdr = TextureHandle::new(SCHEDULE, 1);
        let passes = vec![
            pass(
                "gbuffer",
                PassDependencies::new().with_texture(gbuffer, AccessMode::RenderTarget),
            ),
            pass(
                "lighting",
                PassDependencies::new()
                    .with_texture(gbuffer, AccessMode::ShaderRead)
                    .with_texture(hdr, AccessMode::RenderTarget),
            ),
            pass(
                "tonemap",
                PassDependencies::new().with_texture(hdr, AccessMode::ShaderRead),
            ),
        ];

        let mut compiled = CompiledLifetimes::default();
        compile_into(SCHEDULE, &passes, &[], &textures, &mut compiled);

        let gbuffer_life = compiled.textures[0].unwrap();
        assert_eq!(gbuffer_life.first_pass, PassHandle::new(0));
        assert_eq!(gbuffer_life.last_pass, PassHandle::new(1));
        assert_eq!(gbuffer_life.first_write, Some(PassHandle::new(0)));

        let hdr_life = compiled.textures[1].unwrap();
        assert!(hdr_life.contains(PassHandle::new(2)));
        assert!(!hdr_life.contains(PassHandle::new(0)));
    }

    #[test]
    fn test_unused_resource_has_no_lifetime() {
        let buffers = vec![BufferSource::Transient(BufferDescriptor::with_size(64))];
        let mut compiled = CompiledLifetimes::default();
        compile_into(SCHEDULE, &[], &buffers, &[], &mut compiled);
        assert_eq!(compiled.buffers, vec![None]);
    }

    #[test]
    fn test_recompile_reuses_target() {
        let buffers = vec![BufferSource::Transient(BufferDescriptor::with_size(64))];
        let handle = BufferHandle::new(SCHEDULE, 0);
        let passes = vec![pass(
            "clear",
            PassDependencies::new().with_buffer(handle, AccessMode::ShaderWrite),
        )];

        let mut compiled = CompiledLifetimes::default();
        compile_into(SCHEDULE, &passes, &buffers, &[], &mut compiled);
        compile_into(SCHEDULE, &passes, &buffers, &[], &mut compiled);
        assert_eq!(compiled.buffers.len(), 1);
    }

    #[test]
    #[should_panic(expected = "was not created by this schedule")]
    fn test_foreign_handle_panics() {
        let stray = BufferHandle::new(SCHEDULE + 1, 0);
        let passes = vec![pass(
            "stray",
            PassDependencies::new().with_buffer(stray, AccessMode::ShaderRead),
        )];
        let buffers = vec![BufferSource::Transient(BufferDescriptor::with_size(64))];
        compile_into(SCHEDULE, &passes, &buffers, &[], &mut CompiledLifetimes::default());
    }
}
