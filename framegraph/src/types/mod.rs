//! Descriptors for transient resources and the views passes create on them.
//!
//! These are plain data: the frame graph hands them to the [`Device`] when it
//! materializes a transient resource or writes a view into the transient
//! descriptor table.
//!
//! [`Device`]: crate::device::Device

mod buffer;
mod texture;
mod view;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use texture::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};
pub use view::{BufferViewDescriptor, TextureSubresource, TextureViewDescriptor, TextureViewKind};
