//! Fence-gated circular allocators.
//!
//! [`CircularRangeAllocator`] is the primitive; the upload and descriptor
//! allocators bind it to one backing resource and its alignment.

mod descriptor;
mod ring;
mod upload;

pub use descriptor::{CircularDescriptorAllocator, DescriptorRange};
pub use ring::{CircularRangeAllocator, RingAllocation};
pub use upload::{CircularUploadAllocator, DEFAULT_UPLOAD_ALIGNMENT, UploadAllocation};
