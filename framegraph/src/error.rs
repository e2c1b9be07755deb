//! Frame graph error types.

use thiserror::Error;

/// Errors that can occur while building or executing a frame.
///
/// Capacity errors are configuration bugs (an arena sized too small for the
/// workload). They are returned rather than retried; callers are expected to
/// treat them as fatal for the current frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameGraphError {
    #[error(
        "circular allocator exhausted: requested {requested} bytes, {available} of {capacity} available"
    )]
    RingExhausted {
        requested: u64,
        available: u64,
        capacity: u64,
    },
    #[error("transient pool exhausted: placement needs {required} bytes, pool holds {capacity}")]
    TransientPoolExhausted { required: u64, capacity: u64 },
    #[error("failed to create resource: {0}")]
    ResourceCreationFailed(String),
    #[error("out of device memory")]
    OutOfMemory,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("pass '{pass}' failed: {reason}")]
    PassFailed { pass: String, reason: String },
}

/// Convenience alias used throughout the crate.
pub type FrameGraphResult<T> = Result<T, FrameGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameGraphError::OutOfMemory;
        assert_eq!(err.to_string(), "out of device memory");

        let err = FrameGraphError::RingExhausted {
            requested: 512,
            available: 256,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "circular allocator exhausted: requested 512 bytes, 256 of 1024 available"
        );

        let err = FrameGraphError::PassFailed {
            pass: "lighting".into(),
            reason: "missing shadow map".into(),
        };
        assert_eq!(err.to_string(), "pass 'lighting' failed: missing shadow map");
    }
}
