use core::fmt::Debug;

use parred_runtime::{kernel::PipelineError, server::ServerError};
use thiserror::Error;

/// Errors that can abort a reduction.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum ReduceError {
    /// The number of elements isn't a non-zero power of two.
    #[error("Can't reduce {length} elements, the length must be a non-zero power of two")]
    InvalidLength {
        /// The rejected length.
        length: u32,
    },

    /// The working buffer can't hold the elements to reduce.
    #[error("The working buffer holds {size} bytes, too small for {length} elements")]
    BufferTooSmall {
        /// The number of elements to reduce.
        length: u32,
        /// Size of the working buffer in bytes.
        size: usize,
    },

    /// The group-decomposed strategy only reduces the number of elements it was configured for.
    #[error("The group decomposition is configured for {expected} elements, got {length}")]
    LengthMismatch {
        /// The number of elements to reduce.
        length: u32,
        /// The configured number of elements.
        expected: u32,
    },

    /// The group decomposition can't be laid out on the device.
    #[error("Invalid group decomposition\nCaused by:\n  {reason}")]
    InvalidDecomposition {
        /// Why the geometry was rejected.
        reason: String,
    },

    /// The device doesn't support plane instructions.
    #[error("Trying to launch a kernel using plane instructions, but there are not supported by the hardware.")]
    PlanesUnavailable,

    /// The entry point of the strategy couldn't be turned into a pipeline.
    #[error("Can't build the reduction pipeline\nCaused by:\n  {0}")]
    Pipeline(#[from] PipelineError),

    /// The device failed to run or read back the reduction.
    #[error("The device failed during the reduction\nCaused by:\n  {0}")]
    Server(#[from] ServerError),
}

impl Debug for ReduceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("{self}"))
    }
}
