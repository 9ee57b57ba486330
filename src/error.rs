// Pickle Prefetching Accelerator Rust Bindings
// SPDX-License-Identifier: MIT

//! Error types for Pickle device operations.

use thiserror::Error;

/// Errors that can occur while talking to the Pickle device or while
/// assembling job descriptors.
#[derive(Debug, Error)]
pub enum PickleError {
    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Permission denied accessing the device node.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),

    /// An ioctl against the device failed.
    #[error("ioctl {op} failed: {source}")]
    Ioctl {
        op: &'static str,
        source: std::io::Error,
    },

    /// A command-write phase transferred fewer bytes than requested.
    #[error("short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },

    /// An array id was looked up in a rename map that does not contain it.
    /// This means a descriptor was serialized against a job it was never
    /// registered in.
    #[error("array id {0} is not registered in this job")]
    UnknownArrayId(u64),

    /// The job's descriptor count does not fit the 1-byte wire header.
    #[error("job has {0} descriptors, wire format allows at most 255")]
    TooManyDescriptors(usize),

    /// Platform not supported.
    #[error("platform not supported: the Pickle device requires Linux")]
    PlatformNotSupported,
}

/// Result type alias for Pickle operations.
pub type PickleResult<T> = Result<T, PickleError>;
