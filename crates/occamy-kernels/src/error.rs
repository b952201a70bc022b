// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for payload kernels

use occamy_runtime::RuntimeError;
use thiserror::Error;

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised while validating or running a kernel
#[derive(Debug, Error)]
pub enum KernelError {
    /// No kernel registered under the launch's kernel id
    #[error("Unknown kernel id {id}")]
    UnknownKernel {
        /// Requested id
        id: u32,
    },

    /// A vector argument is shorter than the launch length
    #[error("{kernel}: {argument} has {len} elements, launch needs {needed}")]
    ShortBuffer {
        /// Kernel name
        kernel: &'static str,
        /// Argument name
        argument: &'static str,
        /// Elements available
        len: usize,
        /// Elements required
        needed: usize,
    },

    /// A work range reaches past the launch length
    #[error("{kernel}: range {start}..{end} exceeds length {len}")]
    RangeOutOfBounds {
        /// Kernel name
        kernel: &'static str,
        /// Range start
        start: usize,
        /// Range end
        end: usize,
        /// Launch length
        len: usize,
    },

    /// Data set cannot be built
    #[error("Invalid data set: {reason}")]
    InvalidData {
        /// Reason for rejection
        reason: String,
    },

    /// Runtime failure while reading arguments
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl KernelError {
    /// Create an invalid data error
    pub fn invalid_data(reason: impl Into<String>) -> Self {
        Self::InvalidData {
            reason: reason.into(),
        }
    }
}

impl From<KernelError> for RuntimeError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::Runtime(inner) => inner,
            other => RuntimeError::payload(other.to_string()),
        }
    }
}
