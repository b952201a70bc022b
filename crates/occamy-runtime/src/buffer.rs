// SPDX-License-Identifier: AGPL-3.0-only

//! Launch mailbox and shared payload buffers
//!
//! A [`SharedBuffer`] is a vector of `f64` stored as atomic words. Cores
//! write their slice of the output during an epoch; the host reads it only
//! after the completion signal. The release fence in `return_to_host` and
//! the acquire on the host's completion poll order those accesses, so
//! element stores themselves can be relaxed.

use crate::error::{Result, RuntimeError};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Vector of `f64` shared between the host and cluster cores.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    words: Arc<[AtomicU64]>,
}

impl SharedBuffer {
    /// Buffer of `len` zeros.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Buffer holding a copy of `values`.
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            words: values.iter().map(|v| AtomicU64::new(v.to_bits())).collect(),
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True if the buffer has no elements.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Element `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.words
            .get(index)
            .map(|w| f64::from_bits(w.load(Ordering::Relaxed)))
    }

    /// Store `value` at `index`.
    ///
    /// # Errors
    ///
    /// Returns `Payload` if `index` is out of range.
    pub fn set(&self, index: usize, value: f64) -> Result<()> {
        let word = self.words.get(index).ok_or_else(|| {
            RuntimeError::payload(format!("index {index} out of range for {} elements", self.len()))
        })?;
        word.store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    /// Copy out every element.
    pub fn to_vec(&self) -> Vec<f64> {
        self.words
            .iter()
            .map(|w| f64::from_bits(w.load(Ordering::Relaxed)))
            .collect()
    }

    /// Contents as little-endian `f64` bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.len() * 8);
        for word in self.words.iter() {
            out.put_f64_le(f64::from_bits(word.load(Ordering::Relaxed)));
        }
        out.freeze()
    }

    /// True if both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.words, &other.words)
    }
}

/// Arguments the host publishes for one offload.
///
/// Cores read them through [`crate::CoreContext::params`].
#[derive(Debug, Clone, Default)]
pub struct LaunchParams {
    /// Kernel selector.
    pub kernel: u32,
    /// Problem length in elements.
    pub length: usize,
    /// Scalar arguments.
    pub scalars: Vec<f64>,
    /// Input vectors.
    pub inputs: Vec<SharedBuffer>,
    /// Output vector.
    pub output: Option<SharedBuffer>,
}

impl LaunchParams {
    /// Parameters for `kernel` over `length` elements.
    pub fn new(kernel: u32, length: usize) -> Self {
        Self {
            kernel,
            length,
            ..Self::default()
        }
    }

    /// Append a scalar argument.
    #[must_use]
    pub fn with_scalar(mut self, value: f64) -> Self {
        self.scalars.push(value);
        self
    }

    /// Append an input vector.
    #[must_use]
    pub fn with_input(mut self, buffer: SharedBuffer) -> Self {
        self.inputs.push(buffer);
        self
    }

    /// Set the output vector.
    #[must_use]
    pub fn with_output(mut self, buffer: SharedBuffer) -> Self {
        self.output = Some(buffer);
        self
    }

    /// Scalar argument `index`.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` if it was not supplied.
    pub fn scalar(&self, index: usize) -> Result<f64> {
        self.scalars
            .get(index)
            .copied()
            .ok_or_else(|| RuntimeError::missing_argument(format!("scalar {index}")))
    }

    /// Input vector `index`.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` if it was not supplied.
    pub fn input(&self, index: usize) -> Result<&SharedBuffer> {
        self.inputs
            .get(index)
            .ok_or_else(|| RuntimeError::missing_argument(format!("input {index}")))
    }

    /// Output vector.
    ///
    /// # Errors
    ///
    /// Returns `MissingArgument` if it was not supplied.
    pub fn output(&self) -> Result<&SharedBuffer> {
        self.output
            .as_ref()
            .ok_or_else(|| RuntimeError::missing_argument("output buffer"))
    }
}
