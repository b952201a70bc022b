// SPDX-License-Identifier: AGPL-3.0-only

//! Kernel interface, kernel table and work splitting

use crate::error::{KernelError, Result};
use occamy_runtime::LaunchParams;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

/// A payload the cluster's compute cores can run.
pub trait Kernel: Debug + Send + Sync {
    /// Identifier carried in [`LaunchParams::kernel`].
    fn id(&self) -> u32;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Check that `params` carries every argument the kernel reads.
    ///
    /// # Errors
    ///
    /// Returns error if an argument is missing or too short.
    fn validate(&self, params: &LaunchParams) -> Result<()>;

    /// Compute elements `range` of the output.
    ///
    /// # Errors
    ///
    /// Returns error if the arguments are invalid or `range` exceeds the
    /// launch length.
    fn run(&self, params: &LaunchParams, range: Range<usize>) -> Result<()>;
}

/// How a launch's elements are shared among compute cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkSplit {
    /// Contiguous, near-equal slice per compute core.
    #[default]
    PerCore,
    /// The first compute core runs everything; the others idle.
    Single,
    /// Every compute core computes the whole vector.
    Replicated,
}

impl WorkSplit {
    /// Elements assigned to compute core `rank` of `workers`.
    ///
    /// Slices are disjoint and together cover `0..len`, except under
    /// [`WorkSplit::Replicated`]. Cores with nothing to do get an empty range.
    pub fn range(self, rank: usize, workers: usize, len: usize) -> Range<usize> {
        match self {
            Self::PerCore => {
                let workers = workers.max(1);
                let chunk = len.div_ceil(workers);
                let start = (rank * chunk).min(len);
                start..(start + chunk).min(len)
            }
            Self::Single if rank == 0 => 0..len,
            Self::Single => 0..0,
            Self::Replicated => 0..len,
        }
    }

    /// Parse `per-core` / `single` / `replicated`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "per-core" | "percore" | "split" => Some(Self::PerCore),
            "single" => Some(Self::Single),
            "replicated" | "all" => Some(Self::Replicated),
            _ => None,
        }
    }
}

/// Kernels addressable by id.
#[derive(Debug, Clone, Default)]
pub struct KernelTable {
    kernels: BTreeMap<u32, Arc<dyn Kernel>>,
}

impl KernelTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every kernel this crate ships.
    pub fn builtin() -> Self {
        Self::new().with(crate::Axpy)
    }

    /// Register `kernel`, replacing any kernel with the same id.
    #[must_use]
    pub fn with(mut self, kernel: impl Kernel + 'static) -> Self {
        self.kernels.insert(kernel.id(), Arc::new(kernel));
        self
    }

    /// Look up kernel `id`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownKernel` if nothing is registered under `id`.
    pub fn get(&self, id: u32) -> Result<&Arc<dyn Kernel>> {
        self.kernels.get(&id).ok_or(KernelError::UnknownKernel { id })
    }

    /// Registered kernels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Kernel>> {
        self.kernels.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_core_slices_cover_everything_once() {
        for len in [0, 1, 4, 7, 8, 9, 100] {
            let mut covered = vec![0u32; len];
            for rank in 0..8 {
                for i in WorkSplit::PerCore.range(rank, 8, len) {
                    covered[i] += 1;
                }
            }
            assert!(covered.iter().all(|c| *c == 1), "len {len}: {covered:?}");
        }
    }

    #[test]
    fn short_vector_leaves_tail_cores_idle() {
        assert_eq!(WorkSplit::PerCore.range(0, 8, 4), 0..1);
        assert_eq!(WorkSplit::PerCore.range(3, 8, 4), 3..4);
        assert!(WorkSplit::PerCore.range(5, 8, 4).is_empty());
    }

    #[test]
    fn single_and_replicated() {
        assert_eq!(WorkSplit::Single.range(0, 8, 10), 0..10);
        assert!(WorkSplit::Single.range(1, 8, 10).is_empty());
        assert_eq!(WorkSplit::Replicated.range(6, 8, 10), 0..10);
    }

    #[test]
    fn parses_names() {
        assert_eq!(WorkSplit::parse("Per-Core"), Some(WorkSplit::PerCore));
        assert_eq!(WorkSplit::parse("single"), Some(WorkSplit::Single));
        assert_eq!(WorkSplit::parse("both"), None);
    }

    #[test]
    fn table_lookup() {
        let table = KernelTable::builtin();
        assert_eq!(table.get(crate::axpy::AXPY_ID).unwrap().name(), "axpy");
        assert!(matches!(table.get(99), Err(KernelError::UnknownKernel { id: 99 })));
    }
}
