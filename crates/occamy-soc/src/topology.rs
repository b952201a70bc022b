// SPDX-License-Identifier: AGPL-3.0-only

//! Cluster and core topology.
//!
//! ## Key facts
//!
//! - Every cluster is its own power/clock domain; the partition is static
//!   and fixed when the SoC is built.
//! - A cluster holds `cores_per_cluster` cores. The first
//!   `compute_cores_per_cluster` of them execute kernels; the remaining
//!   cores are data-movement (DM) cores that shepherd data and never compute.
//! - On Occamy that is 8 compute cores + 1 DM core per cluster, and the DM
//!   core is always the last one.

use std::fmt;

/// Identifier of a cluster (power/clock domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClusterId(pub u8);

impl ClusterId {
    /// Zero-based index, for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cluster{}", self.0)
    }
}

/// Index of a core inside its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreIndex(pub u8);

impl CoreIndex {
    /// Zero-based index, for table lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Bit of this core in per-core registers (wake set/clear/pending).
    ///
    /// `None` for cores past the 32-bit register width.
    #[must_use]
    pub const fn bit(self) -> Option<u32> {
        if self.0 < 32 {
            Some(1 << self.0)
        } else {
            None
        }
    }
}

impl fmt::Display for CoreIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

/// What a core does during an offload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreRole {
    /// Executes the offloaded kernel body.
    Compute,
    /// Data movement only; never runs the kernel body.
    DataMovement,
}

/// Static cluster/core layout of the SoC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocTopology {
    /// Number of clusters.
    pub clusters: u8,
    /// Cores per cluster (compute + DM).
    pub cores_per_cluster: u8,
    /// Compute cores per cluster; the rest are DM cores.
    pub compute_cores_per_cluster: u8,
}

impl SocTopology {
    /// Occamy reference layout: 6 clusters × (8 compute + 1 DM).
    pub const OCCAMY: Self = Self {
        clusters: 6,
        cores_per_cluster: 9,
        compute_cores_per_cluster: 8,
    };

    /// Largest cluster the per-core register bitmaps can describe.
    pub const MAX_CORES_PER_CLUSTER: u8 = 32;

    /// Largest cluster count the host interrupt bitmap can describe.
    pub const MAX_CLUSTERS: u8 = 32;

    /// DM cores per cluster.
    #[must_use]
    pub const fn dm_cores_per_cluster(&self) -> u8 {
        self.cores_per_cluster.saturating_sub(self.compute_cores_per_cluster)
    }

    /// Total cores on the SoC (host excluded).
    #[must_use]
    pub const fn total_cores(&self) -> u32 {
        (self.clusters as u32) * (self.cores_per_cluster as u32)
    }

    /// True if `cluster` exists on this SoC.
    #[must_use]
    pub const fn contains_cluster(&self, cluster: ClusterId) -> bool {
        cluster.0 < self.clusters
    }

    /// True if `core` exists inside a cluster of this SoC.
    #[must_use]
    pub const fn contains_core(&self, core: CoreIndex) -> bool {
        core.0 < self.cores_per_cluster
    }

    /// Silicon role of a core: the low indices compute, the tail moves data.
    #[must_use]
    pub const fn role_of(&self, core: CoreIndex) -> CoreRole {
        if core.0 < self.compute_cores_per_cluster {
            CoreRole::Compute
        } else {
            CoreRole::DataMovement
        }
    }

    /// Bitmap with one bit set per core of a cluster.
    #[must_use]
    pub const fn all_cores_mask(&self) -> u32 {
        if self.cores_per_cluster >= 32 {
            u32::MAX
        } else {
            (1u32 << self.cores_per_cluster) - 1
        }
    }

    /// Iterate over all cluster identifiers.
    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> {
        (0..self.clusters).map(ClusterId)
    }

    /// Iterate over all core indices of one cluster.
    pub fn core_indices(&self) -> impl Iterator<Item = CoreIndex> {
        (0..self.cores_per_cluster).map(CoreIndex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occamy_geometry() {
        let t = SocTopology::OCCAMY;
        assert_eq!(t.total_cores(), 54);
        assert_eq!(t.dm_cores_per_cluster(), 1);
        assert_eq!(t.all_cores_mask(), 0x1FF);
    }

    #[test]
    fn core_bits_stop_at_register_width() {
        assert_eq!(CoreIndex(0).bit(), Some(1));
        assert_eq!(CoreIndex(31).bit(), Some(1 << 31));
        assert_eq!(CoreIndex(32).bit(), None);
        assert_eq!(CoreIndex(200).bit(), None);
    }

    #[test]
    fn dm_core_is_last() {
        let t = SocTopology::OCCAMY;
        assert_eq!(t.role_of(CoreIndex(0)), CoreRole::Compute);
        assert_eq!(t.role_of(CoreIndex(7)), CoreRole::Compute);
        assert_eq!(t.role_of(CoreIndex(8)), CoreRole::DataMovement);
    }

    #[test]
    fn bounds() {
        let t = SocTopology::OCCAMY;
        assert!(t.contains_cluster(ClusterId(5)));
        assert!(!t.contains_cluster(ClusterId(6)));
        assert!(!t.contains_core(CoreIndex(9)));
    }
}
