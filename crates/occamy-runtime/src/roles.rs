// SPDX-License-Identifier: AGPL-3.0-only

//! Core role partition
//!
//! The compute/DM split is resolved once into a table (core index → role)
//! and only ever looked up afterwards. Every core of every cluster consults
//! the same table, so no two cores can disagree about each other's role.

use crate::error::{Result, RuntimeError};
use occamy_soc::{CoreIndex, CoreRole, SocTopology};

/// Which cores must reach the barrier before completion is signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncScope {
    /// Every core of the cluster.
    All,
    /// Compute cores only; DM cores neither block nor count.
    ComputeOnly,
}

/// Register bit of `core`.
///
/// # Errors
///
/// Returns `InvalidCore` for cores past the 32-bit core bitmap.
pub(crate) fn core_bit(core: CoreIndex) -> Result<u32> {
    core.bit().ok_or(RuntimeError::InvalidCore {
        core,
        cores: SocTopology::MAX_CORES_PER_CLUSTER,
    })
}

/// Static core index → role table shared by all clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePartition {
    roles: Vec<CoreRole>,
}

impl RolePartition {
    /// Resolve the silicon split of `topology`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if the topology describes an unusable split.
    pub fn from_topology(topology: &SocTopology) -> Result<Self> {
        if topology.compute_cores_per_cluster > topology.cores_per_cluster {
            return Err(RuntimeError::invalid_partition(format!(
                "{} compute cores in a {}-core cluster",
                topology.compute_cores_per_cluster, topology.cores_per_cluster
            )));
        }
        Self::from_roles(topology.core_indices().map(|c| topology.role_of(c)).collect())
    }

    /// Use an explicit table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if the table is empty, larger than a
    /// per-core bitmap, or has no compute core.
    pub fn from_roles(roles: Vec<CoreRole>) -> Result<Self> {
        let partition = Self { roles };
        partition.validate()?;
        Ok(partition)
    }

    /// Check the table is usable for an offload.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if the table is empty, larger than a
    /// per-core bitmap, or has no compute core.
    pub fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(RuntimeError::invalid_partition("cluster has no cores"));
        }
        if self.roles.len() > usize::from(SocTopology::MAX_CORES_PER_CLUSTER) {
            return Err(RuntimeError::invalid_partition(format!(
                "{} cores exceed the {}-bit core bitmap",
                self.roles.len(),
                SocTopology::MAX_CORES_PER_CLUSTER
            )));
        }
        if !self.roles.contains(&CoreRole::Compute) {
            return Err(RuntimeError::invalid_partition("cluster has no compute core"));
        }
        Ok(())
    }

    /// Cores per cluster.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Always false: a validated partition has at least one core.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Role of `core`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCore` if `core` is outside the cluster.
    pub fn role(&self, core: CoreIndex) -> Result<CoreRole> {
        self.roles.get(core.index()).copied().ok_or(RuntimeError::InvalidCore {
            core,
            cores: u8::try_from(self.roles.len()).unwrap_or(u8::MAX),
        })
    }

    /// True if `core` is a compute core. Out-of-range cores are not.
    pub fn is_compute(&self, core: CoreIndex) -> bool {
        matches!(self.roles.get(core.index()), Some(CoreRole::Compute))
    }

    /// Compute cores in index order.
    pub fn compute_cores(&self) -> impl Iterator<Item = CoreIndex> + '_ {
        self.cores_with(CoreRole::Compute)
    }

    /// DM cores in index order.
    pub fn dm_cores(&self) -> impl Iterator<Item = CoreIndex> + '_ {
        self.cores_with(CoreRole::DataMovement)
    }

    fn cores_with(&self, role: CoreRole) -> impl Iterator<Item = CoreIndex> + '_ {
        self.roles
            .iter()
            .enumerate()
            .filter(move |(_, r)| **r == role)
            .filter_map(|(i, _)| u8::try_from(i).ok().map(CoreIndex))
    }

    /// Position of `core` among the compute cores, if it is one.
    pub fn compute_rank(&self, core: CoreIndex) -> Option<usize> {
        self.compute_cores().position(|c| c == core)
    }

    /// True if `core` must arrive for `scope`.
    pub fn participates(&self, core: CoreIndex, scope: SyncScope) -> bool {
        match scope {
            SyncScope::All => core.index() < self.roles.len(),
            SyncScope::ComputeOnly => self.is_compute(core),
        }
    }

    /// Number of cores that must arrive for `scope`.
    pub fn participants(&self, scope: SyncScope) -> usize {
        match scope {
            SyncScope::All => self.roles.len(),
            SyncScope::ComputeOnly => self.compute_cores().count(),
        }
    }

    /// Bitmap of the cores that must arrive for `scope`.
    pub fn mask(&self, scope: SyncScope) -> u32 {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, role)| scope == SyncScope::All || **role == CoreRole::Compute)
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}
