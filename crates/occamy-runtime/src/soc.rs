// SPDX-License-Identifier: AGPL-3.0-only

//! SoC context handle
//!
//! [`Soc`] owns everything the runtime knows about one SoC: the register
//! window, the static topology and role table, the configuration, and one
//! slot of shared state per cluster. It is cheap to clone; clones share
//! state, so the host thread and every core thread can hold one.

use crate::buffer::LaunchParams;
use crate::config::RuntimeConfig;
use crate::device::CoreContext;
use crate::epoch::EpochSync;
use crate::error::{Result, RuntimeError};
use crate::regfile::RegisterFile;
use crate::roles::RolePartition;
use crate::timer::{CycleCounter, CycleStamp, DomainClock, HostCounter};
use occamy_soc::{regs, ClusterId, CoreIndex, SocTopology};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cycles one core reported for its share of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreCycles {
    /// Reporting core.
    pub core: CoreIndex,
    /// Cluster-domain cycles.
    pub cycles: u64,
}

/// Shared state of one cluster.
#[derive(Debug)]
pub(crate) struct ClusterSlot {
    /// Serialises power sequencing on this cluster.
    pub(crate) power: Mutex<()>,
    pub(crate) sync: EpochSync,
    pub(crate) mailbox: Mutex<Option<Arc<LaunchParams>>>,
    pub(crate) clock: DomainClock,
    pub(crate) cycles: Mutex<Vec<CoreCycles>>,
}

impl ClusterSlot {
    fn new(id: ClusterId, hz: u64) -> Self {
        Self {
            power: Mutex::new(()),
            sync: EpochSync::new(id),
            mailbox: Mutex::new(None),
            clock: DomainClock::cluster(id, hz),
            cycles: Mutex::new(Vec::new()),
        }
    }
}

/// Lock `mutex`, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct SocShared {
    regs: Arc<dyn RegisterFile>,
    topology: SocTopology,
    partition: RolePartition,
    config: RuntimeConfig,
    clusters: Vec<ClusterSlot>,
    host_counter: HostCounter,
}

/// Handle to one SoC.
#[derive(Debug, Clone)]
pub struct Soc {
    shared: Arc<SocShared>,
}

impl Soc {
    /// Create a handle over `regs` with the silicon role split of `topology`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if `topology` exceeds the register bitmaps
    /// or has no compute core.
    pub fn new(
        regs: Arc<dyn RegisterFile>,
        topology: SocTopology,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let partition = RolePartition::from_topology(&topology)?;
        Self::with_partition(regs, topology, partition, config)
    }

    /// Create a handle with an explicit role table.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartition` if the table does not cover exactly one
    /// cluster of `topology`, or `topology` is out of range.
    pub fn with_partition(
        regs: Arc<dyn RegisterFile>,
        topology: SocTopology,
        partition: RolePartition,
        config: RuntimeConfig,
    ) -> Result<Self> {
        if topology.clusters == 0 || topology.clusters > SocTopology::MAX_CLUSTERS {
            return Err(RuntimeError::invalid_partition(format!(
                "{} clusters (supported: 1..={})",
                topology.clusters,
                SocTopology::MAX_CLUSTERS
            )));
        }
        partition.validate()?;
        if partition.len() != usize::from(topology.cores_per_cluster) {
            return Err(RuntimeError::invalid_partition(format!(
                "role table has {} entries for {}-core clusters",
                partition.len(),
                topology.cores_per_cluster
            )));
        }

        let clusters = topology
            .cluster_ids()
            .map(|id| ClusterSlot::new(id, config.cluster_clock_hz))
            .collect();

        tracing::debug!(
            "SoC handle: {} clusters × {} cores ({} compute)",
            topology.clusters,
            topology.cores_per_cluster,
            partition.compute_cores().count()
        );

        Ok(Self {
            shared: Arc::new(SocShared {
                regs,
                topology,
                partition,
                config,
                clusters,
                host_counter: HostCounter::new(),
            }),
        })
    }

    /// Static layout.
    pub fn topology(&self) -> &SocTopology {
        &self.shared.topology
    }

    /// Core role table, shared by all clusters.
    pub fn partition(&self) -> &RolePartition {
        &self.shared.partition
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    /// Register window.
    pub fn registers(&self) -> &Arc<dyn RegisterFile> {
        &self.shared.regs
    }

    /// Host cycle counter.
    pub fn host_counter(&self) -> &HostCounter {
        &self.shared.host_counter
    }

    /// Read the host cycle counter.
    pub fn read_cycles(&self) -> CycleStamp {
        self.shared.host_counter.read_cycles()
    }

    /// Contents of the SoC version register.
    ///
    /// # Errors
    ///
    /// Returns error if the register window cannot be read.
    pub fn soc_version(&self) -> Result<u32> {
        self.shared.regs.read32(regs::SOC_VERSION)
    }

    pub(crate) fn slot(&self, cluster: ClusterId) -> Result<&ClusterSlot> {
        self.shared
            .clusters
            .get(cluster.index())
            .ok_or(RuntimeError::InvalidCluster {
                cluster,
                clusters: self.shared.topology.clusters,
            })
    }

    pub(crate) fn read(&self, offset: usize) -> Result<u32> {
        self.shared.regs.read32(offset)
    }

    pub(crate) fn write(&self, offset: usize, value: u32) -> Result<()> {
        self.shared.regs.write32(offset, value)
    }

    /// Execution context of `core` in `cluster`, bound to the cluster's
    /// current epoch.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` or `InvalidCore` for identifiers outside the
    /// topology.
    pub fn core_context(&self, cluster: ClusterId, core: CoreIndex) -> Result<CoreContext> {
        let slot = self.slot(cluster)?;
        let role = self.shared.partition.role(core)?;
        let epoch = slot.sync.status().epoch;
        Ok(CoreContext::new(self.clone(), cluster, core, role, epoch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regfile::SimRegisterFile;

    fn soc() -> Soc {
        let regs = Arc::new(SimRegisterFile::for_topology(&SocTopology::OCCAMY));
        Soc::new(regs, SocTopology::OCCAMY, RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn clones_share_state() {
        let a = soc();
        let b = a.clone();
        assert!(Arc::ptr_eq(a.registers(), b.registers()));
        assert_eq!(b.topology().clusters, 6);
    }

    #[test]
    fn reads_version() {
        assert_eq!(soc().soc_version().unwrap(), regs::SOC_VERSION_OCCAMY);
    }

    #[test]
    fn rejects_unknown_cluster_and_core() {
        let soc = soc();
        let err = soc.core_context(ClusterId(6), CoreIndex(0)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCluster { .. }));
        let err = soc.core_context(ClusterId(0), CoreIndex(9)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCore { .. }));
    }

    #[test]
    fn rejects_mismatched_role_table() {
        use occamy_soc::CoreRole;
        let regs = Arc::new(SimRegisterFile::for_topology(&SocTopology::OCCAMY));
        let partition = RolePartition::from_roles(vec![CoreRole::Compute; 4]).unwrap();
        let err = Soc::with_partition(regs, SocTopology::OCCAMY, partition, RuntimeConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn rejects_empty_soc() {
        let topology = SocTopology {
            clusters: 0,
            ..SocTopology::OCCAMY
        };
        let regs = Arc::new(SimRegisterFile::new(0x1000));
        assert!(Soc::new(regs, topology, RuntimeConfig::default()).is_err());
    }
}
