// SPDX-License-Identifier: AGPL-3.0-only

//! Cluster-core side of the runtime
//!
//! A [`CoreContext`] is what code running on one cluster core sees: its own
//! identity, its role, the launch parameters and the epoch it was woken for.
//! The accelerator-side operations (`on_post_wake`, `is_compute_core`,
//! `read_cycles`, `return_to_host`) all hang off it.

use crate::buffer::LaunchParams;
use crate::config::ReturnPolicy;
use crate::epoch::{Arrival, Epoch};
use crate::error::{Result, RuntimeError};
use crate::roles::{core_bit, SyncScope};
use crate::soc::{lock, CoreCycles, Soc};
use crate::timer::{CycleCounter, CycleStamp};
use occamy_soc::{regs, ClusterId, CoreIndex, CoreRole};
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Execution context of one cluster core for one epoch.
#[derive(Debug, Clone)]
pub struct CoreContext {
    soc: Soc,
    cluster: ClusterId,
    core: CoreIndex,
    role: CoreRole,
    epoch: Epoch,
}

impl CoreContext {
    pub(crate) fn new(
        soc: Soc,
        cluster: ClusterId,
        core: CoreIndex,
        role: CoreRole,
        epoch: Epoch,
    ) -> Self {
        Self {
            soc,
            cluster,
            core,
            role,
            epoch,
        }
    }

    /// Cluster this core belongs to.
    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    /// Index of this core inside its cluster.
    pub fn core(&self) -> CoreIndex {
        self.core
    }

    /// Epoch this context was woken for.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Role of this core.
    pub fn role(&self) -> CoreRole {
        self.role
    }

    /// True if this core runs kernel bodies.
    ///
    /// Pure lookup in the static role table; every core of the SoC answers
    /// the same way for the same core index.
    pub fn is_compute_core(&self) -> bool {
        self.role == CoreRole::Compute
    }

    /// True if this is a data-movement core.
    pub fn is_dm_core(&self) -> bool {
        self.role == CoreRole::DataMovement
    }

    /// Position among the compute cores, for splitting work.
    pub fn compute_rank(&self) -> Option<usize> {
        self.soc.partition().compute_rank(self.core)
    }

    /// Number of compute cores in the cluster.
    pub fn compute_cores(&self) -> usize {
        self.soc.partition().participants(SyncScope::ComputeOnly)
    }

    /// Launch parameters of the current epoch.
    ///
    /// # Errors
    ///
    /// Returns `NoEpoch` if the host published none.
    pub fn params(&self) -> Result<Arc<LaunchParams>> {
        let slot = self.soc.slot(self.cluster)?;
        lock(&slot.mailbox)
            .clone()
            .ok_or(RuntimeError::NoEpoch {
                cluster: self.cluster,
            })
    }

    /// Read this cluster's cycle counter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` if the context was built for an unknown cluster.
    pub fn read_cycles(&self) -> Result<CycleStamp> {
        Ok(self.soc.slot(self.cluster)?.clock.read_cycles())
    }

    /// Report cycles spent in this epoch's payload; the host receives them
    /// in its [`crate::Completion`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` if the context was built for an unknown cluster.
    pub fn record_cycles(&self, cycles: u64) -> Result<()> {
        let slot = self.soc.slot(self.cluster)?;
        lock(&slot.cycles).push(CoreCycles {
            core: self.core,
            cycles,
        });
        Ok(())
    }

    /// Post-wake hook: run once per core right after it is woken, before
    /// any kernel logic, on compute and DM cores alike.
    ///
    /// Acknowledges this core's wake interrupt so it does not fire again
    /// while the kernel runs.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePostWake` on a second call in the same epoch.
    pub fn on_post_wake(&self) -> Result<()> {
        let slot = self.soc.slot(self.cluster)?;
        let bit = core_bit(self.core)?;
        slot.sync.post_wake(self.epoch, self.core, || {
            self.soc.write(regs::wake_irq(self.cluster).clear, bit)
        })?;
        trace!("{}/{}: post-wake done", self.cluster, self.core);
        Ok(())
    }

    /// Report that this core has finished its part of the epoch.
    ///
    /// Every memory write made before the call is visible to the host
    /// once it observes completion. The last participant to arrive raises
    /// the cluster's completion interrupt; that happens exactly once per
    /// epoch. Cores outside `scope` return immediately. Under
    /// [`ReturnPolicy::Wait`] other participants block until the barrier
    /// completes.
    ///
    /// # Errors
    ///
    /// - `DuplicateArrival` on a second call in the same epoch
    /// - `ScopeMismatch` if another core arrived with a different scope
    /// - `Timeout` if peers do not arrive within the barrier timeout
    pub fn return_to_host(&self, scope: SyncScope) -> Result<Arrival> {
        fence(Ordering::SeqCst);

        let slot = self.soc.slot(self.cluster)?;
        let arrival = slot
            .sync
            .arrive(self.epoch, self.core, scope, self.soc.partition())?;

        match arrival {
            Arrival::Last => {
                let irq = regs::HOST_IRQ.set;
                self.soc.write(irq, 1 << self.cluster.0)?;
                debug!(
                    "{}/{}: last arrival, signalled host for epoch {}",
                    self.cluster, self.core, self.epoch
                );
            }
            Arrival::Waiting if self.soc.config().return_policy == ReturnPolicy::Wait => {
                slot.sync
                    .wait_signaled(self.epoch, self.soc.config().barrier_timeout)?;
            }
            Arrival::Waiting | Arrival::NotParticipating => {}
        }
        Ok(arrival)
    }
}
