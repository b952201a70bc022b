// SPDX-License-Identifier: AGPL-3.0-only

//! Host side of the offload protocol
//!
//! ```text
//! host                                   cluster cores
//! ────                                   ─────────────
//! launch():
//!   check Running + narrow path released
//!   open epoch, publish LaunchParams
//!   clear stale completion bit
//!   raise wake bit of every core   ───►  on_post_wake()
//!                                        payload (compute cores)
//!                                        return_to_host(scope)
//! wait():                                  last arrival raises
//!   poll completion bit           ◄───     HOST_IRQ bit of the cluster
//!   clear it, observe epoch
//! ```

use crate::buffer::LaunchParams;
use crate::epoch::{Epoch, EpochStatus};
use crate::error::{Result, RuntimeError};
use crate::power::PowerState;
use crate::regfile::poll_until;
use crate::soc::{lock, CoreCycles, Soc};
use crate::timer::CycleStamp;
use occamy_soc::{regs, ClusterId, IsolationMask};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A launched, not yet completed offload.
#[derive(Debug)]
#[must_use = "a launch must be waited on or aborted"]
pub struct Launch {
    cluster: ClusterId,
    epoch: Epoch,
    started: CycleStamp,
}

impl Launch {
    /// Target cluster.
    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    /// Epoch opened for this launch.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

/// Outcome of a completed offload.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Cluster that ran the offload.
    pub cluster: ClusterId,
    /// Epoch that completed.
    pub epoch: Epoch,
    /// Host-domain cycles from launch to observed completion.
    pub host_cycles: u64,
    /// Cluster-domain cycles reported by the cores, in arrival order.
    pub core_cycles: Vec<CoreCycles>,
    /// Barrier bookkeeping at completion.
    pub status: EpochStatus,
}

impl Completion {
    /// Longest cycle count any core reported.
    pub fn max_core_cycles(&self) -> Option<u64> {
        self.core_cycles.iter().map(|c| c.cycles).max()
    }
}

impl Soc {
    /// Launch `params` on `cluster` without waiting.
    ///
    /// # Errors
    ///
    /// - `InvalidCluster` for an unknown id
    /// - `ClusterNotRunning` if the cluster has not been woken
    /// - `SignalPathIsolated` if the narrow ports are still isolated
    /// - `EpochInFlight` if the previous epoch is unfinished or unobserved
    pub fn launch(&self, cluster: ClusterId, params: LaunchParams) -> Result<Launch> {
        let slot = self.slot(cluster)?;

        let state = self.power_state(cluster)?;
        if state != PowerState::Running {
            return Err(RuntimeError::ClusterNotRunning { cluster, state });
        }
        let released = self.released(cluster)?;
        if !released.contains(IsolationMask::NARROW) {
            return Err(RuntimeError::SignalPathIsolated { cluster, released });
        }

        // cores of the new epoch block on the mailbox until it is filled
        let mut mailbox = lock(&slot.mailbox);
        let epoch = slot.sync.open()?;
        *mailbox = Some(Arc::new(params));
        lock(&slot.cycles).clear();
        drop(mailbox);

        // scratch register holds the low word of the epoch
        let scratch = u32::try_from(epoch.0 & u64::from(u32::MAX)).unwrap_or_default();
        self.write(regs::SCRATCH_EPOCH, scratch)?;
        self.write(regs::SCRATCH_TARGET, u32::from(cluster.0))?;
        self.write(regs::HOST_IRQ.clear, 1 << cluster.0)?;

        let started = self.read_cycles();
        self.write(regs::wake_irq(cluster).set, self.topology().all_cores_mask())?;
        debug!("{cluster}: launched epoch {epoch}");

        Ok(Launch {
            cluster,
            epoch,
            started,
        })
    }

    /// Block until `launch` completes.
    ///
    /// # Errors
    ///
    /// - `Timeout` after `launch_timeout`; the epoch stays in flight and
    ///   further launches on the cluster are refused until
    ///   [`Soc::abort_epoch`]
    /// - `UnexpectedSignal` if the completion bit does not match the epoch
    pub fn wait(&self, launch: Launch) -> Result<Completion> {
        let Launch {
            cluster,
            epoch,
            started,
        } = launch;
        let slot = self.slot(cluster)?;
        let config = self.config();
        let bit = 1u32 << cluster.0;

        let start = Instant::now();
        let signalled = poll_until(config.launch_timeout, config.poll_interval, || {
            Ok(self.read(regs::HOST_IRQ.pending)? & bit != 0)
        })?;
        if !signalled {
            let status = slot.sync.status();
            warn!(
                "{cluster}: epoch {epoch} timed out with {}/{} arrivals",
                status.arrived, status.expected
            );
            return Err(RuntimeError::timeout(
                format!("{cluster} completion of epoch {epoch}"),
                start.elapsed(),
                Some(status),
            ));
        }

        let host_cycles = self.read_cycles().cycles_since(&started)?;
        self.write(regs::HOST_IRQ.clear, bit)?;
        let status = slot.sync.observe(epoch)?;
        let core_cycles = lock(&slot.cycles).clone();

        info!("{cluster}: epoch {epoch} complete in {host_cycles} host cycles");
        Ok(Completion {
            cluster,
            epoch,
            host_cycles,
            core_cycles,
            status,
        })
    }

    /// Launch `params` on `cluster` and block until every participating
    /// core has returned. Output buffers are fully written when this
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// See [`Soc::launch`] and [`Soc::wait`].
    pub fn launch_and_wait(&self, cluster: ClusterId, params: LaunchParams) -> Result<Completion> {
        let launch = self.launch(cluster, params)?;
        self.wait(launch)
    }

    /// Abandon the epoch in flight on `cluster`, if any.
    ///
    /// Cores still blocked in the barrier get `EpochAborted`. Cores that
    /// never arrived are not touched; isolating or powering the cluster
    /// down is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` for an unknown id.
    pub fn abort_epoch(&self, cluster: ClusterId) -> Result<Option<Epoch>> {
        let slot = self.slot(cluster)?;
        let aborted = slot.sync.abort();
        self.write(regs::HOST_IRQ.clear, 1 << cluster.0)?;
        self.write(regs::wake_irq(cluster).clear, self.topology().all_cores_mask())?;
        *lock(&slot.mailbox) = None;
        Ok(aborted)
    }
}
