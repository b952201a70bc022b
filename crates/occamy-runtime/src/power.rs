// SPDX-License-Identifier: AGPL-3.0-only

//! Power/isolation sequencer
//!
//! Brings a cluster from reset + gated + isolated into execution:
//!
//! ```text
//!   IsolatedGated ── reset pulse, clock on ──► UngatedReset ── release mask ──► Running
//!        ▲                                         │  ▲                           │
//!        └──────────────── power_down ─────────────┘  └────────── isolate ────────┘
//! ```
//!
//! The state is decoded from the cluster's registers on every query, so it
//! always agrees with the hardware. Each request to drop isolation is
//! confirmed by polling the isolation-status register.

use crate::error::{Result, RuntimeError};
use crate::regfile::poll_until;
use crate::soc::{lock, Soc};
use occamy_soc::regs::{self, clock, reset};
use occamy_soc::{ClusterId, IsolationMask};
use std::time::Instant;
use tracing::{debug, info};

/// Power state of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Clock gated or reset asserted.
    IsolatedGated,
    /// Clocked and out of reset, every signal group still isolated.
    UngatedReset,
    /// Clocked, out of reset, at least one signal group released.
    Running,
}

impl PowerState {
    fn decode(reset_n: u32, clk_ena: u32, isolated: IsolationMask) -> Self {
        if reset_n != reset::RELEASED || clk_ena != clock::ENABLED {
            Self::IsolatedGated
        } else if isolated == IsolationMask::ALL {
            Self::UngatedReset
        } else {
            Self::Running
        }
    }
}

impl Soc {
    /// Current power state of `cluster`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` for an unknown id.
    pub fn power_state(&self, cluster: ClusterId) -> Result<PowerState> {
        self.slot(cluster)?;
        Ok(PowerState::decode(
            self.read(regs::cluster_reg(cluster, regs::cluster::RESET_N))?,
            self.read(regs::cluster_reg(cluster, regs::cluster::CLK_ENA))?,
            self.isolated(cluster)?,
        ))
    }

    /// Signal groups of `cluster` whose isolation has been released.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCluster` for an unknown id.
    pub fn released(&self, cluster: ClusterId) -> Result<IsolationMask> {
        self.slot(cluster)?;
        Ok(!self.isolated(cluster)?)
    }

    fn isolated(&self, cluster: ClusterId) -> Result<IsolationMask> {
        let bits = self.read(regs::cluster_reg(cluster, regs::cluster::ISOLATED))?;
        Ok(IsolationMask::from_bits_truncate(bits))
    }

    /// Wake `cluster` and release every isolation group.
    ///
    /// Idempotent: waking a running cluster is a no-op.
    ///
    /// # Errors
    ///
    /// - `InvalidCluster` for an unknown id (no register is touched)
    /// - `Timeout` if the isolation cells do not acknowledge in time
    pub fn wake(&self, cluster: ClusterId) -> Result<()> {
        self.wake_with_mask(cluster, IsolationMask::ALL)
    }

    /// Wake `cluster` and release the groups in `mask`.
    ///
    /// A cluster that is already clocked is not reset again, so widening
    /// the mask of a running cluster does not disturb its cores.
    ///
    /// # Errors
    ///
    /// Same as [`Soc::wake`].
    pub fn wake_with_mask(&self, cluster: ClusterId, mask: IsolationMask) -> Result<()> {
        let slot = self.slot(cluster)?;
        let _guard = lock(&slot.power);

        let state = self.power_state(cluster)?;
        if state == PowerState::Running && self.released(cluster)?.contains(mask) {
            debug!("{cluster}: already running with {mask:?} released");
            return Ok(());
        }

        if state == PowerState::IsolatedGated {
            self.reset_and_ungate(cluster)?;
        }
        self.deisolate(cluster, mask)?;

        info!("{cluster}: running, released {:?}", self.released(cluster)?);
        Ok(())
    }

    fn reset_and_ungate(&self, cluster: ClusterId) -> Result<()> {
        let reset_reg = regs::cluster_reg(cluster, regs::cluster::RESET_N);
        debug!("{cluster}: assert reset, ungate clock, release reset");
        self.write(reset_reg, reset::ASSERTED)?;
        self.write(regs::cluster_reg(cluster, regs::cluster::CLK_ENA), clock::ENABLED)?;
        self.write(reset_reg, reset::RELEASED)?;
        Ok(())
    }

    fn deisolate(&self, cluster: ClusterId, mask: IsolationMask) -> Result<()> {
        let request_reg = regs::cluster_reg(cluster, regs::cluster::ISOLATE);
        let request = IsolationMask::from_bits_truncate(self.read(request_reg)?) & !mask;
        debug!("{cluster}: isolation request {request:?}");
        self.write(request_reg, request.bits())?;

        self.await_isolation(cluster, |isolated| (isolated & mask).is_empty(), "release")
    }

    fn await_isolation(
        &self,
        cluster: ClusterId,
        done: impl Fn(IsolationMask) -> bool,
        what: &str,
    ) -> Result<()> {
        let config = self.config();
        let start = Instant::now();
        let acknowledged = poll_until(config.isolation_timeout, config.poll_interval, || {
            Ok(done(self.isolated(cluster)?))
        })?;
        if acknowledged {
            Ok(())
        } else {
            Err(RuntimeError::timeout(
                format!(
                    "{cluster} isolation {what} (status {:?})",
                    self.isolated(cluster)?
                ),
                start.elapsed(),
                None,
            ))
        }
    }

    /// Isolate every signal group of `cluster`; clock and reset are left alone.
    ///
    /// # Errors
    ///
    /// `InvalidCluster` or `Timeout`.
    pub fn isolate(&self, cluster: ClusterId) -> Result<()> {
        let slot = self.slot(cluster)?;
        let _guard = lock(&slot.power);
        self.isolate_locked(cluster)
    }

    fn isolate_locked(&self, cluster: ClusterId) -> Result<()> {
        let all = IsolationMask::ALL;
        self.write(regs::cluster_reg(cluster, regs::cluster::ISOLATE), all.bits())?;
        self.await_isolation(cluster, |isolated| isolated == all, "request")?;
        info!("{cluster}: isolated");
        Ok(())
    }

    /// Isolate `cluster`, gate its clock and hold it in reset.
    ///
    /// # Errors
    ///
    /// `InvalidCluster` or `Timeout`.
    pub fn power_down(&self, cluster: ClusterId) -> Result<()> {
        let slot = self.slot(cluster)?;
        let _guard = lock(&slot.power);
        self.isolate_locked(cluster)?;
        self.write(regs::cluster_reg(cluster, regs::cluster::CLK_ENA), clock::GATED)?;
        self.write(regs::cluster_reg(cluster, regs::cluster::RESET_N), reset::ASSERTED)?;
        info!("{cluster}: powered down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::regfile::SimRegisterFile;
    use crate::ErrorKind;
    use occamy_soc::SocTopology;
    use std::sync::Arc;
    use std::time::Duration;

    fn soc_over(regs: SimRegisterFile) -> Soc {
        let config = RuntimeConfig::default()
            .with_isolation_timeout(Duration::from_millis(20))
            .with_poll_interval(Duration::from_micros(50));
        Soc::new(Arc::new(regs), SocTopology::OCCAMY, config).unwrap()
    }

    fn soc() -> Soc {
        soc_over(SimRegisterFile::for_topology(&SocTopology::OCCAMY))
    }

    #[test]
    fn powers_up_isolated_gated() {
        let soc = soc();
        for id in soc.topology().cluster_ids() {
            assert_eq!(soc.power_state(id).unwrap(), PowerState::IsolatedGated);
        }
    }

    #[test]
    fn wake_is_idempotent() {
        let soc = soc();
        let c = ClusterId(0);
        soc.wake(c).unwrap();
        assert_eq!(soc.power_state(c).unwrap(), PowerState::Running);
        soc.wake(c).unwrap();
        assert_eq!(soc.power_state(c).unwrap(), PowerState::Running);
        assert_eq!(soc.released(c).unwrap(), IsolationMask::ALL);
        // other clusters untouched
        assert_eq!(soc.power_state(ClusterId(1)).unwrap(), PowerState::IsolatedGated);
    }

    #[test]
    fn partial_mask_then_widen() {
        let soc = soc();
        let c = ClusterId(2);
        soc.wake_with_mask(c, IsolationMask::NARROW).unwrap();
        assert_eq!(soc.released(c).unwrap(), IsolationMask::NARROW);
        soc.wake(c).unwrap();
        assert_eq!(soc.released(c).unwrap(), IsolationMask::ALL);
    }

    #[test]
    fn invalid_cluster_touches_nothing() {
        let soc = soc();
        let err = soc.wake(ClusterId(6)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        for id in soc.topology().cluster_ids() {
            assert_eq!(soc.power_state(id).unwrap(), PowerState::IsolatedGated);
        }
    }

    #[test]
    fn stuck_isolation_times_out() {
        let status = regs::cluster_reg(ClusterId(0), regs::cluster::ISOLATED);
        let soc = soc_over(SimRegisterFile::for_topology(&SocTopology::OCCAMY).with_stuck(status));
        let err = soc.wake(ClusterId(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn isolate_and_power_down() {
        let soc = soc();
        let c = ClusterId(1);
        soc.wake(c).unwrap();
        soc.isolate(c).unwrap();
        assert_eq!(soc.power_state(c).unwrap(), PowerState::UngatedReset);
        soc.wake(c).unwrap();
        assert_eq!(soc.power_state(c).unwrap(), PowerState::Running);
        soc.power_down(c).unwrap();
        assert_eq!(soc.power_state(c).unwrap(), PowerState::IsolatedGated);
    }
}
