// SPDX-License-Identifier: AGPL-3.0-only

//! Register-file abstraction
//!
//! Every runtime operation reaches the hardware through [`RegisterFile`].
//! Two implementations exist:
//!
//! - [`SimRegisterFile`]: an atomic word array that also models the small
//!   amount of behaviour the runtime relies on (set/clear aliases, isolation
//!   status echo). Used by the simulated SoC and the unit tests.
//! - [`crate::mmio::MappedRegion`]: the real control window, `mmap`ed.

use crate::error::{Result, RuntimeError};
use occamy_soc::regs::{self, cluster, AliasPair};
use occamy_soc::{IsolationMask, SocTopology};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// 32-bit register access to the SoC control window.
///
/// Writes take `&self`: the window is shared by the host and every
/// simulated core, and registers are individually atomic.
pub trait RegisterFile: Debug + Send + Sync {
    /// Read the 32-bit register at `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if `offset` is outside the window or misaligned.
    fn read32(&self, offset: usize) -> Result<u32>;

    /// Write the 32-bit register at `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if `offset` is outside the window or misaligned.
    fn write32(&self, offset: usize, value: u32) -> Result<()>;
}

/// Poll `ready` until it returns `true` or `timeout` expires.
///
/// Returns `Ok(false)` on expiry. A zero `interval` yields the thread
/// between polls instead of sleeping.
///
/// # Errors
///
/// Propagates the first error returned by `ready`.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut ready: F) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if ready()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        if interval.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(interval);
        }
    }
}

/// Hardware behaviour attached to a simulated register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    /// Writing 1 bits sets them in `pending`.
    SetAlias { pending: usize },
    /// Writing 1 bits clears them in `pending`.
    ClearAlias { pending: usize },
    /// Every write is copied to `to` as well.
    Mirror { to: usize },
    /// Writes are dropped; the register keeps its value.
    Stuck,
}

/// Simulated control window.
///
/// Registers power up with the values real silicon has out of reset:
/// clusters held in reset, clocks gated, every isolation group isolated.
#[derive(Debug)]
pub struct SimRegisterFile {
    words: Vec<AtomicU32>,
    behaviours: HashMap<usize, Behaviour>,
}

impl SimRegisterFile {
    /// Create a zeroed window of `size` bytes with no behaviour attached.
    pub fn new(size: usize) -> Self {
        Self {
            words: (0..size.div_ceil(4)).map(|_| AtomicU32::new(0)).collect(),
            behaviours: HashMap::new(),
        }
    }

    /// Create the control window for `topology`, wired like the silicon.
    pub fn for_topology(topology: &SocTopology) -> Self {
        let mut rf = Self::new(regs::window_size(topology.clusters));
        rf.poke(regs::SOC_VERSION, regs::SOC_VERSION_OCCAMY);
        rf.alias(regs::HOST_IRQ);

        for id in topology.cluster_ids() {
            rf.poke(regs::cluster_reg(id, cluster::RESET_N), regs::reset::ASSERTED);
            rf.poke(regs::cluster_reg(id, cluster::CLK_ENA), regs::clock::GATED);
            rf.poke(regs::cluster_reg(id, cluster::ISOLATE), IsolationMask::ALL.bits());
            rf.poke(regs::cluster_reg(id, cluster::ISOLATED), IsolationMask::ALL.bits());
            rf.behaviours.insert(
                regs::cluster_reg(id, cluster::ISOLATE),
                Behaviour::Mirror {
                    to: regs::cluster_reg(id, cluster::ISOLATED),
                },
            );
            rf.alias(regs::wake_irq(id));
        }

        tracing::debug!(
            "Simulated control window: {} clusters, {} bytes",
            topology.clusters,
            rf.words.len() * 4
        );
        rf
    }

    /// Make writes to `offset` have no effect (models a stuck status line).
    #[must_use]
    pub fn with_stuck(mut self, offset: usize) -> Self {
        self.behaviours.insert(offset, Behaviour::Stuck);
        self
    }

    fn alias(&mut self, pair: AliasPair) {
        self.behaviours.insert(pair.set, Behaviour::SetAlias { pending: pair.pending });
        self.behaviours.insert(pair.clear, Behaviour::ClearAlias { pending: pair.pending });
    }

    fn poke(&self, offset: usize, value: u32) {
        if let Some(word) = self.words.get(offset / 4) {
            word.store(value, Ordering::SeqCst);
        }
    }

    fn word(&self, offset: usize) -> Result<&AtomicU32> {
        if offset % 4 != 0 {
            return Err(RuntimeError::register(offset, "misaligned 32-bit access"));
        }
        self.words.get(offset / 4).ok_or_else(|| {
            RuntimeError::register(
                offset,
                format!("outside simulated window ({:#x} bytes)", self.words.len() * 4),
            )
        })
    }

    fn store(&self, offset: usize, value: u32) -> Result<()> {
        if self.behaviours.get(&offset) == Some(&Behaviour::Stuck) {
            tracing::trace!("Dropped write {value:#x} to stuck register {offset:#x}");
            return Ok(());
        }
        self.word(offset)?.store(value, Ordering::SeqCst);
        Ok(())
    }
}

impl RegisterFile for SimRegisterFile {
    fn read32(&self, offset: usize) -> Result<u32> {
        let value = self.word(offset)?.load(Ordering::SeqCst);
        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    fn write32(&self, offset: usize, value: u32) -> Result<()> {
        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");
        match self.behaviours.get(&offset).copied() {
            Some(Behaviour::SetAlias { pending }) => {
                self.word(offset)?;
                self.word(pending)?.fetch_or(value, Ordering::SeqCst);
                Ok(())
            }
            Some(Behaviour::ClearAlias { pending }) => {
                self.word(offset)?;
                self.word(pending)?.fetch_and(!value, Ordering::SeqCst);
                Ok(())
            }
            Some(Behaviour::Mirror { to }) => {
                self.store(offset, value)?;
                self.store(to, value)
            }
            Some(Behaviour::Stuck) | None => self.store(offset, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use occamy_soc::ClusterId;

    #[test]
    fn powers_up_isolated_and_gated() {
        let rf = SimRegisterFile::for_topology(&SocTopology::OCCAMY);
        let c = ClusterId(3);
        assert_eq!(rf.read32(regs::cluster_reg(c, cluster::CLK_ENA)).unwrap(), 0);
        assert_eq!(rf.read32(regs::cluster_reg(c, cluster::RESET_N)).unwrap(), 0);
        assert_eq!(
            rf.read32(regs::cluster_reg(c, cluster::ISOLATED)).unwrap(),
            IsolationMask::ALL.bits()
        );
        assert_eq!(rf.read32(regs::SOC_VERSION).unwrap(), regs::SOC_VERSION_OCCAMY);
    }

    #[test]
    fn set_and_clear_aliases() {
        let rf = SimRegisterFile::for_topology(&SocTopology::OCCAMY);
        rf.write32(regs::HOST_IRQ_SET, 0b101).unwrap();
        rf.write32(regs::HOST_IRQ_SET, 0b010).unwrap();
        assert_eq!(rf.read32(regs::HOST_IRQ_PENDING).unwrap(), 0b111);
        rf.write32(regs::HOST_IRQ_CLEAR, 0b001).unwrap();
        assert_eq!(rf.read32(regs::HOST_IRQ_PENDING).unwrap(), 0b110);
    }

    #[test]
    fn isolation_status_echoes_request() {
        let rf = SimRegisterFile::for_topology(&SocTopology::OCCAMY);
        let c = ClusterId(0);
        rf.write32(regs::cluster_reg(c, cluster::ISOLATE), 0).unwrap();
        assert_eq!(rf.read32(regs::cluster_reg(c, cluster::ISOLATED)).unwrap(), 0);
    }

    #[test]
    fn stuck_status_never_changes() {
        let c = ClusterId(0);
        let status = regs::cluster_reg(c, cluster::ISOLATED);
        let rf = SimRegisterFile::for_topology(&SocTopology::OCCAMY).with_stuck(status);
        rf.write32(regs::cluster_reg(c, cluster::ISOLATE), 0).unwrap();
        assert_eq!(rf.read32(status).unwrap(), IsolationMask::ALL.bits());
    }

    #[test]
    fn rejects_bad_offsets() {
        let rf = SimRegisterFile::new(16);
        assert!(rf.read32(2).is_err());
        assert!(rf.read32(16).is_err());
        assert!(rf.write32(64, 1).is_err());
    }

    #[test]
    fn poll_until_times_out() {
        let ready = poll_until(Duration::from_millis(5), Duration::from_micros(100), || Ok(false));
        assert!(!ready.unwrap());
        let ready = poll_until(Duration::from_millis(5), Duration::ZERO, || Ok(true));
        assert!(ready.unwrap());
    }
}
