// SPDX-License-Identifier: AGPL-3.0-only

//! Cycle timers
//!
//! Each clock domain has its own free-running counter. Stamps carry their
//! domain, so a delta between a host stamp and a cluster stamp is refused
//! instead of silently producing a meaningless number.
//!
//! ```text
//! Domain        Counter               Width
//! ───────────── ───────────────────── ─────
//! Host          mcycle / rdtsc / cntvct 64 bit
//! Cluster(n)    cluster mcycle        32 bit (wraps after ~4.3 s at 1 GHz)
//! ```

use crate::error::{Result, RuntimeError};
use occamy_soc::ClusterId;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Clock domain a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockDomain {
    /// The host processor.
    Host,
    /// One accelerator cluster.
    Cluster(ClusterId),
}

/// Counter width, for wrap-aware deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWidth {
    /// 32-bit counter.
    Bits32,
    /// 64-bit counter.
    Bits64,
}

impl CounterWidth {
    const fn mask(self) -> u64 {
        match self {
            Self::Bits32 => u32::MAX as u64,
            Self::Bits64 => u64::MAX,
        }
    }
}

/// A counter reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStamp {
    /// Domain the value was read in.
    pub domain: ClockDomain,
    /// Raw counter value, already truncated to the counter width.
    pub value: u64,
    /// Width of the counter that produced `value`.
    pub width: CounterWidth,
}

impl CycleStamp {
    /// Elapsed cycles from `earlier` to `self`.
    ///
    /// A single wrap of the counter between the two reads is accounted for.
    ///
    /// # Errors
    ///
    /// Returns `DomainMismatch` if the stamps come from different domains.
    pub fn cycles_since(&self, earlier: &Self) -> Result<u64> {
        if self.domain != earlier.domain {
            return Err(RuntimeError::DomainMismatch {
                earlier: earlier.domain,
                later: self.domain,
            });
        }
        Ok(self.value.wrapping_sub(earlier.value) & self.width.mask())
    }
}

/// A free-running cycle counter local to one clock domain.
pub trait CycleCounter: Debug + Send + Sync {
    /// Domain this counter runs in.
    fn domain(&self) -> ClockDomain;

    /// Counter width.
    fn width(&self) -> CounterWidth;

    /// Raw, untruncated counter value.
    fn raw(&self) -> u64;

    /// Read the counter.
    fn read_cycles(&self) -> CycleStamp {
        let width = self.width();
        CycleStamp {
            domain: self.domain(),
            value: self.raw() & width.mask(),
            width,
        }
    }
}

/// The host processor's architectural cycle counter.
///
/// `rdcycle` on RISC-V, `rdtsc` on x86-64, `cntvct_el0` on AArch64, a
/// monotonic clock in nanoseconds elsewhere. Readings never go below the
/// previous reading of the same counter, even if the thread migrates
/// between cores whose counters are slightly skewed.
#[derive(Debug)]
pub struct HostCounter {
    origin: Instant,
    last: AtomicU64,
}

impl HostCounter {
    /// Create a host counter.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    #[cfg(target_arch = "riscv64")]
    fn arch_cycles(&self) -> u64 {
        let value: u64;
        // SAFETY: rdcycle reads a user-accessible CSR and has no side effects.
        unsafe { std::arch::asm!("rdcycle {0}", out(reg) value) };
        value
    }

    #[cfg(target_arch = "x86_64")]
    fn arch_cycles(&self) -> u64 {
        // SAFETY: rdtsc is available on every x86-64 CPU and has no side effects.
        unsafe { std::arch::x86_64::_rdtsc() }
    }

    #[cfg(target_arch = "aarch64")]
    fn arch_cycles(&self) -> u64 {
        let value: u64;
        // SAFETY: cntvct_el0 is readable from EL0 and has no side effects.
        unsafe { std::arch::asm!("mrs {0}, cntvct_el0", out(reg) value) };
        value
    }

    #[cfg(not(any(target_arch = "riscv64", target_arch = "x86_64", target_arch = "aarch64")))]
    fn arch_cycles(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Time since this counter was created.
    pub fn uptime(&self) -> std::time::Duration {
        self.origin.elapsed()
    }
}

impl Default for HostCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleCounter for HostCounter {
    fn domain(&self) -> ClockDomain {
        ClockDomain::Host
    }

    fn width(&self) -> CounterWidth {
        CounterWidth::Bits64
    }

    fn raw(&self) -> u64 {
        let now = self.arch_cycles();
        let prev = self.last.fetch_max(now, Ordering::AcqRel);
        now.max(prev)
    }
}

/// A counter derived from the monotonic clock, scaled to a nominal frequency.
///
/// Stands in for a cluster's `mcycle` in the simulated SoC.
#[derive(Debug, Clone)]
pub struct DomainClock {
    domain: ClockDomain,
    width: CounterWidth,
    origin: Instant,
    hz: u64,
}

impl DomainClock {
    /// Create a clock for `domain` ticking at `hz`.
    pub fn new(domain: ClockDomain, width: CounterWidth, hz: u64) -> Self {
        Self {
            domain,
            width,
            origin: Instant::now(),
            hz,
        }
    }

    /// 32-bit cluster counter at `hz`.
    pub fn cluster(id: ClusterId, hz: u64) -> Self {
        Self::new(ClockDomain::Cluster(id), CounterWidth::Bits32, hz)
    }
}

impl CycleCounter for DomainClock {
    fn domain(&self) -> ClockDomain {
        self.domain
    }

    fn width(&self) -> CounterWidth {
        self.width
    }

    fn raw(&self) -> u64 {
        let nanos = self.origin.elapsed().as_nanos();
        u64::try_from(nanos * u128::from(self.hz) / 1_000_000_000).unwrap_or(u64::MAX)
    }
}

/// A benchmarked region: stamp at `start`, delta at `stop`.
#[derive(Debug, Clone, Copy)]
pub struct CycleSpan {
    start: CycleStamp,
}

impl CycleSpan {
    /// Open a region on `counter`.
    pub fn start(counter: &dyn CycleCounter) -> Self {
        Self {
            start: counter.read_cycles(),
        }
    }

    /// Stamp taken at `start`.
    pub const fn started(&self) -> CycleStamp {
        self.start
    }

    /// Close the region and return elapsed cycles.
    ///
    /// # Errors
    ///
    /// Returns `DomainMismatch` if `counter` is not the one the span started on.
    pub fn stop(self, counter: &dyn CycleCounter) -> Result<u64> {
        counter.read_cycles().cycles_since(&self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_counter_is_monotonic() {
        let counter = HostCounter::new();
        for _ in 0..1000 {
            let first = counter.read_cycles();
            let second = counter.read_cycles();
            assert!(second.value >= first.value);
        }
    }

    #[test]
    fn domain_clock_is_monotonic() {
        let clock = DomainClock::cluster(ClusterId(0), occamy_soc::memmap::CLUSTER_CLOCK_HZ);
        let first = clock.read_cycles();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let second = clock.read_cycles();
        assert!(second.cycles_since(&first).unwrap() > 0);
    }

    #[test]
    fn wrap_is_accounted_for() {
        let domain = ClockDomain::Cluster(ClusterId(1));
        let before = CycleStamp { domain, value: 0xFFFF_FFF0, width: CounterWidth::Bits32 };
        let after = CycleStamp { domain, value: 0x10, width: CounterWidth::Bits32 };
        assert_eq!(after.cycles_since(&before).unwrap(), 0x20);
    }

    #[test]
    fn cross_domain_delta_is_refused() {
        let host = HostCounter::new().read_cycles();
        let cluster = DomainClock::cluster(ClusterId(0), 1_000).read_cycles();
        let err = cluster.cycles_since(&host).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn span_measures_region() {
        let counter = HostCounter::new();
        let span = CycleSpan::start(&counter);
        let delta = span.stop(&counter).unwrap();
        assert!(delta < u64::MAX / 2);
    }
}
