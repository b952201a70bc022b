// SPDX-License-Identifier: AGPL-3.0-only

//! Control-window register map.
//!
//! All registers are 32 bits wide and 4-byte aligned. Offsets are relative
//! to the start of the control window (see [`crate::memmap`]).
//!
//! ```text
//! 0x0000          SoC identification and scratch mailbox
//! 0x0800          Host interrupt controller (one bit per cluster)
//! 0x1000 + n*0x100  Per-cluster block: reset, clock gate, isolation, wake
//! ```
//!
//! Set/clear registers are write-one aliases: writing a 1 bit to `*_SET`
//! sets that bit in the matching `*_PENDING` register, writing it to
//! `*_CLEAR` clears it. Zero bits are ignored. This lets many cores touch
//! their own bit without a read-modify-write race.

use crate::topology::ClusterId;

// ── SoC identification ───────────────────────────────────────────────────────

/// Version/identification register.
pub const SOC_VERSION: usize = 0x0000;

/// Value read from [`SOC_VERSION`] on Occamy.
pub const SOC_VERSION_OCCAMY: u32 = 0x0CCA_0001;

/// Scratch register 0: launch epoch published by the host.
pub const SCRATCH_EPOCH: usize = 0x0010;

/// Scratch register 1: cluster the last launch targeted.
pub const SCRATCH_TARGET: usize = 0x0014;

// ── Host interrupt controller ────────────────────────────────────────────────

/// Host interrupt pending bits, one per cluster. A set bit means that
/// cluster has signalled completion of its current epoch.
pub const HOST_IRQ_PENDING: usize = 0x0800;
/// Write-one-to-set alias of [`HOST_IRQ_PENDING`].
pub const HOST_IRQ_SET: usize = 0x0804;
/// Write-one-to-clear alias of [`HOST_IRQ_PENDING`].
pub const HOST_IRQ_CLEAR: usize = 0x0808;

// ── Per-cluster control block ────────────────────────────────────────────────

/// First per-cluster block.
pub const CLUSTER_BLOCK_BASE: usize = 0x1000;
/// Stride between per-cluster blocks.
pub const CLUSTER_BLOCK_STRIDE: usize = 0x100;

/// Offsets inside one per-cluster block.
pub mod cluster {
    /// Reset control: `1` = reset released, `0` = held in reset.
    pub const RESET_N: usize = 0x00;
    /// Clock enable: `1` = clock running, `0` = gated.
    pub const CLK_ENA: usize = 0x04;
    /// Isolation request, one bit per [`crate::iso`] group (`1` = isolated).
    pub const ISOLATE: usize = 0x08;
    /// Isolation status reported back by the isolation cells.
    pub const ISOLATED: usize = 0x0C;
    /// Wake interrupt pending bits, one per core.
    pub const WAKE_PENDING: usize = 0x10;
    /// Write-one-to-set alias of [`WAKE_PENDING`].
    pub const WAKE_SET: usize = 0x14;
    /// Write-one-to-clear alias of [`WAKE_PENDING`].
    pub const WAKE_CLEAR: usize = 0x18;
}

/// Absolute offset of a register inside a cluster's block.
#[must_use]
pub const fn cluster_reg(id: ClusterId, reg: usize) -> usize {
    CLUSTER_BLOCK_BASE + id.index() * CLUSTER_BLOCK_STRIDE + reg
}

/// Bytes needed to cover the control window for `clusters` clusters.
#[must_use]
pub const fn window_size(clusters: u8) -> usize {
    CLUSTER_BLOCK_BASE + clusters as usize * CLUSTER_BLOCK_STRIDE
}

/// Reset register bits.
pub mod reset {
    /// Reset released.
    pub const RELEASED: u32 = 1;
    /// Held in reset.
    pub const ASSERTED: u32 = 0;
}

/// Clock enable bits.
pub mod clock {
    /// Clock running.
    pub const ENABLED: u32 = 1;
    /// Clock gated.
    pub const GATED: u32 = 0;
}

/// A set/clear alias and the pending register it acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasPair {
    /// Write-one-to-set register.
    pub set: usize,
    /// Write-one-to-clear register.
    pub clear: usize,
    /// Register holding the resulting bits.
    pub pending: usize,
}

/// The host interrupt alias triple.
pub const HOST_IRQ: AliasPair = AliasPair {
    set: HOST_IRQ_SET,
    clear: HOST_IRQ_CLEAR,
    pending: HOST_IRQ_PENDING,
};

/// The wake interrupt alias triple of one cluster.
#[must_use]
pub const fn wake_irq(id: ClusterId) -> AliasPair {
    AliasPair {
        set: cluster_reg(id, cluster::WAKE_SET),
        clear: cluster_reg(id, cluster::WAKE_CLEAR),
        pending: cluster_reg(id, cluster::WAKE_PENDING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SocTopology;

    #[test]
    fn cluster_blocks_do_not_overlap() {
        let last = ClusterId(SocTopology::OCCAMY.clusters - 1);
        assert!(cluster_reg(ClusterId(0), cluster::WAKE_CLEAR) < cluster_reg(ClusterId(1), 0));
        assert!(cluster_reg(last, cluster::WAKE_CLEAR) < window_size(SocTopology::OCCAMY.clusters));
    }

    #[test]
    fn host_block_below_cluster_blocks() {
        assert!(HOST_IRQ_CLEAR < CLUSTER_BLOCK_BASE);
        assert!(SCRATCH_TARGET < HOST_IRQ_PENDING);
    }

    #[test]
    fn registers_are_word_aligned() {
        for reg in [
            cluster::RESET_N,
            cluster::CLK_ENA,
            cluster::ISOLATE,
            cluster::ISOLATED,
            cluster::WAKE_PENDING,
            cluster::WAKE_SET,
            cluster::WAKE_CLEAR,
            HOST_IRQ_PENDING,
            HOST_IRQ_SET,
            HOST_IRQ_CLEAR,
        ] {
            assert_eq!(reg % 4, 0);
        }
    }
}
